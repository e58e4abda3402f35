use serde::Serialize;

/// Controller state machine.
///
/// State transitions:
/// ```text
/// ready ⇄ listening ⇄ recording
///   └──────────────────↗   (start_recording from ready listens first)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Ready,
    Listening,
    Recording,
}

impl ServiceState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// True while audio is being captured into memory (listening or recording).
    pub fn is_capturing(&self) -> bool {
        !self.is_ready()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::Ready
    }
}
