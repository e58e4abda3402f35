use thiserror::Error;

/// Errors that can occur while capturing into audio memory or saving from it.
///
/// Capture faults (`BadParameter`, `InvalidOperation`, `Device`) are
/// fail-soft: the pull that hit them counts as an empty read and scheduling
/// carries on. `Storage` faults end the session they happened in.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture source rejected a parameter")]
    BadParameter,

    #[error("capture source is not in a readable state")]
    InvalidOperation,

    #[error("capture device error: {0}")]
    Device(String),

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("audio worker is not running")]
    WorkerUnavailable,
}

impl CaptureError {
    /// Whether this error is local to a single capture pull.
    pub fn is_capture_fault(&self) -> bool {
        matches!(
            self,
            Self::BadParameter | Self::InvalidOperation | Self::Device(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_capture_faults() {
        assert!(CaptureError::BadParameter.is_capture_fault());
        assert!(CaptureError::InvalidOperation.is_capture_fault());
        assert!(CaptureError::Device("unplugged".into()).is_capture_fault());
        assert!(!CaptureError::Storage("disk full".into()).is_capture_fault());
        assert!(!CaptureError::DeviceNotAvailable.is_capture_fault());
    }
}
