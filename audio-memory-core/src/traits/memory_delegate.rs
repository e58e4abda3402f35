use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::ServiceState;

/// Event delegate for controller notifications.
///
/// All methods are called on the controller's callback thread, never on the
/// audio worker. Implementations should marshal to the UI thread if needed.
pub trait MemoryDelegate: Send + Sync {
    /// Called after every state transition.
    fn on_state_changed(&self, state: ServiceState);

    /// Called for failures that have no caller callback to report to:
    /// capture source open failures, aborted recording sessions, rejected
    /// requests.
    fn on_error(&self, error: &CaptureError);

    /// Called when a recording session ends without a `stop_recording`
    /// callback (listening disabled mid-recording, controller dropped).
    fn on_recording_finished(&self, result: &RecordingResult);
}
