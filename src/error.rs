use thiserror::Error;

/// Errors that can occur while bringing up the audio service.
///
/// Only construction can fail from the consumer's point of view. Runtime
/// problems (server restarts, malformed device data, rejected requests) are
/// logged and self-heal through reconnection and re-fetching; they are never
/// surfaced through this type.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The PulseAudio threaded mainloop could not be allocated
    #[error("failed to create PulseAudio mainloop")]
    MainloopCreation,

    /// The PulseAudio context could not be allocated
    #[error("failed to create PulseAudio context")]
    ContextCreation,

    /// The initial connection to the server could not be initiated
    #[error("PulseAudio connection failed: {0}")]
    ConnectionFailed(String),

    /// The background worker thread died before reporting its startup result
    #[error("audio worker thread unavailable")]
    WorkerUnavailable,
}
