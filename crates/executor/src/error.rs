use gridsweep_host::HostError;
use gridsweep_manifest::ManifestError;

/// Errors surfaced by the sweep executor.
///
/// Per-cell sampler and asset failures are recovered inside the loop
/// (logged, cell skipped) and never reach this enum; what does reach it
/// is fatal for the node invocation.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// Invalid JSON in one of the sweep inputs, named by field.
    #[error("JSON error in {input}: {message}")]
    ConfigParse {
        input: &'static str,
        message: String,
    },

    /// Host-originated abort. Pending cells are discarded; flushed work
    /// stays durable.
    #[error("Interrupt requested by host")]
    Interrupted,

    /// Manifest persistence failed; flush work was lost.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Session directory creation or image write failed.
    #[error("Session I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A decoded frame could not be converted or encoded.
    #[error("Image encode failed: {0}")]
    ImageEncode(String),

    /// Pending latents disagreed on shape at flush time.
    #[error("Latent batch concat failed: {0}")]
    LatentShape(String),

    /// A non-recoverable host failure outside the per-cell loop.
    #[error("Host error: {0}")]
    Host(HostError),
}

impl From<HostError> for SweepError {
    fn from(e: HostError) -> Self {
        if e.is_interrupt() {
            SweepError::Interrupted
        } else {
            SweepError::Host(e)
        }
    }
}
