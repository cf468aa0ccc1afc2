/// Errors surfaced by the workflow host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// A referenced checkpoint or lora weight could not be resolved.
    #[error("Asset not found: {kind} '{name}'")]
    MissingAsset { kind: &'static str, name: String },

    /// Checkpoint load or lora patch failed.
    #[error("Model load failed for '{name}': {message}")]
    LoadFailed { name: String, message: String },

    /// Tokenize/encode of a prompt failed.
    #[error("Text encode failed: {0}")]
    EncodeFailed(String),

    /// The sampler raised.
    #[error("Sampler failed: {0}")]
    SamplerFailed(String),

    /// VAE decode raised.
    #[error("VAE decode failed: {0}")]
    DecodeFailed(String),

    /// The user aborted execution from the host UI.
    ///
    /// Must be propagated unchanged; pending work is discarded.
    #[error("Interrupt requested by host")]
    Interrupted,
}

impl HostError {
    /// Whether the error is the host-originated abort signal.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, HostError::Interrupted)
    }
}
