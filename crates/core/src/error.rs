#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unrecognized color '{0}'")]
    UnknownColor(String),

    #[error("Tensor shape mismatch: {0}")]
    TensorShape(String),
}
