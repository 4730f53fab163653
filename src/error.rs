pub type GiftboxResult<T> = Result<T, GiftboxError>;

#[derive(thiserror::Error, Debug)]
pub enum GiftboxError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GiftboxError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            GiftboxError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            GiftboxError::storage("x")
                .to_string()
                .contains("storage error:")
        );
        assert!(
            GiftboxError::encode("x")
                .to_string()
                .contains("encode error:")
        );
        assert!(
            GiftboxError::capture("x")
                .to_string()
                .contains("capture error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = GiftboxError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
