pub type AvatarfitResult<T> = Result<T, AvatarfitError>;

#[derive(thiserror::Error, Debug)]
pub enum AvatarfitError {
    #[error("invalid image dimensions: {0}")]
    InvalidImageDimensions(String),

    #[error("image load error: {0}")]
    ImageLoad(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("polling timed out after {attempts} attempts")]
    PollingTimeout { attempts: u32 },

    #[error("api key missing: {0}")]
    ApiKeyMissing(String),

    #[error("upstream http error: {0}")]
    UpstreamHttp(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AvatarfitError {
    pub fn invalid_image_dimensions(msg: impl Into<String>) -> Self {
        Self::InvalidImageDimensions(msg.into())
    }

    pub fn image_load(msg: impl Into<String>) -> Self {
        Self::ImageLoad(msg.into())
    }

    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    pub fn api_key_missing(msg: impl Into<String>) -> Self {
        Self::ApiKeyMissing(msg.into())
    }

    pub fn upstream_http(msg: impl Into<String>) -> Self {
        Self::UpstreamHttp(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            AvatarfitError::invalid_image_dimensions("x")
                .to_string()
                .contains("invalid image dimensions:")
        );
        assert!(
            AvatarfitError::image_load("x")
                .to_string()
                .contains("image load error:")
        );
        assert!(
            AvatarfitError::generation_failed("x")
                .to_string()
                .contains("generation failed:")
        );
        assert!(
            AvatarfitError::upstream_http("x")
                .to_string()
                .contains("upstream http error:")
        );
        assert!(
            AvatarfitError::validation("x")
                .to_string()
                .contains("validation error:")
        );
    }

    #[test]
    fn polling_timeout_reports_attempt_count() {
        let err = AvatarfitError::PollingTimeout { attempts: 120 };
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = AvatarfitError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
