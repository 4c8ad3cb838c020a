use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscuitError {
    #[error("Discuit API error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Authentication required for {operation}")]
    NotAuthenticated { operation: String },

    #[error("Could not obtain a csrf token from the server")]
    CsrfTokenUnavailable,
}

impl ApiError {
    pub fn not_authenticated(operation: impl Into<String>) -> Self {
        Self::NotAuthenticated {
            operation: operation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DiscuitError::Api(ApiError::not_authenticated("comment"));
        assert_eq!(err.to_string(), "Discuit API error: Authentication required for comment");

        let err = DiscuitError::Api(ApiError::CsrfTokenUnavailable);
        assert!(err.to_string().contains("csrf token"));
    }
}
