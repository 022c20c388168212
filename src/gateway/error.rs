use thiserror::Error;

/// Failure talking to the account gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request never produced a response.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The gateway answered with a non-2xx status.
    #[error("HTTP {status}: {reason} ({endpoint})")]
    Status {
        endpoint: String,
        status: u16,
        reason: String,
    },

    /// The body could not be read as the expected JSON shape.
    #[error("malformed response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl GatewayError {
    pub fn status(endpoint: &str, status: u16, reason: &str) -> Self {
        GatewayError::Status {
            endpoint: endpoint.to_string(),
            status,
            reason: reason.to_string(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
