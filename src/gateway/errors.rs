//! Gateway error types.

use thiserror::Error;

/// Errors from the chat completion gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("cannot reach gateway at {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("gateway returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid gateway response: {reason}")]
    InvalidResponse { reason: String },

    #[error("gateway configuration error: {reason}")]
    Config { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = GatewayError::HttpStatus {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(e.to_string(), "gateway returned HTTP 429: rate limited");

        let e = GatewayError::ConnectionFailed {
            endpoint: "http://localhost:11434".into(),
            reason: "refused".into(),
        };
        assert!(e.to_string().contains("http://localhost:11434"));
    }
}
