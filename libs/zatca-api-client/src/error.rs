// [libs/zatca-api-client/src/error.rs]
//! Error taxonomy for the ZATCA REST client, matching the NetworkError /
//! HttpError / ProtocolError / TimeoutError kinds the submission contract
//! distinguishes: a transport failure is retryable, a non-2xx response is
//! the regulator's own verdict and is not.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("NETWORK_FAULT: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP_FAULT: {status} — {body}")]
    Http { status: u16, body: String },
    #[error("PROTOCOL_FAULT: {0}")]
    Protocol(String),
    #[error("TIMEOUT_FAULT: request did not complete within the configured timeout")]
    Timeout,
}
