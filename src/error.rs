use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The answer endpoint replied with a non-success status or without a body
    #[error("bad response from {url}: {status}")]
    BadResponse { url: String, status: StatusCode },

    /// A fire-and-forget endpoint refused the request
    #[error("request to {url} was rejected with {status}: {body}")]
    Rejected {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
