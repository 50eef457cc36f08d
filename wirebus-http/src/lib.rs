//! # wirebus-http
//!
//! Plain HTTP GET/POST helper: a stateless request/response wrapper with no
//! concurrency of its own. Independent of the bus crates.

// TODO: add https support (needs a TLS backend feature on reqwest)

use thiserror::Error;

/// Outcome of one HTTP request.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl Response {
    /// Returns whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP helper errors.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Performs a single GET request.
pub async fn get(url: &str) -> Result<Response, HttpError> {
    tracing::debug!("GET {}", url);
    let response = reqwest::get(url).await?;
    read_response(response).await
}

/// Performs a single POST request with `body` as the request body.
pub async fn post(url: &str, body: impl Into<String>) -> Result<Response, HttpError> {
    tracing::debug!("POST {}", url);
    let client = reqwest::Client::new();
    let response = client.post(url).body(body.into()).send().await?;
    read_response(response).await
}

async fn read_response(response: reqwest::Response) -> Result<Response, HttpError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(Response { status, body })
}
