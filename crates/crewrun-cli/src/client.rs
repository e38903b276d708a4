//! HTTP client for the coordinator admin API.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClientError;

/// Error body returned by the coordinator.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// HTTP client for the coordinator REST API.
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check if the coordinator is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = self.url("/health");
        debug!(url = %url, "Checking health");

        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// GET JSON from an endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        Self::decode(path, response).await
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "POST request");

        let response = self.inner.post(&url).json(body).send().await?;
        Self::decode(path, response).await
    }

    /// DELETE a resource and decode the JSON reply.
    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "DELETE request");

        let response = self.inner.delete(&url).send().await?;
        Self::decode(path, response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ClientError::Serialization(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_body(status, path, &body))
    }
}

/// Map a non-success reply onto [`ClientError`].
fn error_from_body(status: StatusCode, path: &str, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) if status == StatusCode::NOT_FOUND => ClientError::NotFound(err.message),
        Ok(err) => ClientError::Api {
            status: status.as_u16(),
            code: err.error,
            message: err.message,
        },
        Err(_) if status == StatusCode::NOT_FOUND => ClientError::NotFound(path.to_string()),
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            code: "http_error".to_string(),
            message: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_mapping() {
        let err = error_from_body(
            StatusCode::CONFLICT,
            "/v1/tasks",
            r#"{"error":"invalid_state","message":"task t1 already submitted"}"#,
        );
        match err {
            ClientError::Api { status, code, .. } => {
                assert_eq!(status, 409);
                assert_eq!(code, "invalid_state");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = error_from_body(StatusCode::NOT_FOUND, "/v1/workers/x", "");
        assert!(matches!(err, ClientError::NotFound(path) if path == "/v1/workers/x"));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = HttpClient::new("http://localhost:8700/");
        assert_eq!(client.url("/health"), "http://localhost:8700/health");
    }
}
