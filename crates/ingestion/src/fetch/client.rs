//! HTTP access to griddap servers.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{retry_with_backoff, AttemptError, GriddapQuery, RetryPolicy};
use crate::config::FetchConfig;
use crate::error::FetchError;

/// Sent with every griddap request.
pub const USER_AGENT: &str = "ocean-drivers-anomaly-detection/1.0";

/// A downloaded response body.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub bytes: Bytes,
    /// `Content-Length` declared by the server, if any
    pub content_length: Option<u64>,
}

/// A server that answers griddap queries. One call is one attempt.
#[async_trait]
pub trait GridServer: Send + Sync {
    async fn fetch_once(&self, query: &GriddapQuery) -> Result<FetchedPayload, AttemptError>;
}

/// [`GridServer`] over HTTP.
pub struct ErddapClient {
    client: Client,
}

impl ErddapClient {
    pub fn new(request_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Fatal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

/// 5xx, 408 and 429 are worth retrying; other non-success codes are not.
pub(crate) fn classify_status(status: StatusCode) -> Option<AttemptError> {
    if status.is_success() {
        None
    } else if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        Some(AttemptError::Retryable(format!("HTTP {}", status)))
    } else {
        Some(AttemptError::Fatal(format!("HTTP {}", status)))
    }
}

fn classify_transport(e: reqwest::Error) -> AttemptError {
    if e.is_builder() {
        AttemptError::Fatal(format!("invalid request: {}", e))
    } else {
        AttemptError::Retryable(e.to_string())
    }
}

#[async_trait]
impl GridServer for ErddapClient {
    async fn fetch_once(&self, query: &GriddapQuery) -> Result<FetchedPayload, AttemptError> {
        let url = query.to_url();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_transport)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let content_length = response.content_length();
        let bytes = response.bytes().await.map_err(classify_transport)?;

        Ok(FetchedPayload {
            bytes,
            content_length,
        })
    }
}

/// Retrying fetcher that only returns bodies that look like NetCDF files.
#[derive(Clone)]
pub struct RemoteDataClient {
    server: Arc<dyn GridServer>,
    policy: RetryPolicy,
    min_bytes: usize,
}

impl RemoteDataClient {
    pub fn new(server: Arc<dyn GridServer>, config: &FetchConfig) -> Self {
        Self {
            server,
            policy: RetryPolicy::from(config),
            min_bytes: config.min_bytes,
        }
    }

    /// HTTP client configured from `config`.
    pub fn http(config: &FetchConfig) -> Result<Self, FetchError> {
        let server = ErddapClient::new(config.request_timeout())?;
        Ok(Self::new(Arc::new(server), config))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn min_bytes(&self) -> usize {
        self.min_bytes
    }

    /// Fetch one query. Truncated or non-NetCDF bodies count as transient failures.
    #[instrument(skip(self, query), fields(dataset = %query.dataset_id))]
    pub async fn fetch(&self, query: &GriddapQuery) -> Result<FetchedPayload, FetchError> {
        let url = query.to_url();
        debug!(url = %url, "Fetching griddap subset");

        let payload = retry_with_backoff(&self.policy, &query.dataset_id, move |_| async move {
            let payload = self.server.fetch_once(query).await?;

            if let Some(declared) = payload.content_length {
                if declared != payload.bytes.len() as u64 {
                    return Err(AttemptError::Retryable(format!(
                        "body truncated: declared {} bytes, received {}",
                        declared,
                        payload.bytes.len()
                    )));
                }
            }

            netcdf_parser::validate_header(&payload.bytes, self.min_bytes)
                .map_err(|e| AttemptError::Retryable(e.to_string()))?;

            Ok(payload)
        })
        .await?;

        info!(bytes = payload.bytes.len(), "Fetched griddap subset");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Some(AttemptError::Retryable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(AttemptError::Retryable(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Some(AttemptError::Fatal(_))
        ));
    }

    #[tokio::test]
    async fn test_requests_carry_user_agent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Capture one request head and answer 404.
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&head).to_ascii_lowercase()
        });

        // Keep the loopback request off any proxy configured in the environment.
        std::env::set_var("NO_PROXY", "127.0.0.1");
        std::env::set_var("no_proxy", "127.0.0.1");
        let client = ErddapClient::new(Duration::from_secs(5)).unwrap();
        let query = GriddapQuery {
            base_url: format!("http://{}/erddap/griddap", addr),
            dataset_id: "ncdcOisst21Agg".to_string(),
            variables: vec!["sst".to_string()],
            dims: Vec::new(),
        };
        let result = client.fetch_once(&query).await;
        assert!(matches!(result, Err(AttemptError::Fatal(_))));

        let head = server.await.unwrap();
        assert!(head.starts_with("get /erddap/griddap/ncdcoisst21agg.nc?sst"));
        assert!(head.contains(&format!("user-agent: {}", USER_AGENT)));
    }
}
