use super::{ObjectStore, PutOptions, PutReceipt, StoreError, join_url};
use crate::naming::validate_key;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, IF_NONE_MATCH};
use std::time::{Duration, Instant};

/// Longest slice of an error response body kept in [`StoreError::Rejected`].
const MAX_ERROR_BODY: usize = 200;

/// S3-style HTTP object store.
///
/// Objects are written with `PUT {endpoint}/{bucket}/{key}`. Overwrite
/// protection uses a conditional write (`If-None-Match: *`), which S3, R2, and
/// most S3-compatible gateways answer with `412 Precondition Failed` when the
/// key is taken.
pub struct HttpStore {
    endpoint: String,
    bucket: String,
    public_base_url: String,
    bearer_token: Option<String>,
    client: Client,
}

impl HttpStore {
    /// `timeout` bounds each request end to end; expiry surfaces as
    /// [`StoreError::Network`].
    pub fn new(
        endpoint: String,
        bucket: String,
        public_base_url: String,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            public_base_url,
            bearer_token: None,
            client,
        })
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.bucket,
            key.trim_start_matches('/')
        )
    }
}

fn network_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Network(format!("request timed out: {e}"))
    } else {
        StoreError::Network(e.to_string())
    }
}

fn truncated_body(resp: reqwest::blocking::Response) -> String {
    let mut body = resp.text().unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

impl ObjectStore for HttpStore {
    fn name(&self) -> &'static str {
        "http"
    }

    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        options: PutOptions,
    ) -> Result<PutReceipt, StoreError> {
        validate_key(key).map_err(StoreError::InvalidKey)?;
        let started = Instant::now();

        let mut req = self
            .client
            .put(self.object_url(key))
            .header(CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        if options.fail_on_exists {
            req = req.header(IF_NONE_MATCH, "*");
        }
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().map_err(network_error)?;
        let status = resp.status();
        if status == StatusCode::PRECONDITION_FAILED || status == StatusCode::CONFLICT {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: truncated_body(resp),
            });
        }

        tracing::debug!(
            backend = "http",
            key,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "object uploaded"
        );
        Ok(PutReceipt {
            url: self.public_url(key),
        })
    }

    fn public_url(&self, key: &str) -> String {
        if self.public_base_url.trim().is_empty() {
            self.object_url(key)
        } else {
            join_url(&self.public_base_url, key)
        }
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        validate_key(key).map_err(StoreError::InvalidKey)?;
        let mut req = self.client.get(self.object_url(key));
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().map_err(network_error)?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: truncated_body(resp),
            });
        }
        resp.bytes().map(|b| b.to_vec()).map_err(network_error)
    }
}
