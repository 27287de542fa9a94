//! # Remote Backend
//!
//! Where queued mutations are sent.
//!
//! ## Request Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sale        POST {base}/rest/v1/sales                                 │
//! │  sale_items  POST {base}/rest/v1/sale_items                            │
//! │  inventory   POST {base}/rest/v1/inventory?on_conflict=product_id,user_id
//! │              Prefer: resolution=merge-duplicates                       │
//! │                                                                         │
//! │  Headers on every call:                                                │
//! │    apikey: <api_key>                                                   │
//! │    Authorization: Bearer <api_key>                                     │
//! │    Content-Type: application/json                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::config::BackendSettings;
use crate::error::{SyncError, SyncResult};
use crate::mutation::{Mutation, MutationKind};

/// Something that can apply one mutation remotely.
///
/// An `Ok` means the backend durably accepted the write.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn apply(&self, mutation: &Mutation) -> SyncResult<()>;
}

// =============================================================================
// REST Backend
// =============================================================================

/// PostgREST-style HTTP backend.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base_url: Url,
    api_key: String,
    timeout_secs: u64,
}

/// Target of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    /// Value of the `Prefer` header, if any.
    pub prefer: Option<&'static str>,
}

impl RestBackend {
    pub fn new(settings: &BackendSettings) -> SyncResult<Self> {
        let base_url = settings.base_url()?;
        let client = Client::builder()
            .user_agent(format!("tillbox/{}", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(RestBackend {
            client,
            base_url,
            api_key: settings.api_key.clone(),
            timeout_secs: settings.request_timeout_secs,
        })
    }

    pub fn endpoint(&self, kind: MutationKind) -> Endpoint {
        let base = self.base_url.as_str().trim_end_matches('/');
        match kind {
            MutationKind::Sale | MutationKind::SaleItems => Endpoint {
                url: format!("{}/rest/v1/{}", base, kind.table()),
                prefer: None,
            },
            MutationKind::Inventory => Endpoint {
                url: format!(
                    "{}/rest/v1/{}?on_conflict=product_id,user_id",
                    base,
                    kind.table()
                ),
                prefer: Some("resolution=merge-duplicates"),
            },
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout_secs)
        } else if err.is_connect() {
            SyncError::ConnectionFailed(format!("Cannot reach {}", self.base_url))
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn apply(&self, mutation: &Mutation) -> SyncResult<()> {
        let kind = mutation.kind();
        let endpoint = self.endpoint(kind);
        let body = mutation.to_payload()?;

        let mut request = self
            .client
            .post(&endpoint.url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(prefer) = endpoint.prefer {
            request = request.header("Prefer", prefer);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(rejection(status, &text));
        }

        debug!(kind = %kind, status = status.as_u16(), "Mutation accepted");
        Ok(())
    }
}

/// Turns a non-success response into an error, keeping the backend's message.
fn rejection(status: StatusCode, body: &str) -> SyncError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected response")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        });

    SyncError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> RestBackend {
        RestBackend::new(&BackendSettings {
            url: Some(url.into()),
            api_key: "key".into(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoints() {
        let backend = backend("https://backend.example.com/");

        assert_eq!(
            backend.endpoint(MutationKind::Sale),
            Endpoint {
                url: "https://backend.example.com/rest/v1/sales".into(),
                prefer: None,
            }
        );
        assert_eq!(
            backend.endpoint(MutationKind::SaleItems).url,
            "https://backend.example.com/rest/v1/sale_items"
        );

        let inventory = backend.endpoint(MutationKind::Inventory);
        assert_eq!(
            inventory.url,
            "https://backend.example.com/rest/v1/inventory?on_conflict=product_id,user_id"
        );
        assert_eq!(inventory.prefer, Some("resolution=merge-duplicates"));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = RestBackend::new(&BackendSettings {
            url: Some("ftp://backend.example.com".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(SyncError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejection_message() {
        let err = rejection(
            StatusCode::CONFLICT,
            r#"{"code":"23505","message":"duplicate key value"}"#,
        );
        assert!(matches!(
            err,
            SyncError::Rejected { status: 409, ref message } if message == "duplicate key value"
        ));
        assert!(!err.is_retryable());

        let err = rejection(StatusCode::BAD_GATEWAY, "");
        assert!(matches!(
            err,
            SyncError::Rejected { status: 502, ref message } if message == "Bad Gateway"
        ));
        assert!(err.is_retryable());
    }
}
