//! Completion webhooks and public file URLs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use vedit_models::WebhookResponse;

use crate::error::{WorkerError, WorkerResult};

pub const WEBHOOKS_TOTAL: &str = "vedit_webhooks_total";

/// Rewrites output file paths into URLs served under `/files`.
#[derive(Debug, Clone)]
pub struct FileUrlBuilder {
    output_root: PathBuf,
    public_host: String,
    public_port: Option<u16>,
}

impl FileUrlBuilder {
    pub fn new(
        output_root: impl Into<PathBuf>,
        public_host: impl Into<String>,
        public_port: Option<u16>,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            public_host: public_host.into(),
            public_port,
        }
    }

    /// `http` for localhost, `https` for anything else.
    pub fn scheme(&self) -> &'static str {
        if self.public_host == "localhost" {
            "http"
        } else {
            "https"
        }
    }

    /// Public URL for a file under the output root.
    pub fn url_for(&self, path: &Path) -> String {
        let relative = match path.strip_prefix(&self.output_root) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => {
                warn!(
                    "File {} is outside output root {}",
                    path.display(),
                    self.output_root.display()
                );
                path.to_string_lossy().trim_start_matches('/').to_string()
            }
        };

        let port = self
            .public_port
            .map(|p| format!(":{}", p))
            .unwrap_or_default();

        format!(
            "{}://{}{}/files/{}",
            self.scheme(),
            self.public_host,
            port,
            relative
        )
    }

    pub fn urls_for(&self, paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| self.url_for(p)).collect()
    }
}

/// Delivers [`WebhookResponse`] payloads.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> WorkerResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// POST the payload as JSON.
    ///
    /// Transport failures are errors. A non-2xx status is only logged.
    pub async fn notify(&self, url: &str, payload: &WebhookResponse) -> WorkerResult<()> {
        let response = match self.client.post(url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                record_webhook("failed");
                return Err(WorkerError::notification(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(event_id = %payload.id, "Webhook delivered to {} ({})", url, status);
            record_webhook("delivered");
        } else {
            warn!(event_id = %payload.id, "Webhook {} responded with {}", url, status);
            record_webhook("rejected");
        }

        Ok(())
    }
}

fn record_webhook(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(WEBHOOKS_TOTAL, &labels).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::EventId;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_localhost_url() {
        let urls = FileUrlBuilder::new("/data/output", "localhost", Some(8080));
        assert_eq!(
            urls.url_for(Path::new("/data/output/abc/out_001.jpg")),
            "http://localhost:8080/files/abc/out_001.jpg"
        );
    }

    #[test]
    fn test_public_host_uses_https_and_optional_port() {
        let urls = FileUrlBuilder::new("/data/output", "media.example.com", None);
        assert_eq!(urls.scheme(), "https");
        assert_eq!(
            urls.url_for(Path::new("/data/output/abc/out.mp4")),
            "https://media.example.com/files/abc/out.mp4"
        );
    }

    #[test]
    fn test_path_outside_root() {
        let urls = FileUrlBuilder::new("/data/output", "localhost", Some(80));
        assert_eq!(
            urls.url_for(Path::new("/elsewhere/out.mp4")),
            "http://localhost:80/files/elsewhere/out.mp4"
        );
    }

    #[tokio::test]
    async fn test_notify_posts_json() {
        let server = MockServer::start().await;
        let payload = WebhookResponse::success(
            EventId::from_string("evt-1"),
            vec!["http://localhost:8080/files/a/out.jpg".into()],
        );

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "status": "success",
                "id": "evt-1",
                "file_location": ["http://localhost:8080/files/a/out.jpg"]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Duration::from_secs(5)).unwrap();
        notifier
            .notify(&format!("{}/hook", server.uri()), &payload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Duration::from_secs(5)).unwrap();
        let payload = WebhookResponse::error(EventId::from_string("evt-2"), "boom");
        assert!(notifier.notify(&server.uri(), &payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let notifier = WebhookNotifier::new(Duration::from_secs(2)).unwrap();
        let payload = WebhookResponse::error(EventId::from_string("evt-3"), "boom");

        let err = notifier
            .notify("http://127.0.0.1:9/hook", &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Notification(_)));
    }
}
