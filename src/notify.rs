use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Summary delivered to the job owner when a job completes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompletionNotice {
    pub operation_type: String,
    pub total_processed: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub duration_seconds: u64,
}

/// Best-effort completion signal.
///
/// Delivery failures are logged by the caller and never change job state or
/// trigger a retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_completion(
        &self,
        owner_id: &str,
        notice: &CompletionNotice,
    ) -> Result<(), NotifyError>;
}

/// Posts completion notices to a webhook as JSON.
pub struct WebhookNotifier {
    http: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    owner_id: &'a str,
    #[serde(flatten)]
    notice: &'a CompletionNotice,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_completion(
        &self,
        owner_id: &str,
        notice: &CompletionNotice,
    ) -> Result<(), NotifyError> {
        self.http
            .post(&self.endpoint)
            .json(&WebhookPayload { owner_id, notice })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Logs completion notices; used when no delivery channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_completion(
        &self,
        owner_id: &str,
        notice: &CompletionNotice,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            owner_id,
            operation_type = %notice.operation_type,
            total_processed = notice.total_processed,
            success_count = notice.success_count,
            failure_count = notice.failure_count,
            duration_seconds = notice.duration_seconds,
            "Job completion notice"
        );
        Ok(())
    }
}
