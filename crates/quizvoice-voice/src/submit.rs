//! Hand-off of an accepted code to the host's join or verify API.

use crate::error::{SubmitError, VoiceError};
use crate::events::SubmissionReporter;
use quizvoice_types::SubmissionOutcome;
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Reason used when the API refuses a code without saying why.
pub const DEFAULT_REJECTION: &str = "No match was found for this code";

/// Submits a confirmed code and reports the outcome asynchronously.
pub trait CodeSubmitter: Send {
    fn submit(&mut self, code: &str, reporter: SubmissionReporter);

    /// Abandons the submission in flight, if any.
    fn cancel(&mut self) {}
}

/// Body answered by the submission API.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubmitResponse {
    success: Option<bool>,
    status: Option<String>,
    redirect: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl SubmitResponse {
    fn accepted(&self) -> bool {
        self.success == Some(true) || self.status.as_deref() == Some("success")
    }

    fn into_outcome(self) -> SubmissionOutcome {
        if self.accepted() {
            SubmissionOutcome::Accepted {
                redirect: self.redirect,
            }
        } else {
            self.into_rejection()
        }
    }

    fn into_rejection(self) -> SubmissionOutcome {
        SubmissionOutcome::Rejected {
            reason: self
                .message
                .or(self.error)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
        }
    }
}

/// Posts `{"<field>": "<code>"}` as JSON.
///
/// A 2xx answer with `"success": true` or `"status": "success"` accepts the
/// code. Any other 2xx answer, and every 4xx answer, rejects it with the
/// body's `message`. Transport failures, timeouts and 5xx statuses are
/// reported as unavailable.
pub struct HttpSubmitter {
    client: reqwest::Client,
    url: String,
    field: String,
    running: Option<JoinHandle<()>>,
}

impl HttpSubmitter {
    pub fn new(
        url: impl Into<String>,
        field: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            field: field.into(),
            running: None,
        })
    }

    /// Performs one submission and waits for the answer.
    pub async fn post(&self, code: &str) -> Result<SubmissionOutcome, SubmitError> {
        post(&self.client, &self.url, &self.field, code).await
    }
}

async fn post(
    client: &reqwest::Client,
    url: &str,
    field: &str,
    code: &str,
) -> Result<SubmissionOutcome, SubmitError> {
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), serde_json::Value::String(code.to_string()));

    let response = client.post(url).json(&body).send().await?;
    let status = response.status();
    if !status.is_success() && !status.is_client_error() {
        return Err(SubmitError::Status(status.as_u16()));
    }

    let text = response.text().await?;
    let parsed: SubmitResponse = if text.trim().is_empty() {
        SubmitResponse::default()
    } else if status.is_client_error() {
        // Error pages are not always JSON; the status alone is enough.
        serde_json::from_str(&text).unwrap_or_default()
    } else {
        serde_json::from_str(&text).map_err(|e| SubmitError::Decode(e.to_string()))?
    };

    if status.is_client_error() {
        Ok(parsed.into_rejection())
    } else {
        Ok(parsed.into_outcome())
    }
}

impl CodeSubmitter for HttpSubmitter {
    fn submit(&mut self, code: &str, reporter: SubmissionReporter) {
        self.cancel();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            reporter.unavailable("no async runtime");
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        let field = self.field.clone();
        let code = code.to_string();
        self.running = Some(runtime.spawn(async move {
            match post(&client, &url, &field, &code).await {
                Ok(outcome) => {
                    info!(generation = reporter.generation(), ?outcome, "submission answered");
                    reporter.completed(outcome);
                }
                Err(e) => {
                    warn!("submission to {} failed: {}", url, e);
                    reporter.unavailable(e.to_string());
                }
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.running.take() {
            task.abort();
        }
    }
}
