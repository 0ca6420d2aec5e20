use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{JobAlertError, JobAlertResult};

/// Counts reported by the pipeline endpoint after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub jobs_scraped: u64,
    pub processed: u64,
}

impl PipelineSummary {
    /// Reads `scraped.jobsScraped` and `processed.success`; absent counts are 0.
    /// A body that is not JSON at all is an error.
    pub fn from_body(body: &str) -> JobAlertResult<Self> {
        let json: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| JobAlertError::Pipeline(format!("response is not valid JSON: {e}")))?;
        Ok(Self {
            jobs_scraped: json["scraped"]["jobsScraped"].as_u64().unwrap_or(0),
            processed: json["processed"]["success"].as_u64().unwrap_or(0),
        })
    }
}

/// Terminal result shown to the user after a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Success { jobs_scraped: u64, processed: u64 },
    Failure { message: String },
}

impl TriggerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TriggerOutcome::Success { .. })
    }

    pub fn message(&self) -> String {
        match self {
            TriggerOutcome::Success {
                jobs_scraped,
                processed,
            } => format!("Pipeline complete: scraped {jobs_scraped} jobs, processed {processed}"),
            TriggerOutcome::Failure { message } => format!("Pipeline failed: {message}"),
        }
    }
}

/// Issues the single POST that starts a scrape+score+notify run.
pub struct PipelineTrigger {
    url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl PipelineTrigger {
    pub fn new(url: String, secret: Option<String>, timeout: Duration) -> JobAlertResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            secret: secret.filter(|s| !s.trim().is_empty()),
            client,
        })
    }

    pub async fn trigger(&self) -> JobAlertResult<PipelineSummary> {
        tracing::info!(url = %self.url, authorized = self.secret.is_some(), "triggering pipeline");

        let mut request = self.client.post(&self.url);
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(JobAlertError::Pipeline(format!("{}: {}", status, body.trim())));
        }

        let summary = PipelineSummary::from_body(&body)?;
        tracing::info!(
            jobs_scraped = summary.jobs_scraped,
            processed = summary.processed,
            "pipeline finished"
        );
        Ok(summary)
    }
}

/// Run the trigger and collapse any failure into a one-line message.
pub async fn run_trigger(trigger: &PipelineTrigger) -> TriggerOutcome {
    match trigger.trigger().await {
        Ok(summary) => TriggerOutcome::Success {
            jobs_scraped: summary.jobs_scraped,
            processed: summary.processed,
        },
        Err(e) => {
            tracing::error!(error = %e, "pipeline trigger failed");
            TriggerOutcome::Failure {
                message: one_line(&e.to_string()),
            }
        }
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
