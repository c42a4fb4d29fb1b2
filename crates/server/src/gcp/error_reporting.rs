use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, warn};

use rowgate_gateway::{ErrorReport, ErrorReporter};

use super::auth::AuthHeaders;

/// Sends unexpected failures to Cloud Error Reporting.
///
/// Failures to report are logged and otherwise ignored.
#[derive(Debug)]
pub struct CloudErrorReporter {
    client: reqwest::Client,
    base_url: String,
    project: String,
    service: String,
    auth: Arc<dyn AuthHeaders>,
}

impl CloudErrorReporter {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        project: impl Into<String>,
        service: impl Into<String>,
        auth: Arc<dyn AuthHeaders>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            project: project.into(),
            service: service.into(),
            auth,
        }
    }

    fn report_url(&self) -> String {
        format!(
            "{}/v1beta1/projects/{}/events:report",
            self.base_url, self.project
        )
    }

    fn event(&self, report: &ErrorReport) -> Value {
        json!({
            "eventTime": Utc::now().to_rfc3339(),
            "serviceContext": {
                "service": self.service,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "message": format!("{}\n{}", report.message, report.detail),
            "context": {
                "user": report.user,
                "httpRequest": {
                    "method": "POST",
                    "url": "/",
                },
                "reportLocation": {
                    "functionName": report.function,
                },
            },
        })
    }

    async fn send(&self, report: &ErrorReport) -> Result<(), String> {
        let headers = self.auth.headers().await.map_err(|e| e.to_string())?;
        let response = self
            .client
            .post(self.report_url())
            .headers(headers)
            .json(&self.event(report))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }
        Ok(())
    }
}

#[async_trait]
impl ErrorReporter for CloudErrorReporter {
    async fn report(&self, report: ErrorReport) {
        match self.send(&report).await {
            Ok(()) => debug!(request_id = %report.request_id, "error reported"),
            Err(e) => warn!(
                request_id = %report.request_id,
                error = %e,
                "failed to send error report"
            ),
        }
    }
}
