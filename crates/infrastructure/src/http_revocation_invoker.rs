use async_trait::async_trait;
use portwarden_application::{EXECUTION_ROLE_HEADER, OneShotJob, RevocationInvoker};
use portwarden_core::{AppError, AppResult};

/// Invokes revocation targets over HTTP with the job payload as JSON body.
#[derive(Clone)]
pub struct HttpRevocationInvoker {
    http_client: reqwest::Client,
    shared_secret: String,
}

impl HttpRevocationInvoker {
    /// Creates an invoker authenticating with the worker shared secret.
    #[must_use]
    pub fn new(http_client: reqwest::Client, shared_secret: impl Into<String>) -> Self {
        Self {
            http_client,
            shared_secret: shared_secret.into(),
        }
    }
}

#[async_trait]
impl RevocationInvoker for HttpRevocationInvoker {
    async fn invoke(&self, job: &OneShotJob) -> AppResult<()> {
        let response = self
            .http_client
            .post(job.target.target_url.as_str())
            .bearer_auth(self.shared_secret.as_str())
            .header(EXECUTION_ROLE_HEADER, job.target.execution_role.as_str())
            .json(&job.payload)
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "revocation target '{}' request failed: {error}",
                    job.target.target_url
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::Internal(format!(
                "revocation target returned status {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};
    use portwarden_application::{
        FLEXIBLE_WINDOW_MINUTES, OneShotJob, RevocationInvoker, RevocationTarget,
    };
    use portwarden_domain::{GrantOrigin, RevocationPayload, ScheduleKey};

    use super::HttpRevocationInvoker;
    use crate::test_http::serve_once;

    fn job(target_url: &str) -> OneShotJob {
        let origin = GrantOrigin::from_str("1.2.3.4").unwrap_or_else(|_| unreachable!());

        OneShotJob {
            schedule_key: ScheduleKey::for_origin(origin),
            fire_at: Utc
                .with_ymd_and_hms(2026, 10, 18, 12, 5, 0)
                .single()
                .unwrap_or_else(|| unreachable!()),
            flexible_window_minutes: FLEXIBLE_WINDOW_MINUTES,
            target: RevocationTarget::new(target_url, "portwarden-scheduler")
                .unwrap_or_else(|_| unreachable!()),
            payload: RevocationPayload {
                origin,
                group: "sg-0123".to_owned(),
                port: 22,
                region: "us-east-1".to_owned(),
            },
        }
    }

    #[tokio::test]
    async fn posts_payload_with_secret_and_role() {
        let (base_url, server) =
            serve_once("200 OK", r#""IP removed from Security Group.""#).await;
        let invoker = HttpRevocationInvoker::new(reqwest::Client::new(), "worker-secret");

        let result = invoker
            .invoke(&job(format!("{base_url}/api/internal/revocations").as_str()))
            .await;
        let request = server.await.unwrap_or_default().to_ascii_lowercase();

        assert!(result.is_ok());
        assert!(request.starts_with("post /api/internal/revocations "));
        assert!(request.contains("authorization: bearer worker-secret"));
        assert!(request.contains("x-portwarden-execution-role: portwarden-scheduler"));
        assert!(request.contains(r#""origin":"1.2.3.4""#));
        assert!(request.contains(r#""group":"sg-0123""#));
        assert!(request.contains(r#""port":22"#));
        assert!(request.contains(r#""region":"us-east-1""#));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (base_url, server) =
            serve_once("500 Internal Server Error", r#"{"message":"boom"}"#).await;
        let invoker = HttpRevocationInvoker::new(reqwest::Client::new(), "worker-secret");

        let result = invoker.invoke(&job(base_url.as_str())).await;
        let _ = server.await;

        assert!(result.is_err());
    }
}
