//! Portwarden revocation worker runtime.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use portwarden_application::{ExpiryExecutorService, SystemClock};
use portwarden_core::{AppError, AppResult};
use portwarden_infrastructure::{HttpRevocationInvoker, PostgresExpiryScheduler};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkerConfig {
    database_url: String,
    worker_shared_secret: String,
    worker_id: String,
    claim_limit: usize,
    lease_seconds: u32,
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let executor = ExpiryExecutorService::new(
        Arc::new(PostgresExpiryScheduler::new(pool)),
        Arc::new(HttpRevocationInvoker::new(
            http_client,
            config.worker_shared_secret.as_str(),
        )),
        Arc::new(SystemClock),
    );

    info!(
        worker_id = %config.worker_id,
        claim_limit = config.claim_limit,
        lease_seconds = config.lease_seconds,
        poll_interval_ms = config.poll_interval_ms,
        "portwarden-worker started"
    );

    loop {
        match executor
            .run_once(
                config.worker_id.as_str(),
                config.claim_limit,
                config.lease_seconds,
            )
            .await
        {
            Ok(summary) if summary.claimed == 0 => {}
            Ok(summary) => {
                info!(
                    worker_id = %config.worker_id,
                    claimed = summary.claimed,
                    completed = summary.completed,
                    failed = summary.failed,
                    "revocation jobs processed"
                );
                // Drain backlog before sleeping.
                if summary.claimed >= config.claim_limit {
                    continue;
                }
            }
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "failed to claim revocation jobs"
                );
            }
        }

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        Self::from_variables(&env::vars().collect(), std::process::id())
    }

    fn from_variables(variables: &HashMap<String, String>, process_id: u32) -> AppResult<Self> {
        let database_url = required_var(variables, "DATABASE_URL")?;
        let worker_shared_secret = required_var(variables, "WORKER_SHARED_SECRET")?;
        let worker_id = variables
            .get("WORKER_ID")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{process_id}"));
        let claim_limit = parse_var(variables, "WORKER_CLAIM_LIMIT", 10_usize)?;
        let lease_seconds = parse_var(variables, "WORKER_LEASE_SECONDS", 60_u32)?;
        let poll_interval_ms = parse_var(variables, "WORKER_POLL_INTERVAL_MS", 5000_u64)?;

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WORKER_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "WORKER_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            worker_shared_secret,
            worker_id,
            claim_limit,
            lease_seconds,
            poll_interval_ms,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_var(variables: &HashMap<String, String>, name: &str) -> AppResult<String> {
    variables
        .get(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_var<T>(variables: &HashMap<String, String>, name: &str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match variables.get(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use portwarden_core::AppError;

    use super::WorkerConfig;

    fn variables(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut variables: HashMap<String, String> = [
            ("DATABASE_URL", "postgres://localhost/portwarden"),
            ("WORKER_SHARED_SECRET", "worker-secret"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();
        for (key, value) in pairs {
            variables.insert((*key).to_owned(), (*value).to_owned());
        }
        variables
    }

    #[test]
    fn defaults_apply_when_optional_variables_are_missing() {
        let config = WorkerConfig::from_variables(&variables(&[]), 4242)
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.worker_id, "worker-4242");
        assert_eq!(config.claim_limit, 10);
        assert_eq!(config.lease_seconds, 60);
        assert_eq!(config.poll_interval_ms, 5000);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = WorkerConfig::from_variables(
            &variables(&[
                ("WORKER_ID", " revoker-a "),
                ("WORKER_CLAIM_LIMIT", "25"),
                ("WORKER_LEASE_SECONDS", "120"),
                ("WORKER_POLL_INTERVAL_MS", "750"),
            ]),
            1,
        )
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.worker_id, "revoker-a");
        assert_eq!(config.claim_limit, 25);
        assert_eq!(config.lease_seconds, 120);
        assert_eq!(config.poll_interval_ms, 750);
    }

    #[test]
    fn missing_shared_secret_is_rejected() {
        let mut variables = variables(&[]);
        variables.remove("WORKER_SHARED_SECRET");

        let result = WorkerConfig::from_variables(&variables, 1);

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn zero_and_malformed_numbers_are_rejected() {
        for (name, value) in [
            ("WORKER_CLAIM_LIMIT", "0"),
            ("WORKER_LEASE_SECONDS", "0"),
            ("WORKER_POLL_INTERVAL_MS", "0"),
            ("WORKER_CLAIM_LIMIT", "many"),
        ] {
            let result = WorkerConfig::from_variables(&variables(&[(name, value)]), 1);
            assert!(
                matches!(result, Err(AppError::Validation(_))),
                "{name}={value} should be rejected"
            );
        }
    }
}
