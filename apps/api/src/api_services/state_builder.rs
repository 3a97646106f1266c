use std::sync::Arc;
use std::time::Duration;

use portwarden_application::{
    AccessGrantService, AuditLogSink, AuditLogger, AuthGatewayService, Clock, ExpiryExecutorService,
    ExpiryScheduler, GrantPolicy, GrantStore, IdentityProviderSettings, RevocationService,
    RevocationTarget, SystemClock,
};
use portwarden_core::AppError;
use portwarden_domain::{FirewallGroup, GrantPort};
use portwarden_infrastructure::{
    HttpAuthorizationCodeExchanger, HttpRevocationInvoker, InMemoryExpiryScheduler,
    InMemoryGrantStore, JwksIdentityVerifier, PostgresAuditLogSink, PostgresExpiryScheduler,
    PostgresGrantStore, RedisGrantMutationGuard, TracingAuditLogSink,
};
use sqlx::PgPool;

use crate::api_config::{ApiConfig, AuditSinkConfig, FirewallBackendConfig};
use crate::state::AppState;

use super::redis::build_redis_client;

/// Everything the API process runs.
pub struct ApiServices {
    pub state: AppState,
    /// In-process scheduler executor, present for the memory backend only.
    pub local_executor: Option<ExpiryExecutorService>,
}

fn require_pool(pool: Option<&PgPool>) -> Result<PgPool, AppError> {
    pool.cloned()
        .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))
}

/// Upper bound on token exchange, key set fetch and revocation calls.
const OUTBOUND_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))
}

pub fn build_api_services(pool: Option<PgPool>, config: &ApiConfig) -> Result<ApiServices, AppError> {
    let http_client = build_http_client(OUTBOUND_HTTP_TIMEOUT)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let group = FirewallGroup::new(
        config.firewall_group_id.as_str(),
        config.firewall_region.as_str(),
    )?;
    let policy = GrantPolicy::new(group, GrantPort::new(config.grant_port)?, config.grant_ttl_seconds)?
        .with_compensation(config.compensate_on_schedule_failure);
    let revocation_target = RevocationTarget::new(
        config.revocation_target_url.as_str(),
        config.revocation_execution_role.as_str(),
    )?;
    let provider = IdentityProviderSettings::new(
        config.idp_base_url.as_str(),
        config.idp_client_id.as_str(),
        config.idp_client_secret.as_str(),
        config.idp_callback_url.as_str(),
    )?;

    let audit_sink: Arc<dyn AuditLogSink> = match config.audit_sink {
        AuditSinkConfig::Postgres => Arc::new(PostgresAuditLogSink::new(require_pool(pool.as_ref())?)),
        AuditSinkConfig::Console => Arc::new(TracingAuditLogSink::new()),
    };
    let audit_logger = AuditLogger::new(audit_sink, config.audit_log_group.as_str());

    let (grant_store, scheduler, local_executor): (
        Arc<dyn GrantStore>,
        Arc<dyn ExpiryScheduler>,
        Option<ExpiryExecutorService>,
    ) = match config.firewall_backend {
        FirewallBackendConfig::Postgres => {
            let pool = require_pool(pool.as_ref())?;
            let grant_store: Arc<dyn GrantStore> = Arc::new(PostgresGrantStore::new(pool.clone()));
            let scheduler: Arc<dyn ExpiryScheduler> = Arc::new(PostgresExpiryScheduler::new(pool));
            (grant_store, scheduler, None)
        }
        FirewallBackendConfig::Memory => {
            let in_memory_scheduler = Arc::new(InMemoryExpiryScheduler::new(clock.clone()));
            let executor = ExpiryExecutorService::new(
                in_memory_scheduler.clone(),
                Arc::new(HttpRevocationInvoker::new(
                    http_client.clone(),
                    config.worker_shared_secret.as_str(),
                )),
                clock.clone(),
            );
            let grant_store: Arc<dyn GrantStore> = Arc::new(InMemoryGrantStore::new());
            let scheduler: Arc<dyn ExpiryScheduler> = in_memory_scheduler;
            (grant_store, scheduler, Some(executor))
        }
    };

    let mut access_grant_service = AccessGrantService::new(
        grant_store.clone(),
        scheduler,
        audit_logger.clone(),
        clock.clone(),
        policy,
        revocation_target,
    );
    if let Some(redis_url) = config.redis_url.as_deref() {
        access_grant_service = access_grant_service.with_mutation_guard(Arc::new(
            RedisGrantMutationGuard::new(build_redis_client(redis_url)?, "portwarden:grant"),
        ));
    }

    let mut verifier = JwksIdentityVerifier::remote(
        http_client.clone(),
        config.idp_jwks_url.as_str(),
        config.idp_client_id.as_str(),
    );
    if let Some(issuer) = config.idp_issuer.as_deref() {
        verifier = verifier.with_issuer(issuer);
    }

    let auth_gateway_service = AuthGatewayService::new(
        provider.clone(),
        Arc::new(HttpAuthorizationCodeExchanger::new(http_client, provider)),
        Arc::new(verifier),
        access_grant_service,
    );

    Ok(ApiServices {
        state: AppState {
            auth_gateway_service,
            revocation_service: RevocationService::new(grant_store, audit_logger, clock),
            worker_shared_secret: config.worker_shared_secret.clone(),
            revocation_execution_role: config.revocation_execution_role.clone(),
            trust_forwarded_for: config.trust_forwarded_for,
        },
        local_executor,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::build_http_client;

    #[tokio::test]
    async fn outbound_calls_give_up_after_the_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|_| unreachable!());
        let address = listener.local_addr().unwrap_or_else(|_| unreachable!());
        let silent_server = tokio::spawn(async move {
            let accepted = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(accepted);
        });
        let client = build_http_client(Duration::from_millis(200)).unwrap_or_else(|_| unreachable!());

        let result = client.get(format!("http://{address}/jwks.json")).send().await;

        assert!(matches!(result, Err(error) if error.is_timeout()));
        silent_server.abort();
    }
}
