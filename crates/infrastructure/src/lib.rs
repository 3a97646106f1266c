//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_authorization_code_exchanger;
mod http_revocation_invoker;
mod in_memory_expiry_scheduler;
mod in_memory_grant_store;
mod jwks_identity_verifier;
mod postgres_audit_log_sink;
mod postgres_expiry_scheduler;
mod postgres_grant_store;
mod redis_grant_mutation_guard;
mod tracing_audit_log_sink;

#[cfg(test)]
mod test_http;

pub use http_authorization_code_exchanger::HttpAuthorizationCodeExchanger;
pub use http_revocation_invoker::HttpRevocationInvoker;
pub use in_memory_expiry_scheduler::InMemoryExpiryScheduler;
pub use in_memory_grant_store::InMemoryGrantStore;
pub use jwks_identity_verifier::JwksIdentityVerifier;
pub use postgres_audit_log_sink::PostgresAuditLogSink;
pub use postgres_expiry_scheduler::PostgresExpiryScheduler;
pub use postgres_grant_store::PostgresGrantStore;
pub use redis_grant_mutation_guard::RedisGrantMutationGuard;
pub use tracing_audit_log_sink::TracingAuditLogSink;
