//! Application services and ports.

#![forbid(unsafe_code)]

mod access_grant_service;
mod audit_logger;
mod audit_ports;
mod auth_gateway_service;
mod expiry_executor_service;
mod grant_ports;
mod identity_ports;
mod revocation_service;
mod settings;

#[cfg(test)]
mod test_fakes;

pub use access_grant_service::{AccessGrantService, GrantDecision};
pub use audit_logger::AuditLogger;
pub use audit_ports::{AuditLogSink, AuditRecord};
pub use auth_gateway_service::{AuthGatewayService, GatewayOutcome};
pub use expiry_executor_service::{ExecutionSummary, ExpiryExecutorService};
pub use grant_ports::{
    ClaimedRevocationJob, Clock, ExpiryScheduler, GrantMutationGuard, GrantMutationLease,
    GrantStore, OneShotJob, RevocationInvoker, RevocationJobQueue, SystemClock,
};
pub use identity_ports::{AuthorizationCodeExchanger, IdentityVerifier};
pub use revocation_service::{RevocationOutcome, RevocationService};
pub use settings::{
    EXECUTION_ROLE_HEADER, FLEXIBLE_WINDOW_MINUTES, GrantPolicy, IdentityProviderSettings, RevocationTarget,
};
