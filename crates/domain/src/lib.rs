//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit;
mod grant;
mod network;

pub use audit::{AuditAction, AuditPartitionKey};
pub use grant::{AccessGrant, GRANT_TIMESTAMP_FORMAT, RevocationPayload, ScheduleKey};
pub use network::{
    FirewallGroup, GrantOrigin, GrantPort, IngressPermission, IngressProtocol, IngressRule,
};
