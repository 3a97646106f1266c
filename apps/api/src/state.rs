use portwarden_application::{AuthGatewayService, RevocationService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub auth_gateway_service: AuthGatewayService,
    pub revocation_service: RevocationService,
    pub worker_shared_secret: String,
    pub revocation_execution_role: String,
    pub trust_forwarded_for: bool,
}
