use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use portwarden_core::AppError;
use tracing_subscriber::EnvFilter;

/// Where firewall rules and revocation jobs live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallBackendConfig {
    Postgres,
    /// Process-local rule set with an in-process scheduler executor.
    Memory,
}

/// Where audit records are appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSinkConfig {
    Postgres,
    Console,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub firewall_group_id: String,
    pub firewall_region: String,
    pub grant_port: u16,
    pub grant_ttl_seconds: u32,
    pub idp_base_url: String,
    pub idp_client_id: String,
    pub idp_client_secret: String,
    pub idp_callback_url: String,
    pub idp_jwks_url: String,
    pub idp_issuer: Option<String>,
    pub audit_log_group: String,
    pub audit_sink: AuditSinkConfig,
    pub firewall_backend: FirewallBackendConfig,
    pub revocation_target_url: String,
    pub revocation_execution_role: String,
    pub worker_shared_secret: String,
    pub redis_url: Option<String>,
    pub trust_forwarded_for: bool,
    pub compensate_on_schedule_failure: bool,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        let variables: HashMap<String, String> = env::vars().collect();

        Self::from_variables(&variables, migrate_only)
    }

    pub fn from_variables(
        variables: &HashMap<String, String>,
        migrate_only: bool,
    ) -> Result<Self, AppError> {
        let source = EnvSource(variables);

        let firewall_backend = match source.or_default("FIREWALL_BACKEND", "postgres").as_str() {
            "postgres" => FirewallBackendConfig::Postgres,
            "memory" => FirewallBackendConfig::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "FIREWALL_BACKEND must be either 'postgres' or 'memory', got '{other}'"
                )));
            }
        };
        let audit_sink = match source.or_default("AUDIT_SINK", "postgres").as_str() {
            "postgres" => AuditSinkConfig::Postgres,
            "console" => AuditSinkConfig::Console,
            other => {
                return Err(AppError::Validation(format!(
                    "AUDIT_SINK must be either 'postgres' or 'console', got '{other}'"
                )));
            }
        };

        let needs_database = migrate_only
            || firewall_backend == FirewallBackendConfig::Postgres
            || audit_sink == AuditSinkConfig::Postgres;
        let database_url = if needs_database {
            Some(source.required_non_empty("DATABASE_URL")?)
        } else {
            source.optional("DATABASE_URL")
        };

        let api_port = source
            .optional("API_PORT")
            .map(|value| {
                value
                    .parse::<u16>()
                    .map_err(|error| AppError::Validation(format!("invalid API_PORT: {error}")))
            })
            .transpose()?
            .unwrap_or(3001);

        let grant_port = source
            .required_non_empty("GRANT_PORT")?
            .parse::<u16>()
            .map_err(|error| AppError::Validation(format!("invalid GRANT_PORT: {error}")))?;
        if grant_port == 0 {
            return Err(AppError::Validation(
                "GRANT_PORT must be between 1 and 65535".to_owned(),
            ));
        }

        let grant_ttl_seconds = source
            .required_non_empty("GRANT_TTL_SECONDS")?
            .parse::<u32>()
            .map_err(|error| AppError::Validation(format!("invalid GRANT_TTL_SECONDS: {error}")))?;
        if grant_ttl_seconds == 0 {
            return Err(AppError::Validation(
                "GRANT_TTL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            migrate_only,
            database_url,
            api_host: source.or_default("API_HOST", "127.0.0.1"),
            api_port,
            firewall_group_id: source.required_non_empty("FIREWALL_GROUP_ID")?,
            firewall_region: source.required_non_empty("FIREWALL_REGION")?,
            grant_port,
            grant_ttl_seconds,
            idp_base_url: source.required_non_empty("IDP_BASE_URL")?,
            idp_client_id: source.required_non_empty("IDP_CLIENT_ID")?,
            idp_client_secret: source.required_non_empty("IDP_CLIENT_SECRET")?,
            idp_callback_url: source.required_non_empty("IDP_CALLBACK_URL")?,
            idp_jwks_url: source.required_non_empty("IDP_JWKS_URL")?,
            idp_issuer: source.optional("IDP_ISSUER"),
            audit_log_group: source.required_non_empty("AUDIT_LOG_GROUP")?,
            audit_sink,
            firewall_backend,
            revocation_target_url: source.required_non_empty("REVOCATION_TARGET_URL")?,
            revocation_execution_role: source.required_non_empty("REVOCATION_EXECUTION_ROLE")?,
            worker_shared_secret: source.required_non_empty("WORKER_SHARED_SECRET")?,
            redis_url: source.optional("REDIS_URL"),
            trust_forwarded_for: source.flag("TRUST_FORWARDED_FOR", false),
            compensate_on_schedule_failure: source.flag("COMPENSATE_ON_SCHEDULE_FAILURE", true),
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

struct EnvSource<'a>(&'a HashMap<String, String>);

impl EnvSource<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        self.0
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name)
            .unwrap_or_else(|| default.to_owned())
            .to_ascii_lowercase()
    }

    fn required_non_empty(&self, name: &str) -> Result<String, AppError> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{name} must not be empty")));
        }

        Ok(value.trim().to_owned())
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        self.optional(name)
            .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use portwarden_core::AppError;

    use super::{ApiConfig, AuditSinkConfig, FirewallBackendConfig};

    fn base_variables() -> HashMap<String, String> {
        [
            ("DATABASE_URL", "postgres://localhost/portwarden"),
            ("FIREWALL_GROUP_ID", "sg-0123"),
            ("FIREWALL_REGION", "us-east-1"),
            ("GRANT_PORT", "22"),
            ("GRANT_TTL_SECONDS", "300"),
            ("IDP_BASE_URL", "https://portwarden.auth.example.com"),
            ("IDP_CLIENT_ID", "client-123"),
            ("IDP_CLIENT_SECRET", "secret"),
            ("IDP_CALLBACK_URL", "https://api.example.com/access"),
            ("IDP_JWKS_URL", "https://idp.example.com/.well-known/jwks.json"),
            ("AUDIT_LOG_GROUP", "portwarden-audit"),
            ("REVOCATION_TARGET_URL", "https://api.example.com/api/internal/revocations"),
            ("REVOCATION_EXECUTION_ROLE", "portwarden-scheduler"),
            ("WORKER_SHARED_SECRET", "worker-secret"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect()
    }

    #[test]
    fn loads_defaults() {
        let config = ApiConfig::from_variables(&base_variables(), false)
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.api_port, 3001);
        assert_eq!(config.grant_port, 22);
        assert_eq!(config.firewall_backend, FirewallBackendConfig::Postgres);
        assert_eq!(config.audit_sink, AuditSinkConfig::Postgres);
        assert!(config.compensate_on_schedule_failure);
        assert!(!config.trust_forwarded_for);
        assert!(config.redis_url.is_none());
        assert!(config.idp_issuer.is_none());
    }

    #[test]
    fn missing_required_variable_names_it() {
        let mut variables = base_variables();
        variables.remove("IDP_CLIENT_ID");

        let result = ApiConfig::from_variables(&variables, false);

        assert!(matches!(
            result,
            Err(AppError::Validation(message)) if message == "IDP_CLIENT_ID is required"
        ));
    }

    #[test]
    fn zero_ttl_and_port_are_rejected() {
        let mut zero_ttl = base_variables();
        zero_ttl.insert("GRANT_TTL_SECONDS".to_owned(), "0".to_owned());
        let mut zero_port = base_variables();
        zero_port.insert("GRANT_PORT".to_owned(), "0".to_owned());

        assert!(ApiConfig::from_variables(&zero_ttl, false).is_err());
        assert!(ApiConfig::from_variables(&zero_port, false).is_err());
    }

    #[test]
    fn memory_backend_with_console_sink_runs_without_database() {
        let mut variables = base_variables();
        variables.remove("DATABASE_URL");
        variables.insert("FIREWALL_BACKEND".to_owned(), "memory".to_owned());
        variables.insert("AUDIT_SINK".to_owned(), "console".to_owned());
        variables.insert("TRUST_FORWARDED_FOR".to_owned(), "true".to_owned());
        variables.insert("COMPENSATE_ON_SCHEDULE_FAILURE".to_owned(), "false".to_owned());

        let config =
            ApiConfig::from_variables(&variables, false).unwrap_or_else(|_| unreachable!());

        assert!(config.database_url.is_none());
        assert!(config.trust_forwarded_for);
        assert!(!config.compensate_on_schedule_failure);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut variables = base_variables();
        variables.insert("FIREWALL_BACKEND".to_owned(), "aws".to_owned());

        assert!(matches!(
            ApiConfig::from_variables(&variables, false),
            Err(AppError::Validation(_))
        ));
    }
}
