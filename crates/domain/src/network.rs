use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use portwarden_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Network address of the authenticating caller. Always a single host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GrantOrigin(IpAddr);

impl GrantOrigin {
    /// Creates an origin from a host address.
    #[must_use]
    pub fn new(address: IpAddr) -> Self {
        Self(address)
    }

    /// Returns the host address.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.0
    }

    /// Returns the single-host network (`/32` or `/128`) admitted for this origin.
    #[must_use]
    pub fn host_network(&self) -> IpNet {
        IpNet::from(self.0)
    }
}

impl FromStr for GrantOrigin {
    type Err = AppError;

    /// Accepts a bare address or a host-length prefix such as `1.2.3.4/32`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Ok(address) = IpAddr::from_str(value) {
            return Ok(Self(address));
        }

        let network = IpNet::from_str(value).map_err(|error| {
            AppError::Validation(format!("invalid origin address '{value}': {error}"))
        })?;
        if network.prefix_len() != network.max_prefix_len() {
            return Err(AppError::Validation(format!(
                "origin '{value}' must be a single host, got a /{} range",
                network.prefix_len()
            )));
        }

        Ok(Self(network.addr()))
    }
}

impl TryFrom<String> for GrantOrigin {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<GrantOrigin> for String {
    fn from(value: GrantOrigin) -> Self {
        value.0.to_string()
    }
}

impl Display for GrantOrigin {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Single TCP port admitted by a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct GrantPort(u16);

impl GrantPort {
    /// Creates a validated, non-zero port.
    pub fn new(value: u16) -> AppResult<Self> {
        if value == 0 {
            return Err(AppError::Validation(
                "grant port must be greater than zero".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the port number.
    #[must_use]
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for GrantPort {
    type Error = AppError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GrantPort> for u16 {
    fn from(value: GrantPort) -> Self {
        value.0
    }
}

impl Display for GrantPort {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Firewall rule collection mutated by grants, scoped to its region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirewallGroup {
    group_id: NonEmptyString,
    region: NonEmptyString,
}

impl FirewallGroup {
    /// Creates a firewall group reference.
    pub fn new(group_id: impl Into<String>, region: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            group_id: NonEmptyString::new(group_id)?,
            region: NonEmptyString::new(region)?,
        })
    }

    /// Returns the group identifier.
    #[must_use]
    pub fn group_id(&self) -> &str {
        self.group_id.as_str()
    }

    /// Returns the region hosting the group.
    #[must_use]
    pub fn region(&self) -> &str {
        self.region.as_str()
    }
}

/// Transport protocol of a stored ingress permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressProtocol {
    /// TCP traffic.
    Tcp,
    /// UDP traffic.
    Udp,
    /// Every protocol.
    All,
}

impl IngressProtocol {
    /// Returns a stable storage value for this protocol.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::All => "-1",
        }
    }
}

impl FromStr for IngressProtocol {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "-1" => Ok(Self::All),
            _ => Err(AppError::Validation(format!(
                "unknown ingress protocol '{value}'"
            ))),
        }
    }
}

/// One permission entry as stored in a firewall group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressPermission {
    /// Transport protocol.
    pub protocol: IngressProtocol,
    /// Lower bound of the port range, absent for protocol-wide entries.
    pub from_port: Option<u16>,
    /// Upper bound of the port range, absent for protocol-wide entries.
    pub to_port: Option<u16>,
    /// Address ranges admitted by this entry.
    pub ranges: Vec<IpNet>,
}

/// The (group, origin, port) tuple identifying one grant's firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    group: FirewallGroup,
    origin: GrantOrigin,
    port: GrantPort,
}

impl IngressRule {
    /// Creates the rule tuple.
    #[must_use]
    pub fn new(group: FirewallGroup, origin: GrantOrigin, port: GrantPort) -> Self {
        Self {
            group,
            origin,
            port,
        }
    }

    /// Returns the firewall group.
    #[must_use]
    pub fn group(&self) -> &FirewallGroup {
        &self.group
    }

    /// Returns the admitted origin.
    #[must_use]
    pub fn origin(&self) -> GrantOrigin {
        self.origin
    }

    /// Returns the admitted port.
    #[must_use]
    pub fn port(&self) -> GrantPort {
        self.port
    }

    /// Grant rules are always TCP.
    #[must_use]
    pub fn protocol(&self) -> IngressProtocol {
        IngressProtocol::Tcp
    }

    /// Returns the exact permission entry this rule stores.
    #[must_use]
    pub fn to_permission(&self) -> IngressPermission {
        IngressPermission {
            protocol: self.protocol(),
            from_port: Some(self.port.value()),
            to_port: Some(self.port.value()),
            ranges: vec![self.origin.host_network()],
        }
    }

    /// Returns whether a stored permission admits exactly this tuple.
    ///
    /// Wider ranges, port ranges and other protocols never match.
    #[must_use]
    pub fn is_satisfied_by(&self, permission: &IngressPermission) -> bool {
        let port = Some(self.port.value());
        let host_network = self.origin.host_network();

        permission.protocol == IngressProtocol::Tcp
            && permission.from_port == port
            && permission.to_port == port
            && permission.ranges.iter().any(|range| *range == host_network)
    }

    /// Stable string used for logging and lock keys.
    #[must_use]
    pub fn tuple_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.group.region(),
            self.group.group_id(),
            self.origin.host_network(),
            self.port
        )
    }
}
