//! Session/cluster configuration (`spec.md` §6).
use std::{env, fmt, net::SocketAddr, time::Duration};

use crate::protocol::Consistency;

/// Error parsing a [`ClusterConfig`] contact point or environment variable.
#[derive(Clone, thiserror::Error)]
pub enum ConfigError {
    /// A contact point string failed to parse as `host:port`.
    #[error("config error: {0}")]
    Parse(&'static str),
    /// A contact point's host did not resolve to any address.
    #[error("config error: could not resolve {0}")]
    Resolve(String),
}

impl fmt::Debug for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Plaintext username/password authentication (`spec.md` §4.3).
#[derive(Debug, Clone)]
pub struct PlainTextAuth {
    pub username: String,
    pub password: String,
}

/// TLS configuration surface. The handshake itself is out of scope
/// (`SPEC_FULL.md` §1's Non-goals); this only carries the knobs a caller
/// would set to turn it on.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub ca_cert_path: Option<String>,
    pub verify_hostname: bool,
}

/// Connection-pool sizing, one instance shared by every host in the cluster.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub connections_per_host: usize,
    pub max_in_flight_per_connection: u16,
    pub heartbeat_interval: Duration,
    pub defunct_read_timeout_threshold: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connections_per_host: 1,
            max_in_flight_per_connection: 2048,
            heartbeat_interval: Duration::from_secs(30),
            defunct_read_timeout_threshold: 64,
        }
    }
}

/// Cluster-wide driver configuration, built explicitly or from
/// `CASSA_CONTACT_POINTS`-style environment variables (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub contact_points: Vec<String>,
    pub port: u16,
    pub local_datacenter: Option<String>,
    pub keyspace: Option<String>,
    pub default_consistency: Consistency,
    pub pool: PoolConfig,
    pub tls: TlsConfig,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub auth: Option<PlainTextAuth>,
    pub managed_service: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            contact_points: Vec::new(),
            port: 9042,
            local_datacenter: None,
            keyspace: None,
            default_consistency: Consistency::LocalOne,
            pool: PoolConfig::default(),
            tls: TlsConfig::default(),
            request_timeout: Duration::from_secs(12),
            connect_timeout: Duration::from_secs(5),
            auth: None,
            managed_service: false,
        }
    }
}

impl ClusterConfig {
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// Build a config from `CASSA_CONTACT_POINTS` (comma-separated
    /// `host[:port]` entries), `CASSA_LOCAL_DC`, `CASSA_KEYSPACE`,
    /// `CASSA_USERNAME`/`CASSA_PASSWORD`, mirroring the teacher's
    /// environment-variable convention for connection parameters.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = env::var("CASSA_CONTACT_POINTS")
            .map_err(|_| ConfigError::Parse("CASSA_CONTACT_POINTS not set"))?;
        let mut builder = Self::builder();
        for point in raw.split(',') {
            let point = point.trim();
            if !point.is_empty() {
                builder = builder.contact_point(point);
            }
        }
        if let Ok(dc) = env::var("CASSA_LOCAL_DC") {
            builder = builder.local_datacenter(dc);
        }
        if let Ok(ks) = env::var("CASSA_KEYSPACE") {
            builder = builder.keyspace(ks);
        }
        if let (Ok(user), Ok(pass)) = (env::var("CASSA_USERNAME"), env::var("CASSA_PASSWORD")) {
            builder = builder.plain_text_auth(user, pass);
        }
        builder.build()
    }

    /// Resolve every contact point to a `host:port` pair using the
    /// configured default `port` when a contact point omits one.
    pub fn contact_addrs(&self) -> Result<Vec<(String, u16)>, ConfigError> {
        self.contact_points
            .iter()
            .map(|raw| parse_contact_point(raw, self.port))
            .collect()
    }
}

fn parse_contact_point(raw: &str, default_port: u16) -> Result<(String, u16), ConfigError> {
    match raw.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Parse("invalid port in contact point"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((raw.to_string(), default_port)),
    }
}

/// A resolved contact point, ready to dial.
pub fn socket_addr_hint(host: &str, port: u16) -> Option<SocketAddr> {
    format!("{host}:{port}").parse().ok()
}

#[derive(Default)]
pub struct ClusterConfigBuilder {
    inner: PartialConfig,
}

#[derive(Default)]
struct PartialConfig {
    contact_points: Vec<String>,
    port: Option<u16>,
    local_datacenter: Option<String>,
    keyspace: Option<String>,
    default_consistency: Option<Consistency>,
    pool: Option<PoolConfig>,
    tls: Option<TlsConfig>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    auth: Option<PlainTextAuth>,
    managed_service: bool,
}

impl ClusterConfigBuilder {
    pub fn contact_point(mut self, point: impl Into<String>) -> Self {
        self.inner.contact_points.push(point.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.inner.port = Some(port);
        self
    }

    pub fn local_datacenter(mut self, dc: impl Into<String>) -> Self {
        self.inner.local_datacenter = Some(dc.into());
        self
    }

    pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.inner.keyspace = Some(keyspace.into());
        self
    }

    pub fn default_consistency(mut self, consistency: Consistency) -> Self {
        self.inner.default_consistency = Some(consistency);
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.inner.pool = Some(pool);
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.inner.tls = Some(tls);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.inner.request_timeout = Some(timeout);
        self
    }

    pub fn plain_text_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.inner.auth = Some(PlainTextAuth { username: username.into(), password: password.into() });
        self
    }

    pub fn managed_service(mut self, managed: bool) -> Self {
        self.inner.managed_service = managed;
        self
    }

    pub fn build(self) -> Result<ClusterConfig, ConfigError> {
        if self.inner.contact_points.is_empty() {
            return Err(ConfigError::Parse("at least one contact point is required"));
        }
        let defaults = ClusterConfig::default();
        Ok(ClusterConfig {
            contact_points: self.inner.contact_points,
            port: self.inner.port.unwrap_or(defaults.port),
            local_datacenter: self.inner.local_datacenter,
            keyspace: self.inner.keyspace,
            default_consistency: self.inner.default_consistency.unwrap_or_else(|| {
                Consistency::default_for(self.inner.managed_service)
            }),
            pool: self.inner.pool.unwrap_or_default(),
            tls: self.inner.tls.unwrap_or_default(),
            request_timeout: self.inner.request_timeout.unwrap_or(defaults.request_timeout),
            connect_timeout: self.inner.connect_timeout.unwrap_or(defaults.connect_timeout),
            auth: self.inner.auth,
            managed_service: self.inner.managed_service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_contact_point() {
        assert!(ClusterConfig::builder().build().is_err());
    }

    #[test]
    fn parses_contact_point_with_explicit_port() {
        assert_eq!(parse_contact_point("10.0.0.1:9142", 9042).unwrap(), ("10.0.0.1".into(), 9142));
    }

    #[test]
    fn parses_contact_point_falling_back_to_default_port() {
        assert_eq!(parse_contact_point("10.0.0.1", 9042).unwrap(), ("10.0.0.1".into(), 9042));
    }
}
