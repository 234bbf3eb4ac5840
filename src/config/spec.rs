//! Configuration specification types for the hostplane provider.
//!
//! This module defines the structs that map to the `hostplane.yaml` file.
//! Stacks are declarative: each entry fully describes the containers and
//! volumes the provider manages in one remote stack.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::api::DEFAULT_API_URL;
use crate::wait::PollOptions;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProviderConfig {
    /// Control plane API settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Polling settings per call site.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Declared stacks.
    #[serde(default)]
    pub stacks: Vec<StackConfig>,
}

/// Control plane API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL of the control plane API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Polling settings.
///
/// Every entry left at zero falls back to the call site's own default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PollingConfig {
    /// Fallback for call sites without their own entry.
    #[serde(default)]
    pub default: PollSettings,
    /// Stack readiness waits.
    #[serde(default)]
    pub stack: PollSettings,
    /// Waits after a service recreate or a stack delete.
    #[serde(default)]
    pub recreate: PollSettings,
    /// App installation version waits.
    #[serde(default)]
    pub app: PollSettings,
    /// Order fulfilment waits.
    #[serde(default)]
    pub order: PollSettings,
    /// Overall deadline for one CLI invocation, in seconds. Zero means none.
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Backoff settings for one call site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PollSettings {
    /// Delay before the second attempt, in milliseconds.
    #[serde(default)]
    pub initial_delay_ms: u64,
    /// Cap on every inter-attempt delay, in milliseconds.
    #[serde(default)]
    pub max_delay_ms: u64,
    /// Multiplicative growth per attempt.
    #[serde(default)]
    pub backoff_factor: f64,
}

/// A declared stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackConfig {
    /// Local name used on the command line.
    pub name: String,
    /// Control plane stack identifier.
    pub stack_id: String,
    /// How much of the remote stack this entry owns.
    #[serde(default)]
    pub ownership: StackOwnership,
    /// Desired containers and volumes.
    #[serde(flatten)]
    pub desired: DesiredStack,
}

/// Desired containers and volumes of a stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DesiredStack {
    /// Containers keyed by logical name.
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerSpec>,
    /// Volumes keyed by name.
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeSpec>,
}

/// Desired state of one container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContainerSpec {
    /// Image reference.
    pub image: String,
    /// Command override. Unset leaves the deployed command alone.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Entrypoint override. Unset leaves the deployed entrypoint alone.
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    /// Environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Port mappings, `<port>[/<tcp|udp>]`.
    #[serde(default)]
    pub ports: Vec<String>,
    /// Mounts, `<volume-or-abs-path>:<container-path>[:ro|rw]`.
    #[serde(default)]
    pub mounts: Vec<String>,
    /// Human readable description. Unset leaves the deployed one alone.
    #[serde(default)]
    pub description: Option<String>,
    /// Apply changes without recreating, even if the server asks for it.
    #[serde(default)]
    pub no_recreate_on_change: bool,
}

/// Volume declaration. Volumes carry no attributes beyond their name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VolumeSpec {}

/// Ownership of a remote stack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StackOwnership {
    /// The provider owns the whole stack; undeclared entries are removed.
    Exclusive,
    /// Other actors may own entries; only declared names are touched.
    #[default]
    #[serde(rename = "shared", alias = "shared_default")]
    SharedDefault,
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

/// A parsed port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PortMapping {
    /// Port number.
    pub port: u16,
    /// Protocol, TCP unless stated.
    pub protocol: PortProtocol,
}

/// Access mode of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum MountMode {
    /// Read-write.
    #[default]
    ReadWrite,
    /// Read-only.
    ReadOnly,
}

/// A parsed mount.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mount {
    /// Volume name or absolute host path.
    pub source: String,
    /// Absolute path inside the container.
    pub target: String,
    /// Access mode.
    pub mode: MountMode,
}

fn default_base_url() -> String {
    String::from(DEFAULT_API_URL)
}

fn default_token_env() -> String {
    String::from("HOSTPLANE_API_TOKEN")
}

const fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl PollSettings {
    /// Converts to poll options. Zero fields stay zero so the call site
    /// default applies.
    #[must_use]
    pub const fn to_options(self) -> PollOptions {
        PollOptions::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_factor,
        )
    }

    /// Field by field, keeps the values set here and takes the rest from
    /// `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            initial_delay_ms: if self.initial_delay_ms == 0 {
                fallback.initial_delay_ms
            } else {
                self.initial_delay_ms
            },
            max_delay_ms: if self.max_delay_ms == 0 {
                fallback.max_delay_ms
            } else {
                self.max_delay_ms
            },
            backoff_factor: if self.backoff_factor <= 0.0 || self.backoff_factor.is_nan() {
                fallback.backoff_factor
            } else {
                self.backoff_factor
            },
        }
    }
}

impl PollingConfig {
    /// Fills each unset field of `specific` from the `default` entry.
    fn resolve(&self, specific: PollSettings) -> PollOptions {
        specific.or(self.default).to_options()
    }

    /// Options for stack readiness waits.
    #[must_use]
    pub fn stack_options(&self) -> PollOptions {
        self.resolve(self.stack)
    }

    /// Options for waits after recreate or delete.
    #[must_use]
    pub fn recreate_options(&self) -> PollOptions {
        self.resolve(self.recreate)
    }

    /// Options for app installation waits.
    #[must_use]
    pub fn app_options(&self) -> PollOptions {
        self.resolve(self.app)
    }

    /// Options for order waits.
    #[must_use]
    pub fn order_options(&self) -> PollOptions {
        self.resolve(self.order)
    }

    /// Overall deadline, if configured.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

impl ProviderConfig {
    /// Finds a declared stack by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&StackConfig> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Returns stack names in declaration order.
    #[must_use]
    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.name.as_str()).collect()
    }
}

impl DesiredStack {
    /// Returns the desired container names.
    #[must_use]
    pub fn container_names(&self) -> BTreeSet<String> {
        self.containers.keys().cloned().collect()
    }

    /// Returns the desired volume names.
    #[must_use]
    pub fn volume_names(&self) -> BTreeSet<String> {
        self.volumes.keys().cloned().collect()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.volumes.is_empty()
    }
}

impl std::fmt::Display for StackOwnership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exclusive => write!(f, "exclusive"),
            Self::SharedDefault => write!(f, "shared"),
        }
    }
}

impl PortMapping {
    /// Parses a port mapping like `8080` or `53/udp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port number or protocol is invalid.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (port, protocol) = match s.split_once('/') {
            Some((port, proto)) => (port, Some(proto)),
            None => (s, None),
        };

        let port = port
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| format!("invalid port '{s}'"))?;

        let protocol = match protocol.map(|p| p.trim().to_lowercase()).as_deref() {
            None | Some("tcp") => PortProtocol::Tcp,
            Some("udp") => PortProtocol::Udp,
            Some(other) => {
                return Err(format!(
                    "invalid protocol '{other}' in port '{s}', expected tcp or udp"
                ));
            }
        };

        Ok(Self { port, protocol })
    }
}

impl std::fmt::Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.protocol {
            PortProtocol::Tcp => write!(f, "{}/tcp", self.port),
            PortProtocol::Udp => write!(f, "{}/udp", self.port),
        }
    }
}

impl Mount {
    /// Parses a mount like `data:/var/lib/data:ro`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or target is missing, the target is
    /// not absolute, or the mode is unknown.
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.split(':').collect();
        let (source, target, mode) = match parts.as_slice() {
            [source, target] => (*source, *target, MountMode::ReadWrite),
            [source, target, "rw"] => (*source, *target, MountMode::ReadWrite),
            [source, target, "ro"] => (*source, *target, MountMode::ReadOnly),
            [_, _, other] => {
                return Err(format!("invalid mode '{other}' in mount '{s}', expected ro or rw"));
            }
            _ => {
                return Err(format!(
                    "invalid mount '{s}', expected <volume-or-path>:<container-path>[:ro|rw]"
                ));
            }
        };

        if source.is_empty() {
            return Err(format!("mount '{s}' has no source"));
        }
        if !target.starts_with('/') {
            return Err(format!("mount target in '{s}' must be an absolute path"));
        }

        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            mode,
        })
    }

    /// Returns true if the source names a volume rather than a host path.
    #[must_use]
    pub fn is_volume(&self) -> bool {
        !self.source.starts_with('/') && !self.source.starts_with('.')
    }
}

impl std::fmt::Display for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.mode {
            MountMode::ReadWrite => write!(f, "{}:{}", self.source, self.target),
            MountMode::ReadOnly => write!(f, "{}:{}:ro", self.source, self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_mapping_parse() {
        let port = PortMapping::parse("8080").expect("bare port");
        assert_eq!(port.port, 8080);
        assert_eq!(port.protocol, PortProtocol::Tcp);
        assert_eq!(port.to_string(), "8080/tcp");

        let port = PortMapping::parse("53/UDP").expect("udp port");
        assert_eq!(port.to_string(), "53/udp");
    }

    #[test]
    fn test_port_mapping_invalid() {
        assert!(PortMapping::parse("http").is_err());
        assert!(PortMapping::parse("0").is_err());
        assert!(PortMapping::parse("80/sctp").is_err());
    }

    #[test]
    fn test_mount_parse() {
        let mount = Mount::parse("data:/var/lib/data:ro").expect("volume mount");
        assert_eq!(mount.source, "data");
        assert_eq!(mount.mode, MountMode::ReadOnly);
        assert!(mount.is_volume());

        let mount = Mount::parse("/srv/www:/usr/share/nginx/html:rw").expect("bind mount");
        assert!(!mount.is_volume());
        assert_eq!(mount.to_string(), "/srv/www:/usr/share/nginx/html");
    }

    #[test]
    fn test_mount_invalid() {
        assert!(Mount::parse("data").is_err());
        assert!(Mount::parse("data:relative").is_err());
        assert!(Mount::parse("data:/x:rx").is_err());
        assert!(Mount::parse(":/x").is_err());
    }

    #[test]
    fn test_ownership_names() {
        let shared: StackOwnership = serde_yaml::from_str("shared").expect("shared");
        let alias: StackOwnership = serde_yaml::from_str("shared_default").expect("alias");
        let exclusive: StackOwnership = serde_yaml::from_str("exclusive").expect("exclusive");

        assert_eq!(shared, StackOwnership::SharedDefault);
        assert_eq!(alias, StackOwnership::SharedDefault);
        assert_eq!(exclusive, StackOwnership::Exclusive);
        assert_eq!(StackOwnership::default(), StackOwnership::SharedDefault);
    }

    #[test]
    fn test_polling_falls_back_to_default_entry() {
        let polling = PollingConfig {
            default: PollSettings {
                initial_delay_ms: 200,
                max_delay_ms: 5_000,
                backoff_factor: 1.5,
            },
            stack: PollSettings {
                initial_delay_ms: 2_000,
                ..PollSettings::default()
            },
            ..PollingConfig::default()
        };

        assert_eq!(polling.order_options().initial_delay, Duration::from_millis(200));
        assert_eq!(polling.stack_options().initial_delay, Duration::from_secs(2));
        assert_eq!(polling.timeout(), None);
    }

    #[test]
    fn test_partial_polling_entry_merges_default_per_field() {
        let config = crate::config::ConfigParser::new()
            .parse_yaml(
                r"
polling:
  default:
    max_delay_ms: 5000
    backoff_factor: 1.5
  stack:
    initial_delay_ms: 500
stacks: []
",
                None,
            )
            .expect("config should parse");

        let stack = config.polling.stack_options();
        assert_eq!(stack.initial_delay, Duration::from_millis(500));
        assert_eq!(stack.max_delay, Duration::from_secs(5));
        assert!((stack.backoff_factor - 1.5).abs() < f64::EPSILON);

        // Fields unset in both entries stay zero for the call site default.
        assert_eq!(config.polling.recreate_options().initial_delay, Duration::ZERO);
    }
}
