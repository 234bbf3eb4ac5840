//! Configuration module for the hostplane provider.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `hostplane.yaml`
//! - Validation of configuration values
//! - Fingerprinting desired stacks

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    ApiConfig, ContainerSpec, DesiredStack, Mount, MountMode, PollSettings, PollingConfig,
    PortMapping, PortProtocol, ProviderConfig, StackConfig, StackOwnership, VolumeSpec,
};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_API_URL, ENV_TOKEN_ENV, find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
