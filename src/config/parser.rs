//! Configuration parser for loading provider configuration files.
//!
//! This module handles loading configuration from YAML files, the `.env`
//! file next to them, and environment variable overrides.

use crate::error::{ConfigError, ProviderError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ProviderConfig;

/// Environment variable overriding `api.base_url`.
pub const ENV_API_URL: &str = "HOSTPLANE_API_URL";

/// Environment variable overriding `api.token_env`.
pub const ENV_TOKEN_ENV: &str = "HOSTPLANE_TOKEN_ENV";

/// Configuration parser for loading provider configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving the `.env` file.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ProviderError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderConfig> {
        debug!("Parsing YAML configuration");

        let config: ProviderConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ProviderError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed configuration with {} stack(s)", config.stacks.len());
        Ok(config)
    }

    /// Loads configuration and applies environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies overrides looked up through `lookup`.
    fn apply_overrides(config: &mut ProviderConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            debug!("Overriding api.base_url from environment");
            config.api.base_url = url;
        }

        if let Some(token_env) = lookup(ENV_TOKEN_ENV).filter(|v| !v.is_empty()) {
            debug!("Overriding api.token_env from environment");
            config.api.token_env = token_env;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ProviderError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Reads the API token from the variable named by `api.token_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty.
    pub fn api_token(config: &ProviderConfig) -> Result<String> {
        let name = &config.api.token_env;
        std::env::var(name)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::Config(ConfigError::MissingEnvVar { name: name.clone() })
            })
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "hostplane.yaml",
    "hostplane.yml",
    ".hostplane.yaml",
    ".hostplane.yml",
];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ProviderError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackOwnership;
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
stacks: []
";
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("minimal config should parse");

        assert!(config.stacks.is_empty());
        assert_eq!(config.api.token_env, "HOSTPLANE_API_TOKEN");
        assert_eq!(config.api.request_timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
api:
  base_url: https://cp.internal.example/v2
  token_env: SHOP_TOKEN
polling:
  stack:
    initial_delay_ms: 500
    max_delay_ms: 20000
    backoff_factor: 1.2
  timeout_secs: 900

stacks:
  - name: shop
    stack_id: st-42
    ownership: exclusive
    containers:
      web:
        image: nginx:1.27
        ports: ["80", "443/tcp"]
        mounts: ["assets:/usr/share/nginx/html:ro"]
        environment:
          MODE: prod
      worker:
        image: ghcr.io/shop/worker:3.1
        command: ["worker", "--queue", "default"]
        no_recreate_on_change: true
    volumes:
      assets: {}
"#;
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("full config should parse");

        assert_eq!(config.api.token_env, "SHOP_TOKEN");
        assert_eq!(config.polling.timeout_secs, 900);

        let stack = config.stack("shop").expect("shop stack");
        assert_eq!(stack.ownership, StackOwnership::Exclusive);
        assert_eq!(stack.desired.containers.len(), 2);
        assert!(stack.desired.volumes.contains_key("assets"));

        let worker = &stack.desired.containers["worker"];
        assert!(worker.no_recreate_on_change);
        assert_eq!(worker.command.as_ref().map(Vec::len), Some(3));
        assert!(worker.entrypoint.is_none());
    }

    #[test]
    fn test_parse_error_reports_location() {
        let err = ConfigParser::new()
            .parse_yaml("stacks: [", Some(Path::new("broken.yaml")))
            .expect_err("invalid yaml");

        assert!(matches!(
            err,
            ProviderError::Config(ConfigError::ParseError { location: Some(ref l), .. }) if l == "broken.yaml"
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ProviderConfig::default();
        let vars = HashMap::from([
            (ENV_API_URL, String::from("http://localhost:8080")),
            (ENV_TOKEN_ENV, String::new()),
        ]);

        ConfigParser::apply_overrides(&mut config, |name| vars.get(name).cloned());

        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.api.token_env, "HOSTPLANE_API_TOKEN");
    }

    #[test]
    fn test_load_and_find_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("deploy").join("prod");
        std::fs::create_dir_all(&nested).expect("create nested dirs");
        let path = dir.path().join("hostplane.yaml");
        std::fs::write(&path, "stacks:\n  - name: shop\n    stack_id: st-1\n")
            .expect("write config");

        let found = find_config_file(&nested).expect("config should be found upwards");
        assert_eq!(found, path);

        let config = ConfigParser::new().load_file(&found).expect("load config");
        assert_eq!(config.stack_names(), vec!["shop"]);
        assert_eq!(config.stacks[0].ownership, StackOwnership::SharedDefault);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ConfigParser::new()
            .load_file(dir.path().join("nope.yaml"))
            .expect_err("missing file");

        assert!(matches!(err, ProviderError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_dotenv_loaded_from_base_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(".env"),
            "HOSTPLANE_PARSER_TEST_TOKEN=from-dotenv\n",
        )
        .expect("write .env");

        ConfigParser::new()
            .with_base_path(dir.path())
            .load_dotenv()
            .expect("load .env");

        let mut config = ProviderConfig::default();
        config.api.token_env = String::from("HOSTPLANE_PARSER_TEST_TOKEN");
        assert_eq!(
            ConfigParser::api_token(&config).expect("token from .env"),
            "from-dotenv"
        );
    }
}
