//! Configuration validation for provider configs.
//!
//! This module validates the whole configuration before any remote call is
//! made. Every problem is collected; the first error is reported.

use crate::error::{ConfigError, ProviderError, Result};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use super::spec::{
    ContainerSpec, Mount, PollSettings, PortMapping, ProviderConfig, StackConfig, StackOwnership,
};

/// Validator for provider configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a provider configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any was found.
    pub fn validate(&self, config: &ProviderConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        match result.errors.first() {
            None => {
                debug!("Configuration validation passed");
                Ok(result)
            }
            Some(first_error) => Err(ProviderError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            ))),
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &ProviderConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_api(config, &mut result);
        Self::validate_polling(config, &mut result);
        Self::validate_stacks(&config.stacks, &mut result);

        result
    }

    fn validate_api(config: &ProviderConfig, result: &mut ValidationResult) {
        let api = &config.api;

        if !api.base_url.starts_with("https://") && !api.base_url.starts_with("http://") {
            result.errors.push(ValidationError {
                field: String::from("api.base_url"),
                message: format!("API base URL must be http(s): {}", api.base_url),
            });
        } else if api.base_url.starts_with("http://") {
            result
                .warnings
                .push(String::from("api.base_url: plain HTTP sends the API token unencrypted"));
        }

        if api.token_env.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("api.token_env"),
                message: String::from("Token environment variable name cannot be empty"),
            });
        }

        if api.request_timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("api.request_timeout_secs"),
                message: String::from("Request timeout must be at least 1 second"),
            });
        }
    }

    fn validate_polling(config: &ProviderConfig, result: &mut ValidationResult) {
        let polling = &config.polling;
        let entries = [
            ("default", polling.default),
            ("stack", polling.stack),
            ("recreate", polling.recreate),
            ("app", polling.app),
            ("order", polling.order),
        ];

        for (name, settings) in entries {
            Self::validate_poll_settings(name, settings, result);
        }

        if polling.timeout_secs == 0 {
            result.warnings.push(String::from(
                "polling.timeout_secs: no overall deadline, waits may run until interrupted",
            ));
        }
    }

    fn validate_poll_settings(name: &str, settings: PollSettings, result: &mut ValidationResult) {
        if settings.backoff_factor.is_nan() || settings.backoff_factor < 0.0 {
            result.errors.push(ValidationError {
                field: format!("polling.{name}.backoff_factor"),
                message: String::from("Backoff factor must be zero (default) or positive"),
            });
        } else if settings.backoff_factor > 0.0 && settings.backoff_factor < 1.0 {
            result.warnings.push(format!(
                "polling.{name}.backoff_factor: {} is raised to 1.0, delays never shrink",
                settings.backoff_factor
            ));
        }

        if settings.max_delay_ms > 0 && settings.initial_delay_ms > settings.max_delay_ms {
            result.warnings.push(format!(
                "polling.{name}: initial delay {}ms is capped at max delay {}ms",
                settings.initial_delay_ms, settings.max_delay_ms
            ));
        }
    }

    fn validate_stacks(stacks: &[StackConfig], result: &mut ValidationResult) {
        if stacks.is_empty() {
            result.warnings.push(String::from("No stacks defined in configuration"));
            return;
        }

        let mut seen_names = HashSet::new();
        let mut seen_ids = HashSet::new();

        for (i, stack) in stacks.iter().enumerate() {
            let prefix = format!("stacks[{i}]");

            if !seen_names.insert(&stack.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate stack name: {}", stack.name),
                });
            }

            if !is_valid_name(&stack.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Stack name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        stack.name
                    ),
                });
            }

            if stack.stack_id.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.stack_id"),
                    message: String::from("Stack ID cannot be empty"),
                });
            } else if !seen_ids.insert(&stack.stack_id) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.stack_id"),
                    message: format!(
                        "Stack ID {} is declared twice; two entries would fight over it",
                        stack.stack_id
                    ),
                });
            }

            if stack.desired.containers.is_empty() {
                result
                    .warnings
                    .push(format!("{prefix}: stack '{}' declares no containers", stack.name));
            }

            for (name, container) in &stack.desired.containers {
                Self::validate_container(stack, name, container, &prefix, result);
            }

            for name in stack.desired.volumes.keys() {
                if !is_valid_name(name) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.volumes.{name}"),
                        message: format!("Volume name '{name}' is invalid"),
                    });
                }
            }
        }
    }

    fn validate_container(
        stack: &StackConfig,
        name: &str,
        container: &ContainerSpec,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let field = format!("{prefix}.containers.{name}");

        if !is_valid_name(name) {
            result.errors.push(ValidationError {
                field: field.clone(),
                message: format!(
                    "Container name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."
                ),
            });
        }

        if container.image.trim().is_empty() {
            result.errors.push(ValidationError {
                field: format!("{field}.image"),
                message: String::from("Container image cannot be empty"),
            });
        } else if container.image.ends_with(":latest") || !container.image.contains(':') {
            result.warnings.push(format!(
                "{field}.image: untagged or ':latest' images drift without a config change"
            ));
        }

        let mut seen_ports = BTreeSet::new();
        for (i, port) in container.ports.iter().enumerate() {
            match PortMapping::parse(port) {
                Ok(mapping) => {
                    if !seen_ports.insert(mapping) {
                        result.errors.push(ValidationError {
                            field: format!("{field}.ports[{i}]"),
                            message: format!("Duplicate port {mapping}"),
                        });
                    }
                }
                Err(message) => result.errors.push(ValidationError {
                    field: format!("{field}.ports[{i}]"),
                    message,
                }),
            }
        }

        let mut seen_targets = HashSet::new();
        for (i, mount) in container.mounts.iter().enumerate() {
            match Mount::parse(mount) {
                Ok(parsed) => {
                    if !seen_targets.insert(parsed.target.clone()) {
                        result.errors.push(ValidationError {
                            field: format!("{field}.mounts[{i}]"),
                            message: format!("Duplicate mount target: {}", parsed.target),
                        });
                    }
                    if parsed.is_volume()
                        && stack.ownership == StackOwnership::Exclusive
                        && !stack.desired.volumes.contains_key(&parsed.source)
                    {
                        result.errors.push(ValidationError {
                            field: format!("{field}.mounts[{i}]"),
                            message: format!(
                                "Mount uses volume '{}' which is not declared in this stack",
                                parsed.source
                            ),
                        });
                    }
                }
                Err(message) => result.errors.push(ValidationError {
                    field: format!("{field}.mounts[{i}]"),
                    message,
                }),
            }
        }

        if container.no_recreate_on_change {
            result.warnings.push(format!(
                "{field}: no_recreate_on_change set, some changes only apply after a manual restart"
            ));
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> ProviderConfig {
        ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("test yaml should parse")
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("api-v2"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web")); // uppercase
        assert!(!is_valid_name("1web")); // starts with number
        assert!(!is_valid_name("web_api")); // underscore
        assert!(!is_valid_name("web-")); // ends with hyphen
        assert!(!is_valid_name("web--api")); // consecutive hyphens
    }

    #[test]
    fn test_valid_config_passes() {
        let config = parse(
            r"
polling:
  timeout_secs: 600
stacks:
  - name: shop
    stack_id: st-123
    containers:
      web:
        image: nginx:1.27
        ports: ['80', '443/tcp']
        mounts: ['assets:/usr/share/nginx/html:ro']
",
        );

        let result = ConfigValidator::new()
            .validate(&config)
            .expect("config should be valid");
        assert_eq!(result.error_count(), 0);
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_collects_every_error() {
        let config = parse(
            r"
stacks:
  - name: shop
    stack_id: st-1
    ownership: exclusive
    containers:
      web:
        image: ''
        ports: ['http', '80', '80/tcp']
        mounts: ['cache:/cache']
  - name: shop
    stack_id: st-1
",
        );

        let result = ConfigValidator::new().check(&config);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"stacks[0].containers.web.image"));
        assert!(fields.contains(&"stacks[0].containers.web.ports[0]"));
        assert!(fields.contains(&"stacks[0].containers.web.ports[2]"));
        assert!(fields.contains(&"stacks[0].containers.web.mounts[0]"));
        assert!(fields.contains(&"stacks[1].name"));
        assert!(fields.contains(&"stacks[1].stack_id"));

        let err = ConfigValidator::new()
            .validate(&config)
            .expect_err("config is invalid");
        assert!(matches!(err, ProviderError::Config(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_shared_stack_may_mount_foreign_volume() {
        let config = parse(
            r"
polling:
  timeout_secs: 60
stacks:
  - name: shop
    stack_id: st-1
    containers:
      web:
        image: nginx:1.27
        mounts: ['uploads:/srv/uploads']
",
        );

        assert!(ConfigValidator::new().check(&config).is_valid());
    }

    #[test]
    fn test_negative_backoff_factor_rejected() {
        let config = parse(
            r"
polling:
  order:
    backoff_factor: -2.0
stacks: []
",
        );

        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.errors[0].field, "polling.order.backoff_factor");
    }
}
