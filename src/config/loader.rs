//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment override {name}: {reason}")]
    Env { name: String, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file into a configuration without validating it.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse TOML text into a configuration without validating it.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load a TOML file, apply process environment overrides and validate.
///
/// Without a path the built-in defaults are the starting point.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `GATEWAY_*` overrides from the given variables.
///
/// Recognized names:
/// - `GATEWAY_MODE`
/// - `GATEWAY_BIND_ADDRESS`
/// - `GATEWAY_ALLOWED_ORIGINS` (comma separated)
/// - `GATEWAY_TRUST_PROXY_HOPS`
/// - `GATEWAY_SERVICE_<KEY>_URL`, where `<KEY>` is the service key upper-cased
///   with `-` replaced by `_`
pub fn apply_env_overrides<I>(config: &mut GatewayConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, value) in vars {
        match name.as_str() {
            "GATEWAY_MODE" => {
                config.mode = value
                    .parse()
                    .map_err(|reason| ConfigError::Env { name: name.clone(), reason })?;
            }
            "GATEWAY_BIND_ADDRESS" => config.listener.bind_address = value,
            "GATEWAY_ALLOWED_ORIGINS" => {
                config.cors.allowed_origins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "GATEWAY_TRUST_PROXY_HOPS" => {
                config.proxy.trust_proxy_hops = value.trim().parse().map_err(|e| ConfigError::Env {
                    name: name.clone(),
                    reason: format!("{}", e),
                })?;
            }
            _ => {
                let Some(env_key) = name
                    .strip_prefix("GATEWAY_SERVICE_")
                    .and_then(|rest| rest.strip_suffix("_URL"))
                else {
                    continue;
                };
                match config.services.iter_mut().find(|s| env_key_for(&s.key) == env_key) {
                    Some(service) => {
                        tracing::debug!(service = %service.key, url = %value, "Base address overridden from environment");
                        service.base_address = value;
                    }
                    None => tracing::warn!(variable = %name, "Environment override names no registered service"),
                }
            }
        }
    }
    Ok(())
}

fn env_key_for(service_key: &str) -> String {
    service_key.to_ascii_uppercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ExecutionMode, LogFormat};

    const SAMPLE: &str = r#"
        mode = "production"

        [listener]
        bind_address = "127.0.0.1:4000"

        [cors]
        allowed_origins = ["https://admin.example.com"]

        [rate_limit]
        max_requests = 20

        [observability]
        log_format = "json"

        [[services]]
        key = "user-management"
        name = "User Management Service"
        base_address = "http://users.internal:3001"
        routes = ["/profile"]
        strip_prefix = true

        [[services]]
        key = "payment-management"
        name = "Payment Management Service"
        base_address = "http://payments.internal:3006"
    "#;

    #[test]
    fn test_parse_sample_config() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.mode, ExecutionMode::Production);
        assert_eq!(config.listener.bind_address, "127.0.0.1:4000");
        assert_eq!(config.rate_limit.max_requests, 20);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert_eq!(config.timeouts.upstream_secs, 30);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.services.len(), 2);
        assert!(config.services[0].strip_prefix);
        assert!(!config.services[1].strip_prefix);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_services_fall_back_to_defaults() {
        let config = parse_config("mode = \"development\"").unwrap();
        assert_eq!(config.services.len(), 5);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        let vars = vec![
            ("GATEWAY_MODE".to_string(), "production".to_string()),
            ("GATEWAY_ALLOWED_ORIGINS".to_string(), "https://a.example, https://b.example".to_string()),
            ("GATEWAY_TRUST_PROXY_HOPS".to_string(), "2".to_string()),
            ("GATEWAY_SERVICE_USER_MANAGEMENT_URL".to_string(), "http://users:8080".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        apply_env_overrides(&mut config, vars).unwrap();

        assert_eq!(config.mode, ExecutionMode::Production);
        assert_eq!(config.cors.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.proxy.trust_proxy_hops, 2);
        let users = config.services.iter().find(|s| s.key == "user-management").unwrap();
        assert_eq!(users.base_address, "http://users:8080");
    }

    #[test]
    fn test_bad_env_mode_is_rejected() {
        let mut config = GatewayConfig::default();
        let err = apply_env_overrides(&mut config, vec![("GATEWAY_MODE".to_string(), "staging".to_string())])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_example_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("gateway.example.toml");
        let config = read_config(&path).unwrap();
        assert_eq!(validate_config(&config), Ok(()));
        assert_eq!(config.services.len(), 5);
    }
}
