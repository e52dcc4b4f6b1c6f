//! Config YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::EngineConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error if any referenced environment variable is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                errors.push(var_name.to_string());
            }
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", errors.join(", "));
    }

    Ok(result)
}

/// Parse an engine config YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_config_str(yaml_str: &str) -> Result<EngineConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: EngineConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse engine config YAML")?;
    Ok(config)
}

/// Parse an engine config YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_config(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_substitution() {
        std::env::set_var("RL_TEST_DB", "/tmp/progress.db");
        let input = "connection: ${RL_TEST_DB}";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "connection: /tmp/progress.db");
        std::env::remove_var("RL_TEST_DB");
    }

    #[test]
    fn no_env_vars_passthrough() {
        let input = "name: contacts\nversion: \"1.0\"";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn missing_env_vars_all_reported() {
        let input = "${RL_MISSING_X} and ${RL_MISSING_Y}";
        let err = substitute_env_vars(input).unwrap_err().to_string();
        assert!(err.contains("RL_MISSING_X"));
        assert!(err.contains("RL_MISSING_Y"));
    }

    #[test]
    fn parse_config_from_string() {
        std::env::set_var("RL_TEST_STATE_PATH", "/tmp/rl-state.db");
        let yaml = r#"
version: "1.0"
name: district_contacts
state:
  connection: ${RL_TEST_STATE_PATH}
"#;
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.state.connection, "/tmp/rl-state.db");
        assert_eq!(config.name, "district_contacts");
        std::env::remove_var("RL_TEST_STATE_PATH");
    }

    #[test]
    fn parse_invalid_yaml_errors() {
        let yaml = "this is not: [valid: yaml: {{{}}}";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn parse_config_file_not_found() {
        let err = parse_config(Path::new("/nonexistent/engine.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to read config file"));
    }
}
