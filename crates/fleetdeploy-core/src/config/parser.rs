//! TOML parser with helpful error messages

use std::path::Path;

use super::FleetConfig;
use super::schema::FleetConfigFile;
use crate::error::ConfigError;

/// Parse and validate fleetdeploy.toml
pub fn parse_fleet_toml(path: &Path) -> Result<FleetConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    parse_fleet_toml_str(&content)
}

/// Parse and validate fleetdeploy.toml content from string
pub fn parse_fleet_toml_str(content: &str) -> Result<FleetConfig, ConfigError> {
    parse_raw(content)?.validate()
}

/// Parse without validation, keeping absent fields absent.
pub fn parse_raw(content: &str) -> Result<FleetConfigFile, ConfigError> {
    toml::from_str(content).map_err(|e| enhance_toml_error(e, content))
}

/// Enhance TOML parsing errors with the offending line and its neighbours
fn enhance_toml_error(error: toml::de::Error, content: &str) -> ConfigError {
    let error_msg = error.message().to_string();

    let line_hint = error
        .span()
        .map(|span| content[..span.start.min(content.len())].lines().count().max(1));

    match line_hint {
        Some(line_num) => {
            let context = get_line_context(content, line_num);
            ConfigError::Parse(format!(
                "TOML parsing error at line {}:\n{}\n\nError: {}",
                line_num, context, error_msg
            ))
        }
        None => ConfigError::Parse(format!("TOML parsing error: {}", error_msg)),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 2).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a raw configuration to TOML string
pub fn to_toml(config: &FleetConfigFile) -> Result<String, ConfigError> {
    toml::to_string_pretty(config)
        .map_err(|e| ConfigError::Parse(format!("Failed to serialize configuration: {}", e)))
}
