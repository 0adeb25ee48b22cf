//! Connection defaults loaded from the CLI config file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// `key = value` file configuration for connection defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Server base URL.
    pub host: Option<String>,
    /// Web context under the host.
    pub context: Option<String>,
    pub username: Option<String>,
    /// Accept any server certificate.
    pub ignore_ssl: Option<bool>,
    /// TLS protocol pinned when `ignore_ssl` is set.
    pub protocol: Option<String>,
    pub session_token: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs)?;
        if let Some(host) = &self.host
            && !(host.starts_with("http://") || host.starts_with("https://"))
        {
            bail!("Invalid config value for `host`: '{host}'. Expected an http:// or https:// URL");
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/forms-client/config.toml`
/// 2. `$HOME/.config/forms-client/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("forms-client")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("forms-client")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config at `path`, or at the default path when `None`.
///
/// A missing default file yields an empty config; a missing explicit file
/// is an error.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = path {
        return read_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_number = line_index + 1;
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "host" => cfg.host = Some(parse_string_literal(value).with_context(invalid)?),
            "context" => cfg.context = Some(parse_string_literal(value).with_context(invalid)?),
            "username" => cfg.username = Some(parse_string_literal(value).with_context(invalid)?),
            "protocol" => cfg.protocol = Some(parse_string_literal(value).with_context(invalid)?),
            "session_token" => {
                cfg.session_token = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "ignore_ssl" => cfg.ignore_ssl = Some(parse_boolean(value).with_context(invalid)?),
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "request_timeout_secs" => {
                cfg.request_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "password" => {
                bail!(
                    "Passwords are not read from the config file (line {line_number}); use --password or FORMS_PASSWORD"
                );
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected true or false"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_all_keys() {
        let raw = r#"
            # connection defaults
            host = "https://forms.example.com"
            context = "forms"   # trailing comment
            username = "admin"
            ignore_ssl = true
            protocol = "TLSv1.3"
            session_token = "1234#5"
            connect_timeout_secs = 10
            request_timeout_secs = 600
        "#;
        let cfg = parse_config_str(raw).unwrap();
        assert_eq!(cfg.host.as_deref(), Some("https://forms.example.com"));
        assert_eq!(cfg.context.as_deref(), Some("forms"));
        assert_eq!(cfg.username.as_deref(), Some("admin"));
        assert_eq!(cfg.ignore_ssl, Some(true));
        assert_eq!(cfg.protocol.as_deref(), Some("TLSv1.3"));
        assert_eq!(cfg.session_token.as_deref(), Some("1234#5"));
        assert_eq!(cfg.connect_timeout_secs, Some(10));
        assert_eq!(cfg.request_timeout_secs, Some(600));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("colour = \"blue\"").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_parse_config_rejects_password() {
        let err = parse_config_str("password = \"hunter2\"").unwrap_err();
        assert!(err.to_string().contains("FORMS_PASSWORD"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("host = https://h").unwrap_err();
        assert!(err.to_string().contains("host"), "{err}");
    }

    #[test]
    fn test_parse_config_validates_timeout_range() {
        let err = parse_config_str("connect_timeout_secs = 0").unwrap_err();
        assert!(format!("{err:#}").contains("1..=3600"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("host").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_explicit_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_file_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "username = \"ops\"\n").unwrap();
        let cfg = load_file_config(Some(&path)).unwrap();
        assert_eq!(cfg.username.as_deref(), Some("ops"));
    }
}
