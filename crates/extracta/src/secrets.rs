//! Model API key resolution from multiple sources.
//!
//! Keys are resolved in priority order:
//!
//! 1. **Direct value** - for quick local testing (`"value": "sk-..."`)
//! 2. **File reference** - Docker secrets pattern (`"file": "/run/secrets/model_key"`)
//! 3. **Env var reference** - production deployments (`"env_var": "EXTRACTA_API_KEY"`)

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a secret may come from. Empty strings count as "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

impl SecretSource {
    pub fn from_env_var(name: impl Into<String>) -> Self {
        Self {
            env_var: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        [&self.value, &self.file, &self.env_var]
            .iter()
            .any(|s| s.as_deref().is_some_and(|s| !s.is_empty()))
    }

    pub fn resolve(&self) -> Result<SecretString> {
        resolve_secret(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env_var.as_deref(),
        )
    }

    /// Like [`resolve`](Self::resolve) but `None` when nothing is configured.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resolves a secret from a direct value, then a file, then an environment
/// variable. The first non-empty source wins; file and env contents are
/// trimmed and must not be blank.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        return non_blank(content.trim(), || format!("file '{}'", expanded));
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => non_blank(value.trim(), || format!("environment variable '{}'", name)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

fn non_blank(value: &str, origin: impl FnOnce() -> String) -> Result<SecretString> {
    if value.is_empty() {
        return Err(SecretError::Empty { origin: origin() });
    }
    Ok(SecretString::from(value.to_string()))
}

/// Expands a leading `~` or `~/` to the user's home directory.
/// `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Tests that modify environment variables must run serially.
    #[test]
    #[serial]
    fn test_direct_value_takes_priority() {
        std::env::set_var("EXTRACTA_TEST_KEY_1", "env_value");
        let key = resolve_secret(Some("sk-direct"), None, Some("EXTRACTA_TEST_KEY_1")).unwrap();
        assert_eq!(key.expose_secret(), "sk-direct");
        std::env::remove_var("EXTRACTA_TEST_KEY_1");
    }

    #[test]
    #[serial]
    fn test_file_takes_priority_over_env() {
        let mut key_file = NamedTempFile::new().unwrap();
        writeln!(key_file, "sk-from-file").unwrap();

        std::env::set_var("EXTRACTA_TEST_KEY_2", "env_value");
        let source = SecretSource {
            value: None,
            file: Some(key_file.path().to_str().unwrap().to_string()),
            env_var: Some("EXTRACTA_TEST_KEY_2".to_string()),
        };
        assert_eq!(source.resolve().unwrap().expose_secret(), "sk-from-file");
        std::env::remove_var("EXTRACTA_TEST_KEY_2");
    }

    #[test]
    #[serial]
    fn test_env_var_fallback_trimmed() {
        std::env::set_var("EXTRACTA_TEST_KEY_3", " sk-env\n");
        let source = SecretSource::from_env_var("EXTRACTA_TEST_KEY_3");
        assert_eq!(source.resolve().unwrap().expose_secret(), "sk-env");
        std::env::remove_var("EXTRACTA_TEST_KEY_3");
    }

    #[test]
    #[serial]
    fn test_blank_env_var_rejected() {
        std::env::set_var("EXTRACTA_TEST_KEY_4", "   ");
        let result = resolve_secret(None, None, Some("EXTRACTA_TEST_KEY_4"));
        assert!(matches!(result, Err(SecretError::Empty { .. })));
        std::env::remove_var("EXTRACTA_TEST_KEY_4");
    }

    #[test]
    fn test_no_source_error() {
        let result = resolve_secret(None, Some(""), None);
        assert!(matches!(result, Err(SecretError::NoSourceProvided)));
    }

    #[test]
    fn test_file_not_found_error() {
        let result = resolve_secret(None, Some("/nonexistent/path/to/key"), None);
        assert!(matches!(result, Err(SecretError::FileReadError { .. })));
    }

    #[test]
    fn test_env_var_not_set_error() {
        let result = resolve_secret(None, None, Some("EXTRACTA_DEFINITELY_NOT_SET_12345"));
        assert!(matches!(result, Err(SecretError::EnvVarNotSet { .. })));
    }

    #[test]
    fn test_optional_and_configured() {
        let empty = SecretSource::default();
        assert!(!empty.is_configured());
        assert!(empty.resolve_optional().unwrap().is_none());

        let direct = SecretSource {
            value: Some("sk-x".to_string()),
            ..SecretSource::default()
        };
        assert!(direct.is_configured());
        assert!(direct.resolve_optional().unwrap().is_some());
    }

    #[test]
    fn test_source_deserializes() {
        let source: SecretSource =
            serde_json::from_str(r#"{"env_var": "EXTRACTA_API_KEY"}"#).unwrap();
        assert_eq!(source, SecretSource::from_env_var("EXTRACTA_API_KEY"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/absolute/path"), "/absolute/path");
        assert_eq!(expand_home("relative/path"), "relative/path");
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy().into_owned();
            assert_eq!(expand_home("~/key"), format!("{}/key", home));
            assert_eq!(expand_home("~"), home);
        }
    }
}
