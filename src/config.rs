//! Configuration for Telegram API credentials and download defaults
//!
//! Values come from environment variables (a `.env` file is loaded first)
//! with an optional `config.yml` underneath them.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Default constants (used when neither env nor config.yml set a value)
pub const SESSION_NAME: &str = "session";
pub const DEFAULT_SAVE_DIR: &str = "./downloads";
pub const CONFIG_FILE: &str = "config.yml";

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramConfig>,
    download: Option<DownloadConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    api_id: Option<String>,
    api_hash: Option<String>,
    phone: Option<String>,
    session_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadConfig {
    save_dir: Option<String>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Credentials and options, read once per process.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: String,
    pub session_name: String,
    pub save_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: String::new(),
            phone: String::new(),
            session_name: SESSION_NAME.to_string(),
            save_dir: DEFAULT_SAVE_DIR.to_string(),
        }
    }
}

impl Config {
    /// Load `.env`, then `config.yml` (current or parent directory) with
    /// environment variables taking precedence.
    pub fn load() -> Result<Self> {
        Self::load_dotenv();

        for candidate in [CONFIG_FILE, "../config.yml"] {
            if Path::new(candidate).exists() {
                return Self::load_from_file(candidate);
            }
        }
        Self::from_yaml_str("", env_lookup)
    }

    /// Load `.env` file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content, env_lookup)
    }

    /// Build a config from YAML text and an environment lookup.
    pub fn from_yaml_str<F>(content: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let yaml: YamlConfig = if content.trim().is_empty() {
            YamlConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        let telegram = yaml.telegram.unwrap_or_default();
        let download = yaml.download.unwrap_or_default();

        let api_id_raw = resolve_value(telegram.api_id, "API_ID", &env);
        let api_id = match api_id_raw.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<i32>()
                .map_err(|_| Error::ConfigError(format!("API_ID must be an integer, got {raw}")))?,
        };

        Ok(Self {
            api_id,
            api_hash: resolve_value(telegram.api_hash, "API_HASH", &env).unwrap_or_default(),
            phone: resolve_value(telegram.phone, "PHONE", &env).unwrap_or_default(),
            session_name: resolve_value(telegram.session_name, "SESSION_NAME", &env)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| SESSION_NAME.to_string()),
            save_dir: resolve_value(download.save_dir, "SAVE_DIR", &env)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SAVE_DIR.to_string()),
        })
    }

    /// Fail when the application id or secret is absent.
    pub fn validate(&self) -> Result<()> {
        if self.api_id == 0 || self.api_hash.is_empty() {
            return Err(Error::MissingCredentials);
        }
        Ok(())
    }

    /// Warning text when the phone is not in international format.
    pub fn phone_warning(&self) -> Option<&'static str> {
        if self.phone.starts_with('+') {
            None
        } else {
            Some("WARNING: PHONE should be in international format, e.g. +380XXXXXXXXX")
        }
    }

    /// First characters of the API hash, safe to print.
    pub fn masked_hash(&self) -> String {
        if self.api_hash.is_empty() {
            "(empty)".to_string()
        } else {
            let head: String = self.api_hash.chars().take(6).collect();
            format!("{head}...")
        }
    }

    /// Path of the SQLite session file.
    pub fn session_file(&self) -> String {
        format!("{}.session", self.session_name)
    }

    /// Path of the lock file guarding the session.
    pub fn lock_file(&self) -> String {
        format!("{}.lock", self.session_name)
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Environment wins; a YAML value of the form `${VAR}` is looked up too.
fn resolve_value<F>(value: Option<String>, env_key: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(env_val) = env(env_key) {
        return Some(env_val);
    }
    match value {
        Some(v) if v.starts_with("${") && v.ends_with('}') => env(&v[2..v.len() - 1]),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_yaml_or_env() {
        let config = Config::from_yaml_str("", env_from(&[])).unwrap();
        assert_eq!(config.api_id, 0);
        assert_eq!(config.session_name, "session");
        assert_eq!(config.save_dir, "./downloads");
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_only_values() {
        let env = env_from(&[
            ("API_ID", "12345"),
            ("API_HASH", "abcdef0123456789"),
            ("PHONE", "+380111222333"),
        ]);
        let config = Config::from_yaml_str("", env).unwrap();
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abcdef0123456789");
        assert!(config.validate().is_ok());
        assert!(config.phone_warning().is_none());
    }

    #[test]
    fn env_overrides_yaml() {
        let yaml = r#"
telegram:
  api_id: 111
  api_hash: "yaml_hash"
  phone: "+100"
  session_name: work
download:
  save_dir: /tmp/media
"#;
        let config = Config::from_yaml_str(yaml, env_from(&[("API_HASH", "env_hash")])).unwrap();
        assert_eq!(config.api_id, 111);
        assert_eq!(config.api_hash, "env_hash");
        assert_eq!(config.session_name, "work");
        assert_eq!(config.save_dir, "/tmp/media");
        assert_eq!(config.session_file(), "work.session");
        assert_eq!(config.lock_file(), "work.lock");
    }

    #[test]
    fn yaml_placeholder_resolves_from_env() {
        let yaml = r#"
telegram:
  api_id: "${MY_ID}"
  api_hash: "${MY_HASH}"
"#;
        let env = env_from(&[("MY_ID", "42"), ("MY_HASH", "secret")]);
        let config = Config::from_yaml_str(yaml, env).unwrap();
        assert_eq!(config.api_id, 42);
        assert_eq!(config.api_hash, "secret");
    }

    #[test]
    fn missing_hash_fails_validation() {
        let config = Config::from_yaml_str("", env_from(&[("API_ID", "7")])).unwrap();
        assert!(matches!(config.validate(), Err(Error::MissingCredentials)));
    }

    #[test]
    fn non_numeric_api_id_is_config_error() {
        let err = Config::from_yaml_str("", env_from(&[("API_ID", "abc")])).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn phone_without_plus_warns() {
        let config = Config {
            phone: "380111222333".to_string(),
            ..Config::default()
        };
        assert!(config.phone_warning().unwrap().contains("international format"));
    }

    #[test]
    fn masked_hash_shows_prefix_only() {
        let config = Config {
            api_hash: "0123456789abcdef".to_string(),
            ..Config::default()
        };
        assert_eq!(config.masked_hash(), "012345...");
        assert_eq!(Config::default().masked_hash(), "(empty)");
    }

    #[test]
    fn load_from_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "telegram:\n  session_name: from_file\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert!(!config.session_name.is_empty());
    }

    #[test]
    fn load_from_file_fails_on_missing_file() {
        let result = Config::load_from_file("/nonexistent/path/config.yml");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn load_from_file_fails_on_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "{ invalid yaml [").unwrap();

        assert!(Config::load_from_file(&path).is_err());
    }
}
