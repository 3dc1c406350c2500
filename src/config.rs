//! The TOML configuration file.
//!
//! ```toml
//! default_model = "gpt-4o-mini"
//! default_workspace = "default"
//!
//! [providers.openai]
//! activate = "auto"
//! priority = 10
//!
//! [workspaces.acme.openai]
//! api_key = "sk-..."
//! ```

use std::collections::BTreeMap;
use std::env::VarError;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::ProviderConfig;
use crate::providers::LlmProvider;

pub const CONFIG_ENV_VAR: &str = "LLMROUTE_CONFIG";
pub const OPENAI_ENV_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config \"{}\"", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config \"{}\"", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to reserialize config")]
    Reserialize(#[from] toml::ser::Error),
    #[error("failed to parse {0}, it is not valid unicode")]
    InvalidEnvironment(&'static str),
}

/// Whether a provider is registered at start-up.
#[derive(Deserialize, Serialize, Default, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderActivationPolicy {
    /// Registered when it looks usable: Ollama answers a probe, OpenAI has a key.
    #[default]
    Auto,
    Enabled,
    Disabled,
}

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
pub struct ProviderSettings {
    #[serde(default)]
    pub activate: ProviderActivationPolicy,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub priority: Option<u8>,
    /// Model names served in addition to the backend's built-in ones
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
pub struct Providers {
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub ollama: ProviderSettings,
}

impl Providers {
    pub fn get(&self, provider: LlmProvider) -> &ProviderSettings {
        match provider {
            LlmProvider::OpenAI => &self.openai,
            LlmProvider::Ollama => &self.ollama,
        }
    }
}

/// Per-workspace overrides, one optional table per provider.
#[derive(Deserialize, Serialize, Default, Clone, Debug)]
pub struct WorkspaceSettings {
    pub openai: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
}

impl WorkspaceSettings {
    pub fn get(&self, provider: LlmProvider) -> Option<&ProviderConfig> {
        match provider {
            LlmProvider::OpenAI => self.openai.as_ref(),
            LlmProvider::Ollama => self.ollama.as_ref(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (LlmProvider, &ProviderConfig)> {
        [
            (LlmProvider::OpenAI, self.openai.as_ref()),
            (LlmProvider::Ollama, self.ollama.as_ref()),
        ]
        .into_iter()
        .filter_map(|(provider, config)| config.map(|c| (provider, c)))
    }
}

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
pub struct Logging {
    pub level: Option<String>,
}

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
pub struct Config {
    pub default_model: Option<String>,
    pub default_workspace: Option<String>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub providers: Providers,
    #[serde(default)]
    pub workspaces: BTreeMap<String, WorkspaceSettings>,
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Providers explicitly enabled in the file. These must be registered
    /// before the router serves any request.
    pub fn required_providers(&self) -> Vec<LlmProvider> {
        [LlmProvider::OpenAI, LlmProvider::Ollama]
            .into_iter()
            .filter(|&p| self.providers.get(p).activate == ProviderActivationPolicy::Enabled)
            .collect()
    }

    /// Whether any workspace, or the provider-wide settings, hold an API key
    /// for `provider`.
    pub fn has_api_key(&self, provider: LlmProvider) -> bool {
        self.providers.get(provider).api_key.is_some()
            || self
                .workspaces
                .values()
                .filter_map(|ws| ws.get(provider))
                .any(|c| c.api_key.is_some())
    }

    /// Fills in settings which may come from the environment.
    pub fn apply_environment(&mut self) -> Result<(), ConfigError> {
        if self.providers.openai.api_key.is_none() {
            self.providers.openai.api_key = match std::env::var(OPENAI_ENV_KEY_VAR) {
                Ok(api_key) => Some(api_key),
                Err(VarError::NotPresent) => None,
                Err(VarError::NotUnicode(_)) => {
                    return Err(ConfigError::InvalidEnvironment(OPENAI_ENV_KEY_VAR))
                }
            };
        }

        Ok(())
    }

    /// Parses a configuration, returning it along with the dotted paths of the
    /// keys that were not understood.
    pub fn parse(raw_config: &str, path: &Path) -> Result<(Config, Vec<String>), ConfigError> {
        let parse_err = |source: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        };

        let config: Config = toml::from_str(raw_config).map_err(parse_err)?;
        let user_config: toml::Table = toml::from_str(raw_config).map_err(parse_err)?;

        let known: toml::Table = toml::from_str(&toml::to_string(&config)?).map_err(parse_err)?;

        let mut extraneous = Vec::new();
        let mut key_path = Vec::new();

        collect_extra_fields(&mut key_path, &user_config, &known, &mut extraneous);

        Ok((config, extraneous))
    }
}

fn collect_extra_fields<'a>(
    path: &mut Vec<&'a str>,
    user_config: &'a toml::Table,
    config: &'a toml::Table,
    extraneous: &mut Vec<String>,
) {
    for (user_key, user_value) in user_config {
        path.push(user_key);

        match config.get(user_key) {
            Some(config_value) => {
                if let (toml::Value::Table(user_value), toml::Value::Table(config_value)) =
                    (user_value, config_value)
                {
                    collect_extra_fields(path, user_value, config_value, extraneous)
                }
            }
            None => extraneous.push(path.join(".")),
        }

        path.pop();
    }
}

/// A loaded configuration file.
#[derive(Debug, Default)]
pub struct ConfigFile {
    pub config: Config,
    /// Where the configuration was read from, `None` if defaults were used
    pub path: Option<PathBuf>,
    pub extraneous_keys: Vec<String>,
}

fn get_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/llmroute/config.toml", ".llmroute.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/llmroute.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

/// Reads the configuration from `config`, or from the first file found in the
/// default locations. Without any file, the defaults are used.
pub fn read_config(config: Option<PathBuf>) -> Result<ConfigFile, ConfigError> {
    let path = match config.or_else(get_config_path) {
        Some(path) => path,
        None => return Ok(ConfigFile::default()),
    };

    let raw_config = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    let (config, extraneous_keys) = Config::parse(&raw_config, &path)?;

    Ok(ConfigFile {
        config,
        path: Some(path),
        extraneous_keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
        default_model = "gpt-4o-mini"
        default_workspace = "acme"

        [logging]
        level = "debug"

        [providers.openai]
        activate = "enabled"
        priority = 30
        models = ["ft:gpt-4o-mini:acme"]

        [providers.ollama]
        activate = "disabled"
        api_base = "http://gpu-box:11434"

        [workspaces.acme.openai]
        api_key = "sk-acme"

        [workspaces.globex.ollama]
        api_base = "http://globex:11434"
    "#;

    fn parse(raw: &str) -> (Config, Vec<String>) {
        Config::parse(raw, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_full_config() {
        let (config, extraneous) = parse(FULL_CONFIG);

        assert!(extraneous.is_empty(), "unexpected keys: {:?}", extraneous);

        assert_eq!(config.default_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.log_level(), "debug");

        let openai = config.providers.get(LlmProvider::OpenAI);
        assert_eq!(openai.activate, ProviderActivationPolicy::Enabled);
        assert_eq!(openai.priority, Some(30));
        assert_eq!(openai.models, vec!["ft:gpt-4o-mini:acme".to_string()]);

        assert_eq!(
            config.providers.ollama.activate,
            ProviderActivationPolicy::Disabled
        );

        assert_eq!(config.required_providers(), vec![LlmProvider::OpenAI]);
        assert!(config.has_api_key(LlmProvider::OpenAI));
        assert!(!config.has_api_key(LlmProvider::Ollama));

        let globex = &config.workspaces["globex"];
        assert!(globex.get(LlmProvider::OpenAI).is_none());
        assert_eq!(
            globex.get(LlmProvider::Ollama).unwrap().api_base.as_deref(),
            Some("http://globex:11434")
        );
    }

    #[test]
    fn test_defaults() {
        let (config, extraneous) = parse("");

        assert!(extraneous.is_empty());
        assert_eq!(config.log_level(), "warn");
        assert_eq!(config.providers.openai.activate, ProviderActivationPolicy::Auto);
        assert!(config.required_providers().is_empty());
        assert!(config.workspaces.is_empty());
    }

    #[test]
    fn test_extraneous_keys_are_reported() {
        let (_, extraneous) = parse(
            r#"
            editor = "vim"

            [providers.openai]
            api_key = "sk-test"
            organization = "acme"

            [workspaces.acme.anthropic]
            api_key = "sk-ant"
            "#,
        );

        assert_eq!(
            extraneous,
            vec![
                "editor".to_string(),
                "providers.openai.organization".to_string(),
                "workspaces.acme.anthropic".to_string(),
            ]
        );
    }

    #[test]
    fn test_invalid_config() {
        let raw = "[providers.openai]\nactivate = \"sometimes\"\n";

        let err = Config::parse(raw, Path::new("bad.toml")).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.to_string(), "failed to parse config \"bad.toml\"");
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_config(Some(PathBuf::from("/nonexistent/llmroute.toml"))).unwrap_err();

        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
