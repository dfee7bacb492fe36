use std::{fs, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use hearth_memory::DEFAULT_TRANSCRIPTS_DIR;
use hearth_provider::{ProviderConfig, ProviderType};
use serde::{Deserialize, Serialize};

use crate::gateway::DEFAULT_MODEL;

pub const DEFAULT_CONFIG_FILE: &str = "hearth.yaml";
pub const BIND_ENV: &str = "HEARTH_BIND";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_transcripts_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TRANSCRIPTS_DIR)
}

fn default_server_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("~/.hearth/sessions.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(flatten)]
    pub provider: ProviderConfig,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            model: default_model(),
        }
    }
}

/// Where transcripts live: on the server (`server`) or with the caller
/// (`client`, the server then runs stateless).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    #[default]
    Server,
    Client,
}

impl PersistenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceMode::Server => "server",
            PersistenceMode::Client => "client",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub mode: PersistenceMode,
    #[serde(default = "default_transcripts_dir")]
    pub transcripts_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::default(),
            transcripts_dir: default_transcripts_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            store_path: default_store_path(),
            max_sessions: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Replaces the built-in system instruction when set.
    #[serde(default)]
    pub system: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HearthConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: CompletionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

/// `~/x` becomes `$HOME/x`; anything else is returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Load `path`, or [`DEFAULT_CONFIG_FILE`] when `None`. A missing default
/// file yields the built-in defaults; an explicitly named file must exist.
pub fn load_config(path: Option<&Path>) -> Result<HearthConfig> {
    let mut config = match path {
        Some(path) => read_yaml_file(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                read_yaml_file(default)?
            } else {
                HearthConfig::default()
            }
        }
    };

    resolve_config_env(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &HearthConfig) -> Result<()> {
    if config.provider.model.trim().is_empty() {
        return Err(anyhow!("provider.model must not be empty"));
    }
    if config.provider.provider.provider_type == ProviderType::Custom
        && config.provider.provider.base_url.is_none()
    {
        return Err(anyhow!("provider.base_url is required for custom providers"));
    }
    if config.client.max_sessions == Some(0) {
        return Err(anyhow!("client.max_sessions must be greater than zero"));
    }
    Ok(())
}

/// Required by [`crate::build_controller`]; the terminal client needs no key.
pub fn validate_credentials(config: &HearthConfig) -> Result<()> {
    let provider = &config.provider.provider;
    let has_key = provider
        .api_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty());
    match provider.provider_type {
        ProviderType::Stub => Ok(()),
        _ if has_key => Ok(()),
        _ => Err(anyhow!(
            "provider.api_key is required for {:?} providers (set {API_KEY_ENV})",
            provider.provider_type
        )),
    }
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn resolve_config_env(config: &mut HearthConfig) {
    let provider = &mut config.provider.provider;
    provider.api_key = provider
        .api_key
        .as_deref()
        .map(resolve_env_var)
        .filter(|key| !key.is_empty())
        .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty()));
    provider.base_url = provider.base_url.as_deref().map(resolve_env_var);
    config.provider.model = resolve_env_var(&config.provider.model);

    if let Ok(bind) = std::env::var(BIND_ENV) {
        if !bind.trim().is_empty() {
            config.server.bind = bind;
        }
    }
    config.server.bind = resolve_env_var(&config.server.bind);
    config.client.server_url = resolve_env_var(&config.client.server_url);
    config.client.store_path = expand_home(&config.client.store_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_cover_every_section() {
        let config = HearthConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.provider.model, "gpt-4o-2024-08-06");
        assert_eq!(config.provider.provider.provider_type, ProviderType::OpenAI);
        assert_eq!(config.persistence.mode, PersistenceMode::Server);
        assert_eq!(config.persistence.transcripts_dir, PathBuf::from("transcripts"));
        assert_eq!(config.client.max_sessions, None);
        assert!(config.prompt.system.is_none());
    }

    #[test]
    fn load_config_reads_yaml_sections() {
        let file = write_config(
            r#"
provider:
  type: stub
  model: gpt-4o-mini
persistence:
  mode: client
client:
  server_url: http://localhost:8080
  store_path: /tmp/hearth-sessions.json
  max_sessions: 20
prompt:
  system: "Be kind."
"#,
        );
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.provider.provider.provider_type, ProviderType::Stub);
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.persistence.mode, PersistenceMode::Client);
        assert_eq!(config.client.server_url, "http://localhost:8080");
        assert_eq!(config.client.max_sessions, Some(20));
        assert_eq!(config.prompt.system.as_deref(), Some("Be kind."));
        assert_eq!(config.logging.dir, PathBuf::from("logs"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/hearth.yaml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn unparsable_yaml_is_an_error() {
        let file = write_config("provider: [unclosed");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("failed to parse yaml file"));
    }

    #[test]
    fn validate_rejects_custom_without_base_url() {
        let mut config = HearthConfig::default();
        config.provider.provider = ProviderConfig::new(ProviderType::Custom);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("base_url"));

        config.provider.provider = config.provider.provider.clone().with_base_url("http://x/v1");
        validate_config(&config).unwrap();
    }

    #[test]
    fn credentials_are_checked_separately() {
        let mut config = HearthConfig::default();
        config.provider.provider.api_key = None;
        validate_config(&config).unwrap();
        let err = validate_credentials(&config).unwrap_err();
        assert!(err.to_string().contains("api_key"));

        config.provider.provider.api_key = Some("sk-test".into());
        validate_credentials(&config).unwrap();

        config.provider.provider = ProviderConfig::new(ProviderType::Stub);
        validate_credentials(&config).unwrap();
    }

    #[test]
    fn validate_rejects_empty_model_and_zero_capacity() {
        let mut config = HearthConfig::default();
        config.provider.provider = ProviderConfig::new(ProviderType::Stub);
        validate_config(&config).unwrap();

        config.client.max_sessions = Some(0);
        assert!(validate_config(&config).is_err());

        config.client.max_sessions = None;
        config.provider.model = "  ".into();
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("model"));
    }

    #[test]
    fn api_key_placeholder_is_resolved_from_env() {
        let expected = std::env::var("PATH").unwrap();
        let file = write_config(
            r#"
provider:
  type: custom
  api_key: ${PATH}
  base_url: http://localhost:9999/v1
"#,
        );
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.provider.provider.api_key.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn resolve_env_var_replaces_placeholders() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(resolve_env_var("home=${HOME}"), format!("home={home}"));
        assert_eq!(resolve_env_var("plain"), "plain");
        assert_eq!(resolve_env_var("x_${UNCLOSED"), "x_${UNCLOSED");
        assert_eq!(resolve_env_var("v=${HEARTH_NONEXISTENT_VAR_XYZ}"), "v=");
    }

    #[test]
    fn expand_home_only_touches_tilde_paths() {
        assert_eq!(expand_home(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/.hearth/sessions.json")),
                PathBuf::from(home).join(".hearth/sessions.json")
            );
        }
    }
}
