use std::path::{Path, PathBuf};
use std::time::Duration;

use gogo_ai::ProviderKind;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("provider is required")]
    MissingProvider,
    #[error("{0}")]
    Invalid(String),
}

/// `~/.config/gogo`, or `./.config/gogo` when `HOME` is unset.
pub fn gogo_config_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".config").join("gogo")
}

pub fn default_config_path() -> PathBuf {
    gogo_config_dir().join(CONFIG_FILE_NAME)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub timeout_ms: Option<u64>,
    pub base_url: Option<String>,
    pub tools_file: Option<PathBuf>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub timeout: Option<Duration>,
    pub tools_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub timeout: Duration,
    pub base_url: Option<String>,
    pub tools_file: Option<PathBuf>,
}

pub fn read_file_config(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: error,
            })
        }
    };
    toml::from_str::<FileConfig>(&content)
        .map(Some)
        .map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
}

/// Loads `~/.config/gogo/config.toml` (or `config_path`) and layers the process
/// environment and `overrides` on top.
pub fn load_config(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig, ConfigError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);
    let file = read_file_config(&path)?.unwrap_or_default();
    resolve_config(file, |name| std::env::var(name).ok(), overrides)
}

pub fn resolve_config<F>(
    file: FileConfig,
    env: F,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |name: &str| env(name).filter(|value| !value.trim().is_empty());
    let mut layered = file;

    if let Some(provider) = env("GOGO_PROVIDER") {
        layered.provider = Some(provider);
    }
    if let Some(model) = env("GOGO_MODEL") {
        layered.model = Some(model);
    }
    if let Some(max_tokens) = env("GOGO_MAX_TOKENS").and_then(|value| value.trim().parse().ok()) {
        layered.max_tokens = Some(max_tokens);
    }
    if let Some(temperature) = env("GOGO_TEMPERATURE").and_then(|value| value.trim().parse().ok()) {
        layered.temperature = Some(temperature);
    }
    if let Some(timeout_ms) = env("GOGO_TIMEOUT_MS").and_then(|value| value.trim().parse().ok()) {
        layered.timeout_ms = Some(timeout_ms);
    }
    if let Some(base_url) = env("GOGO_BASE_URL") {
        layered.base_url = Some(base_url);
    }
    if let Some(tools_file) = env("GOGO_TOOLS_FILE") {
        layered.tools_file = Some(PathBuf::from(tools_file));
    }

    let provider_name = overrides
        .provider
        .clone()
        .or(layered.provider)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingProvider)?;
    let provider = provider_name
        .parse::<ProviderKind>()
        .map_err(ConfigError::Invalid)?;
    let model = overrides
        .model
        .clone()
        .or(layered.model)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| provider.default_model().to_string());

    let timeout = overrides
        .timeout
        .or_else(|| layered.timeout_ms.map(Duration::from_millis))
        .filter(|timeout| !timeout.is_zero())
        .unwrap_or(DEFAULT_TIMEOUT);

    Ok(ResolvedConfig {
        provider,
        model,
        max_tokens: overrides.max_tokens.or(layered.max_tokens).filter(|tokens| *tokens > 0),
        temperature: overrides.temperature.or(layered.temperature),
        timeout,
        base_url: layered.base_url,
        tools_file: overrides.tools_file.clone().or(layered.tools_file),
    })
}

/// Accepts `500ms`, `30s`, `2m`, `1h` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let amount = number
        .parse::<f64>()
        .map_err(|_| format!("invalid duration: {value}"))?;
    let seconds = match unit.trim() {
        "" | "s" => amount,
        "ms" => amount / 1000.0,
        "m" => amount * 60.0,
        "h" => amount * 3600.0,
        other => return Err(format!("invalid duration unit '{other}' in {value}")),
    };
    Duration::try_from_secs_f64(seconds).map_err(|_| format!("invalid duration: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn flags_beat_env_which_beats_file() {
        let file = FileConfig {
            provider: Some("openai".to_string()),
            model: Some("file-model".to_string()),
            max_tokens: Some(100),
            temperature: Some(0.1),
            timeout_ms: Some(5_000),
            ..FileConfig::default()
        };
        let env = env_of(&[
            ("GOGO_PROVIDER", "anthropic"),
            ("GOGO_MODEL", "env-model"),
            ("GOGO_MAX_TOKENS", "200"),
        ]);
        let overrides = ConfigOverrides {
            model: Some("flag-model".to_string()),
            ..ConfigOverrides::default()
        };

        let resolved = resolve_config(file, env, &overrides).expect("resolves");
        assert_eq!(resolved.provider, ProviderKind::Anthropic);
        assert_eq!(resolved.model, "flag-model");
        assert_eq!(resolved.max_tokens, Some(200));
        assert_eq!(resolved.temperature, Some(0.1));
        assert_eq!(resolved.timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn provider_defaults_fill_in_the_model() {
        let overrides = ConfigOverrides {
            provider: Some("gemini".to_string()),
            ..ConfigOverrides::default()
        };
        let resolved =
            resolve_config(FileConfig::default(), env_of(&[]), &overrides).expect("resolves");
        assert_eq!(resolved.model, "gemini-1.5-flash");
        assert_eq!(resolved.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn unparsable_env_numbers_are_ignored() {
        let file = FileConfig {
            provider: Some("openai".to_string()),
            max_tokens: Some(64),
            ..FileConfig::default()
        };
        let env = env_of(&[("GOGO_MAX_TOKENS", "lots"), ("GOGO_TEMPERATURE", "warm")]);
        let resolved = resolve_config(file, env, &ConfigOverrides::default()).expect("resolves");
        assert_eq!(resolved.max_tokens, Some(64));
        assert_eq!(resolved.temperature, None);
    }

    #[test]
    fn missing_or_unknown_provider_is_rejected() {
        assert!(matches!(
            resolve_config(FileConfig::default(), env_of(&[]), &ConfigOverrides::default()),
            Err(ConfigError::MissingProvider)
        ));
        let error = resolve_config(
            FileConfig::default(),
            env_of(&[("GOGO_PROVIDER", "mistral")]),
            &ConfigOverrides::default(),
        )
        .expect_err("unknown provider");
        assert_eq!(error.to_string(), "unknown provider: mistral");
    }

    #[test]
    fn config_file_is_toml_and_optional() {
        let dir = tempdir().expect("tempdir");
        assert_eq!(read_file_config(&dir.path().join("none.toml")).expect("missing"), None);

        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "provider = \"anthropic\"\nmax_tokens = 512\ntools_file = \"/etc/gogo/tools.toml\"\n",
        )
        .expect("write config");
        let file = read_file_config(&path).expect("parses").expect("present");
        assert_eq!(file.provider.as_deref(), Some("anthropic"));
        assert_eq!(file.max_tokens, Some(512));
        assert_eq!(file.tools_file, Some(PathBuf::from("/etc/gogo/tools.toml")));

        std::fs::write(&path, "provider = [").expect("write broken config");
        assert!(matches!(read_file_config(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn durations_accept_go_style_units() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("3d").is_err());
    }
}
