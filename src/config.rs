use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default system prompt sent with every completion request.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Ты — полезный и дружелюбный ассистент. Отвечай по-русски, кратко и по делу.";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    openai_api_key: String,
    /// Completion model name.
    #[serde(default = "default_model")]
    model: String,
    /// Speech-to-text model name.
    #[serde(default = "default_transcription_model")]
    transcription_model: String,
    /// Overrides the built-in system prompt.
    system_prompt: Option<String>,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    max_output_tokens: u32,
    /// Directory for state files (logs). Defaults to current directory.
    data_dir: Option<String>,
    /// Port for the keepalive HTTP endpoint. Disabled when unset.
    health_port: Option<u16>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_transcription_model() -> String {
    "gpt-4o-mini-transcribe".to_string()
}

fn default_temperature() -> f32 {
    0.6
}

fn default_max_output_tokens() -> u32 {
    600
}

pub struct Config {
    pub telegram_bot_token: String,
    pub openai_api_key: String,
    pub model: String,
    pub transcription_model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub health_port: Option<u16>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        // Validate required fields
        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.openai_api_key.is_empty() {
            return Err(ConfigError::Validation("openai_api_key is required".into()));
        }
        if !(0.0..=2.0).contains(&file.temperature) {
            return Err(ConfigError::Validation(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                file.temperature
            )));
        }
        if file.max_output_tokens == 0 {
            return Err(ConfigError::Validation("max_output_tokens must be positive".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            openai_api_key: file.openai_api_key,
            model: file.model,
            transcription_model: file.transcription_model,
            system_prompt: file
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: file.temperature,
            max_output_tokens: file.max_output_tokens,
            data_dir,
            health_port: file.health_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
            "openai_api_key": "sk-test"
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.transcription_model, "gpt-4o-mini-transcribe");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.max_output_tokens, 600);
        assert!(config.health_port.is_none());
    }

    #[test]
    fn test_overrides() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "openai_api_key": "sk-test",
            "model": "gpt-4o",
            "system_prompt": "Answer in English.",
            "temperature": 1.0,
            "max_output_tokens": 1000,
            "health_port": 5000
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.system_prompt, "Answer in English.");
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.max_output_tokens, 1000);
        assert_eq!(config.health_port, Some(5000));
    }

    #[test]
    fn test_empty_token() {
        let file = write_config(r#"{
            "telegram_bot_token": "",
            "openai_api_key": "sk-test"
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("telegram_bot_token"));
    }

    #[test]
    fn test_invalid_token_format_no_colon() {
        let file = write_config(r#"{
            "telegram_bot_token": "invalid_token_no_colon",
            "openai_api_key": "sk-test"
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn test_invalid_token_format_non_numeric_id() {
        let file = write_config(r#"{
            "telegram_bot_token": "notanumber:ABCdef",
            "openai_api_key": "sk-test"
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_empty_api_key() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "openai_api_key": ""
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("openai_api_key"));
    }

    #[test]
    fn test_temperature_out_of_range() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "openai_api_key": "sk-test",
            "temperature": 3.5
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_zero_max_output_tokens() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "openai_api_key": "sk-test",
            "max_output_tokens": 0
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
