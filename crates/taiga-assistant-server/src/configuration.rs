use crate::error::{to_env_var, ConfigError, ENV_PREFIX};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use taiga_assistant::prompt_template::DEFAULT_LANGUAGE;
use taiga_assistant::providers::configs::{
    OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig, ProviderType, OLLAMA_HOST,
    OLLAMA_MODEL, OPENAI_HOST, OPENAI_MODEL,
};

/// Optional file layered under the environment, e.g. `taiga-assistant.toml`
const CONFIG_FILE: &str = "taiga-assistant";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Ollama { .. } => ProviderType::Ollama,
        }
    }

    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key: Some(api_key),
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Ollama {
                host,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

/// How chat sessions behave
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSettings {
    /// Safety ceiling for one streamed turn before the stream is force-closed
    #[serde(default = "default_timeout_secs")]
    pub turn_timeout_secs: u64,
    /// Ceiling for each replayed history turn
    #[serde(default = "default_timeout_secs")]
    pub replay_timeout_secs: u64,
    #[serde(default = "default_language")]
    pub language: String,
    /// Tera template that replaces the built-in system instruction
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_timeout_secs(),
            replay_timeout_secs: default_timeout_secs(),
            language: default_language(),
            system_prompt_file: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub assistant: AssistantSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                match missing_field(&err.to_string()) {
                    Some(field) => Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&qualify(field)),
                    }),
                    None => Err(ConfigError::Other(err)),
                }
            }
        }
    }
}

/// Extract the field name from "missing field `name`", with or without a trailing key
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

/// Serde only reports the leaf name, so put provider fields back under their section
fn qualify(field: &str) -> String {
    match field {
        "provider" => "provider.type".to_string(),
        "type" | "api_key" => format!("provider.{}", field),
        other => other.to_string(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_ollama_host() -> String {
    OLLAMA_HOST.to_string()
}

fn default_ollama_model() -> String {
    OLLAMA_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("TAIGA_ASSISTANT_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("TAIGA_ASSISTANT_PROVIDER__TYPE", "openai");
        env::set_var("TAIGA_ASSISTANT_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.assistant.turn_timeout_secs, 120);
        assert_eq!(settings.assistant.replay_timeout_secs, 120);
        assert_eq!(settings.assistant.language, "English");
        assert!(settings.assistant.system_prompt_file.is_none());

        if let ProviderSettings::OpenAi {
            host,
            api_key,
            model,
            temperature,
            max_tokens,
        } = settings.provider
        {
            assert_eq!(host, "https://api.openai.com");
            assert_eq!(api_key, "test-key");
            assert_eq!(model, "gpt-4o");
            assert_eq!(temperature, None);
            assert_eq!(max_tokens, None);
        } else {
            panic!("Expected OpenAI provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_ollama_settings() {
        clean_env();
        env::set_var("TAIGA_ASSISTANT_PROVIDER__TYPE", "ollama");
        env::set_var("TAIGA_ASSISTANT_PROVIDER__HOST", "http://custom.ollama.host");
        env::set_var("TAIGA_ASSISTANT_PROVIDER__MODEL", "llama3");
        env::set_var("TAIGA_ASSISTANT_PROVIDER__TEMPERATURE", "0.7");
        env::set_var("TAIGA_ASSISTANT_PROVIDER__MAX_TOKENS", "2000");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.provider_type(), ProviderType::Ollama);
        if let ProviderSettings::Ollama {
            host,
            model,
            temperature,
            max_tokens,
        } = settings.provider
        {
            assert_eq!(host, "http://custom.ollama.host");
            assert_eq!(model, "llama3");
            assert_eq!(temperature, Some(0.7));
            assert_eq!(max_tokens, Some(2000));
        } else {
            panic!("Expected Ollama provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("TAIGA_ASSISTANT_SERVER__PORT", "8080");
        env::set_var("TAIGA_ASSISTANT_PROVIDER__TYPE", "openai");
        env::set_var("TAIGA_ASSISTANT_PROVIDER__API_KEY", "test-key");
        env::set_var("TAIGA_ASSISTANT_PROVIDER__MODEL", "gpt-4o-mini");
        env::set_var("TAIGA_ASSISTANT_ASSISTANT__TURN_TIMEOUT_SECS", "30");
        env::set_var("TAIGA_ASSISTANT_ASSISTANT__LANGUAGE", "Spanish");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.assistant.turn_timeout_secs, 30);
        assert_eq!(settings.assistant.language, "Spanish");

        match settings.provider.into_config() {
            ProviderConfig::OpenAi(config) => {
                assert_eq!(config.model, "gpt-4o-mini");
                assert_eq!(config.api_key.as_deref(), Some("test-key"));
            }
            other => panic!("Expected OpenAI provider, got {other:?}"),
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key_names_env_var() {
        clean_env();
        env::set_var("TAIGA_ASSISTANT_PROVIDER__TYPE", "openai");

        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "TAIGA_ASSISTANT_PROVIDER__API_KEY");
            }
            other => panic!("Expected MissingEnvVar, got {other:?}"),
        }

        clean_env();
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_missing_field_parsing() {
        assert_eq!(missing_field("missing field `api_key`"), Some("api_key"));
        assert_eq!(
            missing_field("missing field `type` for key `provider`"),
            Some("type")
        );
        assert_eq!(missing_field("invalid type: string"), None);
    }
}
