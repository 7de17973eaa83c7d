use thiserror::Error;

pub const ENV_PREFIX: &str = "TAIGA_ASSISTANT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration, set the {env_var} environment variable")]
    MissingEnvVar { env_var: String },

    #[error("Invalid configuration: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable that sets a dotted configuration key, e.g. `provider.api_key`
pub fn to_env_var(field: &str) -> String {
    format!(
        "{}_{}",
        ENV_PREFIX,
        field.replace('.', "__").to_uppercase()
    )
}
