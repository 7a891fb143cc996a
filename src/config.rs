//! Configuration types.
//!
//! Everything is read from environment variables; see [`SurveyConfig::from_env`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::survey::{ControllerConfig, DirectiveMode, FormSchema};

/// Service configuration.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    pub llm: LlmConfig,
    /// Sampling temperature passed to the collaborator.
    pub temperature: f32,
    /// Token limit per collaborator reply.
    pub max_tokens: u32,
    /// HTTP listen port.
    pub port: u16,
    /// Form definition file; the built-in business survey when unset.
    pub form_path: Option<PathBuf>,
    /// libSQL database file; sessions live only in memory when unset.
    pub db_path: Option<PathBuf>,
    /// Sessions idle for longer than this are evicted from memory.
    pub session_idle_timeout: Duration,
    pub controller: ControllerConfig,
}

impl SurveyConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend: LlmBackend = parse_or(&var, "SURVEY_LLM_BACKEND", LlmBackend::OpenAi)?;
        let api_key = var(backend.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;

        let llm = LlmConfig {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model: var("SURVEY_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            max_retries: parse_or(&var, "SURVEY_MAX_RETRIES", 5)?,
        };

        let idle_minutes: u64 = parse_or(&var, "SURVEY_SESSION_IDLE_MIN", 60)?;
        let timeout_secs: Option<u64> = parse_opt(&var, "SURVEY_TURN_TIMEOUT_SECS")?;

        let controller = ControllerConfig {
            max_tool_rounds: parse_or(&var, "SURVEY_MAX_TOOL_ROUNDS", 8)?,
            call_timeout: timeout_secs.map(Duration::from_secs),
            prompt_mode: parse_or(&var, "SURVEY_PROMPT_MODE", DirectiveMode::ToolAugmented)?,
        };
        if controller.max_tool_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SURVEY_MAX_TOOL_ROUNDS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            llm,
            temperature: parse_or(&var, "SURVEY_TEMPERATURE", 0.0)?,
            max_tokens: parse_or(&var, "SURVEY_MAX_TOKENS", 300)?,
            port: parse_or(&var, "SURVEY_PORT", 8080)?,
            form_path: var("SURVEY_FORM_PATH").map(PathBuf::from),
            db_path: var("SURVEY_DB_PATH").map(PathBuf::from),
            session_idle_timeout: Duration::from_secs(idle_minutes * 60),
            controller,
        })
    }

    /// Load the configured form, falling back to the built-in one.
    pub fn load_form(&self) -> Result<FormSchema, ConfigError> {
        match self.form_path {
            Some(ref path) => FormSchema::from_path(path),
            None => FormSchema::business_survey().map_err(|e| ConfigError::FormLoad {
                path: "<built-in>".to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn parse_opt<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(var, key)?.unwrap_or(default))
}
