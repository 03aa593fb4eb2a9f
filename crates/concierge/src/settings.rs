use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use crate::agent::{DEFAULT_MAX_ROUND_TRIPS, DEFAULT_SYSTEM_PROMPT};
use crate::capabilities::holidays::{HolidaysConfig, DEFAULT_CALENDAR_URL};
use crate::capabilities::weather::{WeatherConfig, DEFAULT_WEATHER_URL};
use crate::errors::{to_env_var, ConfigError};
use crate::providers::configs::OpenAiProviderConfig;

pub const ENV_PREFIX: &str = "CONCIERGE";

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for titles; the reply model when unset
    #[serde(default)]
    pub title_model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl ProviderSettings {
    pub fn into_config(self) -> Result<OpenAiProviderConfig, ConfigError> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            })?;

        Ok(OpenAiProviderConfig {
            host: self.host,
            api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    /// Reply and title backend configs, in that order
    pub fn into_configs(self) -> Result<(OpenAiProviderConfig, OpenAiProviderConfig), ConfigError> {
        let title_model = self.title_model.clone();
        let reply = self.into_config()?;
        let title = match title_model {
            Some(model) => reply.with_model(model),
            None => reply.clone(),
        };
        Ok((reply, title))
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_round_trips")]
    pub max_round_trips: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Deadline for a whole opening or reply; none when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_round_trips: default_max_round_trips(),
            system_prompt: default_system_prompt(),
            timeout_secs: None,
        }
    }
}

impl AgentSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct WeatherSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_capability_timeout")]
    pub timeout_secs: u64,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_url(),
            timeout_secs: default_capability_timeout(),
        }
    }
}

impl WeatherSettings {
    pub fn into_config(self) -> WeatherConfig {
        WeatherConfig {
            api_key: self.api_key,
            base_url: self.base_url,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HolidaysSettings {
    #[serde(default = "default_calendar_url")]
    pub calendar_url: String,
    #[serde(default = "default_capability_timeout")]
    pub timeout_secs: u64,
}

impl Default for HolidaysSettings {
    fn default() -> Self {
        Self {
            calendar_url: default_calendar_url(),
            timeout_secs: default_capability_timeout(),
        }
    }
}

impl HolidaysSettings {
    pub fn into_config(self) -> HolidaysConfig {
        HolidaysConfig {
            calendar_url: self.calendar_url,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CapabilitySettings {
    #[serde(default)]
    pub weather: WeatherSettings,
    #[serde(default)]
    pub holidays: HolidaysSettings,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub capabilities: CapabilitySettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Provider defaults
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            .set_default("provider.timeout_secs", default_provider_timeout() as i64)?
            // Agent defaults
            .set_default("agent.max_round_trips", default_max_round_trips() as i64)?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                return Err(missing_field(&err).map_or(ConfigError::Other(err), |field| {
                    ConfigError::MissingEnvVar {
                        env_var: to_env_var(&field),
                    }
                }));
            }
        };

        // Fail early rather than on the first request
        if settings.provider.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }

        Ok(settings)
    }
}

/// Field named by a "missing field `x`" error, with its key path when the error has one
fn missing_field(err: &config::ConfigError) -> Option<String> {
    if let config::ConfigError::NotFound(field) = err {
        return Some(field.clone());
    }

    let message = err.to_string();
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    match rest
        .strip_prefix(" for key `")
        .and_then(|key| key.split_once('`'))
    {
        Some((key, _)) => Some(format!("{}.{}", key, field)),
        None => Some(field.to_string()),
    }
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_provider_timeout() -> u64 {
    600
}

fn default_max_round_trips() -> usize {
    DEFAULT_MAX_ROUND_TRIPS
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_weather_url() -> String {
    DEFAULT_WEATHER_URL.to_string()
}

fn default_calendar_url() -> String {
    DEFAULT_CALENDAR_URL.to_string()
}

fn default_capability_timeout() -> u64 {
    10
}
