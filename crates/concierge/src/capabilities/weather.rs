use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::capability::Capability;
use crate::errors::{ToolError, ToolResult};

pub const DEFAULT_WEATHER_URL: &str = "https://api.weatherapi.com/v1";
const MAX_FORECAST_DAYS: i64 = 10;

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// WeatherAPI.com key; calls fail at execution time when it is missing
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_WEATHER_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WeatherLocation {
    pub name: String,
    pub region: String,
    pub country: String,
    pub localtime: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CurrentConditions {
    pub temp_c: f64,
    pub temp_f: f64,
    pub condition: Condition,
    pub wind_kph: f64,
    pub wind_dir: String,
    pub humidity: i64,
    pub feelslike_c: f64,
    pub feelslike_f: f64,
    pub vis_km: f64,
    pub uv: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CurrentWeather {
    pub location: WeatherLocation,
    pub current: CurrentConditions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DaySummary {
    pub maxtemp_c: f64,
    pub mintemp_c: f64,
    pub avgtemp_c: f64,
    pub condition: Condition,
    pub maxwind_kph: f64,
    pub avghumidity: f64,
    pub daily_chance_of_rain: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForecastDay {
    pub date: String,
    pub day: DaySummary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForecastDays {
    pub forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Forecast {
    pub location: WeatherLocation,
    pub current: CurrentConditions,
    pub forecast: ForecastDays,
}

pub fn format_current_weather(weather: &CurrentWeather) -> String {
    let location = &weather.location;
    let current = &weather.current;
    format!(
        "Current weather in {}, {}:\n\
         Condition: {}\n\
         Temperature: {:.1}°C ({:.1}°F)\n\
         Feels like: {:.1}°C ({:.1}°F)\n\
         Wind: {:.1} km/h {}\n\
         Humidity: {}%\n\
         Visibility: {:.1} km\n\
         UV Index: {:.1}\n\
         Local time: {}",
        location.name,
        location.country,
        current.condition.text,
        current.temp_c,
        current.temp_f,
        current.feelslike_c,
        current.feelslike_f,
        current.wind_kph,
        current.wind_dir,
        current.humidity,
        current.vis_km,
        current.uv,
        location.localtime,
    )
}

pub fn format_forecast(forecast: &Forecast) -> String {
    let mut result = format!(
        "Weather forecast for {}, {}:\n\n",
        forecast.location.name, forecast.location.country
    );
    result.push_str(&format!(
        "Current: {}, {:.1}°C, Wind: {:.1} km/h, Humidity: {}%\n\n",
        forecast.current.condition.text,
        forecast.current.temp_c,
        forecast.current.wind_kph,
        forecast.current.humidity,
    ));

    let days = forecast
        .forecast
        .forecastday
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let day = &entry.day;
            format!(
                "Day {} ({}):\n  \
                 Condition: {}\n  \
                 Temperature: {:.1}°C to {:.1}°C (avg: {:.1}°C)\n  \
                 Max wind: {:.1} km/h\n  \
                 Avg humidity: {:.0}%\n  \
                 Chance of rain: {}%\n",
                i + 1,
                entry.date,
                day.condition.text,
                day.mintemp_c,
                day.maxtemp_c,
                day.avgtemp_c,
                day.maxwind_kph,
                day.avghumidity,
                day.daily_chance_of_rain,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    result.push_str(&days);
    result
}

#[derive(Debug, Deserialize)]
pub struct WeatherArguments {
    location: String,
    /// 0 or absent asks for current conditions only
    #[serde(default)]
    forecast_days: i64,
}

/// Current conditions and multi-day forecasts from WeatherAPI.com
pub struct WeatherCapability {
    client: Client,
    config: WeatherConfig,
}

impl WeatherCapability {
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> ToolResult<T> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ToolError::ExecutionError("weather API key is not configured".into()))?;

        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("key", api_key)])
            .query(query)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("failed to reach weather API: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionError(format!(
                "weather API returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("failed to decode weather response: {}", e)))
    }

    pub async fn current(&self, location: &str) -> ToolResult<CurrentWeather> {
        self.fetch(
            "current.json",
            &[("q", location.to_string()), ("aqi", "no".to_string())],
        )
        .await
    }

    /// `days` is clamped to what the free tier serves
    pub async fn forecast(&self, location: &str, days: i64) -> ToolResult<Forecast> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        self.fetch(
            "forecast.json",
            &[
                ("q", location.to_string()),
                ("days", days.to_string()),
                ("aqi", "no".to_string()),
                ("alerts", "no".to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl Capability for WeatherCapability {
    type Arguments = WeatherArguments;

    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather or multi-day forecast for a given location. Use forecast_days for \
         future weather predictions (1-10 days)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name, coordinates (lat,lon), or location query (e.g., 'Barcelona', 'Paris, France', '48.8567,2.3508')"
                },
                "forecast_days": {
                    "type": "integer",
                    "description": "Number of days of forecast (1-10). Omit or set to 0 for current weather only. Use this when user asks about future weather or multi-day forecasts.",
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: WeatherArguments) -> ToolResult<String> {
        if arguments.forecast_days > 0 {
            let forecast = self
                .forecast(&arguments.location, arguments.forecast_days)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        location = %arguments.location,
                        days = arguments.forecast_days,
                        error = %e,
                        "failed to fetch weather forecast"
                    )
                })?;
            return Ok(format_forecast(&forecast));
        }

        let weather = self.current(&arguments.location).await.inspect_err(|e| {
            tracing::error!(location = %arguments.location, error = %e, "failed to fetch current weather")
        })?;
        Ok(format_current_weather(&weather))
    }
}
