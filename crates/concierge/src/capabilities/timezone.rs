use async_trait::async_trait;
use chrono::{DateTime, Offset, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{json, Value};

use super::capability::Capability;
use crate::errors::{ToolError, ToolResult};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

#[derive(Debug, Deserialize)]
pub struct TimezoneArguments {
    /// RFC 3339 timestamp, or "now"
    #[serde(default)]
    time: Option<String>,
    from_timezone: String,
    to_timezone: String,
}

/// Converts a moment between two IANA time zones
#[derive(Debug, Clone, Default)]
pub struct TimezoneCapability;

impl TimezoneCapability {
    pub fn new() -> Self {
        Self
    }

    fn parse_zone(name: &str, which: &str) -> ToolResult<Tz> {
        name.parse::<Tz>().map_err(|e| {
            ToolError::InvalidParameters(format!("invalid {} timezone '{}': {}", which, name, e))
        })
    }

    fn convert(arguments: &TimezoneArguments, now: DateTime<Utc>) -> ToolResult<String> {
        let from = Self::parse_zone(&arguments.from_timezone, "source")?;
        let to = Self::parse_zone(&arguments.to_timezone, "target")?;

        let instant = match arguments.time.as_deref().map(str::trim) {
            None | Some("") | Some("now") => now,
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| {
                    ToolError::InvalidParameters(format!(
                        "invalid time format '{}', expected RFC3339 (e.g., '2025-12-15T14:00:00Z'): {}",
                        raw, e
                    ))
                })?
                .with_timezone(&Utc),
        };

        let input = instant.with_timezone(&from);
        let converted = instant.with_timezone(&to);

        let from_offset = input.offset().fix().local_minus_utc();
        let to_offset = converted.offset().fix().local_minus_utc();
        let diff_hours = f64::from(to_offset - from_offset) / 3600.0;

        let difference = if diff_hours > 0.0 {
            format!("+{:.1} hours", diff_hours)
        } else if diff_hours < 0.0 {
            format!("{:.1} hours", diff_hours)
        } else {
            "same time".to_string()
        };

        Ok(format!(
            "Time Conversion:\nFrom: {} ({})\nTo:   {} ({})\nTime difference: {}",
            input.format(DISPLAY_FORMAT),
            arguments.from_timezone,
            converted.format(DISPLAY_FORMAT),
            arguments.to_timezone,
            difference,
        ))
    }
}

#[async_trait]
impl Capability for TimezoneCapability {
    type Arguments = TimezoneArguments;

    fn name(&self) -> &str {
        "convert_timezone"
    }

    fn description(&self) -> &str {
        "Convert a time from one timezone to another. Useful for travelers scheduling across \
         different locations. Supports IANA timezone names (e.g., 'America/New_York', \
         'Europe/Madrid', 'Asia/Tokyo')."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "time": {
                    "type": "string",
                    "description": "Time in RFC3339 format (e.g., '2025-12-15T14:00:00Z') or 'now' for current time"
                },
                "from_timezone": {
                    "type": "string",
                    "description": "Source timezone in IANA format (e.g., 'America/New_York', 'Europe/Madrid', 'UTC')"
                },
                "to_timezone": {
                    "type": "string",
                    "description": "Target timezone in IANA format (e.g., 'America/New_York', 'Europe/Madrid', 'Asia/Tokyo')"
                }
            },
            "required": ["from_timezone", "to_timezone"]
        })
    }

    async fn execute(&self, arguments: TimezoneArguments) -> ToolResult<String> {
        Self::convert(&arguments, Utc::now())
    }
}
