use std::io::BufReader;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use ical::IcalParser;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::capability::Capability;
use crate::errors::{ToolError, ToolResult};

pub const DEFAULT_CALENDAR_URL: &str = "https://www.officeholidays.com/ics/spain/catalonia";
const NO_HOLIDAYS: &str = "No holidays found matching the criteria.";

#[derive(Debug, Clone)]
pub struct HolidaysConfig {
    pub calendar_url: String,
    pub timeout: Duration,
}

impl Default for HolidaysConfig {
    fn default() -> Self {
        Self {
            calendar_url: DEFAULT_CALENDAR_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

impl Holiday {
    /// Holidays are all-day events; they start at midnight UTC
    fn starts_at(&self) -> DateTime<Utc> {
        self.date.and_time(NaiveTime::default()).and_utc()
    }
}

/// Accepts `VALUE=DATE` start dates as well as full timestamps
fn parse_start_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Extract every event with a usable start date from an ICS document, in file order
pub fn parse_holidays(ics: &str) -> Result<Vec<Holiday>> {
    let mut holidays = Vec::new();
    for calendar in IcalParser::new(BufReader::new(ics.as_bytes())) {
        let calendar = calendar?;
        for event in calendar.events {
            let mut date = None;
            let mut name = String::new();
            for property in &event.properties {
                match property.name.as_str() {
                    "DTSTART" => date = property.value.as_deref().and_then(parse_start_date),
                    "SUMMARY" => name = property.value.clone().unwrap_or_default(),
                    _ => {}
                }
            }
            match date {
                Some(date) => holidays.push(Holiday { date, name }),
                None => tracing::debug!(summary = %name, "skipping calendar event without a start date"),
            }
        }
    }
    Ok(holidays)
}

#[derive(Debug, Deserialize)]
pub struct HolidaysArguments {
    #[serde(default)]
    before_date: Option<DateTime<Utc>>,
    #[serde(default)]
    after_date: Option<DateTime<Utc>>,
    /// Zero or negative means no limit
    #[serde(default)]
    max_count: Option<i64>,
}

/// Keep holidays inside the window, in calendar order, up to `max_count`
pub fn filter_holidays(holidays: &[Holiday], arguments: &HolidaysArguments) -> Vec<String> {
    holidays
        .iter()
        .filter(|h| arguments.before_date.map_or(true, |before| h.starts_at() <= before))
        .filter(|h| arguments.after_date.map_or(true, |after| h.starts_at() >= after))
        .take(match arguments.max_count {
            Some(max) if max > 0 => usize::try_from(max).unwrap_or(usize::MAX),
            _ => usize::MAX,
        })
        .map(|h| format!("{}: {}", h.date.format("%Y-%m-%d"), h.name))
        .collect()
}

/// Local bank and public holidays from a published ICS calendar
pub struct HolidaysCapability {
    client: Client,
    config: HolidaysConfig,
}

impl HolidaysCapability {
    pub fn new(config: HolidaysConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn load_calendar(&self) -> Result<Vec<Holiday>> {
        tracing::info!(link = %self.config.calendar_url, "loading calendar");
        let body = self
            .client
            .get(&self.config.calendar_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_holidays(&body)
    }
}

#[async_trait]
impl Capability for HolidaysCapability {
    type Arguments = HolidaysArguments;

    fn name(&self) -> &str {
        "get_holidays"
    }

    fn description(&self) -> &str {
        "Gets local bank and public holidays. Each line is a single holiday in the format \
         'YYYY-MM-DD: Holiday Name'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "before_date": {
                    "type": "string",
                    "description": "Optional date in RFC3339 format to get holidays before this date. If not provided, all holidays will be returned."
                },
                "after_date": {
                    "type": "string",
                    "description": "Optional date in RFC3339 format to get holidays after this date. If not provided, all holidays will be returned."
                },
                "max_count": {
                    "type": "integer",
                    "description": "Optional maximum number of holidays to return. If not provided, all holidays will be returned."
                }
            }
        })
    }

    async fn execute(&self, arguments: HolidaysArguments) -> ToolResult<String> {
        let holidays = self.load_calendar().await.map_err(|e| {
            ToolError::ExecutionError(format!("failed to load holiday calendar: {:#}", e))
        })?;

        let lines = filter_holidays(&holidays, &arguments);
        if lines.is_empty() {
            return Ok(NO_HOLIDAYS.to_string());
        }
        Ok(lines.join("\n"))
    }
}
