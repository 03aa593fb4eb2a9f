use async_trait::async_trait;
use chrono::{Local, SecondsFormat};
use serde_json::{json, Value};

use super::capability::Capability;
use crate::errors::ToolResult;

/// Reports the current date and time
#[derive(Debug, Clone, Default)]
pub struct DateCapability;

impl DateCapability {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Capability for DateCapability {
    // Takes no arguments; anything decodable is accepted and ignored
    type Arguments = Value;

    fn name(&self) -> &str {
        "get_today_date"
    }

    fn description(&self) -> &str {
        "Get today's date and time in RFC3339 format"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: Value) -> ToolResult<String> {
        Ok(Local::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::AnyCapability;
    use chrono::DateTime;

    #[tokio::test]
    async fn test_returns_rfc3339_now() {
        let before = chrono::Utc::now().timestamp();
        let output = DateCapability::new().call(json!({})).await.unwrap();
        let parsed = DateTime::parse_from_rfc3339(&output).unwrap();
        assert!((parsed.timestamp() - before).abs() <= 2);
    }

    #[tokio::test]
    async fn test_accepts_missing_arguments() {
        assert!(DateCapability::new().call(Value::Null).await.is_ok());
    }
}
