use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{ToolError, ToolResult};
use crate::models::tool::Tool;

/// A named unit of work the model can ask the assistant to perform
///
/// Implementations receive already-decoded arguments; decoding failures never reach
/// `execute`. A capability must not touch the conversation history, it only returns text.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The shape the raw arguments are decoded into
    type Arguments: DeserializeOwned + Send;

    /// Unique name used for dispatch and advertised to the model
    fn name(&self) -> &str;

    /// What the capability does, written for the model
    fn description(&self) -> &str;

    /// JSON schema of `Arguments`
    fn parameters(&self) -> Value;

    /// Perform the work
    async fn execute(&self, arguments: Self::Arguments) -> ToolResult<String>;
}

/// Object-safe view of a [`Capability`], used by the registry to hold capabilities with
/// different argument types side by side
#[async_trait]
pub trait AnyCapability: Send + Sync {
    fn tool(&self) -> Tool;

    /// Decode the raw arguments and run the capability
    async fn call(&self, arguments: Value) -> ToolResult<String>;
}

#[async_trait]
impl<C> AnyCapability for C
where
    C: Capability,
{
    fn tool(&self) -> Tool {
        Tool::new(self.name(), self.description(), self.parameters())
    }

    async fn call(&self, arguments: Value) -> ToolResult<String> {
        let arguments = decode_arguments::<C::Arguments>(arguments)?;
        self.execute(arguments).await
    }
}

/// Decode raw tool-call arguments into `T`
///
/// A JSON string means the backend sent arguments that were not valid JSON at all. A null
/// is treated as an empty object since some backends omit arguments for no-arg tools.
pub fn decode_arguments<T: DeserializeOwned>(arguments: Value) -> ToolResult<T> {
    let arguments = match arguments {
        Value::String(raw) => {
            return Err(ToolError::InvalidParameters(format!(
                "arguments are not a JSON object: {}",
                raw
            )))
        }
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidParameters(e.to_string()))
}
