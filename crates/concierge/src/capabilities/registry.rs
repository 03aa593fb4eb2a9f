//! Capability registry
//!
//! Holds capabilities in registration order and resolves requests by exact name. The
//! registry is immutable once built, so one instance can serve many replies at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::capability::{AnyCapability, Capability};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::Tool;

#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<Arc<dyn AnyCapability>>,
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability; names must be unique
    pub fn register<C>(&mut self, capability: C) -> AgentResult<()>
    where
        C: Capability + 'static,
    {
        let name = capability.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateCapability(name));
        }
        let capability: Arc<dyn AnyCapability> = Arc::new(capability);
        self.tools.push(capability.tool());
        self.index.insert(name, self.capabilities.len());
        self.capabilities.push(capability);
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<C>(mut self, capability: C) -> AgentResult<Self>
    where
        C: Capability + 'static,
    {
        self.register(capability)?;
        Ok(self)
    }

    /// Schema declarations in registration order
    pub fn schemas(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Execute one tool request and wrap the outcome in a tool-result message
    ///
    /// Argument decoding and execution failures become the content of the message. Only an
    /// unknown name is an error, since it means the model asked for something we never
    /// advertised.
    pub async fn dispatch(&self, request: &ToolRequest) -> AgentResult<Message> {
        let name = request.tool_call.name.as_str();
        let capability = self
            .index
            .get(name)
            .map(|&i| Arc::clone(&self.capabilities[i]))
            .ok_or_else(|| {
                tracing::warn!(capability = %name, id = %request.id, "unknown capability requested");
                AgentError::UnknownCapability(name.to_string())
            })?;

        let start = Instant::now();
        let result = capability.call(request.tool_call.arguments.clone()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::info!(
                capability = %name,
                id = %request.id,
                duration_ms,
                outcome = "ok",
                "capability invoked"
            ),
            Err(e) => tracing::warn!(
                capability = %name,
                id = %request.id,
                duration_ms,
                error = %e,
                "capability failed"
            ),
        }

        Ok(Message::tool_result(request.id.clone(), result))
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field(
                "capabilities",
                &self.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ToolError, ToolResult};
    use crate::models::message::MessageContent;
    use crate::models::role::Role;
    use crate::models::tool::ToolCall;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Deserialize)]
    struct EchoArguments {
        message: String,
    }

    struct EchoCapability;

    #[async_trait]
    impl Capability for EchoCapability {
        type Arguments = EchoArguments;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "reply with the input"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            })
        }

        async fn execute(&self, arguments: EchoArguments) -> ToolResult<String> {
            Ok(arguments.message)
        }
    }

    struct BrokenCapability;

    #[async_trait]
    impl Capability for BrokenCapability {
        type Arguments = Value;

        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _arguments: Value) -> ToolResult<String> {
            Err(ToolError::ExecutionError("upstream unavailable".into()))
        }
    }

    fn request(id: &str, name: &str, arguments: Value) -> ToolRequest {
        ToolRequest {
            id: id.to_string(),
            tool_call: ToolCall::new(name, arguments),
        }
    }

    fn result_of(message: &Message) -> &ToolResult<String> {
        match &message.content[0] {
            MessageContent::ToolResponse(response) => &response.tool_result,
            other => panic!("expected tool response, got {:?}", other),
        }
    }

    #[test]
    fn test_schemas_keep_registration_order() -> AgentResult<()> {
        let registry = CapabilityRegistry::new()
            .with(BrokenCapability)?
            .with(EchoCapability)?;

        let names: Vec<String> = registry.schemas().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["broken", "echo"]);
        assert_eq!(registry.schemas(), registry.schemas());
        assert_eq!(registry.schemas()[1].description, "reply with the input");
        Ok(())
    }

    #[test]
    fn test_duplicate_registration_rejected() -> AgentResult<()> {
        let mut registry = CapabilityRegistry::new().with(EchoCapability)?;
        let err = registry.register(EchoCapability).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateCapability(ref n) if n == "echo"));
        assert_eq!(registry.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_success() -> AgentResult<()> {
        let registry = CapabilityRegistry::new().with(EchoCapability)?;
        let message = registry
            .dispatch(&request("call_1", "echo", json!({"message": "hi"})))
            .await?;

        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.correlation_id(), Some("call_1"));
        assert_eq!(result_of(&message), &Ok("hi".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_decode_failure_becomes_result() -> AgentResult<()> {
        let registry = CapabilityRegistry::new().with(EchoCapability)?;
        let message = registry
            .dispatch(&request("call_2", "echo", json!({"text": "wrong field"})))
            .await?;

        assert_eq!(message.correlation_id(), Some("call_2"));
        assert!(matches!(
            result_of(&message),
            Err(ToolError::InvalidParameters(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_execution_failure_becomes_result() -> AgentResult<()> {
        let registry = CapabilityRegistry::new().with(BrokenCapability)?;
        let message = registry
            .dispatch(&request("call_3", "broken", json!({})))
            .await?;

        assert_eq!(
            result_of(&message),
            &Err(ToolError::ExecutionError("upstream unavailable".into()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_unknown_name_is_fatal() -> AgentResult<()> {
        let registry = CapabilityRegistry::new().with(EchoCapability)?;

        let err = registry
            .dispatch(&request("call_4", "Echo", json!({"message": "hi"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownCapability(ref n) if n == "Echo"));
        Ok(())
    }
}
