use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::models::message::{Message, MessageContent};
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref FUNCTION_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").unwrap();
}

/// Convert internal Message format to OpenAI's API message specification
///
/// Every message maps to exactly one spec entry, so the order of the history is kept as is.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(message_to_openai_spec).collect()
}

fn message_to_openai_spec(message: &Message) -> Value {
    let mut converted = json!({
        "role": message.role.as_str()
    });

    for content in &message.content {
        match content {
            MessageContent::Text(text) => {
                let joined = match converted.get("content").and_then(|c| c.as_str()) {
                    Some(existing) => format!("{}{}", existing, text.text),
                    None => text.text.clone(),
                };
                converted["content"] = json!(joined);
            }
            MessageContent::ToolRequest(request) => {
                let tool_call = &request.tool_call;
                // The backend sent the arguments as an encoded string and expects them back that way
                let arguments = match &tool_call.arguments {
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                };
                if let Some(obj) = converted.as_object_mut() {
                    let tool_calls = obj.entry("tool_calls").or_insert(json!([]));
                    if let Some(calls) = tool_calls.as_array_mut() {
                        calls.push(json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": tool_call.name,
                                "arguments": arguments,
                            }
                        }));
                    }
                }
            }
            MessageContent::ToolResponse(response) => {
                converted["tool_call_id"] = json!(response.id);
                converted["content"] = match &response.tool_result {
                    Ok(output) => json!(output),
                    // A tool error is shown as output so the model can interpret the error message
                    Err(e) => json!(format!(
                        "The tool call returned the following error:\n{}",
                        e
                    )),
                };
            }
        }
    }

    // Assistant messages that only request tools still need a content key
    if converted.get("content").is_none() {
        converted["content"] = Value::Null;
    }

    converted
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
        if !is_valid_function_name(&tool.name) {
            return Err(anyhow!(
                "Tool name '{}' must match [a-zA-Z0-9_-]{{1,64}}",
                tool.name
            ));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow!("No choices returned by the model backend"))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            // Undecodable arguments are passed along verbatim; the capability reports them
            let arguments = if arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str::<Value>(arguments)
                    .unwrap_or_else(|_| Value::String(arguments.to_string()))
            };

            message = message.with_tool_request(id, ToolCall::new(function_name, arguments));
        }
    }

    Ok(message)
}

fn is_valid_function_name(name: &str) -> bool {
    FUNCTION_NAME.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
