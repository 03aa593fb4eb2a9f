use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::capabilities::CapabilityRegistry;
use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, ToolRequest};
use crate::providers::base::Provider;

/// Bound on model calls within one reply
pub const DEFAULT_MAX_ROUND_TRIPS: usize = 15;

/// Longest title we hand back, in characters
pub const MAX_TITLE_CHARS: usize = 80;

/// Title for a conversation that has no messages yet
pub const EMPTY_TITLE: &str = "An empty conversation";

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful, concise AI assistant. Provide accurate, safe, and clear responses.";

const TITLE_PROMPT: &str = "You are a title generator. Extract the main topic from the user's message and create a short, descriptive title. Do NOT answer the question. Examples: 'What is the weather like in Barcelona?' → 'Weather in Barcelona'. Maximum 80 characters, no quotes.";

const TITLE_TRIM: &[char] = &[' ', '\t', '\r', '\n', '-', '"', '\''];

/// Agent drives a model backend through tool-calling round-trips until it answers
///
/// The agent holds no per-conversation state; every call to [`Agent::reply`] owns its own
/// history and round-trip counter, so one agent can serve many conversations at once.
pub struct Agent {
    provider: Arc<dyn Provider>,
    title_provider: Arc<dyn Provider>,
    registry: Arc<CapabilityRegistry>,
    max_round_trips: usize,
    system_prompt: String,
}

impl Agent {
    /// Create a new Agent with the specified provider and capabilities
    pub fn new(provider: Arc<dyn Provider>, registry: CapabilityRegistry) -> Self {
        Self {
            title_provider: Arc::clone(&provider),
            provider,
            registry: Arc::new(registry),
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Use a different backend (usually a cheaper model) for titles
    pub fn with_title_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.title_provider = provider;
        self
    }

    pub fn with_max_round_trips(mut self, max_round_trips: usize) -> Self {
        self.max_round_trips = max_round_trips;
        self
    }

    pub fn with_system_prompt<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn max_round_trips(&self) -> usize {
        self.max_round_trips
    }

    /// Answer the last turn of a conversation
    ///
    /// Each round-trip sends the whole history plus every capability schema. When the model
    /// asks for capabilities, they all run concurrently and their results are appended in
    /// the order they were requested before the next call. The first plain-text answer is
    /// returned as is.
    pub async fn reply(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        if messages.is_empty() {
            return Err(AgentError::EmptyConversation);
        }

        let tools = self.registry.schemas();
        let mut history = messages.to_vec();
        let mut round_trips = 0;

        loop {
            if round_trips >= self.max_round_trips {
                tracing::error!(limit = self.max_round_trips, "round-trip limit exceeded");
                return Err(AgentError::RoundTripLimitExceeded {
                    limit: self.max_round_trips,
                });
            }
            round_trips += 1;

            tracing::debug!(
                round_trip = round_trips,
                history = history.len(),
                "requesting completion"
            );
            let (response, usage) = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                result = self.provider.complete(&self.system_prompt, &history, &tools) => {
                    result.map_err(|e| {
                        tracing::error!(round_trip = round_trips, error = %format!("{:#}", e), "model backend failed");
                        AgentError::backend(e)
                    })?
                }
            };

            let requests: Vec<ToolRequest> = response.tool_requests().into_iter().cloned().collect();
            tracing::debug!(
                round_trip = round_trips,
                tool_requests = requests.len(),
                input_tokens = ?usage.input_tokens,
                output_tokens = ?usage.output_tokens,
                "completion received"
            );

            if requests.is_empty() {
                let text = response.text();
                if text.is_empty() {
                    tracing::error!(round_trip = round_trips, "response had neither text nor tool requests");
                    return Err(AgentError::MalformedResponse(
                        "response had neither text nor tool requests".to_string(),
                    ));
                }
                return Ok(text);
            }

            history.push(response);

            let dispatches = requests.iter().map(|request| self.registry.dispatch(request));
            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                results = join_all(dispatches) => results,
            };

            // join_all keeps request order, whatever order the capabilities finished in
            let results = results.into_iter().collect::<AgentResult<Vec<Message>>>()?;
            history.extend(results);
        }
    }

    /// Summarize what a conversation is about in a short title
    ///
    /// One model call without capabilities. Conversations with no messages get
    /// [`EMPTY_TITLE`] without asking the model.
    pub async fn title(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        if messages.is_empty() {
            return Ok(EMPTY_TITLE.to_string());
        }

        // The title model only ever sees what was said, as the user's words
        let prompt: Vec<Message> = messages
            .iter()
            .map(Message::text)
            .filter(|text| !text.is_empty())
            .map(|text| Message::user().with_text(text))
            .collect();

        let (response, _) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = self.title_provider.complete(TITLE_PROMPT, &prompt, &[]) => {
                result.map_err(AgentError::backend)?
            }
        };

        clean_title(&response.text())
    }
}

/// Flatten to one line, strip quotes and dashes around it, cap at [`MAX_TITLE_CHARS`]
pub fn clean_title(raw: &str) -> AgentResult<String> {
    let flat = raw.replace(['\r', '\n'], " ");
    let trimmed = flat.trim_matches(TITLE_TRIM);
    let truncated: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    let title = truncated.trim_matches(TITLE_TRIM);

    if title.is_empty() {
        return Err(AgentError::MalformedResponse(
            "empty response for title generation".to_string(),
        ));
    }
    Ok(title.to_string())
}
