use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

/// One scripted round-trip outcome
#[derive(Debug, Clone)]
pub enum MockResponse {
    Reply(Message),
    Fail(String),
}

/// A mock provider that returns pre-configured responses for testing
///
/// Every call is recorded with the history and tool names it was given.
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    calls: Arc<Mutex<Vec<(Vec<Message>, Vec<String>)>>>,
    delay: Option<Duration>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::scripted(responses.into_iter().map(MockResponse::Reply).collect())
    }

    pub fn scripted(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Default::default()
        }
    }

    /// A provider whose every call fails
    pub fn failing<S: Into<String>>(reason: S) -> Self {
        Self::scripted(vec![MockResponse::Fail(reason.into())])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Scripted responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// The history passed in on each call, in call order
    pub fn histories(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(messages, _)| messages.clone())
            .collect()
    }

    /// The tool names advertised on each call
    pub fn advertised_tools(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, tools)| tools.clone())
            .collect()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.calls.lock().unwrap().push((
            messages.to_vec(),
            tools.iter().map(|t| t.name.clone()).collect(),
        ));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = {
            let mut responses = self.responses.lock().unwrap();
            match responses.len() {
                0 => None,
                // The last scripted failure repeats so a failing provider keeps failing
                1 if matches!(responses[0], MockResponse::Fail(_)) => Some(responses[0].clone()),
                _ => Some(responses.remove(0)),
            }
        };

        match next {
            // Return empty response if no more pre-configured responses
            None => Ok((Message::assistant(), Usage::default())),
            Some(MockResponse::Reply(message)) => Ok((message, Usage::default())),
            Some(MockResponse::Fail(reason)) => Err(anyhow!(reason)),
        }
    }
}
