use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::agent::Agent;
use crate::errors::{AgentError, AgentResult};
use crate::models::conversation::Conversation;
use crate::models::message::Message;

/// Title used when title generation fails for any reason
pub const DEFAULT_TITLE: &str = "Untitled conversation";

/// What a new conversation opens with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opening {
    pub title: String,
    pub reply: String,
}

impl Opening {
    /// Record the title and the assistant's answer on the conversation
    pub fn apply_to(self, conversation: &mut Conversation) {
        conversation.title = Some(self.title);
        conversation.push_reply(self.reply);
    }
}

/// Generates a new conversation's title and first reply side by side
#[derive(Clone)]
pub struct Coordinator {
    agent: Arc<Agent>,
}

impl Coordinator {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Produce the title and reply for a freshly started conversation
    ///
    /// Both run as separate tasks over the same snapshot and are always awaited together.
    /// A failed title falls back to [`DEFAULT_TITLE`]; a failed reply fails the whole
    /// opening and nothing should be persisted. Dropping the returned future aborts both tasks.
    pub async fn open(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> AgentResult<Opening> {
        tracing::info!(conversation_id = %conversation.id, "opening conversation");
        let snapshot: Arc<[Message]> = conversation.messages.clone().into();

        let title_task = {
            let agent = Arc::clone(&self.agent);
            let snapshot = Arc::clone(&snapshot);
            let cancel = cancel.clone();
            AbortOnDropHandle::new(tokio::spawn(async move {
                agent.title(&snapshot, &cancel).await
            }))
        };
        let reply_task = {
            let agent = Arc::clone(&self.agent);
            let cancel = cancel.clone();
            AbortOnDropHandle::new(tokio::spawn(async move {
                agent.reply(&snapshot, &cancel).await
            }))
        };

        let (title, reply) = tokio::join!(title_task, reply_task);

        let reply = flatten(reply).inspect_err(|e| {
            tracing::error!(conversation_id = %conversation.id, error = %e, "reply generation failed")
        })?;

        let title = flatten(title).unwrap_or_else(|e| {
            tracing::warn!(
                conversation_id = %conversation.id,
                error = %e,
                "title generation failed, using default title"
            );
            DEFAULT_TITLE.to_string()
        });

        Ok(Opening { title, reply })
    }

    /// Start a conversation from its first user message and open it
    ///
    /// Returns the conversation with the title and reply already recorded.
    pub async fn start(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> AgentResult<Conversation> {
        let mut conversation = Conversation::start(text)?;
        self.open(&conversation, cancel).await?.apply_to(&mut conversation);
        Ok(conversation)
    }

    /// Answer a follow-up turn; the title is left alone
    pub async fn follow_up(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> AgentResult<String> {
        let reply = self.agent.reply(&conversation.messages, cancel).await?;
        conversation.push_reply(reply.clone());
        Ok(reply)
    }
}

fn flatten<T>(joined: Result<AgentResult<T>, JoinError>) -> AgentResult<T> {
    joined.map_err(|e| AgentError::TaskFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EMPTY_TITLE;
    use crate::capabilities::CapabilityRegistry;
    use crate::models::role::Role;
    use crate::models::tool::Tool;
    use crate::providers::base::{Provider, Usage};
    use crate::providers::mock::{MockProvider, MockResponse};
    use async_trait::async_trait;
    use std::time::{Duration, Instant};

    struct PanickingProvider;

    #[async_trait]
    impl Provider for PanickingProvider {
        async fn complete(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _tools: &[Tool],
        ) -> anyhow::Result<(Message, Usage)> {
            panic!("provider blew up")
        }
    }

    fn coordinator(replies: &MockProvider, titles: &MockProvider) -> Coordinator {
        let agent = Agent::new(Arc::new(replies.clone()), CapabilityRegistry::new())
            .with_title_provider(Arc::new(titles.clone()));
        Coordinator::new(Arc::new(agent))
    }

    fn text(s: &str) -> Message {
        Message::assistant().with_text(s)
    }

    #[tokio::test]
    async fn test_open_returns_title_and_reply() -> anyhow::Result<()> {
        let replies = MockProvider::new(vec![text("It is sunny.")]);
        let titles = MockProvider::new(vec![text("Weather in Barcelona")]);
        let conversation = Conversation::start("What is the weather like in Barcelona?")?;

        let opening = coordinator(&replies, &titles)
            .open(&conversation, &CancellationToken::new())
            .await?;

        assert_eq!(
            opening,
            Opening {
                title: "Weather in Barcelona".into(),
                reply: "It is sunny.".into(),
            }
        );
        // Both tasks saw the same, unmodified snapshot
        assert_eq!(replies.histories()[0], conversation.messages);
        assert_eq!(titles.histories()[0].len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_title_failure_uses_default() -> anyhow::Result<()> {
        let replies = MockProvider::new(vec![text("Hello!")]);
        let titles = MockProvider::failing("title backend down");
        let conversation = Conversation::start("Hi")?;

        let opening = coordinator(&replies, &titles)
            .open(&conversation, &CancellationToken::new())
            .await?;

        assert_eq!(opening.title, DEFAULT_TITLE);
        assert_eq!(opening.reply, "Hello!");
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_title_uses_default() -> anyhow::Result<()> {
        let replies = MockProvider::new(vec![text("Hello!")]);
        let titles = MockProvider::new(vec![text(" \"\" ")]);
        let conversation = Conversation::start("Hi")?;

        let opening = coordinator(&replies, &titles)
            .open(&conversation, &CancellationToken::new())
            .await?;

        assert_eq!(opening.title, DEFAULT_TITLE);
        Ok(())
    }

    #[tokio::test]
    async fn test_reply_failure_is_fatal() {
        let replies = MockProvider::scripted(vec![MockResponse::Fail("upstream 503".into())]);
        let titles = MockProvider::new(vec![text("A fine title")]);
        let conversation = Conversation::start("Hi").unwrap();

        let err = coordinator(&replies, &titles)
            .open(&conversation, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Backend(msg) if msg.contains("upstream 503")));
        // The title still ran to completion before the failure surfaced
        assert_eq!(titles.call_count(), 1);
    }

    #[tokio::test]
    async fn test_title_and_reply_run_concurrently() -> anyhow::Result<()> {
        let delay = Duration::from_millis(200);
        let replies = MockProvider::new(vec![text("Reply")]).with_delay(delay);
        let titles = MockProvider::new(vec![text("Title")]).with_delay(delay);
        let conversation = Conversation::start("Hi")?;

        let started = Instant::now();
        coordinator(&replies, &titles)
            .open(&conversation, &CancellationToken::new())
            .await?;

        assert!(started.elapsed() < delay * 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_conversation() {
        let replies = MockProvider::default();
        let titles = MockProvider::default();
        let conversation = Conversation::from_messages("empty", vec![]);
        let coordinator = coordinator(&replies, &titles);

        let err = coordinator
            .open(&conversation, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyConversation));

        let title = coordinator
            .agent()
            .title(&conversation.messages, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(title, EMPTY_TITLE);
        assert_eq!(titles.call_count(), 0);
        assert_eq!(replies.call_count(), 0);
    }

    #[tokio::test]
    async fn test_start_records_opening() -> anyhow::Result<()> {
        let replies = MockProvider::new(vec![text("Paris is lovely in spring.")]);
        let titles = MockProvider::new(vec![text("Visiting Paris")]);

        let conversation = coordinator(&replies, &titles)
            .start("When should I visit Paris?", &CancellationToken::new())
            .await?;

        assert_eq!(conversation.title.as_deref(), Some("Visiting Paris"));
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert_eq!(conversation.messages[1].text(), "Paris is lovely in spring.");
        Ok(())
    }

    #[tokio::test]
    async fn test_start_rejects_blank_message() {
        let replies = MockProvider::default();
        let titles = MockProvider::default();
        let err = coordinator(&replies, &titles)
            .start("   ", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyConversation));
        assert_eq!(replies.call_count() + titles.call_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_keeps_title() -> anyhow::Result<()> {
        let replies = MockProvider::new(vec![text("First"), text("Second")]);
        let titles = MockProvider::new(vec![text("Chat")]);
        let coordinator = coordinator(&replies, &titles);
        let cancel = CancellationToken::new();

        let mut conversation = coordinator.start("Hello", &cancel).await?;
        conversation.messages.push(Message::user().with_text("And again?"));
        let reply = coordinator.follow_up(&mut conversation, &cancel).await?;

        assert_eq!(reply, "Second");
        assert_eq!(conversation.title.as_deref(), Some("Chat"));
        assert_eq!(conversation.messages.len(), 4);
        assert_eq!(titles.call_count(), 1);
        assert_eq!(replies.histories()[1].len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_opening() {
        let replies = MockProvider::new(vec![text("late")]).with_delay(Duration::from_secs(30));
        let titles = MockProvider::new(vec![text("late")]).with_delay(Duration::from_secs(30));
        let conversation = Conversation::start("Hi").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator(&replies, &titles)
            .open(&conversation, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_title_panic_uses_default() -> anyhow::Result<()> {
        let replies = MockProvider::new(vec![text("Hello!")]);
        let agent = Agent::new(Arc::new(replies), CapabilityRegistry::new())
            .with_title_provider(Arc::new(PanickingProvider));
        let conversation = Conversation::start("Hi")?;

        let opening = Coordinator::new(Arc::new(agent))
            .open(&conversation, &CancellationToken::new())
            .await?;

        assert_eq!(opening.title, DEFAULT_TITLE);
        assert_eq!(opening.reply, "Hello!");
        Ok(())
    }

    #[tokio::test]
    async fn test_reply_panic_is_task_failure() {
        let titles = MockProvider::new(vec![text("A fine title")]);
        let agent = Agent::new(Arc::new(PanickingProvider), CapabilityRegistry::new())
            .with_title_provider(Arc::new(titles));
        let conversation = Conversation::start("Hi").unwrap();

        let err = Coordinator::new(Arc::new(agent))
            .open(&conversation, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::TaskFailed(_)));
    }

    #[tokio::test]
    async fn test_dropped_opening_aborts_tasks() {
        let delay = Duration::from_millis(200);
        let replies = MockProvider::new(vec![text("Reply")]).with_delay(delay);
        let titles = MockProvider::new(vec![text("Title")]).with_delay(delay);
        let conversation = Conversation::start("Hi").unwrap();
        let coordinator = coordinator(&replies, &titles);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            coordinator.open(&conversation, &CancellationToken::new()),
        )
        .await;
        assert!(timed_out.is_err());

        tokio::time::sleep(delay * 2).await;
        // Neither task survived long enough to consume its response
        assert_eq!(replies.remaining(), 1);
        assert_eq!(titles.remaining(), 1);
    }
}
