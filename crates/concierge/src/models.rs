//! These models represent the objects passed around by the assistant
//!
//! There are a few related formats we need to interact with:
//! - conversation turns handed to us by the caller, which only carry user and assistant text
//! - openai messages/tools, sent from the agent to the model backend
//! - capability requests, sent from the agent to the capability registry
//!
//! We always immediately convert those data models into the internal structs using to/from
//! helpers, so the agent loop only ever deals with [`message::Message`] and [`tool::Tool`].
pub mod conversation;
pub mod message;
pub mod role;
pub mod tool;
