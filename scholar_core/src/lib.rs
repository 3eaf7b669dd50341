#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod answer;
pub mod deadline;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod prompt;
pub mod run;
pub mod util;

pub use answer::{Answer, Citation};
pub use deadline::Deadline;
pub use error::{Error, Result};
pub use run::{IndexStatus, RunRequest, RunResult, RunStatus, UploadReceipt};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A span of answer text attributed to a corpus document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Literal substring of the message text the service marked up
    pub text: String,
    /// Stored-document id of the cited source
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
}

impl Annotation {
    #[must_use]
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            start_index: None,
            end_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Message {
    #[must_use]
    pub fn assistant(text: impl Into<String>, annotations: Vec<Annotation>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            annotations,
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            annotations: Vec::new(),
        }
    }
}

/// Remote LLM/corpus service the core talks to.
///
/// Every method is a network round trip. `upload_document` and `start_run`
/// block, polling internally, until the remote side reaches a final state.
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn create_conversation(&self) -> anyhow::Result<String>;

    async fn upload_document(&self, name: &str, content: Vec<u8>)
    -> anyhow::Result<UploadReceipt>;

    async fn list_corpus_document_names(&self) -> anyhow::Result<HashSet<String>>;

    async fn post_message(&self, remote_id: &str, role: Role, text: &str) -> anyhow::Result<()>;

    async fn start_run(&self, remote_id: &str, request: &RunRequest) -> anyhow::Result<RunResult>;

    /// Messages of a conversation, most recent first.
    async fn list_messages(&self, remote_id: &str) -> anyhow::Result<Vec<Message>>;

    async fn resolve_document_name(&self, source_id: &str) -> anyhow::Result<String>;
}

/// Durable local storage of named documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_names(&self) -> std::io::Result<Vec<String>>;

    async fn exists(&self, name: &str) -> std::io::Result<bool>;

    async fn read(&self, name: &str) -> std::io::Result<Vec<u8>>;

    async fn store(&self, name: &str, content: &[u8]) -> std::io::Result<()>;
}

/// Persistent single-bucket string map backing the session registry.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;

    async fn contains(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn count(&self) -> anyhow::Result<u64>;
}
