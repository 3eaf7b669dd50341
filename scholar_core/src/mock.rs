//! In-memory knowledge service for tests.
//!
//! Records every call so tests can assert on ordering, concurrency and the
//! exact set of uploads, and can be scripted to fail or stall specific calls.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{
    IndexStatus, KnowledgeService, Message, Role, RunRequest, RunResult, RunStatus, UploadReceipt,
};

#[derive(Default)]
struct State {
    corpus: HashSet<String>,
    uploaded: Vec<String>,
    /// Every file created remotely, indexed or not
    stored_files: Vec<String>,
    failing_uploads: HashSet<String>,
    failing_index: HashSet<String>,
    panicking_uploads: HashSet<String>,
    posted: Vec<(String, Role, String)>,
    runs: Vec<(String, RunRequest)>,
    calls: Vec<&'static str>,
    names: HashMap<String, String>,
    name_lookups: Vec<String>,
    reply: Option<Message>,
}

pub struct MockKnowledgeService {
    state: Mutex<State>,
    created: AtomicUsize,
    in_flight_uploads: AtomicUsize,
    peak_uploads: AtomicUsize,
    run_status: RunStatus,
    fail_create: bool,
    create_delay: Duration,
    upload_delay: Duration,
    run_delay: Duration,
}

impl Default for MockKnowledgeService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockKnowledgeService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            created: AtomicUsize::new(0),
            in_flight_uploads: AtomicUsize::new(0),
            peak_uploads: AtomicUsize::new(0),
            run_status: RunStatus::Completed,
            fail_create: false,
            create_delay: Duration::ZERO,
            upload_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_corpus<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().corpus.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_document_name(self, source_id: &str, name: &str) -> Self {
        self.state()
            .names
            .insert(source_id.to_string(), name.to_string());
        self
    }

    #[must_use]
    pub fn with_reply(self, reply: Message) -> Self {
        self.state().reply = Some(reply);
        self
    }

    #[must_use]
    pub fn failing_upload(self, name: &str) -> Self {
        self.state().failing_uploads.insert(name.to_string());
        self
    }

    /// File creation succeeds but indexing of `name` ends as failed.
    #[must_use]
    pub fn failing_index(self, name: &str) -> Self {
        self.state().failing_index.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn panicking_upload(self, name: &str) -> Self {
        self.state().panicking_uploads.insert(name.to_string());
        self
    }

    /// Let every scripted upload failure succeed from now on.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_uploads.clear();
        state.failing_index.clear();
        state.panicking_uploads.clear();
    }

    #[must_use]
    pub const fn with_run_status(mut self, status: RunStatus) -> Self {
        self.run_status = status;
        self
    }

    #[must_use]
    pub const fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    #[must_use]
    pub const fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    /// Number of remote conversations created so far.
    pub fn created_conversations(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Names of documents uploaded so far, in completion order.
    pub fn uploaded(&self) -> Vec<String> {
        self.state().uploaded.clone()
    }

    /// Names of every remote file created, including ones that never indexed.
    pub fn stored_files(&self) -> Vec<String> {
        self.state().stored_files.clone()
    }

    pub fn corpus(&self) -> HashSet<String> {
        self.state().corpus.clone()
    }

    /// Highest number of uploads observed running at the same time.
    pub fn peak_concurrent_uploads(&self) -> usize {
        self.peak_uploads.load(Ordering::SeqCst)
    }

    pub fn posted_messages(&self) -> Vec<(String, Role, String)> {
        self.state().posted.clone()
    }

    pub fn runs(&self) -> Vec<(String, RunRequest)> {
        self.state().runs.clone()
    }

    /// Sequence of call names, in the order they started.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn name_lookups(&self) -> Vec<String> {
        self.state().name_lookups.clone()
    }

    fn record(&self, call: &'static str) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl KnowledgeService for MockKnowledgeService {
    async fn create_conversation(&self) -> anyhow::Result<String> {
        self.record("create_conversation");
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.fail_create {
            anyhow::bail!("conversation quota exceeded");
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread_{n}"))
    }

    async fn upload_document(
        &self,
        name: &str,
        content: Vec<u8>,
    ) -> anyhow::Result<UploadReceipt> {
        self.record("upload_document");
        if self.state().panicking_uploads.contains(name) {
            panic!("upload of {name} crashed");
        }
        let now = self.in_flight_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_uploads.fetch_max(now, Ordering::SeqCst);

        if !self.upload_delay.is_zero() {
            tokio::time::sleep(self.upload_delay).await;
        }
        self.in_flight_uploads.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state();
        if state.failing_uploads.contains(name) {
            anyhow::bail!("file rejected by the service");
        }
        state.stored_files.push(name.to_string());
        if state.failing_index.contains(name) {
            return Ok(UploadReceipt {
                file_id: format!("file-{name}"),
                status: IndexStatus::Failed,
                usage_bytes: 0,
            });
        }
        state.corpus.insert(name.to_string());
        state.uploaded.push(name.to_string());
        Ok(UploadReceipt {
            file_id: format!("file-{name}"),
            status: IndexStatus::Completed,
            usage_bytes: content.len() as u64,
        })
    }

    async fn list_corpus_document_names(&self) -> anyhow::Result<HashSet<String>> {
        self.record("list_corpus_document_names");
        // Only indexed documents count, like the vector store listing.
        Ok(self.state().corpus.clone())
    }

    async fn post_message(&self, remote_id: &str, role: Role, text: &str) -> anyhow::Result<()> {
        self.record("post_message");
        self.state()
            .posted
            .push((remote_id.to_string(), role, text.to_string()));
        Ok(())
    }

    async fn start_run(&self, remote_id: &str, request: &RunRequest) -> anyhow::Result<RunResult> {
        self.record("start_run");
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        self.state()
            .runs
            .push((remote_id.to_string(), request.clone()));
        Ok(RunResult {
            id: "run_1".to_string(),
            status: self.run_status,
            raw: serde_json::json!({
                "id": "run_1",
                "thread_id": remote_id,
                "status": self.run_status.as_str(),
            }),
        })
    }

    async fn list_messages(&self, remote_id: &str) -> anyhow::Result<Vec<Message>> {
        self.record("list_messages");
        let state = self.state();
        let mut messages: Vec<Message> = state
            .posted
            .iter()
            .filter(|(id, _, _)| id == remote_id)
            .map(|(_, role, text)| Message {
                role: *role,
                text: text.clone(),
                annotations: Vec::new(),
            })
            .collect();
        messages.extend(state.reply.clone());
        messages.reverse();
        Ok(messages)
    }

    async fn resolve_document_name(&self, source_id: &str) -> anyhow::Result<String> {
        self.record("resolve_document_name");
        let mut state = self.state();
        state.name_lookups.push(source_id.to_string());
        state
            .names
            .get(source_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No such File object: {source_id}"))
    }
}
