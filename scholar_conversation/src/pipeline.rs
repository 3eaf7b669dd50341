use crate::citation::{CitationMatcher, LiteralMatcher, marker, render_answer};
use scholar_core::prompt::{SUMMARY_INSTRUCTIONS, summary_prompt};
use scholar_core::{
    Answer, Citation, Deadline, Error, KnowledgeService, Message, Result, Role, RunRequest,
    RunStatus,
};
use scholar_session::SessionRegistry;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Token budget applied to every run.
#[derive(Debug, Clone, Copy)]
pub struct AskConfig {
    pub max_prompt_tokens: u32,
    pub max_completion_tokens: u32,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            max_prompt_tokens: 100_000,
            max_completion_tokens: 30_000,
        }
    }
}

pub struct AnswerPipeline {
    registry: Arc<SessionRegistry>,
    service: Arc<dyn KnowledgeService>,
    matcher: Box<dyn CitationMatcher>,
    config: AskConfig,
}

impl AnswerPipeline {
    pub fn new(
        registry: Arc<SessionRegistry>,
        service: Arc<dyn KnowledgeService>,
        config: AskConfig,
    ) -> Self {
        Self {
            registry,
            service,
            matcher: Box::new(LiteralMatcher),
            config,
        }
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: Box<dyn CitationMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Post `text` to the conversation registered for `local_id`, run the
    /// assistant with `instructions` and return its cited reply.
    pub async fn ask(
        &self,
        local_id: &str,
        instructions: &str,
        text: &str,
        deadline: Deadline,
    ) -> Result<Answer> {
        let remote_id = self
            .registry
            .resolve(local_id)
            .await?
            .ok_or_else(|| Error::UnknownConversation(local_id.to_string()))?;

        let started = Instant::now();
        info!(local_id, remote_id = %remote_id, "Asking assistant");

        deadline
            .run(
                "post_message",
                &remote_id,
                self.service.post_message(&remote_id, Role::User, text),
            )
            .await?
            .map_err(|cause| Error::remote("post_message", &remote_id, cause))?;

        let request = RunRequest {
            instructions: instructions.to_string(),
            max_prompt_tokens: self.config.max_prompt_tokens,
            max_completion_tokens: self.config.max_completion_tokens,
        };
        let run = deadline
            .run(
                "start_run",
                &remote_id,
                self.service.start_run(&remote_id, &request),
            )
            .await?
            .map_err(|cause| Error::remote("start_run", &remote_id, cause))?;

        if run.status != RunStatus::Completed {
            error!(
                remote_id = %remote_id,
                status = %run.status,
                data = %run.raw,
                "Run did not complete"
            );
            return Err(Error::RunIncomplete {
                conversation: remote_id,
                status: run.status,
                raw: run.raw.to_string(),
            });
        }
        debug!(run_id = %run.id, "Run completed");

        let messages = deadline
            .run(
                "list_messages",
                &remote_id,
                self.service.list_messages(&remote_id),
            )
            .await?
            .map_err(|cause| Error::remote("list_messages", &remote_id, cause))?;

        let reply = messages
            .into_iter()
            .find(|m| m.role == Role::Assistant)
            .ok_or_else(|| {
                Error::remote(
                    "list_messages",
                    &remote_id,
                    anyhow::anyhow!("no assistant reply in conversation"),
                )
            })?;

        let answer = self.cite(reply, deadline).await?;

        info!(
            remote_id = %remote_id,
            citations = answer.citations.len(),
            "Answer ready in {:.2}s",
            started.elapsed().as_secs_f64()
        );

        Ok(answer)
    }

    /// Ask for a summary of one document in the corpus.
    pub async fn summarize(
        &self,
        local_id: &str,
        document_name: &str,
        deadline: Deadline,
    ) -> Result<Answer> {
        self.ask(
            local_id,
            SUMMARY_INSTRUCTIONS,
            &summary_prompt(document_name),
            deadline,
        )
        .await
    }

    /// Replace each annotation with a numbered marker and build the footer.
    ///
    /// Ordinals follow first appearance of a source id. A source whose name
    /// cannot be resolved keeps its ordinal in the text but is left out of
    /// the citation list.
    async fn cite(&self, reply: Message, deadline: Deadline) -> Result<Answer> {
        let mut body = reply.text;
        let mut ordinals: HashMap<String, usize> = HashMap::new();
        let mut names = NameCache::new(self.service.as_ref());
        let mut citations = Vec::new();

        for annotation in &reply.annotations {
            let next = ordinals.len() + 1;
            let (index, first_seen) = match ordinals.entry(annotation.source_id.clone()) {
                Entry::Occupied(e) => (*e.get(), false),
                Entry::Vacant(e) => (*e.insert(next), true),
            };

            if !self.matcher.place(&mut body, annotation, &marker(index)) {
                debug!(
                    source_id = %annotation.source_id,
                    "Annotation text not found in reply"
                );
            }

            if !first_seen {
                continue;
            }

            if let Some(display_name) = names.resolve(&annotation.source_id, deadline).await? {
                citations.push(Citation {
                    index,
                    source_id: annotation.source_id.clone(),
                    display_name,
                });
            }
        }

        let text = render_answer(&body, &citations);
        Ok(Answer { text, citations })
    }
}

/// Document names looked up during a single answer.
struct NameCache<'a> {
    service: &'a dyn KnowledgeService,
    names: HashMap<String, Option<String>>,
}

impl<'a> NameCache<'a> {
    fn new(service: &'a dyn KnowledgeService) -> Self {
        Self {
            service,
            names: HashMap::new(),
        }
    }

    /// `None` when the service could not resolve the id; only timeouts are fatal.
    async fn resolve(&mut self, source_id: &str, deadline: Deadline) -> Result<Option<String>> {
        if let Some(cached) = self.names.get(source_id) {
            return Ok(cached.clone());
        }

        let resolved = match deadline
            .run(
                "resolve_document_name",
                source_id,
                self.service.resolve_document_name(source_id),
            )
            .await?
        {
            Ok(name) => Some(name),
            Err(cause) => {
                let err = Error::NameResolution {
                    source_id: source_id.to_string(),
                    cause,
                };
                warn!("Dropping citation: {err}");
                None
            }
        };

        self.names.insert(source_id.to_string(), resolved.clone());
        Ok(resolved)
    }
}
