//! Integration tests for the answer pipeline.
//!
//! These tests verify that:
//! - Annotations become numbered markers with a matching footer
//! - Repeated sources share one ordinal and one lookup
//! - Unresolvable sources are dropped from the footer only
//! - Runs that do not complete surface their status and payload

use async_trait::async_trait;
use scholar_core::mock::MockKnowledgeService;
use scholar_core::prompt::SUMMARY_INSTRUCTIONS;
use scholar_core::{
    Annotation, ConversationStore, Deadline, Error, Message, Role, RunStatus,
};
use scholar_conversation::{AnswerPipeline, AskConfig, OffsetMatcher};
use scholar_session::SessionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get(&self, local_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(local_id).cloned())
    }

    async fn put(&self, local_id: &str, remote_id: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(local_id.to_string(), remote_id.to_string());
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.entries.lock().unwrap().len() as u64)
    }
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(10))
}

async fn pipeline_with(service: MockKnowledgeService) -> (Arc<MockKnowledgeService>, AnswerPipeline) {
    let service = Arc::new(service);
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(MemoryStore::default()),
        service.clone(),
    ));
    registry
        .ensure_conversation("C01:1700.1", deadline())
        .await
        .unwrap();
    let pipeline = AnswerPipeline::new(registry, service.clone(), AskConfig::default());
    (service, pipeline)
}

#[tokio::test]
async fn test_single_citation_rewritten() {
    let (_service, pipeline) = pipeline_with(
        MockKnowledgeService::new()
            .with_document_name("file-1", "Paper.pdf")
            .with_reply(Message::assistant(
                "X is great. [cite:1]",
                vec![Annotation::new("[cite:1]", "file-1")],
            )),
    )
    .await;

    let answer = pipeline
        .ask("C01:1700.1", "be brief", "Is X great?", deadline())
        .await
        .unwrap();

    assert_eq!(answer.text, "X is great.  [1]\n\n---\n[1] Paper.pdf");
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].index, 1);
    assert_eq!(answer.citations[0].source_id, "file-1");
}

#[tokio::test]
async fn test_repeated_source_shares_ordinal() {
    let (service, pipeline) = pipeline_with(
        MockKnowledgeService::new()
            .with_document_name("file-a", "a.pdf")
            .with_document_name("file-b", "b.md")
            .with_reply(Message::assistant(
                "One (x) two (y) three (z)",
                vec![
                    Annotation::new("(x)", "file-a"),
                    Annotation::new("(y)", "file-b"),
                    Annotation::new("(z)", "file-a"),
                ],
            )),
    )
    .await;

    let answer = pipeline
        .ask("C01:1700.1", "", "question", deadline())
        .await
        .unwrap();

    assert_eq!(
        answer.text,
        "One  [1] two  [2] three  [1]\n\n---\n[1] a.pdf\n[2] b.md"
    );
    assert_eq!(service.name_lookups(), vec!["file-a", "file-b"]);
}

#[tokio::test]
async fn test_unresolvable_source_dropped_from_footer() {
    let (_service, pipeline) = pipeline_with(
        MockKnowledgeService::new()
            .with_document_name("file-1", "first.pdf")
            .with_document_name("file-3", "third.pdf")
            .with_reply(Message::assistant(
                "a [c1] b [c2] c [c3]",
                vec![
                    Annotation::new("[c1]", "file-1"),
                    Annotation::new("[c2]", "file-deleted"),
                    Annotation::new("[c3]", "file-3"),
                ],
            )),
    )
    .await;

    let answer = pipeline
        .ask("C01:1700.1", "", "question", deadline())
        .await
        .unwrap();

    assert_eq!(answer.citations.len(), 2);
    assert_eq!(
        answer.text,
        "a  [1] b  [2] c  [3]\n\n---\n[1] first.pdf\n[3] third.pdf"
    );
}

fn reply_citing_second_occurrence() -> Message {
    Message::assistant(
        "A [c] B [c]",
        vec![Annotation {
            start_index: Some(8),
            end_index: Some(11),
            ..Annotation::new("[c]", "file-1")
        }],
    )
}

#[tokio::test]
async fn test_installed_matcher_places_markers() {
    let (_service, literal) = pipeline_with(
        MockKnowledgeService::new()
            .with_document_name("file-1", "Paper.pdf")
            .with_reply(reply_citing_second_occurrence()),
    )
    .await;
    let answer = literal
        .ask("C01:1700.1", "", "question", deadline())
        .await
        .unwrap();
    assert_eq!(answer.text, "A  [1] B [c]\n\n---\n[1] Paper.pdf");

    let (_service, by_offset) = pipeline_with(
        MockKnowledgeService::new()
            .with_document_name("file-1", "Paper.pdf")
            .with_reply(reply_citing_second_occurrence()),
    )
    .await;
    let by_offset = by_offset.with_matcher(Box::new(OffsetMatcher));
    let answer = by_offset
        .ask("C01:1700.1", "", "question", deadline())
        .await
        .unwrap();
    assert_eq!(answer.text, "A [c] B  [1]\n\n---\n[1] Paper.pdf");
}

#[tokio::test]
async fn test_no_annotations_means_no_footer() {
    let (service, pipeline) = pipeline_with(
        MockKnowledgeService::new().with_reply(Message::assistant("I could not find that.", vec![])),
    )
    .await;

    let answer = pipeline
        .ask("C01:1700.1", "", "question", deadline())
        .await
        .unwrap();

    assert_eq!(answer.text, "I could not find that.");
    assert!(answer.citations.is_empty());
    assert!(service.name_lookups().is_empty());
}

#[tokio::test]
async fn test_name_cache_is_per_call() {
    let (service, pipeline) = pipeline_with(
        MockKnowledgeService::new()
            .with_document_name("file-1", "Paper.pdf")
            .with_reply(Message::assistant(
                "cited [c]",
                vec![Annotation::new("[c]", "file-1")],
            )),
    )
    .await;

    for _ in 0..2 {
        pipeline
            .ask("C01:1700.1", "", "again", deadline())
            .await
            .unwrap();
    }

    assert_eq!(service.name_lookups(), vec!["file-1", "file-1"]);
}

#[tokio::test]
async fn test_steps_run_in_order() {
    let (service, pipeline) = pipeline_with(
        MockKnowledgeService::new().with_reply(Message::assistant("ok", vec![])),
    )
    .await;

    pipeline
        .ask("C01:1700.1", "custom instructions", "hello", deadline())
        .await
        .unwrap();

    let calls = service.calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        &["post_message", "start_run", "list_messages"]
    );

    let posted = service.posted_messages();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].1, Role::User);
    assert_eq!(posted[0].2, "hello");

    let runs = service.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, "thread_1");
    assert_eq!(runs[0].1.instructions, "custom instructions");
    assert_eq!(runs[0].1.max_prompt_tokens, 100_000);
    assert_eq!(runs[0].1.max_completion_tokens, 30_000);
}

#[tokio::test]
async fn test_incomplete_run_reports_status() {
    for status in [RunStatus::Failed, RunStatus::Expired, RunStatus::Cancelled] {
        let (service, pipeline) = pipeline_with(
            MockKnowledgeService::new()
                .with_run_status(status)
                .with_reply(Message::assistant("never read", vec![])),
        )
        .await;

        let err = pipeline
            .ask("C01:1700.1", "", "question", deadline())
            .await
            .unwrap_err();

        match err {
            Error::RunIncomplete {
                conversation,
                status: reported,
                raw,
            } => {
                assert_eq!(conversation, "thread_1");
                assert_eq!(reported, status);
                assert!(raw.contains(status.as_str()));
            }
            other => panic!("Expected RunIncomplete, got {other:?}"),
        }
        assert!(!service.calls().contains(&"list_messages"));
    }
}

#[tokio::test]
async fn test_unknown_conversation_is_not_created() {
    let (service, pipeline) = pipeline_with(MockKnowledgeService::new()).await;

    let err = pipeline
        .ask("C99:never", "", "question", deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownConversation(ref id) if id == "C99:never"));
    assert_eq!(service.created_conversations(), 1);
    assert!(service.posted_messages().is_empty());
}

#[tokio::test]
async fn test_missing_assistant_reply_is_an_error() {
    let (_service, pipeline) = pipeline_with(MockKnowledgeService::new()).await;

    let err = pipeline
        .ask("C01:1700.1", "", "question", deadline())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Remote {
            operation: "list_messages",
            ..
        }
    ));
}

#[tokio::test]
async fn test_run_timeout() {
    let (_service, pipeline) = pipeline_with(
        MockKnowledgeService::new()
            .with_run_delay(Duration::from_secs(30))
            .with_reply(Message::assistant("late", vec![])),
    )
    .await;

    let err = pipeline
        .ask(
            "C01:1700.1",
            "",
            "question",
            Deadline::after(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "start_run timed out for thread_1");
}

#[tokio::test]
async fn test_summarize_uses_summary_prompt() {
    let (service, pipeline) = pipeline_with(
        MockKnowledgeService::new().with_reply(Message::assistant("A summary.", vec![])),
    )
    .await;

    let answer = pipeline
        .summarize("C01:1700.1", "attention.pdf", deadline())
        .await
        .unwrap();

    assert_eq!(answer.text, "A summary.");
    assert_eq!(
        service.posted_messages()[0].2,
        "Please provide a summary of this file: attention.pdf."
    );
    assert_eq!(service.runs()[0].1.instructions, SUMMARY_INSTRUCTIONS);
}
