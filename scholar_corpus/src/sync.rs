//! Corpus sync engine.
//!
//! Reconciliation is one-directional and keyed by document name: every local
//! name missing from the remote corpus is uploaded, nothing is ever deleted
//! remotely and content is not compared.

use scholar_core::util::format_bytes;
use scholar_core::{
    Deadline, DocumentStore, Error, IndexStatus, KnowledgeService, Result, UploadReceipt,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Uploads in flight at any one time.
pub const UPLOAD_CONCURRENCY: usize = 4;

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Documents found in the local store
    pub local: usize,
    /// Documents already present in the remote corpus
    pub remote: usize,
    /// Names uploaded by this sync, in completion order
    pub uploaded: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// A document with this name is already stored locally
    Duplicate,
    Uploaded(UploadReceipt),
}

pub struct CorpusSync {
    documents: Arc<dyn DocumentStore>,
    service: Arc<dyn KnowledgeService>,
}

impl CorpusSync {
    pub fn new(documents: Arc<dyn DocumentStore>, service: Arc<dyn KnowledgeService>) -> Self {
        Self { documents, service }
    }

    /// Upload every local document the remote corpus lacks.
    ///
    /// Waits for all dispatched uploads to finish. A failed upload does not
    /// stop its siblings; the first failure is returned once all are done.
    pub async fn sync(&self, deadline: Deadline) -> Result<SyncReport> {
        let local = self.documents.list_names().await?;
        let remote = deadline
            .run(
                "list_corpus_document_names",
                "corpus",
                self.service.list_corpus_document_names(),
            )
            .await?
            .map_err(|cause| Error::remote("list_corpus_document_names", "corpus", cause))?;

        let pending: Vec<String> = local
            .iter()
            .filter(|name| !remote.contains(name.as_str()))
            .cloned()
            .collect();

        info!(
            local = local.len(),
            remote = remote.len(),
            pending = pending.len(),
            "Reconciling corpus"
        );

        let mut report = SyncReport {
            local: local.len(),
            remote: remote.len(),
            uploaded: Vec::with_capacity(pending.len()),
        };

        let semaphore = Arc::new(Semaphore::new(UPLOAD_CONCURRENCY));
        let mut uploads = JoinSet::new();
        let mut names_by_task = HashMap::new();

        for name in pending {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let documents = Arc::clone(&self.documents);
            let service = Arc::clone(&self.service);

            let task_name = name.clone();
            let handle = uploads.spawn(async move {
                debug!(name = %name, "Uploading local document");
                let result = upload(documents.as_ref(), service.as_ref(), &name, deadline).await;
                drop(permit);
                result
            });
            names_by_task.insert(handle.id(), task_name);
        }

        let mut first_error = None;
        let mut failed = 0usize;
        while let Some(joined) = uploads.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (
                    e.id(),
                    Err(Error::Upload {
                        name: names_by_task.get(&e.id()).cloned().unwrap_or_default(),
                        cause: anyhow::anyhow!("upload task aborted: {e}"),
                    }),
                ),
            };
            let name = names_by_task.remove(&id).unwrap_or_default();

            match outcome {
                Ok(_) => report.uploaded.push(name),
                Err(e) => {
                    error!(name = %name, "Upload failed: {e}");
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(
            uploaded = report.uploaded.len(),
            failed, "Corpus sync finished"
        );

        first_error.map_or(Ok(report), Err)
    }

    /// Store a single document locally and upload it, unless the name is taken.
    pub async fn ingest(
        &self,
        name: &str,
        content: &[u8],
        deadline: Deadline,
    ) -> Result<IngestOutcome> {
        if self.documents.exists(name).await? {
            info!(name, "Document already exists, skipping");
            return Ok(IngestOutcome::Duplicate);
        }

        self.documents.store(name, content).await?;
        let receipt = upload(
            self.documents.as_ref(),
            self.service.as_ref(),
            name,
            deadline,
        )
        .await?;

        Ok(IngestOutcome::Uploaded(receipt))
    }
}

/// Read one document and upload it, polling until indexing ends.
async fn upload(
    documents: &dyn DocumentStore,
    service: &dyn KnowledgeService,
    name: &str,
    deadline: Deadline,
) -> Result<UploadReceipt> {
    let content = documents.read(name).await?;

    let receipt = deadline
        .run("upload_document", name, service.upload_document(name, content))
        .await?
        .map_err(|cause| Error::Upload {
            name: name.to_string(),
            cause,
        })?;

    if receipt.status != IndexStatus::Completed {
        return Err(Error::Upload {
            name: name.to_string(),
            cause: anyhow::anyhow!("indexing ended as {}", receipt.status),
        });
    }

    info!(
        name,
        size = %format_bytes(receipt.usage_bytes),
        status = %receipt.status,
        "Document uploaded"
    );

    Ok(receipt)
}
