use scholar_core::Deadline;
use scholar_core::util::format_bytes;
use scholar_corpus::IngestOutcome;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct AddInput {
    pub path: PathBuf,
}

/// Copies one file into the document store and uploads it.
///
/// Files whose name is already stored are skipped.
#[derive(Debug, Clone, Copy)]
pub struct AddStrategy;

impl super::CommandStrategy for AddStrategy {
    type Input = AddInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let name = input
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", input.path.display()))?
            .to_string();
        let content = tokio::fs::read(&input.path).await?;
        info!(name = %name, size = %format_bytes(content.len() as u64), "Adding document");

        let services = super::Services::connect().await?;
        let deadline = Deadline::after(services.config.timeouts.request());

        match services.corpus.ingest(&name, &content, deadline).await? {
            IngestOutcome::Duplicate => println!("{name} already exists, skipped"),
            IngestOutcome::Uploaded(receipt) => println!(
                "Uploaded {name} as {} ({}, {})",
                receipt.file_id,
                format_bytes(receipt.usage_bytes),
                receipt.status
            ),
        }
        Ok(())
    }
}
