//! Static strategy pattern for CLI commands.
//!
//! Each command is its own strategy type with its own input, dispatched
//! statically from `main`.

use scholar_config::Config;
use scholar_conversation::{AnswerPipeline, AskConfig};
use scholar_corpus::{CorpusSync, FileStore};
use scholar_providers::{OpenAIProvider, OpenAISettings};
use scholar_session::{SessionRegistry, SqliteConversationStore};
use std::sync::Arc;
use tracing::info;

mod add;
mod ask;
mod info;
mod init;
mod sync;
mod version;

pub use add::{AddInput, AddStrategy};
pub use ask::{AskInput, AskStrategy};
pub use info::InfoStrategy;
pub use init::InitStrategy;
pub use sync::SyncStrategy;
pub use version::VersionStrategy;

/// Contract shared by all command strategies.
pub trait CommandStrategy: Send + Sync + 'static {
    type Input;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}

/// Components wired together for commands that talk to the service.
struct Services {
    config: Config,
    registry: Arc<SessionRegistry>,
    corpus: CorpusSync,
    pipeline: AnswerPipeline,
}

impl Services {
    /// Load config, open local stores and bootstrap the remote assistant.
    async fn connect() -> anyhow::Result<Self> {
        let config = Config::load()?;

        let settings = OpenAISettings {
            api_key: config.openai.api_key()?.to_string(),
            base_url: config.openai.base_url.clone(),
            model: config.openai.model.clone(),
            assistant_name: config.assistant.name.clone(),
            temperature: config.assistant.temperature,
            max_num_results: config.assistant.max_num_results,
            vector_store_name: config.assistant.vector_store_name.clone(),
            vector_store_expiry_days: config.assistant.vector_store_expiry_days,
            poll_interval: config.assistant.poll_interval(),
        };

        let data_dir = config.storage.data_dir()?;
        tokio::fs::create_dir_all(&data_dir).await?;
        info!("Data directory: {}", data_dir.display());

        let documents = Arc::new(FileStore::open(config.storage.documents_dir()?).await?);
        let conversations =
            Arc::new(SqliteConversationStore::open(&config.storage.database_path()?).await?);
        let service = Arc::new(OpenAIProvider::connect(&settings).await?);

        let registry = Arc::new(SessionRegistry::new(conversations, service.clone()));
        let corpus = CorpusSync::new(documents, service.clone());
        let pipeline = AnswerPipeline::new(
            registry.clone(),
            service,
            AskConfig {
                max_prompt_tokens: config.assistant.max_prompt_tokens,
                max_completion_tokens: config.assistant.max_completion_tokens,
            },
        );

        Ok(Self {
            config,
            registry,
            corpus,
            pipeline,
        })
    }
}

fn print_sync_report(report: &scholar_corpus::SyncReport) {
    println!(
        "Local documents: {}, already remote: {}, uploaded: {}",
        report.local,
        report.remote,
        report.uploaded.len()
    );
    for name in &report.uploaded {
        println!("  + {name}");
    }
}
