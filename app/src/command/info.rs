use scholar_config::Config;
use scholar_core::util::mask_secret;
use scholar_core::{ConversationStore, DocumentStore};
use scholar_corpus::FileStore;
use scholar_session::SqliteConversationStore;
use tracing::info;

/// Prints configuration and local storage status.
///
/// Never contacts the remote service.
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        println!("=== scholar Configuration ===\n");

        println!("OpenAI:");
        let api_key = config
            .openai
            .api_key()
            .map_or_else(|_| "(not set)".to_string(), mask_secret);
        println!("  API Key: {api_key}");
        println!("  Base URL: {}", config.openai.base_url);
        println!("  Model: {}", config.openai.model);
        println!();

        println!("Assistant:");
        println!("  Name: {}", config.assistant.name);
        println!("  Vector Store: {}", config.assistant.vector_store_name);
        println!(
            "  Vector Store Expiry: {} days",
            config.assistant.vector_store_expiry_days
        );
        println!("  Temperature: {}", config.assistant.temperature);
        println!("  Max Search Results: {}", config.assistant.max_num_results);
        println!(
            "  Token Budget: {} prompt / {} completion",
            config.assistant.max_prompt_tokens, config.assistant.max_completion_tokens
        );
        println!();

        println!("Timeouts:");
        println!("  Request: {}s", config.timeouts.request_secs);
        println!("  Sync: {}s", config.timeouts.sync_secs);
        println!();

        println!("Storage:");
        let documents_dir = config.storage.documents_dir()?;
        println!("  Documents: {}", documents_dir.display());
        match FileStore::new(&documents_dir).list_names().await {
            Ok(names) => println!("  Document Count: {}", names.len()),
            Err(e) => println!("  Document Count: unavailable ({e})"),
        }

        let db_path = config.storage.database_path()?;
        println!("  Database: {}", db_path.display());
        if db_path.exists() {
            info!("Opening conversation store");
            match SqliteConversationStore::open(&db_path).await {
                Ok(store) => match store.count().await {
                    Ok(count) => println!("  Conversations: {count}"),
                    Err(e) => println!("  Conversations: unavailable ({e})"),
                },
                Err(e) => {
                    println!("  Status: Connection failed");
                    println!("  Error: {e}");
                }
            }
        } else {
            println!("  Conversations: 0 (database not created yet)");
        }

        Ok(())
    }
}
