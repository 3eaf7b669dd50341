use scholar_core::Deadline;
use scholar_core::prompt::{ASSISTANT_INSTRUCTIONS, MENTION_INSTRUCTIONS, mention_prompt};
use tracing::info;

#[derive(Debug, Clone)]
pub struct AskInput {
    /// Local conversation id
    pub conversation: String,
    /// Document to summarize instead of asking
    pub summary: Option<String>,
    /// User the answer is addressed to
    pub user: Option<String>,
    pub question: String,
}

/// Syncs the corpus, then answers in the given conversation.
#[derive(Debug, Clone, Copy)]
pub struct AskStrategy;

impl super::CommandStrategy for AskStrategy {
    type Input = AskInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        if input.summary.is_none() && input.question.trim().is_empty() {
            anyhow::bail!("Nothing to ask: pass a question or --summary <document>");
        }

        let services = super::Services::connect().await?;

        let report = services
            .corpus
            .sync(Deadline::after(services.config.timeouts.sync()))
            .await?;
        info!(uploaded = report.uploaded.len(), "Startup sync finished");

        let deadline = Deadline::after(services.config.timeouts.request());
        if services
            .registry
            .ensure_conversation(&input.conversation, deadline)
            .await?
        {
            info!(conversation = %input.conversation, "Started new conversation");
        }

        let deadline = Deadline::after(services.config.timeouts.request());
        let answer = match (&input.summary, &input.user) {
            (Some(document), _) => {
                services
                    .pipeline
                    .summarize(&input.conversation, document, deadline)
                    .await?
            }
            (None, Some(user)) => {
                let text = mention_prompt(&input.question, "cli", &input.conversation, user);
                services
                    .pipeline
                    .ask(&input.conversation, MENTION_INSTRUCTIONS, &text, deadline)
                    .await?
            }
            (None, None) => {
                services
                    .pipeline
                    .ask(
                        &input.conversation,
                        ASSISTANT_INSTRUCTIONS,
                        &input.question,
                        deadline,
                    )
                    .await?
            }
        };

        println!("{}", answer.text);
        Ok(())
    }
}
