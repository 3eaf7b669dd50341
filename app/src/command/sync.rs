use scholar_core::Deadline;

/// Uploads every local document the remote corpus does not have yet.
#[derive(Debug, Clone, Copy)]
pub struct SyncStrategy;

impl super::CommandStrategy for SyncStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let services = super::Services::connect().await?;

        let deadline = Deadline::after(services.config.timeouts.sync());
        let report = services.corpus.sync(deadline).await?;

        super::print_sync_report(&report);
        Ok(())
    }
}
