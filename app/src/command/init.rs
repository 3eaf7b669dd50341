use scholar_config::Config;

/// Writes the configuration template to `~/scholar/config.json`.
#[derive(Debug, Clone, Copy)]
pub struct InitStrategy;

impl super::CommandStrategy for InitStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config_path = Config::create_config()?;

        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Next steps:");
        println!("   1. Edit the config file and add your OpenAI API key (or export OPENAI_API_KEY)");
        println!("   2. Put documents into <data_dir>/documents");
        println!("   3. Run 'scholar sync' to upload them");
        println!();
        Ok(())
    }
}
