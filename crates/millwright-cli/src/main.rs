use clap::Parser;
use millwright_cli::{telemetry, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let cli = Cli::parse();
    cli.run().await?;
    Ok(())
}
