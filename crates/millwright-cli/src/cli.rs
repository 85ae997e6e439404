//! `run(days?)` CLI surface (spec §8 "Invocation").

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::info;

use crate::build;
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(name = "millwright", about = "Discrete-event factory floor simulator")]
pub struct Cli {
    /// Path to the TOML simulation document.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of simulated days to run before stopping. Defaults to the
    /// document's `[millwright] days`, and runs forever if neither is set.
    #[arg(long)]
    pub days: Option<f64>,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = millwright_config::load_config(self.config.as_deref())?;
        let days = self.days.or(config.millwright.days);
        let epoch = Utc::now();

        let simulation = build::build(&config, epoch)?;
        simulation.spawn_processes();

        let drive_clock = simulation.clock.clone();
        let driver = tokio::spawn(async move { drive_clock.drive().await });

        match days {
            Some(days) => {
                info!(days, "running for a fixed horizon");
                let deadline = Duration::from_secs_f64(days * 86_400.0);
                simulation.clock.timeout(deadline).await;
                info!("simulation horizon reached, shutting down");
                driver.abort();
            }
            None => {
                info!("running until no events remain pending");
                let _ = driver.await;
            }
        }

        Ok(())
    }
}
