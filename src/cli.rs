use std::path::PathBuf;

use clap::Parser;

/// Command-line overrides for the probe. The process has a single implicit
/// run mode with no subcommands; these flags only let an operator override
/// where configuration is read from without touching the environment.
#[derive(Parser, Debug)]
#[command(name = "mqd-probe")]
#[command(about = "Federated open-banking data-quality probe", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file. Overrides `MQD_CONFIG`.
    #[arg(long)]
    pub config: Option<PathBuf>,
}
