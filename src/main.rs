use anyhow::Context;
use clap::{Parser, Subcommand};
use packsync::{install_pack, ExpectedHash, InstallConfig, Side};
use std::path::PathBuf;
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "packsync")]
#[command(about = "Install and update packwiz modpacks from their pack.toml", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install or update a pack
    #[command(visible_alias = "i")]
    Install {
        /// URL of the pack's pack.toml
        url: Url,

        /// Directory to install the pack into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Hash of pack.toml as <format>:<hash>, e.g. "sha256:abc012..."
        #[arg(long)]
        hash: Option<ExpectedHash>,

        /// Side to install files for: client, server, or both
        #[arg(short = 'g', long = "side", default_value = "both")]
        side: Side,

        /// Maximum number of concurrent tasks (default: number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("packsync={}", log_level))
        .init();

    match args.command {
        Command::Install {
            url,
            dir,
            hash,
            side,
            jobs,
        } => {
            let mut config = InstallConfig::default();
            if let Some(jobs) = jobs {
                config.max_concurrent_tasks = jobs.max(1);
            }

            info!("🚀 Packsync");
            info!("URL: {}", url);
            info!("Dir: {}", dir.display());

            let updates = install_pack(&config, url.clone(), hash, &dir, side)
                .await
                .with_context(|| format!("failed to install {}", url))?;

            println!("{}", updates);
            println!("Done.");
            Ok(())
        }
    }
}
