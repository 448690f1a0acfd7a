use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::info;

use vcbot_core::config::Config;

/// Temporary voice channel bot for Discord.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the JSON stores (overrides DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vcbot_core::logging::init("vcbot")?;
    let args = Args::parse();

    let mut cfg = Config::load(args.token)?;
    if let Some(dir) = args.data_dir {
        cfg = cfg.with_data_dir(dir);
    }

    info!(
        prefix = %cfg.default_prefix,
        audit_log = %cfg.audit_log_path.display(),
        "starting vcbot"
    );

    vcbot_discord::router::run(Arc::new(cfg)).await
}
