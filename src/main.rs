// src/main.rs

use std::path::PathBuf;

use shepherd::config::load_and_validate;
use shepherd::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("shepherd error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let cfg = load_and_validate(&PathBuf::from(&args.config))?;

    let log_file = (!args.dry_run).then(|| cfg.log_path());
    logging::init_logging(args.log_level, log_file.as_deref())?;

    run(args, cfg).await
}
