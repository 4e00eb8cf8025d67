// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod process;
pub mod status;
pub mod supervisor;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::command::FileInbox;
use crate::config::ConfigFile;
use crate::config::duration::format_duration;
use crate::exec::OsProcessBackend;
use crate::fs::RealFileSystem;
use crate::status::FileOutbox;
use crate::supervisor::{Supervisor, shutdown_signal};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - the OS process backend
/// - the file-backed command inbox and status outbox
/// - the supervisor loop
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs, cfg: ConfigFile) -> Result<()> {
    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    info!(
        config = %args.config,
        status_file = %cfg.status_path().display(),
        command_file = %cfg.command_path().display(),
        "loaded configuration"
    );

    let inbox = Arc::new(FileInbox::new(RealFileSystem, cfg.command_path()));
    let outbox = Arc::new(FileOutbox::new(RealFileSystem, cfg.status_path()));
    let supervisor = Supervisor::new(&cfg, OsProcessBackend::new(), inbox, outbox);

    supervisor.run_until(shutdown_signal()).await;
    Ok(())
}

/// Simple dry-run output: print services, launch commands and timings.
fn print_dry_run(cfg: &ConfigFile) {
    let t = &cfg.timings;
    println!("shepherd dry-run");
    println!("  status_file = {}", cfg.status_path().display());
    println!("  command_file = {}", cfg.command_path().display());
    println!("  log_file = {}", cfg.log_path().display());
    println!("  status_interval = {}", format_duration(t.status_interval));
    println!("  command_poll_interval = {}", format_duration(t.command_poll_interval));
    println!("  startup_stagger = {}", format_duration(t.startup_stagger));
    println!("  restart_settle = {}", format_duration(t.restart_settle));
    println!("  stop_grace = {}", format_duration(t.stop_grace));
    println!(
        "  startup window = {} x {} = {}",
        t.startup_polls,
        format_duration(t.startup_poll_interval),
        format_duration(t.startup_window())
    );
    println!();

    println!("services ({}):", cfg.services.len());
    for svc in &cfg.services {
        let spec = cfg.launch_spec(svc);
        println!("  - {}", svc.name);
        println!("      cmd: {}", spec.display_command());
        if let Some(ref alias) = svc.alias {
            println!("      alias: {alias}");
        }
        if let Some(ref cwd) = spec.cwd {
            println!("      cwd: {}", cwd.display());
        }
        if !svc.autostart {
            println!("      autostart: false");
        }
    }

    debug!("dry-run complete (no processes started)");
}
