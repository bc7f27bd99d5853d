use std::process;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clouddity::cli::{format_task_list, Cli};
use clouddity::config::load_cluster_file;
use clouddity::tasks::{handle_interrupts, TaskContext, TaskRegistry};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let registry = TaskRegistry::standard();

    if cli.list_tasks {
        print!("{}", format_task_list(&registry.list()));
        return;
    }

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let config_path = cli.config_path();
    let config = match load_cluster_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(
                "Failed to load cluster design {}: {}",
                config_path.display(),
                e
            );
            process::exit(1);
        }
    };
    info!(
        "Loaded cluster '{}' ({} node types, {} security groups)",
        config.cluster,
        config.node_types.len(),
        config.security_groups.len()
    );

    let cancel = CancellationToken::new();
    let ctx = match TaskContext::from_config(config) {
        Ok(ctx) => ctx
            .with_selection(cli.selection())
            .with_policy(cli.policy)
            .with_timeout(cli.action_timeout())
            .with_cancellation(cancel.clone()),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    // Ctrl-C stops the fan-out before the next item, a second one exits
    tokio::spawn(async move {
        let interrupted = || async { tokio::signal::ctrl_c().await.is_ok() };
        if handle_interrupts(interrupted, cancel).await {
            process::exit(130);
        }
    });

    // Presence is enforced by clap unless --list-tasks was given
    let Some(task) = cli.task.as_deref() else {
        process::exit(2);
    };

    match registry.run(task, &ctx).await {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("Task '{}' failed: {}", task, e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
