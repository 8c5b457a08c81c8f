//! CredParse CLI - Main entry point

use clap::Parser;
use credparse_cli::error::{EXIT_FAILURE, EXIT_INTERRUPTED};
use credparse_cli::summary::summary_lines;
use credparse_cli::Cli;
use credparse_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use credparse_ingest::pipeline::{Pipeline, RunSummary};
use std::process;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    // Verbosity flag sets the baseline; environment variables take precedence
    let log_config = LogConfig::builder()
        .level(LogLevel::from_verbosity(cli.verbose))
        .output(LogOutput::Console)
        .log_file_prefix("credparse")
        .build();
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The parser works without logging, so a failed init is not fatal
    let guard = init_logging(&log_config).ok();

    let code = match run(&cli).await {
        Ok(summary) if summary.is_success() => 0,
        Ok(_) => EXIT_FAILURE,
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("Error: {e}");
            e.exit_code()
        },
    };

    drop(guard);
    process::exit(code);
}

async fn run(cli: &Cli) -> credparse_cli::Result<RunSummary> {
    let config = cli.to_run_config()?;

    let token = CancellationToken::new();
    tokio::spawn(handle_interrupts(token.clone()));

    let summary = Pipeline::new(config)
        .with_cancellation(token)
        .run(&cli.files)
        .await?;

    for line in summary_lines(&summary) {
        eprintln!("{line}");
    }
    Ok(summary)
}

/// First Ctrl+C stops workers after their current line; a second exits at once
async fn handle_interrupts(token: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    warn!("Received Ctrl+C, stopping after the current line (press again to exit immediately)");
    token.cancel();

    if signal::ctrl_c().await.is_ok() {
        eprintln!("Interrupted");
        process::exit(EXIT_INTERRUPTED);
    }
}
