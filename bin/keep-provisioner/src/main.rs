//! provision-keep-client prepares a keep client operator: it funds, stakes and
//! authorizes the operator account, then renders the client config.

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use keep_provision::{JsonRpcChainClient, ProvisionConfig, ProvisionError, Provisioner};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_status(&e));
        }
    };

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = e
                .downcast_ref::<ProvisionError>()
                .map(ProvisionError::kind)
                .unwrap_or("setup_failed");
            tracing::error!(kind, error = %format!("{:#}", e), "Provisioning failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Exit status for a command line that could not be parsed.
///
/// `--help` and `--version` succeed; every other parse error is a fatal
/// configuration failure and exits with 1 like any other failure.
fn usage_exit_status(error: &clap::Error) -> u8 {
    if error.use_stderr() { 1 } else { 0 }
}

async fn run(cli: Cli) -> Result<()> {
    // If a config file is provided, it replaces every other option.
    let config = match &cli.config {
        Some(path) => ProvisionConfig::load_from_file(path)?,
        None => cli.to_provision_config()?,
    };

    if let Some(path) = &cli.save_config {
        config.save_to_file(path)?;
    }

    let chain = JsonRpcChainClient::new(config.rpc_client_config()?)?;

    Provisioner::new(&config, &chain).run().await?;

    Ok(())
}
