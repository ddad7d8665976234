use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use svcgate::{execute, Args, Config, Outcome};
use tracing::error;

/// Exit status for a finished run: the gate's verdict, or `1` for setup errors
fn exit_status(result: &anyhow::Result<Outcome>) -> u8 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(_) => 1,
    }
}

async fn run(args: Args) -> anyhow::Result<Outcome> {
    let config = Config::load(args).context("invalid configuration")?;
    let outcome = execute(&config)
        .await
        .context("gate could not start")?;
    Ok(outcome)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    let result = run(args).await;

    if let Err(e) = &result {
        error!("Service check failed: {:#}", e);
    }

    ExitCode::from(exit_status(&result))
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
