use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use voxbridge::api::{self, ApiState};
use voxbridge::Config;

/// Voxbridge - telephony voice gateway for speech-to-speech AI
#[derive(Parser)]
#[command(name = "voxbridge", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "VOX_PORT", default_value = "8080")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "VOX_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voxbridge=info",
        1 => "info,voxbridge=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let state = ApiState::new(config);
    let registry = state.registry.clone();

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "voxbridge listening");

    tokio::select! {
        result = api::serve(listener, state) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down, ending active calls");
            registry.shutdown_all().await;
        }
    }
    Ok(())
}
