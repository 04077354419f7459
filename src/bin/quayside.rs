//! Quayside server binary
//!
//! Exit codes: 0 normal shutdown, 1 configuration error, 2 store
//! unreachable, 3 position feed unreachable at startup with `--require-ais`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use quayside::clock::SystemClock;
use quayside::config::AppConfig;
use quayside::Engine;

#[derive(Debug, Parser)]
#[command(name = "quayside", version, about = "Port berth planning and allocation engine")]
struct Cli {
    /// Configuration file (TOML); defaults and env overrides apply
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Fail startup when the AIS feed is unreachable
    #[arg(long)]
    require_ais: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return 1;
        }
    };
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }

    init_tracing(&config);

    let engine = match Engine::new(config, Arc::new(SystemClock)) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "store unavailable");
            return 2;
        }
    };

    if cli.require_ais {
        if let Err(e) = engine.ingestor.probe().await {
            error!(error = %e, "position feed unreachable at startup");
            return 3;
        }
    }

    let handles = engine.spawn_background();
    let serving = quayside::api::serve(engine.clone(), async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    });

    let code = match serving.await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "server error");
            2
        }
    };

    engine.shutdown();
    for handle in handles {
        let _ = handle.await;
    }
    info!("stopped");
    code
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
