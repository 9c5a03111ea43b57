//! # meshbook-node
//!
//! Runs one meshbook node:
//!
//! ```text
//! meshbook-node [config.toml]
//! ```
//!
//! Startup order: config → logging → database → identity → overlay →
//! services → channel rejoin. Runs until Ctrl-C, then closes the overlay.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use meshbook_identity::NodeIdentity;
use meshbook_p2p::{Overlay, OverlayNode};
use meshbook_service::{ChannelService, OrderService};
use meshbook_storage::{SledStorage, Storage};
use meshbook_types::constants::{NODE_NAME, VERSION};
use meshbook_types::{NodeConfig, Result};

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match NodeConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{NODE_NAME}: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&config.log) {
        eprintln!("{NODE_NAME}: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "node stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    info!(version = VERSION, database = %config.database_path.display(), "starting {NODE_NAME}");

    std::fs::create_dir_all(&config.database_path)?;
    let storage: Arc<dyn Storage> = Arc::new(SledStorage::open(&config.database_path)?);
    let identity = NodeIdentity::load_or_generate(storage.as_ref())?;

    let overlay = Arc::new(OverlayNode::new(config.p2p.clone(), identity.keypair().clone()));
    overlay.run().await?;

    let orders = Arc::new(OrderService::new(
        storage.clone(),
        overlay.clone(),
        identity.signing_secret()?,
    ));
    overlay.add_receiver(orders);

    let channels = ChannelService::new(storage, overlay.clone());
    channels.rejoin_all()?;
    for pair in &config.join {
        if let Err(e) = channels.join(&pair.asset, &pair.counter_asset) {
            warn!(pair = %pair, error = %e, "could not join configured channel");
        }
    }

    info!(peer = %overlay.host_id(), "node ready");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    overlay.close().await;
    Ok(())
}
