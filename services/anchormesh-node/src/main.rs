//! Standalone mesh node daemon.
//!
//! Joins the link-local mesh, announces itself until terminated, and logs
//! a periodic status line. Configuration comes from an optional TOML file
//! (`--config <path>`) with environment overrides on top.

use anchormesh_core::{logging, MeshConfig};
use anchormesh_mesh::MeshNode;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("anchormesh-node {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if std::env::var("ANCHORMESH_LOG_JSON").is_ok() {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match parse_config_path(&args)? {
        Some(path) => MeshConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MeshConfig::default(),
    }
    .apply_env();

    info!(
        name = %config.name,
        node_type = %config.node_type,
        zone = %config.zone,
        ego = config.ego_score,
        "starting anchormesh node"
    );

    let node = MeshNode::new(config);
    node.register().await?;

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await; // first tick fires immediately
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            _ = status.tick() => {
                info!(
                    is_anchor = node.is_anchor(),
                    anchor = node.anchor_id().as_deref().unwrap_or("none"),
                    peers = node.discover("*").len(),
                    health = ?node.health(),
                    "mesh status"
                );
            }
        }
    }

    node.close();
    Ok(())
}

fn parse_config_path(args: &[String]) -> Result<Option<PathBuf>> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            match iter.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("--config was provided without a path"),
            }
        }
    }
    Ok(None)
}
