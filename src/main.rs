mod client;
mod command;
mod command_parser;
mod config_handler;
mod errors;
mod handler;
mod keyspace;
mod length_encoding;
mod protocol_constants;
mod rdb_parser;
mod rdb_serializer;
mod replica_registry;
mod replication_client;
mod replication_config;
mod util;
mod value_entry;

use crate::config_handler::{ConfigHandler, ServerArgs};
use crate::keyspace::Keyspace;
use crate::replica_registry::ReplicaRegistry;
use crate::replication_config::ReplicationConfig;
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = ServerArgs::parse();

    let db = Keyspace::shared();
    let config = ConfigHandler::shared_config();
    let replication_config = Arc::new(RwLock::new(ReplicationConfig::new()));
    let registry = ReplicaRegistry::new();

    let config_handler =
        ConfigHandler::new(db.clone(), config.clone(), replication_config.clone());
    config_handler.load_config(&args).await;
    config_handler.configure_db().await;
    config_handler.configure_replication(registry.clone()).await;

    let port = config_handler.get_port().await;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("failed to bind to port {}", port))?;
    info!(
        role = replication_config.read().await.get_role(),
        "listening on 0.0.0.0:{}", port
    );

    handler::serve(listener, db, config, replication_config, registry).await;
    Ok(())
}
