use crate::client::Client;
use crate::command_parser::CommandParser;
use crate::config_handler::Config;
use crate::errors::{ArgumentError, ProtocolError};
use crate::keyspace::Db;
use crate::protocol_constants::*;
use crate::replica_registry::ReplicaRegistry;
use crate::replication_config::ReplicationConfig;
use crate::util::encode_error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::{error, info};

/// Accept loop. Each connection gets its own worker task; a connection
/// failure never takes the server down.
pub async fn serve(
    listener: TcpListener,
    db: Db,
    config: Config,
    replication_config: Arc<RwLock<ReplicationConfig>>,
    registry: ReplicaRegistry,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let db = db.clone();
                let config = config.clone();
                let replication_config = replication_config.clone();
                let registry = registry.clone();
                tokio::spawn(async move {
                    handle_client(stream, addr, db, config, replication_config, registry).await;
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

/// Per-connection worker: read one frame, dispatch, write the reply,
/// repeat. Usage errors keep the connection; framing errors end it.
pub async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    db: Db,
    config: Config,
    replication_config: Arc<RwLock<ReplicationConfig>>,
    registry: ReplicaRegistry,
) {
    let mut client = Client::new(stream);
    info!("client connected: {}", addr);

    loop {
        let tokens = match client.read_request().await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                info!("client disconnected: {}", addr);
                return;
            }
            Err(e) => {
                let reply = match e {
                    ProtocolError::NotAnArray => INVALID_FRAME_ERROR_RESPONSE.to_string(),
                    ref other => encode_error(&other.to_string()),
                };
                let _ = client.write_all(reply.as_bytes()).await;
                error!("closing {} on protocol error: {}", addr, e);
                return;
            }
        };

        let command = match CommandParser::parse_tokens(tokens) {
            Ok(command) => command,
            Err(ArgumentError::UnknownCommand(name)) => {
                info!("unknown command from {}: {}", addr, name);
                if client
                    .write_all(UNKNOWN_COMMAND_ERROR_RESPONSE.as_bytes())
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }
            Err(e) => {
                if client.write_all(encode_error(&e.to_string()).as_bytes()).await.is_err() {
                    return;
                }
                continue;
            }
        };

        if let Err(e) = command
            .handle_command(
                &client.get_writer(),
                &db,
                &config,
                &replication_config,
                &registry,
                addr,
            )
            .await
        {
            error!("failed to write reply to {}: {}", addr, e);
            return;
        }
    }
}
