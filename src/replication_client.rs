use crate::client::Client;
use crate::command_parser::CommandParser;
use crate::config_handler::Config;
use crate::keyspace::{Db, Keyspace};
use crate::protocol_constants::*;
use crate::rdb_parser::RdbParser;
use crate::replica_registry::ReplicaRegistry;
use crate::replication_config::ReplicationConfig;
use crate::util::construct_redis_command;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Replica side of the replication link: run the four-step handshake, load
/// the snapshot payload, then consume the primary's command stream forever,
/// applying each write with replies suppressed.
pub async fn start_replication(
    master_host: String,
    master_port: u16,
    listening_port: u16,
    db: Db,
    config: Config,
    replication_config: Arc<RwLock<ReplicationConfig>>,
    registry: ReplicaRegistry,
) -> Result<()> {
    let master_addr = format!("{}:{}", master_host, master_port);
    let stream = TcpStream::connect(&master_addr)
        .await
        .with_context(|| format!("failed to connect to master at {}", master_addr))?;
    let mut master = Client::new(stream);

    handshake(&mut master, listening_port).await?;
    load_snapshot_payload(&mut master, &db).await?;
    info!("replication link to {} established", master_addr);

    consume_command_stream(master, db, config, replication_config, registry).await;
    Ok(())
}

async fn handshake(master: &mut Client, listening_port: u16) -> Result<()> {
    send_command(master, &[PING_COMMAND]).await?;
    expect_simple(master, "PONG").await?;

    let port = listening_port.to_string();
    send_command(master, &[REPLCONF_COMMAND, "listening-port", &port]).await?;
    expect_simple(master, "OK").await?;

    send_command(master, &[REPLCONF_COMMAND, "capa", "psync2"]).await?;
    expect_simple(master, "OK").await?;

    send_command(master, &[PSYNC_COMMAND, "?", "-1"]).await?;
    let reply = master.read_reply_line().await?;
    if !reply.starts_with(&format!("{}FULLRESYNC", SIMPLE_STRING_PREFIX)) {
        bail!("expected FULLRESYNC from master, got {:?}", reply);
    }
    info!("master replied {}", reply.trim_start_matches('+'));
    Ok(())
}

/// Reads the `$<n>`-framed snapshot that follows FULLRESYNC and merges it
/// into the keyspace. A payload that fails to decode is logged and skipped;
/// the live command stream is what converges the replica.
async fn load_snapshot_payload(master: &mut Client, db: &Db) -> Result<()> {
    let payload = master
        .read_snapshot_payload()
        .await
        .context("failed to read snapshot payload from master")?;
    info!(bytes = payload.len(), "received full-resync snapshot");

    let mut scratch = Keyspace::new();
    match RdbParser::new(payload.as_slice(), &mut scratch).parse().await {
        Ok(summary) => {
            let mut db = db.write().await;
            for (key, entry) in scratch.iter_for_snapshot() {
                db.set(key.clone(), entry.clone());
            }
            info!(entries = summary.entries, "snapshot payload loaded");
        }
        Err(e) => warn!("discarding undecodable snapshot payload: {}", e),
    }
    Ok(())
}

async fn consume_command_stream(
    mut master: Client,
    db: Db,
    config: Config,
    replication_config: Arc<RwLock<ReplicationConfig>>,
    registry: ReplicaRegistry,
) {
    loop {
        match master.read_request().await {
            Ok(Some(tokens)) => {
                let command = match CommandParser::parse_tokens(tokens) {
                    Ok(command) => command,
                    Err(e) => {
                        warn!("ignoring unparsable command from master: {}", e);
                        continue;
                    }
                };
                // replies are discarded on the replication connection
                if let Err(e) = command
                    .execute(&db, &config, &replication_config, &registry)
                    .await
                {
                    warn!("command from master failed: {}", e);
                }
            }
            Ok(None) => {
                info!("master closed the replication connection");
                return;
            }
            Err(e) => {
                error!("replication stream error: {}", e);
                return;
            }
        }
    }
}

async fn send_command(master: &Client, args: &[&str]) -> Result<()> {
    master
        .write_all(construct_redis_command(args).as_bytes())
        .await
        .context("failed to send handshake command to master")
}

async fn expect_simple(master: &mut Client, expected: &str) -> Result<()> {
    let reply = master.read_reply_line().await?;
    if reply != format!("{}{}", SIMPLE_STRING_PREFIX, expected) {
        bail!("unexpected handshake reply from master: {:?}", reply);
    }
    Ok(())
}
