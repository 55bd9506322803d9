use crate::keyspace::{Db, Keyspace};
use crate::rdb_parser::RdbParser;
use crate::replica_registry::ReplicaRegistry;
use crate::replication_client::start_replication;
use crate::replication_config::ReplicationConfig;
use clap::Parser;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

pub type Config = Arc<RwLock<HashMap<String, String>>>;

#[derive(Parser, Debug)]
#[command(name = "rudis", about = "In-memory key-value server with snapshots and replication")]
pub struct ServerArgs {
    /// Directory containing the snapshot file
    #[arg(long, default_value = ".redis/rdb/")]
    pub dir: String,

    /// Snapshot file name
    #[arg(long, default_value = "redis.rdb")]
    pub dbfilename: String,

    /// TCP listen port
    #[arg(long, default_value_t = 6379)]
    pub port: u16,

    /// Replicate from a primary, given as "<host> <port>"
    #[arg(long)]
    pub replicaof: Option<String>,
}

/// Startup orchestration: folds the flags into the shared config map, loads
/// the snapshot into the keyspace, and bootstraps the replication link when
/// the process runs as a replica.
pub struct ConfigHandler {
    db: Db,
    config: Config,
    replication_config: Arc<RwLock<ReplicationConfig>>,
}

impl ConfigHandler {
    pub fn new(
        db: Db,
        config: Config,
        replication_config: Arc<RwLock<ReplicationConfig>>,
    ) -> Self {
        Self { db, config, replication_config }
    }

    pub fn shared_config() -> Config {
        Arc::new(RwLock::new(HashMap::new()))
    }

    pub async fn load_config(&self, args: &ServerArgs) {
        let mut config = self.config.write().await;
        config.insert("dir".into(), args.dir.clone());
        config.insert("dbfilename".into(), args.dbfilename.clone());
        config.insert("port".into(), args.port.to_string());

        if let Some(replicaof) = &args.replicaof {
            let parts: Vec<&str> = replicaof.split_whitespace().collect();
            if parts.len() == 2 {
                config.insert("replica_of_host".into(), parts[0].into());
                config.insert("replica_of_port".into(), parts[1].into());
            } else {
                error!("--replicaof requires a host and port (e.g. 'localhost 6379')");
            }
        }
        info!("configuration loaded");
    }

    /// Loads the snapshot, if any, into the keyspace. A missing file is a
    /// clean start; a file that fails to decode is logged and ignored.
    pub async fn configure_db(&self) {
        let (dir, file_name) = {
            let config = self.config.read().await;
            (
                config.get("dir").cloned().unwrap_or_default(),
                config.get("dbfilename").cloned().unwrap_or_default(),
            )
        };
        if dir.is_empty() || file_name.is_empty() {
            return;
        }

        let path = Path::new(&dir).join(&file_name);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no snapshot file, starting empty");
                return;
            }
            Err(e) => {
                warn!(path = %path.display(), "cannot open snapshot: {}", e);
                return;
            }
        };

        let mut scratch = Keyspace::new();
        match RdbParser::new(BufReader::new(file), &mut scratch).parse().await {
            Ok(summary) => {
                let mut db = self.db.write().await;
                for (key, entry) in scratch.iter_for_snapshot() {
                    db.set(key.clone(), entry.clone());
                }
                info!(
                    path = %path.display(),
                    entries = summary.entries,
                    checksum_ok = summary.checksum_ok,
                    "snapshot loaded"
                );
            }
            Err(e) => {
                warn!(path = %path.display(), "snapshot decode failed, starting empty: {}", e);
            }
        }
    }

    /// When `--replicaof` was given: switch the role and run the
    /// replication link in its own task. A failed handshake leaves the
    /// process serving its own clients.
    pub async fn configure_replication(&self, registry: ReplicaRegistry) {
        let (host, port) = {
            let config = self.config.read().await;
            (
                config.get("replica_of_host").cloned().unwrap_or_default(),
                config.get("replica_of_port").cloned().unwrap_or_default(),
            )
        };
        if host.is_empty() || port.is_empty() {
            return;
        }
        let master_port = match port.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                error!("invalid --replicaof port: {}", port);
                return;
            }
        };

        self.replication_config
            .write()
            .await
            .set_replica_of(host.clone(), master_port);

        let listening_port = self.get_port().await;
        let db = self.db.clone();
        let config = self.config.clone();
        let replication_config = self.replication_config.clone();
        tokio::spawn(async move {
            if let Err(e) = start_replication(
                host,
                master_port,
                listening_port,
                db,
                config,
                replication_config,
                registry,
            )
            .await
            {
                error!("replication link failed: {:#}", e);
            }
        });
    }

    pub async fn get_port(&self) -> u16 {
        self.config
            .read()
            .await
            .get("port")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(6379)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdb_serializer::RdbSerializer;
    use crate::value_entry::ValueEntry;
    use bytes::Bytes;

    #[tokio::test]
    async fn missing_snapshot_is_a_clean_start() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Keyspace::shared();
        let config = ConfigHandler::shared_config();
        let handler = ConfigHandler::new(
            db.clone(),
            config,
            Arc::new(RwLock::new(ReplicationConfig::new())),
        );
        let args = ServerArgs {
            dir: tmp.path().to_str().unwrap().into(),
            dbfilename: "missing.rdb".into(),
            port: 6379,
            replicaof: None,
        };
        handler.load_config(&args).await;
        handler.configure_db().await;
        assert!(db.read().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_on_disk_is_loaded_at_startup() {
        let tmp = tempfile::tempdir().unwrap();
        let mut seed = Keyspace::new();
        seed.set(
            Bytes::from_static(b"foo"),
            ValueEntry::new_relative(Bytes::from_static(b"bar"), None),
        );
        let snapshot = RdbSerializer::serialize(&seed).unwrap();
        let path = tmp.path().join("dump.rdb");
        std::fs::write(&path, snapshot).unwrap();

        let db = Keyspace::shared();
        let config = ConfigHandler::shared_config();
        let handler = ConfigHandler::new(
            db.clone(),
            config,
            Arc::new(RwLock::new(ReplicationConfig::new())),
        );
        let args = ServerArgs {
            dir: tmp.path().to_str().unwrap().into(),
            dbfilename: "dump.rdb".into(),
            port: 6379,
            replicaof: None,
        };
        handler.load_config(&args).await;
        handler.configure_db().await;
        assert_eq!(db.write().await.get(b"foo"), Some(Bytes::from_static(b"bar")));
    }

    #[tokio::test]
    async fn undecodable_snapshot_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dump.rdb");
        std::fs::write(&path, b"NOTREDIS0011garbage").unwrap();

        let db = Keyspace::shared();
        let config = ConfigHandler::shared_config();
        let handler = ConfigHandler::new(
            db.clone(),
            config,
            Arc::new(RwLock::new(ReplicationConfig::new())),
        );
        let args = ServerArgs {
            dir: tmp.path().to_str().unwrap().into(),
            dbfilename: "dump.rdb".into(),
            port: 6379,
            replicaof: None,
        };
        handler.load_config(&args).await;
        handler.configure_db().await;
        assert!(db.read().await.is_empty());
    }
}
