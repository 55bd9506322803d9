use crate::config_handler::Config;
use crate::keyspace::Db;
use crate::protocol_constants::*;
use crate::rdb_serializer::RdbSerializer;
use crate::replica_registry::{ReplicaHandle, ReplicaRegistry};
use crate::replication_config::{ReplicationConfig, ROLE_MASTER};
use crate::util::{encode_array_of_bulks, encode_bulk, encode_simple};
use crate::value_entry::ValueEntry;
use bytes::Bytes;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

#[derive(Debug)]
pub enum Command {
    Ping,
    Echo(Bytes),
    Get(Bytes),
    Set { key: Bytes, value: Bytes, px: Option<i64>, ex: Option<i64> },
    Config(ConfigCommand),
    Keys,
    Save,
    Info(String),
    ReplConf(Vec<String>),
    Psync(Vec<String>),
}

#[derive(Debug)]
pub enum ConfigCommand {
    Get(String),
}

pub enum CommandResponse {
    Simple(String),
    Bulk(Bytes),
    NullBulk,
    Array(Vec<Bytes>),
    /// `$<n>\r\n` followed by the raw bytes, with no trailing CRLF. Only the
    /// full-resync snapshot transfer uses this shape.
    SnapshotPayload(Vec<u8>),
}

impl Command {
    pub async fn handle_command(
        &self,
        writer: &Arc<Mutex<OwnedWriteHalf>>,
        db: &Db,
        config: &Config,
        replication_config: &Arc<RwLock<ReplicationConfig>>,
        registry: &ReplicaRegistry,
        peer_addr: SocketAddr,
    ) -> std::io::Result<()> {
        match self.execute(db, config, replication_config, registry).await {
            Ok(responses) => {
                {
                    let mut writer = writer.lock().await;
                    for response in responses {
                        match response {
                            CommandResponse::Simple(text) => {
                                writer.write_all(text.as_bytes()).await?;
                            }
                            CommandResponse::Bulk(data) => {
                                writer.write_all(&encode_bulk(&data)).await?;
                            }
                            CommandResponse::NullBulk => {
                                writer.write_all(NULL_BULK_RESPONSE.as_bytes()).await?;
                            }
                            CommandResponse::Array(items) => {
                                let header =
                                    format!("{}{}{}", ARRAY_PREFIX, items.len(), CRLF);
                                writer.write_all(header.as_bytes()).await?;
                                for item in items {
                                    writer.write_all(&encode_bulk(&item)).await?;
                                }
                            }
                            CommandResponse::SnapshotPayload(data) => {
                                let header =
                                    format!("{}{}{}", BULK_STRING_PREFIX, data.len(), CRLF);
                                writer.write_all(header.as_bytes()).await?;
                                writer.write_all(&data).await?;
                            }
                        }
                    }
                    writer.flush().await?;
                }

                // A completed PSYNC turns this connection into a fan-out
                // sink. Registration waits until the FULLRESYNC reply and
                // snapshot payload are on the wire so no forwarded frame can
                // land inside the handshake.
                if matches!(self, Command::Psync(_)) {
                    registry
                        .register(ReplicaHandle {
                            addr: peer_addr,
                            writer: Arc::clone(writer),
                        })
                        .await;
                }
            }
            Err(e) => {
                let mut writer = writer.lock().await;
                writer
                    .write_all(format!("-ERR {}{}", e, CRLF).as_bytes())
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn execute(
        &self,
        db: &Db,
        config: &Config,
        replication_config: &Arc<RwLock<ReplicationConfig>>,
        registry: &ReplicaRegistry,
    ) -> Result<Vec<CommandResponse>, String> {
        match self {
            Command::Ping => Ok(vec![CommandResponse::Simple(PONG_RESPONSE.into())]),
            Command::Echo(message) => Ok(vec![CommandResponse::Bulk(message.clone())]),
            Command::Get(key) => {
                let mut db = db.write().await;
                Ok(vec![match db.get(key) {
                    Some(value) => CommandResponse::Bulk(value),
                    None => CommandResponse::NullBulk,
                }])
            }
            Command::Set { key, value, px, ex } => {
                self.execute_set(key, value, *px, *ex, db, replication_config, registry)
                    .await
            }
            Command::Config(command) => Ok(vec![Self::execute_config(command, config).await]),
            Command::Keys => Ok(vec![Self::execute_keys(db).await]),
            Command::Save => Self::execute_save(db, config).await,
            Command::Info(section) => Ok(vec![
                Self::execute_info(section, replication_config).await,
            ]),
            Command::ReplConf(_) => Ok(vec![CommandResponse::Simple(OK_RESPONSE.into())]),
            Command::Psync(args) => Self::execute_psync(args, replication_config).await,
        }
    }

    /// The frame this command arrived as, rebuilt from its parsed tokens.
    /// Fan-out forwards these bytes verbatim to every replica.
    pub fn to_frame(&self) -> Option<Vec<u8>> {
        match self {
            Command::Set { key, value, px, ex } => {
                let mut tokens = vec![
                    Bytes::from_static(SET_COMMAND.as_bytes()),
                    key.clone(),
                    value.clone(),
                ];
                if let Some(ms) = px {
                    tokens.push(Bytes::from_static(PX_OPTION.as_bytes()));
                    tokens.push(Bytes::from(ms.to_string()));
                }
                if let Some(s) = ex {
                    tokens.push(Bytes::from_static(EX_OPTION.as_bytes()));
                    tokens.push(Bytes::from(s.to_string()));
                }
                Some(encode_array_of_bulks(&tokens))
            }
            _ => None,
        }
    }

    async fn execute_set(
        &self,
        key: &Bytes,
        value: &Bytes,
        px: Option<i64>,
        ex: Option<i64>,
        db: &Db,
        replication_config: &Arc<RwLock<ReplicationConfig>>,
        registry: &ReplicaRegistry,
    ) -> Result<Vec<CommandResponse>, String> {
        let expiration_ms = match (px, ex) {
            (Some(ms), _) => Some(ms),
            (None, Some(s)) => Some(s.saturating_mul(1000)),
            _ => None,
        };

        {
            let mut db = db.write().await;
            db.set(
                key.clone(),
                ValueEntry::new_relative(value.clone(), expiration_ms),
            );
        }

        let role = replication_config.read().await.get_role().to_string();
        if role == ROLE_MASTER {
            if let Some(frame) = self.to_frame() {
                registry.propagate(&frame).await;
            }
        }

        Ok(vec![CommandResponse::Simple(OK_RESPONSE.into())])
    }

    async fn execute_config(command: &ConfigCommand, config: &Config) -> CommandResponse {
        match command {
            ConfigCommand::Get(name) => {
                let config = config.read().await;
                match config.get(name.as_str()) {
                    Some(value) => CommandResponse::Array(vec![
                        Bytes::from(name.clone()),
                        Bytes::from(value.clone()),
                    ]),
                    None => CommandResponse::NullBulk,
                }
            }
        }
    }

    async fn execute_keys(db: &Db) -> CommandResponse {
        let db = db.read().await;
        if db.is_empty() {
            return CommandResponse::Simple(EMPTY_KEYS_ERROR_RESPONSE.into());
        }
        CommandResponse::Array(db.keys())
    }

    async fn execute_save(
        db: &Db,
        config: &Config,
    ) -> Result<Vec<CommandResponse>, String> {
        let (dir, file_name) = {
            let config = config.read().await;
            (
                config.get("dir").cloned().unwrap_or_default(),
                config.get("dbfilename").cloned().unwrap_or_default(),
            )
        };

        let snapshot = {
            let db = db.read().await;
            RdbSerializer::serialize(&db).map_err(|e| e.to_string())?
        };
        let path = Path::new(&dir).join(&file_name);
        tokio::fs::write(&path, &snapshot)
            .await
            .map_err(|e| format!("failed to write snapshot: {}", e))?;

        info!(path = %path.display(), bytes = snapshot.len(), "snapshot saved");
        Ok(vec![CommandResponse::Simple(encode_simple(&format!(
            "File Saved in file {} at {}",
            file_name, dir
        )))])
    }

    async fn execute_info(
        section: &str,
        replication_config: &Arc<RwLock<ReplicationConfig>>,
    ) -> CommandResponse {
        if section.eq_ignore_ascii_case("replication") {
            let info = replication_config.read().await.get_info();
            CommandResponse::Bulk(Bytes::from(info))
        } else {
            CommandResponse::NullBulk
        }
    }

    async fn execute_psync(
        args: &[String],
        replication_config: &Arc<RwLock<ReplicationConfig>>,
    ) -> Result<Vec<CommandResponse>, String> {
        let requested_offset: i64 = args
            .get(1)
            .and_then(|offset| offset.parse::<i64>().ok())
            .unwrap_or(-1);

        let replication_config = replication_config.read().await;
        let master_replid = replication_config.get_master_replid().to_string();
        let master_offset = replication_config.get_master_repl_offset();
        drop(replication_config);

        if requested_offset >= 0 && requested_offset as u64 >= master_offset {
            return Err("partial resync is not supported".into());
        }

        // The payload is a real serialization of an empty keyspace; the
        // replica converges through the live command stream that follows.
        let snapshot = RdbSerializer::empty_snapshot().map_err(|e| e.to_string())?;
        Ok(vec![
            CommandResponse::Simple(format!(
                "{}FULLRESYNC {} {}{}",
                SIMPLE_STRING_PREFIX, master_replid, master_offset, CRLF
            )),
            CommandResponse::SnapshotPayload(snapshot),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_handler::ConfigHandler;
    use crate::keyspace::Keyspace;

    fn test_context() -> (Db, Config, Arc<RwLock<ReplicationConfig>>, ReplicaRegistry) {
        let config = ConfigHandler::shared_config();
        (
            Keyspace::shared(),
            config,
            Arc::new(RwLock::new(ReplicationConfig::new())),
            ReplicaRegistry::new(),
        )
    }

    async fn single_response(
        command: Command,
        ctx: &(Db, Config, Arc<RwLock<ReplicationConfig>>, ReplicaRegistry),
    ) -> CommandResponse {
        let mut responses = command
            .execute(&ctx.0, &ctx.1, &ctx.2, &ctx.3)
            .await
            .unwrap();
        assert_eq!(responses.len(), 1);
        responses.remove(0)
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let ctx = test_context();
        match single_response(Command::Ping, &ctx).await {
            CommandResponse::Simple(text) => assert_eq!(text, "+PONG\r\n"),
            _ => panic!("expected a simple reply"),
        }
    }

    #[tokio::test]
    async fn echo_replies_the_argument() {
        let ctx = test_context();
        match single_response(Command::Echo(Bytes::from_static(b"hello")), &ctx).await {
            CommandResponse::Bulk(data) => assert_eq!(data, Bytes::from_static(b"hello")),
            _ => panic!("expected a bulk reply"),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let ctx = test_context();
        let set = Command::Set {
            key: Bytes::from_static(b"foo"),
            value: Bytes::from_static(b"bar"),
            px: None,
            ex: None,
        };
        match single_response(set, &ctx).await {
            CommandResponse::Simple(text) => assert_eq!(text, "+OK\r\n"),
            _ => panic!("expected +OK"),
        }
        match single_response(Command::Get(Bytes::from_static(b"foo")), &ctx).await {
            CommandResponse::Bulk(data) => assert_eq!(data, Bytes::from_static(b"bar")),
            _ => panic!("expected the stored value"),
        }
    }

    #[tokio::test]
    async fn get_of_missing_key_is_null_bulk() {
        let ctx = test_context();
        assert!(matches!(
            single_response(Command::Get(Bytes::from_static(b"nope")), &ctx).await,
            CommandResponse::NullBulk
        ));
    }

    #[tokio::test]
    async fn keys_on_empty_store_is_the_literal_error() {
        let ctx = test_context();
        match single_response(Command::Keys, &ctx).await {
            CommandResponse::Simple(text) => {
                assert_eq!(text, "-ERROR: no data is saved\r\n")
            }
            _ => panic!("expected the empty-store error"),
        }
    }

    #[tokio::test]
    async fn info_replication_reports_role_and_identity() {
        let ctx = test_context();
        match single_response(Command::Info("replication".into()), &ctx).await {
            CommandResponse::Bulk(data) => {
                let text = String::from_utf8(data.to_vec()).unwrap();
                assert!(text.starts_with("role:master\r\n"));
                assert!(text.contains("master_replid:"));
                assert!(text.contains("master_repl_offset:0"));
            }
            _ => panic!("expected a bulk reply"),
        }
    }

    #[tokio::test]
    async fn psync_replies_fullresync_and_a_snapshot() {
        let ctx = test_context();
        let responses = Command::Psync(vec!["?".into(), "-1".into()])
            .execute(&ctx.0, &ctx.1, &ctx.2, &ctx.3)
            .await
            .unwrap();
        assert_eq!(responses.len(), 2);
        match &responses[0] {
            CommandResponse::Simple(text) => {
                assert!(text.starts_with("+FULLRESYNC "));
                assert!(text.ends_with(" 0\r\n"));
            }
            _ => panic!("expected FULLRESYNC"),
        }
        match &responses[1] {
            CommandResponse::SnapshotPayload(data) => {
                assert!(data.starts_with(b"REDIS0011"));
            }
            _ => panic!("expected a snapshot payload"),
        }
    }

    #[test]
    fn set_frame_rebuild_includes_options() {
        let set = Command::Set {
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
            px: Some(100),
            ex: None,
        };
        assert_eq!(
            set.to_frame().unwrap(),
            b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nPX\r\n$3\r\n100\r\n".to_vec()
        );
    }
}
