use crate::protocol_constants::CRLF;
use rand::RngCore;

pub const ROLE_MASTER: &str = "master";
pub const ROLE_SLAVE: &str = "slave";

/// Role and replication identity. Written once at startup, read-only
/// afterwards: the id is a 40-hex-character string and the offset stays 0
/// (the wire contract reserves room for future monotonic offsets).
#[derive(Clone)]
pub struct ReplicationConfig {
    role: String,
    master_host: Option<String>,
    master_port: Option<u16>,
    master_replid: String,
    master_repl_offset: u64,
}

impl ReplicationConfig {
    pub fn new() -> Self {
        Self {
            role: ROLE_MASTER.to_string(),
            master_host: None,
            master_port: None,
            master_replid: Self::generate_replication_id(),
            master_repl_offset: 0,
        }
    }

    fn generate_replication_id() -> String {
        let mut raw = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut raw);
        raw.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn set_replica_of(&mut self, host: String, port: u16) {
        self.role = ROLE_SLAVE.to_string();
        self.master_host = Some(host);
        self.master_port = Some(port);
    }

    pub fn get_role(&self) -> &str {
        &self.role
    }

    pub fn get_master_addr(&self) -> Option<(String, u16)> {
        match (&self.master_host, self.master_port) {
            (Some(host), Some(port)) => Some((host.clone(), port)),
            _ => None,
        }
    }

    pub fn get_master_replid(&self) -> &str {
        &self.master_replid
    }

    pub fn get_master_repl_offset(&self) -> u64 {
        self.master_repl_offset
    }

    /// Body of the `INFO replication` bulk reply.
    pub fn get_info(&self) -> String {
        format!(
            "role:{}{}master_replid:{}{}master_repl_offset:{}",
            self.role, CRLF, self.master_replid, CRLF, self.master_repl_offset
        )
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_as_master_with_a_40_hex_id() {
        let config = ReplicationConfig::new();
        assert_eq!(config.get_role(), ROLE_MASTER);
        assert_eq!(config.get_master_replid().len(), 40);
        assert!(config
            .get_master_replid()
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
        assert_eq!(config.get_master_repl_offset(), 0);
    }

    #[test]
    fn replica_of_switches_the_role() {
        let mut config = ReplicationConfig::new();
        config.set_replica_of("localhost".into(), 6380);
        assert_eq!(config.get_role(), ROLE_SLAVE);
        assert_eq!(config.get_master_addr(), Some(("localhost".into(), 6380)));
    }

    #[test]
    fn info_lists_role_id_and_offset() {
        let config = ReplicationConfig::new();
        let info = config.get_info();
        let lines: Vec<&str> = info.split(CRLF).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "role:master");
        assert!(lines[1].starts_with("master_replid:"));
        assert_eq!(lines[2], "master_repl_offset:0");
    }
}
