use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::{error, info};

/// A fan-out sink for one attached replica. The write half is shared with
/// the connection's worker; dropping the handle never closes the socket.
#[derive(Clone)]
pub struct ReplicaHandle {
    pub addr: SocketAddr,
    pub writer: Arc<Mutex<OwnedWriteHalf>>,
}

/// Live replica connections eligible for write fan-out. Registrations are
/// created when a `PSYNC` handshake completes and destroyed when a send
/// fails; nothing else mutates the set.
#[derive(Clone, Default)]
pub struct ReplicaRegistry {
    replicas: Arc<Mutex<Vec<ReplicaHandle>>>,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: ReplicaHandle) {
        let mut replicas = self.replicas.lock().await;
        if !replicas.iter().any(|r| r.addr == handle.addr) {
            info!(addr = %handle.addr, "replica attached");
            replicas.push(handle);
        }
    }

    pub async fn len(&self) -> usize {
        self.replicas.lock().await.len()
    }

    /// Sends one framed command to every attached replica. The handle list
    /// is snapshotted under the registry lock and the sends happen outside
    /// it; a replica that fails to accept the write is dropped.
    pub async fn propagate(&self, frame: &[u8]) {
        let handles: Vec<ReplicaHandle> = self.replicas.lock().await.clone();

        let mut dead = Vec::new();
        for handle in &handles {
            let mut writer = handle.writer.lock().await;
            let result = async {
                writer.write_all(frame).await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = result {
                error!(addr = %handle.addr, "dropping replica after failed send: {}", e);
                dead.push(handle.addr);
            }
        }

        if !dead.is_empty() {
            let mut replicas = self.replicas.lock().await;
            replicas.retain(|r| !dead.contains(&r.addr));
        }
    }
}
