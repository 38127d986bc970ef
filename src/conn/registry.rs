//! Process-wide connection registry.
//!
//! Created at service start and handed to both the connection-creating path
//! and the inbound callback dispatcher; all mutation goes through the
//! registry's own lock. Departed connection ids are retained so a late
//! callback can be told the connection is gone rather than unknown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::NsiError;

use super::aggregate::Connection;

pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    departed: Mutex<HashSet<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub active: usize,
    pub departed: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            departed: Mutex::new(HashSet::new()),
        }
    }

    pub async fn insert(&self, connection: Arc<Connection>) -> Result<(), NsiError> {
        let mut connections = self.connections.lock().await;
        let id = connection.connection_id().to_string();
        if connections.contains_key(&id) {
            return Err(NsiError::Connection(format!("connection {id} already registered")));
        }
        debug!("registered connection {id}");
        connections.insert(id, connection);
        Ok(())
    }

    pub async fn lookup(&self, connection_id: &str) -> Result<Arc<Connection>, NsiError> {
        if let Some(connection) = self.connections.lock().await.get(connection_id) {
            return Ok(connection.clone());
        }
        if self.departed.lock().await.contains(connection_id) {
            Err(NsiError::ConnectionGone(connection_id.to_string()))
        } else {
            Err(NsiError::ConnectionNonExistent(connection_id.to_string()))
        }
    }

    /// Drop a connection whose requester no longer references it. The id is
    /// remembered so late callbacks map to `ConnectionGone`.
    pub async fn remove(&self, connection_id: &str) -> Result<Arc<Connection>, NsiError> {
        let removed = self.connections.lock().await.remove(connection_id);
        match removed {
            Some(connection) => {
                self.departed.lock().await.insert(connection_id.to_string());
                debug!("removed connection {connection_id}");
                Ok(connection)
            }
            None => Err(NsiError::ConnectionNonExistent(connection_id.to_string())),
        }
    }

    pub async fn is_gone(&self, connection_id: &str) -> bool {
        self.departed.lock().await.contains(connection_id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn stats(&self) -> RegistryStats {
        RegistryStats {
            active: self.connections.lock().await.len(),
            departed: self.departed.lock().await.len(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
