//! Outbound provider-proxy boundary and the pending-reply table.
//!
//! A proxy sends lifecycle requests to one or more peer NSAs and completes
//! when the matching asynchronous response arrives. Implementations register
//! a handle in [`PendingReplies`] before sending; the requester callback
//! surface resolves it when the peer's confirmation or failure comes back.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::error::NsiError;
use crate::model::{Criteria, ServiceParameters};
use crate::proto::types::QuerySummaryResultType;

/// Asynchronous client half of the provider agent peering.
#[async_trait]
pub trait ProviderProxy: Send + Sync {
    /// Request a reservation on the peer serving `network`. Completes when
    /// the peer confirms or fails the reservation.
    async fn reservation(
        &self,
        network: &str,
        correlation_id: Option<&str>,
        global_reservation_id: Option<&str>,
        description: Option<&str>,
        connection_id: &str,
        params: &ServiceParameters,
    ) -> Result<(), NsiError>;

    /// Tear down a reservation on the peer.
    async fn terminate_reservation(
        &self,
        network: &str,
        correlation_id: Option<&str>,
        connection_id: &str,
    ) -> Result<(), NsiError>;

    /// Activate a reserved circuit. Returns the peer's echoed connection id.
    async fn provision(
        &self,
        network: &str,
        correlation_id: Option<&str>,
        connection_id: &str,
    ) -> Result<String, NsiError>;

    /// Deactivate a provisioned circuit. Returns the peer's echoed
    /// connection id.
    async fn release_provision(
        &self,
        network: &str,
        correlation_id: Option<&str>,
        connection_id: &str,
    ) -> Result<String, NsiError>;
}

/// What a peer's asynchronous response resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerReply {
    ReserveConfirmed {
        connection_id: String,
        global_reservation_id: Option<String>,
        description: Option<String>,
        criteria: Criteria,
    },
    ReserveCommitted { connection_id: String },
    ReserveAborted { connection_id: String },
    Provisioned { connection_id: String },
    Released { connection_id: String },
    Terminated { connection_id: String },
    QuerySummary { reservations: Vec<QuerySummaryResultType> },
}

type ReplySender = oneshot::Sender<Result<PeerReply, NsiError>>;

/// Outstanding asynchronous handles, keyed by connection id (or correlation
/// id for query exchanges, which carry no single connection).
pub struct PendingReplies {
    pending: Mutex<HashMap<String, ReplySender>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self { pending: Mutex::new(HashMap::new()) }
    }

    /// Register a handle under `key`. A second registration for the same key
    /// means two operations are racing on one connection, which the state
    /// machine is supposed to prevent.
    pub async fn register(
        &self,
        key: impl Into<String>,
    ) -> Result<oneshot::Receiver<Result<PeerReply, NsiError>>, NsiError> {
        let key = key.into();
        let mut pending = self.pending.lock().await;
        if pending.contains_key(&key) {
            return Err(NsiError::Connection(format!("operation already pending for {key}")));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(key, tx);
        Ok(rx)
    }

    /// Resolve the handle registered under `key`.
    pub async fn resolve(&self, key: &str, reply: PeerReply) -> Result<(), NsiError> {
        self.complete(key, Ok(reply)).await
    }

    /// Reject the handle registered under `key`.
    pub async fn reject(&self, key: &str, error: NsiError) -> Result<(), NsiError> {
        self.complete(key, Err(error)).await
    }

    /// Drop a handle without completing it (the waiter gave up).
    pub async fn forget(&self, key: &str) {
        self.pending.lock().await.remove(key);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.pending.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    async fn complete(
        &self,
        key: &str,
        outcome: Result<PeerReply, NsiError>,
    ) -> Result<(), NsiError> {
        let sender = self
            .pending
            .lock()
            .await
            .remove(key)
            .ok_or_else(|| NsiError::ConnectionNonExistent(key.to_string()))?;
        if sender.send(outcome).is_err() {
            debug!("waiter for {key} went away before its reply arrived");
        }
        Ok(())
    }
}

impl Default for PendingReplies {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_resolve_round_trip() {
        let pending = PendingReplies::new();
        let rx = pending.register("C-1").await.unwrap();
        pending
            .resolve("C-1", PeerReply::Provisioned { connection_id: "C-1".into() })
            .await
            .unwrap();
        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply, PeerReply::Provisioned { connection_id: "C-1".into() });
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_reject_delivers_error() {
        let pending = PendingReplies::new();
        let rx = pending.register("C-2").await.unwrap();
        pending
            .reject("C-2", NsiError::Connection("peer refused".into()))
            .await
            .unwrap();
        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_unknown_key_is_nonexistent() {
        let pending = PendingReplies::new();
        let err = pending
            .resolve("missing", PeerReply::Terminated { connection_id: "missing".into() })
            .await
            .unwrap_err();
        assert_eq!(err, NsiError::ConnectionNonExistent("missing".into()));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let pending = PendingReplies::new();
        let _rx = pending.register("C-3").await.unwrap();
        assert!(pending.register("C-3").await.is_err());
    }
}
