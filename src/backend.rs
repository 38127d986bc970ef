//! Hardware backend boundary.
//!
//! A backend drives the local NRM (Juniper, Force10, Brocade, ...) and is
//! supplied to the local sub-connection at construction. The crate ships
//! only [`DudBackend`], an always-accepting backend used to exercise the
//! lifecycle without hardware.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::NsiError;
use crate::model::ServiceParameters;

/// Asynchronous driver for the local network resource manager.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Reserve a cross-connect between two local endpoints. Returns the
    /// backend's internal reservation id.
    async fn reserve(
        &self,
        source_endpoint: &str,
        dest_endpoint: &str,
        params: &ServiceParameters,
    ) -> Result<String, NsiError>;

    /// Drop a reservation that was never provisioned (or was released).
    async fn cancel_reservation(&self, reservation_id: &str) -> Result<(), NsiError>;

    /// Activate a reservation in the data plane. Returns the backend's
    /// internal connection id.
    async fn provision(&self, reservation_id: &str) -> Result<String, NsiError>;

    /// Deactivate a provisioned connection, returning it to reserved.
    /// Returns the internal reservation id the circuit falls back to.
    async fn release_provision(&self, connection_id: &str) -> Result<String, NsiError>;
}

/// A backend that accepts everything and provisions nothing.
pub struct DudBackend {
    name: String,
    counter: AtomicU64,
}

impl DudBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), counter: AtomicU64::new(0) }
    }

    fn next_id(&self, kind: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}:{kind}-{n}", self.name)
    }
}

#[async_trait]
impl Backend for DudBackend {
    async fn reserve(
        &self,
        source_endpoint: &str,
        dest_endpoint: &str,
        _params: &ServiceParameters,
    ) -> Result<String, NsiError> {
        let id = self.next_id("reservation");
        debug!("dud backend {} reserved {source_endpoint} -> {dest_endpoint} as {id}", self.name);
        Ok(id)
    }

    async fn cancel_reservation(&self, reservation_id: &str) -> Result<(), NsiError> {
        debug!("dud backend {} cancelled {reservation_id}", self.name);
        Ok(())
    }

    async fn provision(&self, reservation_id: &str) -> Result<String, NsiError> {
        let id = self.next_id("connection");
        debug!("dud backend {} provisioned {reservation_id} as {id}", self.name);
        Ok(id)
    }

    async fn release_provision(&self, connection_id: &str) -> Result<String, NsiError> {
        let id = self.next_id("reservation");
        debug!("dud backend {} released {connection_id} back to {id}", self.name);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bandwidth, Schedule, ServiceParameters, Stp};
    use chrono::NaiveDate;

    fn params() -> ServiceParameters {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        ServiceParameters::new(
            Schedule::new(day.and_hms_opt(10, 0, 0).unwrap(), day.and_hms_opt(12, 0, 0).unwrap())
                .unwrap(),
            Stp::new("aruba", "A1"),
            Stp::new("aruba", "A3"),
            Bandwidth::fixed(200_000_000),
        )
    }

    #[tokio::test]
    async fn test_basic_usage() {
        let backend = DudBackend::new("test-dud");
        let reservation = backend.reserve("A1", "A3", &params()).await.unwrap();
        let connection = backend.provision(&reservation).await.unwrap();
        let reservation = backend.release_provision(&connection).await.unwrap();
        backend.cancel_reservation(&reservation).await.unwrap();
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let backend = DudBackend::new("test-dud");
        let a = backend.reserve("A1", "A2", &params()).await.unwrap();
        let b = backend.reserve("A1", "A2", &params()).await.unwrap();
        assert_ne!(a, b);
    }
}
