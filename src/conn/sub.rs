//! Single-segment lifecycle driver.
//!
//! A sub-connection owns one segment of a multi-domain circuit: either the
//! local segment, driven through a hardware backend, or a remote segment,
//! delegated to a peer NSA through a provider proxy. Both share the state
//! machine and the four-operation surface; only the downstream binding
//! differs. Any downstream failure is fatal for the segment: it drops to
//! Terminated and the error travels up to the aggregator.

use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::error::NsiError;
use crate::model::{ServiceParameters, Stp};
use crate::proto::proxy::ProviderProxy;
use crate::state::{LifecycleState, StateMachine};

/// Downstream binding of a segment. Constructed with its backend or proxy
/// reference, so an unbound invocation is unrepresentable.
pub enum Binding {
    Local {
        backend: Arc<dyn Backend>,
        source_endpoint: String,
        dest_endpoint: String,
        internal_reservation_id: Option<String>,
        internal_connection_id: Option<String>,
    },
    Remote {
        proxy: Arc<dyn ProviderProxy>,
        network: String,
    },
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Local {
                source_endpoint,
                dest_endpoint,
                internal_reservation_id,
                internal_connection_id,
                ..
            } => f
                .debug_struct("Binding::Local")
                .field("source_endpoint", source_endpoint)
                .field("dest_endpoint", dest_endpoint)
                .field("internal_reservation_id", internal_reservation_id)
                .field("internal_connection_id", internal_connection_id)
                .finish(),
            Binding::Remote { network, .. } => f
                .debug_struct("Binding::Remote")
                .field("network", network)
                .finish(),
        }
    }
}

#[derive(Debug)]
pub struct SubConnection {
    connection_id: String,
    source_stp: Stp,
    dest_stp: Stp,
    global_reservation_id: Option<String>,
    description: Option<String>,
    state: StateMachine,
    binding: Binding,
}

impl SubConnection {
    /// Segment on our own network, driven by `backend`.
    pub fn local(
        connection_id: impl Into<String>,
        source_stp: Stp,
        dest_stp: Stp,
        source_endpoint: impl Into<String>,
        dest_endpoint: impl Into<String>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            source_stp,
            dest_stp,
            global_reservation_id: None,
            description: None,
            state: StateMachine::new(),
            binding: Binding::Local {
                backend,
                source_endpoint: source_endpoint.into(),
                dest_endpoint: dest_endpoint.into(),
                internal_reservation_id: None,
                internal_connection_id: None,
            },
        }
    }

    /// Segment delegated to the peer serving `network`. Carries the parent's
    /// global reservation id and description for relaying.
    pub fn remote(
        connection_id: impl Into<String>,
        network: impl Into<String>,
        source_stp: Stp,
        dest_stp: Stp,
        global_reservation_id: Option<String>,
        description: Option<String>,
        proxy: Arc<dyn ProviderProxy>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            source_stp,
            dest_stp,
            global_reservation_id,
            description,
            state: StateMachine::new(),
            binding: Binding::Remote { proxy, network: network.into() },
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current()
    }

    pub fn source_stp(&self) -> &Stp {
        &self.source_stp
    }

    pub fn dest_stp(&self) -> &Stp {
        &self.dest_stp
    }

    /// Peer network for a remote segment.
    pub fn network(&self) -> Option<&str> {
        match &self.binding {
            Binding::Local { .. } => None,
            Binding::Remote { network, .. } => Some(network),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.binding, Binding::Local { .. })
    }

    pub fn internal_reservation_id(&self) -> Option<&str> {
        match &self.binding {
            Binding::Local { internal_reservation_id, .. } => internal_reservation_id.as_deref(),
            Binding::Remote { .. } => None,
        }
    }

    pub fn internal_connection_id(&self) -> Option<&str> {
        match &self.binding {
            Binding::Local { internal_connection_id, .. } => internal_connection_id.as_deref(),
            Binding::Remote { .. } => None,
        }
    }

    pub async fn reserve(&mut self, params: &ServiceParameters) -> Result<(), NsiError> {
        self.state.transition(LifecycleState::Reserving)?;
        let outcome = match &mut self.binding {
            Binding::Local {
                backend,
                source_endpoint,
                dest_endpoint,
                internal_reservation_id,
                ..
            } => backend
                .reserve(source_endpoint, dest_endpoint, params)
                .await
                .map(|id| *internal_reservation_id = Some(id)),
            Binding::Remote { proxy, network } => {
                let sub_params =
                    params.restricted(self.source_stp.clone(), self.dest_stp.clone());
                proxy
                    .reservation(
                        network,
                        None,
                        self.global_reservation_id.as_deref(),
                        self.description.as_deref(),
                        &self.connection_id,
                        &sub_params,
                    )
                    .await
            }
        };
        match outcome {
            Ok(()) => {
                self.state.transition(LifecycleState::Reserved)?;
                info!(
                    "segment {} ({} -> {}) reserved",
                    self.connection_id, self.source_stp, self.dest_stp
                );
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn cancel_reservation(&mut self) -> Result<(), NsiError> {
        self.state.transition(LifecycleState::Terminating)?;
        let outcome = match &mut self.binding {
            Binding::Local { backend, internal_reservation_id, .. } => {
                let reservation_id = internal_reservation_id
                    .as_deref()
                    .ok_or_else(|| missing_id(&self.connection_id, "reservation"))?;
                backend.cancel_reservation(reservation_id).await
            }
            Binding::Remote { proxy, network } => {
                proxy.terminate_reservation(network, None, &self.connection_id).await
            }
        };
        match outcome {
            Ok(()) => {
                self.state.transition(LifecycleState::Terminated)?;
                debug!("segment {} cancelled", self.connection_id);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn provision(&mut self) -> Result<(), NsiError> {
        self.state.transition(LifecycleState::Provisioning)?;
        let outcome = match &mut self.binding {
            Binding::Local {
                backend,
                internal_reservation_id,
                internal_connection_id,
                ..
            } => {
                let reservation_id = internal_reservation_id
                    .as_deref()
                    .ok_or_else(|| missing_id(&self.connection_id, "reservation"))?;
                backend
                    .provision(reservation_id)
                    .await
                    .map(|id| *internal_connection_id = Some(id))
            }
            Binding::Remote { proxy, network } => proxy
                .provision(network, None, &self.connection_id)
                .await
                .and_then(|echoed| check_echo(&self.connection_id, &echoed)),
        };
        match outcome {
            Ok(()) => {
                self.state.transition(LifecycleState::Provisioned)?;
                info!("segment {} provisioned", self.connection_id);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn release_provision(&mut self) -> Result<(), NsiError> {
        self.state.transition(LifecycleState::Releasing)?;
        let outcome = match &mut self.binding {
            Binding::Local {
                backend,
                internal_reservation_id,
                internal_connection_id,
                ..
            } => {
                let connection_id = internal_connection_id
                    .as_deref()
                    .ok_or_else(|| missing_id(&self.connection_id, "connection"))?;
                match backend.release_provision(connection_id).await {
                    Ok(reservation_id) => {
                        *internal_reservation_id = Some(reservation_id);
                        *internal_connection_id = None;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Binding::Remote { proxy, network } => proxy
                .release_provision(network, None, &self.connection_id)
                .await
                .and_then(|echoed| check_echo(&self.connection_id, &echoed)),
        };
        match outcome {
            Ok(()) => {
                self.state.transition(LifecycleState::Reserved)?;
                info!("segment {} released", self.connection_id);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Downstream failure: the segment is dead, no retry.
    fn fail(&mut self, error: NsiError) -> Result<(), NsiError> {
        self.state.transition(LifecycleState::Terminated)?;
        debug!("segment {} failed: {error}", self.connection_id);
        Err(error)
    }
}

fn check_echo(connection_id: &str, echoed: &str) -> Result<(), NsiError> {
    if echoed == connection_id {
        Ok(())
    } else {
        Err(NsiError::Internal(format!(
            "peer echoed connection id {echoed}, expected {connection_id}"
        )))
    }
}

fn missing_id(connection_id: &str, kind: &str) -> NsiError {
    NsiError::Internal(format!("segment {connection_id} has no internal {kind} id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DudBackend;
    use crate::model::{Bandwidth, Schedule};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn params() -> ServiceParameters {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        ServiceParameters::new(
            Schedule::new(day.and_hms_opt(8, 0, 0).unwrap(), day.and_hms_opt(9, 0, 0).unwrap())
                .unwrap(),
            Stp::new("aruba", "A1"),
            Stp::new("aruba", "A3"),
            Bandwidth::fixed(200_000_000),
        )
    }

    fn local_sub() -> SubConnection {
        SubConnection::local(
            "C-local",
            Stp::new("aruba", "A1"),
            Stp::new("aruba", "A3"),
            "A1",
            "A3",
            Arc::new(DudBackend::new("dud")),
        )
    }

    struct EchoProxy;

    #[async_trait]
    impl ProviderProxy for EchoProxy {
        async fn reservation(
            &self,
            _network: &str,
            _correlation_id: Option<&str>,
            _global_reservation_id: Option<&str>,
            _description: Option<&str>,
            _connection_id: &str,
            params: &ServiceParameters,
        ) -> Result<(), NsiError> {
            // the segment must restrict the parameters to its own pair
            assert_eq!(params.source_stp.network, "bonaire");
            Ok(())
        }

        async fn terminate_reservation(
            &self,
            _network: &str,
            _correlation_id: Option<&str>,
            _connection_id: &str,
        ) -> Result<(), NsiError> {
            Ok(())
        }

        async fn provision(
            &self,
            _network: &str,
            _correlation_id: Option<&str>,
            connection_id: &str,
        ) -> Result<String, NsiError> {
            Ok(connection_id.to_string())
        }

        async fn release_provision(
            &self,
            _network: &str,
            _correlation_id: Option<&str>,
            _connection_id: &str,
        ) -> Result<String, NsiError> {
            Ok("someone-else".to_string())
        }
    }

    #[tokio::test]
    async fn test_local_lifecycle_tracks_internal_ids() {
        let mut sub = local_sub();
        sub.reserve(&params()).await.unwrap();
        assert_eq!(sub.state(), LifecycleState::Reserved);
        assert!(sub.internal_reservation_id().is_some());

        sub.provision().await.unwrap();
        assert_eq!(sub.state(), LifecycleState::Provisioned);
        assert!(sub.internal_connection_id().is_some());

        sub.release_provision().await.unwrap();
        assert_eq!(sub.state(), LifecycleState::Reserved);
        assert!(sub.internal_connection_id().is_none());

        sub.cancel_reservation().await.unwrap();
        assert_eq!(sub.state(), LifecycleState::Terminated);
    }

    #[tokio::test]
    async fn test_illegal_start_state_fails_synchronously() {
        let mut sub = local_sub();
        let err = sub.provision().await.unwrap_err();
        assert!(matches!(err, NsiError::StateTransition { .. }));
        assert_eq!(sub.state(), LifecycleState::Initial);
    }

    #[tokio::test]
    async fn test_remote_passes_restricted_params_and_checks_echo() {
        let mut sub = SubConnection::remote(
            "C-remote",
            "bonaire",
            Stp::new("bonaire", "b1"),
            Stp::new("bonaire", "b2"),
            Some("urn:uuid:global-1".into()),
            Some("test circuit".into()),
            Arc::new(EchoProxy),
        );
        sub.reserve(&params()).await.unwrap();
        sub.provision().await.unwrap();
        assert_eq!(sub.state(), LifecycleState::Provisioned);

        // EchoProxy answers release with a foreign id; the segment must die
        let err = sub.release_provision().await.unwrap_err();
        assert!(matches!(err, NsiError::Internal(_)));
        assert_eq!(sub.state(), LifecycleState::Terminated);
    }

    #[tokio::test]
    async fn test_backend_failure_terminates_segment() {
        struct FailingBackend;

        #[async_trait]
        impl Backend for FailingBackend {
            async fn reserve(
                &self,
                _source_endpoint: &str,
                _dest_endpoint: &str,
                _params: &ServiceParameters,
            ) -> Result<String, NsiError> {
                Err(NsiError::Internal("no capacity".into()))
            }

            async fn cancel_reservation(&self, _reservation_id: &str) -> Result<(), NsiError> {
                Ok(())
            }

            async fn provision(&self, _reservation_id: &str) -> Result<String, NsiError> {
                Ok("x".into())
            }

            async fn release_provision(&self, _connection_id: &str) -> Result<String, NsiError> {
                Ok("x".into())
            }
        }

        let mut sub = SubConnection::local(
            "C-fail",
            Stp::new("aruba", "A1"),
            Stp::new("aruba", "A3"),
            "A1",
            "A3",
            Arc::new(FailingBackend),
        );
        let err = sub.reserve(&params()).await.unwrap_err();
        assert!(matches!(err, NsiError::Internal(_)));
        assert_eq!(sub.state(), LifecycleState::Terminated);
    }
}
