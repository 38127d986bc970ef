//! Aggregating connection: fans lifecycle commands out to every segment and
//! collapses the outcomes.
//!
//! A command launches one task per segment and always waits for all of them;
//! a partial success is treated as a total failure at the parent (state goes
//! to Terminated) because end-to-end consistency cannot be guaranteed without
//! a compensating workflow. Outstanding segments are never actively
//! cancelled: peers may still be committing resources, and silently dropping
//! them would leave dangling reservations. Manual cleanup is the documented
//! recovery, flagged on the error itself.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{FailureMode, NsiError};
use crate::label::Label;
use crate::model::{NsaIdentity, Path, ServiceParameters, Stp, ETHERNET_VLAN};
use crate::proto::proxy::ProviderProxy;
use crate::proto::types::new_correlation_id;
use crate::state::{LifecycleState, StateMachine};

use super::sub::SubConnection;

/// The four lifecycle commands a requester can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Reserve,
    CancelReservation,
    Provision,
    ReleaseProvision,
}

impl Operation {
    fn in_flight_state(self) -> LifecycleState {
        match self {
            Operation::Reserve => LifecycleState::Reserving,
            Operation::CancelReservation => LifecycleState::Terminating,
            Operation::Provision => LifecycleState::Provisioning,
            Operation::ReleaseProvision => LifecycleState::Releasing,
        }
    }

    fn success_state(self) -> LifecycleState {
        match self {
            Operation::Reserve => LifecycleState::Reserved,
            Operation::CancelReservation => LifecycleState::Terminated,
            Operation::Provision => LifecycleState::Provisioned,
            Operation::ReleaseProvision => LifecycleState::Reserved,
        }
    }

    fn failure(self, mode: FailureMode, detail: String) -> NsiError {
        let message = match (self, mode) {
            (Operation::Reserve, FailureMode::Partial) => format!(
                "partial failure in reservation, may require manual cleanup ({detail})"
            ),
            (Operation::Reserve, FailureMode::Total) => {
                format!("reservation failed for all local/sub connections ({detail})")
            }
            (Operation::CancelReservation, FailureMode::Partial) => {
                format!("cancel partially failed, may require manual cleanup ({detail})")
            }
            (Operation::CancelReservation, FailureMode::Total) => {
                format!("cancel failed for all local/sub connections ({detail})")
            }
            (Operation::Provision, FailureMode::Partial) => {
                format!("provision partially failed, may require manual cleanup ({detail})")
            }
            (Operation::Provision, FailureMode::Total) => {
                format!("provision failed for all local/sub connections ({detail})")
            }
            (Operation::ReleaseProvision, FailureMode::Partial) => {
                format!("release partially failed, may require manual cleanup ({detail})")
            }
            (Operation::ReleaseProvision, FailureMode::Total) => {
                format!("release failed for all local/sub connections ({detail})")
            }
        };
        match self {
            Operation::Reserve => NsiError::Reserve { mode, message },
            Operation::CancelReservation => NsiError::CancelReservation { mode, message },
            Operation::Provision => NsiError::Provision { mode, message },
            Operation::ReleaseProvision => NsiError::Release { mode, message },
        }
    }
}

/// Collapse a multi-set of segment outcomes into the parent's next state and
/// result. Pure: the same outcomes always produce the same answer.
pub(crate) fn collapse(
    op: Operation,
    outcomes: &[Result<(), NsiError>],
) -> (LifecycleState, Result<(), NsiError>) {
    let failures: Vec<String> = outcomes
        .iter()
        .filter_map(|r| r.as_ref().err().map(|e| e.to_string()))
        .collect();

    if failures.is_empty() {
        return (op.success_state(), Ok(()));
    }

    let mode = if failures.len() == outcomes.len() {
        FailureMode::Total
    } else {
        FailureMode::Partial
    };
    (LifecycleState::Terminated, Err(op.failure(mode, failures.join(" # "))))
}

#[derive(Clone)]
enum Command {
    Reserve(Arc<ServiceParameters>),
    CancelReservation,
    Provision,
    ReleaseProvision,
}

impl Command {
    fn operation(&self) -> Operation {
        match self {
            Command::Reserve(_) => Operation::Reserve,
            Command::CancelReservation => Operation::CancelReservation,
            Command::Provision => Operation::Provision,
            Command::ReleaseProvision => Operation::ReleaseProvision,
        }
    }
}

/// A multi-domain connection: one optional local segment plus any number of
/// remote segments, all exclusively owned.
#[derive(Debug)]
pub struct Connection {
    connection_id: String,
    requester_nsa: NsaIdentity,
    source_stp: Stp,
    dest_stp: Stp,
    global_reservation_id: Option<String>,
    description: Option<String>,
    state: Mutex<StateMachine>,
    service_parameters: Mutex<Option<ServiceParameters>>,
    local: Option<Arc<Mutex<SubConnection>>>,
    remotes: Vec<Arc<Mutex<SubConnection>>>,
}

impl Connection {
    pub fn new(
        requester_nsa: NsaIdentity,
        connection_id: impl Into<String>,
        source_stp: Stp,
        dest_stp: Stp,
        global_reservation_id: Option<String>,
        description: Option<String>,
        local: Option<SubConnection>,
        remotes: Vec<SubConnection>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            requester_nsa,
            source_stp,
            dest_stp,
            global_reservation_id,
            description,
            state: Mutex::new(StateMachine::new()),
            service_parameters: Mutex::new(None),
            local: local.map(|sub| Arc::new(Mutex::new(sub))),
            remotes: remotes.into_iter().map(|sub| Arc::new(Mutex::new(sub))).collect(),
        }
    }

    /// Decompose a known path into segments: links on `local_network` form
    /// the local segment, every other link a remote one. A common
    /// Ethernet-VLAN label is negotiated across the chain first; a path with
    /// no viable common value fails here, before any connection exists.
    pub fn from_path(
        requester_nsa: NsaIdentity,
        connection_id: impl Into<String>,
        path: &Path,
        local_network: &str,
        backend: Arc<dyn Backend>,
        proxy: Arc<dyn ProviderProxy>,
        global_reservation_id: Option<String>,
        description: Option<String>,
    ) -> Result<Self, NsiError> {
        let connection_id = connection_id.into();
        let common = path.common_label(ETHERNET_VLAN)?;

        let mut local = None;
        let mut remotes = Vec::new();
        for link in path.links() {
            let source_stp = constrain(link.source_stp(), common.as_ref());
            let dest_stp = constrain(link.dest_stp(), common.as_ref());
            if link.network() == local_network {
                if local.is_some() {
                    return Err(NsiError::Payload(format!(
                        "path crosses network {local_network} more than once"
                    )));
                }
                let (src_port, dst_port) = (source_stp.port.clone(), dest_stp.port.clone());
                local = Some(SubConnection::local(
                    new_correlation_id(),
                    source_stp,
                    dest_stp,
                    src_port,
                    dst_port,
                    backend.clone(),
                ));
            } else {
                remotes.push(SubConnection::remote(
                    new_correlation_id(),
                    link.network(),
                    source_stp,
                    dest_stp,
                    global_reservation_id.clone(),
                    description.clone(),
                    proxy.clone(),
                ));
            }
        }

        Ok(Self::new(
            requester_nsa,
            connection_id,
            path.source_stp(),
            path.dest_stp(),
            global_reservation_id,
            description,
            local,
            remotes,
        ))
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn requester_nsa(&self) -> &NsaIdentity {
        &self.requester_nsa
    }

    pub fn source_stp(&self) -> &Stp {
        &self.source_stp
    }

    pub fn dest_stp(&self) -> &Stp {
        &self.dest_stp
    }

    pub fn global_reservation_id(&self) -> Option<&str> {
        self.global_reservation_id.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn has_local_connection(&self) -> bool {
        self.local.is_some()
    }

    pub async fn state(&self) -> LifecycleState {
        self.state.lock().await.current()
    }

    pub async fn service_parameters(&self) -> Option<ServiceParameters> {
        self.service_parameters.lock().await.clone()
    }

    /// Local segment first, then the remotes.
    pub fn segments(&self) -> Vec<Arc<Mutex<SubConnection>>> {
        self.local.iter().chain(self.remotes.iter()).cloned().collect()
    }

    pub async fn reserve(&self, params: ServiceParameters) -> Result<(), NsiError> {
        self.start(Operation::Reserve).await?;
        *self.service_parameters.lock().await = Some(params.clone());
        self.run(Command::Reserve(Arc::new(params))).await
    }

    pub async fn cancel_reservation(&self) -> Result<(), NsiError> {
        self.start(Operation::CancelReservation).await?;
        self.run(Command::CancelReservation).await
    }

    pub async fn provision(&self) -> Result<(), NsiError> {
        self.start(Operation::Provision).await?;
        self.run(Command::Provision).await
    }

    pub async fn release_provision(&self) -> Result<(), NsiError> {
        self.start(Operation::ReleaseProvision).await?;
        self.run(Command::ReleaseProvision).await
    }

    async fn start(&self, op: Operation) -> Result<(), NsiError> {
        self.state.lock().await.transition(op.in_flight_state()).map(drop)
    }

    /// Fan the command out to every segment, wait for all of them, collapse.
    async fn run(&self, command: Command) -> Result<(), NsiError> {
        let op = command.operation();
        let mut tasks = JoinSet::new();
        for segment in self.segments() {
            let command = command.clone();
            tasks.spawn(async move {
                let mut segment = segment.lock().await;
                match command {
                    Command::Reserve(params) => segment.reserve(&params).await,
                    Command::CancelReservation => segment.cancel_reservation().await,
                    Command::Provision => segment.provision().await,
                    Command::ReleaseProvision => segment.release_provision().await,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined.unwrap_or_else(|e| {
                Err(NsiError::Internal(format!("segment task failed: {e}")))
            }));
        }

        let (next_state, result) = collapse(op, &outcomes);
        self.state.lock().await.transition(next_state)?;
        match &result {
            Ok(()) => info!(
                "connection {} and its {} segment(s): {:?} complete",
                self.connection_id,
                outcomes.len(),
                op
            ),
            Err(e) => warn!("connection {}: {e}", self.connection_id),
        }
        result
    }
}

fn constrain(mut stp: Stp, common: Option<&Label>) -> Stp {
    if let Some(common) = common {
        for label in &mut stp.labels {
            if label.type_uri() == common.type_uri() {
                *label = common.clone();
            }
        }
    }
    stp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureMode;

    fn ok() -> Result<(), NsiError> {
        Ok(())
    }

    fn fail(msg: &str) -> Result<(), NsiError> {
        Err(NsiError::Internal(msg.into()))
    }

    #[test]
    fn test_collapse_all_succeed() {
        let (state, result) = collapse(Operation::Reserve, &[ok(), ok(), ok()]);
        assert_eq!(state, LifecycleState::Reserved);
        assert!(result.is_ok());

        let (state, _) = collapse(Operation::Provision, &[ok()]);
        assert_eq!(state, LifecycleState::Provisioned);

        let (state, _) = collapse(Operation::ReleaseProvision, &[ok()]);
        assert_eq!(state, LifecycleState::Reserved);

        let (state, _) = collapse(Operation::CancelReservation, &[ok()]);
        assert_eq!(state, LifecycleState::Terminated);
    }

    #[test]
    fn test_collapse_partial_failure_terminates_and_flags_cleanup() {
        let (state, result) = collapse(Operation::Reserve, &[ok(), fail("peer down")]);
        assert_eq!(state, LifecycleState::Terminated);
        let err = result.unwrap_err();
        assert!(matches!(err, NsiError::Reserve { mode: FailureMode::Partial, .. }));
        assert!(err.needs_manual_cleanup());
        assert!(err.to_string().contains("partial failure in reservation"));
        assert!(err.to_string().contains("peer down"));
    }

    #[test]
    fn test_collapse_total_failure() {
        let (state, result) =
            collapse(Operation::Reserve, &[fail("no vlan"), fail("no capacity")]);
        assert_eq!(state, LifecycleState::Terminated);
        let err = result.unwrap_err();
        assert!(matches!(err, NsiError::Reserve { mode: FailureMode::Total, .. }));
        assert!(err.to_string().contains("failed for all local/sub connections"));
        assert!(err.to_string().contains("no vlan"));
        assert!(err.to_string().contains("no capacity"));
    }

    #[test]
    fn test_collapse_is_deterministic_per_outcome_multiset() {
        let outcomes = [ok(), fail("x"), ok()];
        let (s1, r1) = collapse(Operation::Provision, &outcomes);
        let (s2, r2) = collapse(Operation::Provision, &outcomes);
        assert_eq!(s1, s2);
        assert_eq!(r1.unwrap_err(), r2.unwrap_err());
    }

    #[test]
    fn test_every_operation_maps_to_its_error_kind() {
        for (op, want_partial) in [
            (Operation::Reserve, "partial failure in reservation"),
            (Operation::CancelReservation, "cancel partially failed"),
            (Operation::Provision, "provision partially failed"),
            (Operation::ReleaseProvision, "release partially failed"),
        ] {
            let (_, result) = collapse(op, &[ok(), fail("boom")]);
            assert!(result.unwrap_err().to_string().contains(want_partial));
        }
    }
}
