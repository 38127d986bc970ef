//! Requester callback surface: the inbound half of the peering.
//!
//! Peer NSAs deliver asynchronous confirmations, failures, and notifications
//! here (via the codec). Each entry point parses the wire body into the data
//! model, finds the pending handle by connection id, resolves or rejects it,
//! and returns a generic acknowledgement for the codec to emit. A bad payload
//! or an unknown connection is an error for us but not for the transport:
//! the dispatcher still acknowledges delivery.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::conn::ConnectionRegistry;
use crate::error::NsiError;
use crate::label::Label;
use crate::model::{
    Criteria, Directionality, EthernetService, Schedule, ServiceDefinition, Stp, ETHERNET_VLAN,
};
use crate::proto::actions;
use crate::proto::proxy::{PeerReply, PendingReplies};
use crate::proto::types::{
    CriteriaType, DataPlaneStateChangeType, Envelope, ErrorEventType, GenericAcknowledgementType,
    GenericConfirmType, GenericFailureType, MessageBody, MessageDeliveryTimeoutType, NsiHeader,
    OrderedStpType, QuerySummaryConfirmedType, ReserveTimeoutType, ReserveType, StpType,
};

/// Notifications forwarded out of the callback surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NsiEvent {
    ErrorEvent(ErrorEventType),
    DataPlaneStateChange(DataPlaneStateChangeType),
    ReserveTimeout(ReserveTimeoutType),
    MessageDeliveryTimeout(MessageDeliveryTimeoutType),
}

pub struct RequesterService {
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingReplies>,
    events: mpsc::UnboundedSender<NsiEvent>,
}

impl RequesterService {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        pending: Arc<PendingReplies>,
    ) -> (Self, mpsc::UnboundedReceiver<NsiEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { registry, pending, events }, receiver)
    }

    /// Dispatch a decoded message by action name. Dispatch failures are
    /// logged; the peer's delivery is acknowledged either way.
    pub async fn handle(&self, envelope: Envelope) -> GenericAcknowledgementType {
        let ack = ack(&envelope.header);
        if let Err(e) = self.dispatch(envelope).await {
            warn!("inbound dispatch failed: {e}");
        }
        ack
    }

    async fn dispatch(&self, envelope: Envelope) -> Result<(), NsiError> {
        let Envelope { action, header, body } = envelope;
        match (action.as_str(), body) {
            (actions::RESERVE_CONFIRMED, MessageBody::ReserveConfirmed(msg)) => {
                self.reserve_confirmed(&header, msg).await.map(drop)
            }
            (actions::RESERVE_FAILED, MessageBody::GenericFailure(msg)) => {
                self.reserve_failed(&header, msg).await.map(drop)
            }
            (actions::RESERVE_COMMIT_CONFIRMED, MessageBody::GenericConfirm(msg)) => {
                self.reserve_commit_confirmed(&header, msg).await.map(drop)
            }
            (actions::RESERVE_COMMIT_FAILED, MessageBody::GenericFailure(msg)) => {
                self.reserve_commit_failed(&header, msg).await.map(drop)
            }
            (actions::RESERVE_ABORT_CONFIRMED, MessageBody::GenericConfirm(msg)) => {
                self.reserve_abort_confirmed(&header, msg).await.map(drop)
            }
            (actions::PROVISION_CONFIRMED, MessageBody::GenericConfirm(msg)) => {
                self.provision_confirmed(&header, msg).await.map(drop)
            }
            (actions::RELEASE_CONFIRMED, MessageBody::GenericConfirm(msg)) => {
                self.release_confirmed(&header, msg).await.map(drop)
            }
            (actions::TERMINATE_CONFIRMED, MessageBody::GenericConfirm(msg)) => {
                self.terminate_confirmed(&header, msg).await.map(drop)
            }
            (actions::TERMINATE_FAILED, MessageBody::GenericFailure(msg)) => {
                self.terminate_failed(&header, msg).await.map(drop)
            }
            (actions::QUERY_SUMMARY_CONFIRMED, MessageBody::QuerySummaryConfirmed(msg)) => {
                self.query_summary_confirmed(&header, msg).await.map(drop)
            }
            (actions::QUERY_SUMMARY_FAILED, MessageBody::GenericFailure(msg)) => {
                self.query_summary_failed(&header, msg).await.map(drop)
            }
            (actions::ERROR_EVENT, MessageBody::ErrorEvent(msg)) => {
                self.error_event(&header, msg).await.map(drop)
            }
            (actions::DATA_PLANE_STATE_CHANGE, MessageBody::DataPlaneStateChange(msg)) => {
                self.data_plane_state_change(&header, msg).await.map(drop)
            }
            (actions::RESERVE_TIMEOUT, MessageBody::ReserveTimeout(msg)) => {
                self.reserve_timeout(&header, msg).await.map(drop)
            }
            (actions::MESSAGE_DELIVERY_TIMEOUT, MessageBody::MessageDeliveryTimeout(msg)) => {
                self.message_delivery_timeout(&header, msg).await.map(drop)
            }
            (action, _) => {
                Err(NsiError::Payload(format!("no handler registered for action {action}")))
            }
        }
    }

    // -------------------------------------------------------------------------
    // positive responses
    // -------------------------------------------------------------------------

    pub async fn reserve_confirmed(
        &self,
        header: &NsiHeader,
        msg: ReserveType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        let criteria = criteria_from_wire(msg.criteria)?;
        self.resolve(
            &msg.connection_id,
            PeerReply::ReserveConfirmed {
                connection_id: msg.connection_id.clone(),
                global_reservation_id: msg.global_reservation_id,
                description: msg.description,
                criteria,
            },
        )
        .await?;
        Ok(ack(header))
    }

    pub async fn reserve_commit_confirmed(
        &self,
        header: &NsiHeader,
        msg: GenericConfirmType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        self.resolve(
            &msg.connection_id,
            PeerReply::ReserveCommitted { connection_id: msg.connection_id.clone() },
        )
        .await?;
        Ok(ack(header))
    }

    pub async fn reserve_abort_confirmed(
        &self,
        header: &NsiHeader,
        msg: GenericConfirmType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        self.resolve(
            &msg.connection_id,
            PeerReply::ReserveAborted { connection_id: msg.connection_id.clone() },
        )
        .await?;
        Ok(ack(header))
    }

    pub async fn provision_confirmed(
        &self,
        header: &NsiHeader,
        msg: GenericConfirmType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        self.resolve(
            &msg.connection_id,
            PeerReply::Provisioned { connection_id: msg.connection_id.clone() },
        )
        .await?;
        Ok(ack(header))
    }

    pub async fn release_confirmed(
        &self,
        header: &NsiHeader,
        msg: GenericConfirmType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        self.resolve(
            &msg.connection_id,
            PeerReply::Released { connection_id: msg.connection_id.clone() },
        )
        .await?;
        Ok(ack(header))
    }

    pub async fn terminate_confirmed(
        &self,
        header: &NsiHeader,
        msg: GenericConfirmType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        self.resolve(
            &msg.connection_id,
            PeerReply::Terminated { connection_id: msg.connection_id.clone() },
        )
        .await?;
        Ok(ack(header))
    }

    pub async fn query_summary_confirmed(
        &self,
        header: &NsiHeader,
        msg: QuerySummaryConfirmedType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        // query exchanges span many connections; the handle is keyed by the
        // exchange's correlation id
        self.pending
            .resolve(
                &header.correlation_id,
                PeerReply::QuerySummary { reservations: msg.reservations },
            )
            .await?;
        Ok(ack(header))
    }

    // -------------------------------------------------------------------------
    // negative responses
    // -------------------------------------------------------------------------

    pub async fn reserve_failed(
        &self,
        header: &NsiHeader,
        msg: GenericFailureType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        let (connection_id, error) = parse_generic_failure(&msg);
        self.reject(&connection_id, error).await?;
        Ok(ack(header))
    }

    pub async fn reserve_commit_failed(
        &self,
        header: &NsiHeader,
        msg: GenericFailureType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        let (connection_id, error) = parse_generic_failure(&msg);
        self.reject(&connection_id, error).await?;
        Ok(ack(header))
    }

    pub async fn terminate_failed(
        &self,
        header: &NsiHeader,
        msg: GenericFailureType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        let (connection_id, error) = parse_generic_failure(&msg);
        self.reject(&connection_id, NsiError::Terminate(error.to_string())).await?;
        Ok(ack(header))
    }

    pub async fn query_summary_failed(
        &self,
        header: &NsiHeader,
        msg: GenericFailureType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        let (_, error) = parse_generic_failure(&msg);
        self.pending.reject(&header.correlation_id, error).await?;
        Ok(ack(header))
    }

    // -------------------------------------------------------------------------
    // notifications
    // -------------------------------------------------------------------------

    pub async fn error_event(
        &self,
        header: &NsiHeader,
        msg: ErrorEventType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        if self.pending.contains(&msg.connection_id).await {
            let error = match &msg.service_exception {
                Some(se) => NsiError::from_wire(&se.error_id, &se.text),
                None => NsiError::Connection(format!("error event: {}", msg.event)),
            };
            self.pending.reject(&msg.connection_id, error).await?;
        }
        self.emit(NsiEvent::ErrorEvent(msg));
        Ok(ack(header))
    }

    pub async fn data_plane_state_change(
        &self,
        header: &NsiHeader,
        msg: DataPlaneStateChangeType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        self.emit(NsiEvent::DataPlaneStateChange(msg));
        Ok(ack(header))
    }

    pub async fn reserve_timeout(
        &self,
        header: &NsiHeader,
        msg: ReserveTimeoutType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        if self.pending.contains(&msg.connection_id).await {
            let error = NsiError::Connection(format!(
                "reserve timeout from {} after {}s",
                msg.originating_nsa, msg.timeout_value
            ));
            self.pending.reject(&msg.connection_id, error).await?;
        }
        self.emit(NsiEvent::ReserveTimeout(msg));
        Ok(ack(header))
    }

    pub async fn message_delivery_timeout(
        &self,
        header: &NsiHeader,
        msg: MessageDeliveryTimeoutType,
    ) -> Result<GenericAcknowledgementType, NsiError> {
        if self.pending.contains(&msg.connection_id).await {
            let error = NsiError::Connection(format!(
                "message delivery timeout for correlation {}",
                msg.correlation_id
            ));
            self.pending.reject(&msg.connection_id, error).await?;
        }
        self.emit(NsiEvent::MessageDeliveryTimeout(msg));
        Ok(ack(header))
    }

    // -------------------------------------------------------------------------
    // plumbing
    // -------------------------------------------------------------------------

    async fn resolve(&self, connection_id: &str, reply: PeerReply) -> Result<(), NsiError> {
        match self.pending.resolve(connection_id, reply).await {
            Err(NsiError::ConnectionNonExistent(id)) => Err(self.classify_unknown(&id).await),
            other => other,
        }
    }

    async fn reject(&self, connection_id: &str, error: NsiError) -> Result<(), NsiError> {
        match self.pending.reject(connection_id, error).await {
            Err(NsiError::ConnectionNonExistent(id)) => Err(self.classify_unknown(&id).await),
            other => other,
        }
    }

    /// No handle was waiting: distinguish gone, known-but-idle, and unknown.
    async fn classify_unknown(&self, connection_id: &str) -> NsiError {
        match self.registry.lookup(connection_id).await {
            Ok(_) => NsiError::Connection(format!("no operation pending for {connection_id}")),
            Err(e) => e,
        }
    }

    fn emit(&self, event: NsiEvent) {
        // the receiver going away just means nobody subscribes to
        // notifications anymore
        let _ = self.events.send(event);
    }
}

fn ack(header: &NsiHeader) -> GenericAcknowledgementType {
    GenericAcknowledgementType { correlation_id: header.correlation_id.clone() }
}

// =============================================================================
// WIRE -> MODEL CONVERSION
// =============================================================================

fn stp_from_wire(stp: &StpType) -> Result<Stp, NsiError> {
    let mut labels = Vec::new();
    for pair in stp.labels.iter().flatten() {
        labels.push(Label::new(pair.type_uri.clone(), &pair.values.join(","))?);
    }
    Ok(Stp::with_labels(stp.network_id.clone(), stp.local_id.clone(), labels))
}

fn ero_from_wire(ero: &Option<Vec<OrderedStpType>>) -> Result<Option<Vec<Stp>>, NsiError> {
    match ero {
        None => Ok(None),
        Some(entries) => {
            let mut ordered: Vec<&OrderedStpType> = entries.iter().collect();
            ordered.sort_by_key(|e| e.order);
            ordered
                .into_iter()
                .map(|e| stp_from_wire(&e.stp))
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
        }
    }
}

fn directionality_from_wire(value: &str) -> Result<Directionality, NsiError> {
    match value {
        "Unidirectional" => Ok(Directionality::Unidirectional),
        "Bidirectional" => Ok(Directionality::Bidirectional),
        other => Err(NsiError::Payload(format!("unknown directionality {other}"))),
    }
}

/// Build model criteria from a reserve confirmation.
///
/// The VLAN ids ride next to the termination points on the wire; they are
/// lifted onto each STP as a single-value Ethernet-VLAN label before the
/// criteria go upward.
fn criteria_from_wire(criteria: CriteriaType) -> Result<Criteria, NsiError> {
    use crate::proto::types::ServiceDefinitionType;

    let schedule = Schedule::new(criteria.schedule.start_time, criteria.schedule.end_time)?;

    let ServiceDefinitionType::EthernetVlan(evts) = criteria.service_def else {
        return Err(NsiError::Payload(
            "only the Ethernet-VLAN service is supported in reserve confirmations".into(),
        ));
    };

    let mut source_stp = stp_from_wire(&evts.source_stp)?;
    let mut dest_stp = stp_from_wire(&evts.dest_stp)?;
    source_stp.labels = vec![Label::new(ETHERNET_VLAN, &evts.source_vlan.to_string())?];
    dest_stp.labels = vec![Label::new(ETHERNET_VLAN, &evts.dest_vlan.to_string())?];

    let mtu = evts
        .mtu
        .ok_or_else(|| NsiError::Payload("Ethernet-VLAN service is missing mtu".into()))?;
    let burst_size = evts
        .burstsize
        .ok_or_else(|| NsiError::Payload("Ethernet-VLAN service is missing burstsize".into()))?;

    let service_def = ServiceDefinition::ethernet_vlan(EthernetService {
        capacity: evts.capacity,
        directionality: directionality_from_wire(&evts.directionality)?,
        symmetric: evts.symmetric_path.unwrap_or(false),
        source_stp,
        dest_stp,
        ero: ero_from_wire(&evts.ero)?,
        mtu,
        burst_size,
    })?;

    Ok(Criteria { revision: criteria.version, schedule, service_def })
}

/// Pull the connection id and the mapped error kind out of a generic
/// failure body.
fn parse_generic_failure(msg: &GenericFailureType) -> (String, NsiError) {
    let se = &msg.service_exception;
    (msg.connection_id.clone(), NsiError::from_wire(&se.error_id, &se.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;
    use crate::proto::types::{
        ConnectionStatesType, DataPlaneStatusType, EthernetVlanServiceType, ScheduleType,
        ServiceDefinitionType, ServiceExceptionType,
    };
    use chrono::NaiveDate;

    fn service() -> (Arc<ConnectionRegistry>, Arc<PendingReplies>, RequesterService) {
        let registry = Arc::new(ConnectionRegistry::new());
        let pending = Arc::new(PendingReplies::new());
        let (service, _events) = RequesterService::new(registry.clone(), pending.clone());
        (registry, pending, service)
    }

    fn header() -> NsiHeader {
        NsiHeader::new("urn:ogf:network:aruba:nsa", "urn:ogf:network:bonaire:nsa")
    }

    fn wire_stp(network: &str, port: &str) -> StpType {
        StpType { network_id: network.into(), local_id: port.into(), labels: None }
    }

    fn reserve_confirmed_body(connection_id: &str) -> ReserveType {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        ReserveType {
            connection_id: connection_id.into(),
            global_reservation_id: Some("urn:uuid:global-1".into()),
            description: Some("test circuit".into()),
            criteria: CriteriaType {
                version: 0,
                schedule: ScheduleType {
                    start_time: day.and_hms_opt(10, 0, 0).unwrap(),
                    end_time: day.and_hms_opt(12, 0, 0).unwrap(),
                },
                service_def: ServiceDefinitionType::EthernetVlan(EthernetVlanServiceType {
                    capacity: 500_000_000,
                    directionality: "Bidirectional".into(),
                    symmetric_path: Some(false),
                    source_stp: wire_stp("bonaire", "b1"),
                    dest_stp: wire_stp("bonaire", "b2"),
                    ero: None,
                    mtu: Some(9000),
                    burstsize: Some(10_000),
                    source_vlan: 1780,
                    dest_vlan: 1781,
                }),
            },
        }
    }

    fn failure_body(connection_id: &str, error_id: &str, text: &str) -> GenericFailureType {
        GenericFailureType {
            connection_id: connection_id.into(),
            connection_states: ConnectionStatesType {
                reservation_state: "ReserveFailed".into(),
                provision_state: "Released".into(),
                lifecycle_state: "Created".into(),
                data_plane_status: DataPlaneStatusType {
                    active: false,
                    version: 0,
                    version_consistent: true,
                },
            },
            service_exception: ServiceExceptionType {
                nsa_id: "urn:ogf:network:bonaire:nsa".into(),
                connection_id: Some(connection_id.into()),
                service_type: None,
                error_id: error_id.into(),
                text: text.into(),
                variables: None,
                child_exception: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_reserve_confirmed_lifts_vlans_onto_stps() {
        let (_registry, pending, service) = service();
        let rx = pending.register("C-1").await.unwrap();

        service.reserve_confirmed(&header(), reserve_confirmed_body("C-1")).await.unwrap();

        let PeerReply::ReserveConfirmed { criteria, .. } = rx.await.unwrap().unwrap() else {
            panic!("expected a reserve confirmation");
        };
        let src = criteria.service_def.source_stp();
        let dst = criteria.service_def.dest_stp();
        assert_eq!(src.labels.len(), 1);
        assert_eq!(src.labels[0].type_uri(), ETHERNET_VLAN);
        assert_eq!(src.labels[0].single_value(), Some(1780));
        assert_eq!(dst.labels[0].single_value(), Some(1781));
    }

    #[tokio::test]
    async fn test_reserve_confirmed_unknown_connection() {
        let (_registry, _pending, service) = service();
        let err = service
            .reserve_confirmed(&header(), reserve_confirmed_body("C-404"))
            .await
            .unwrap_err();
        assert_eq!(err, NsiError::ConnectionNonExistent("C-404".into()));
    }

    #[tokio::test]
    async fn test_handle_acknowledges_even_on_dispatch_failure() {
        let (_registry, _pending, service) = service();
        let header = header();
        let correlation_id = header.correlation_id.clone();
        let ack = service
            .handle(Envelope {
                action: actions::RESERVE_CONFIRMED.into(),
                header,
                body: MessageBody::ReserveConfirmed(reserve_confirmed_body("C-404")),
            })
            .await;
        assert_eq!(ack.correlation_id, correlation_id);
    }

    #[tokio::test]
    async fn test_reserve_failed_rejects_waiter_with_mapped_kind() {
        let (_registry, pending, service) = service();
        let rx = pending.register("C-2").await.unwrap();
        service
            .reserve_failed(&header(), failure_body("C-2", error::RESERVE_ERROR, "no capacity"))
            .await
            .unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, NsiError::Reserve { .. }));
    }

    #[tokio::test]
    async fn test_unknown_wire_error_id_collapses_to_connection_error() {
        let (_registry, pending, service) = service();
        let rx = pending.register("C-3").await.unwrap();
        service
            .reserve_failed(&header(), failure_body("C-3", "54321", "weird"))
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap().unwrap_err(), NsiError::Connection("weird".into()));
    }

    #[tokio::test]
    async fn test_terminate_failed_maps_to_terminate_kind() {
        let (_registry, pending, service) = service();
        let rx = pending.register("C-4").await.unwrap();
        service
            .terminate_failed(&header(), failure_body("C-4", error::INTERNAL_ERROR, "nrm fault"))
            .await
            .unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, NsiError::Terminate(_)));
    }

    #[tokio::test]
    async fn test_notifications_reach_the_event_channel() {
        let registry = Arc::new(ConnectionRegistry::new());
        let pending = Arc::new(PendingReplies::new());
        let (service, mut events) = RequesterService::new(registry, pending.clone());

        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let change = DataPlaneStateChangeType {
            connection_id: "C-5".into(),
            notification_id: 1,
            time_stamp: day.and_hms_opt(10, 30, 0).unwrap(),
            data_plane_status: DataPlaneStatusType {
                active: true,
                version: 1,
                version_consistent: true,
            },
        };
        service.data_plane_state_change(&header(), change.clone()).await.unwrap();
        assert_eq!(events.recv().await.unwrap(), NsiEvent::DataPlaneStateChange(change));
    }

    #[tokio::test]
    async fn test_reserve_timeout_fails_the_waiting_task() {
        let (_registry, pending, service) = service();
        let rx = pending.register("C-6").await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        service
            .reserve_timeout(
                &header(),
                ReserveTimeoutType {
                    connection_id: "C-6".into(),
                    notification_id: 2,
                    time_stamp: day.and_hms_opt(10, 30, 0).unwrap(),
                    timeout_value: 120,
                    originating_connection_id: "C-6".into(),
                    originating_nsa: "urn:ogf:network:bonaire:nsa".into(),
                },
            )
            .await
            .unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("reserve timeout"));
    }

    #[tokio::test]
    async fn test_query_summary_resolved_by_correlation_id() {
        let (_registry, pending, service) = service();
        let header = header();
        let rx = pending.register(header.correlation_id.clone()).await.unwrap();
        service
            .query_summary_confirmed(
                &header,
                QuerySummaryConfirmedType { reservations: Vec::new() },
            )
            .await
            .unwrap();
        assert_eq!(
            rx.await.unwrap().unwrap(),
            PeerReply::QuerySummary { reservations: Vec::new() }
        );
    }
}
