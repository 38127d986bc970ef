//! Wire DTOs for the NSI CS 2.0 message bodies.
//!
//! These mirror the element shapes of the three OGF namespaces; the codec
//! carries them as an [`Envelope`]. Conversions to the core data model live
//! with the requester surface, which is the only consumer that needs them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::NsiError;

// =============================================================================
// NAMESPACES AND TAG DISPATCH
// =============================================================================

pub const FRAMEWORK_TYPES_NS: &str = "http://schemas.ogf.org/nsi/2013/07/framework/types";
pub const SERVICES_TYPES_NS: &str = "http://schemas.ogf.org/nsi/2013/07/services/types";
pub const POINT2POINT_NS: &str = "http://schemas.ogf.org/nsi/2013/07/services/point2point";

/// Prefix of every correlation id.
pub const URN_UUID_PREFIX: &str = "urn:uuid:";

/// Element shapes an inbound service payload may dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    P2P,
    Ethernet,
    EthernetVlan,
    Stp,
    ServiceException,
}

impl ElementKind {
    /// Qualified tag in `{namespace}local` form.
    pub fn tag(self) -> &'static str {
        match self {
            ElementKind::P2P => "{http://schemas.ogf.org/nsi/2013/07/services/point2point}p2ps",
            ElementKind::Ethernet => "{http://schemas.ogf.org/nsi/2013/07/services/point2point}ets",
            ElementKind::EthernetVlan => {
                "{http://schemas.ogf.org/nsi/2013/07/services/point2point}evts"
            }
            ElementKind::Stp => "{http://schemas.ogf.org/nsi/2013/07/services/types}stp",
            ElementKind::ServiceException => {
                "{http://schemas.ogf.org/nsi/2013/07/framework/types}serviceException"
            }
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, NsiError> {
        [
            ElementKind::P2P,
            ElementKind::Ethernet,
            ElementKind::EthernetVlan,
            ElementKind::Stp,
            ElementKind::ServiceException,
        ]
        .into_iter()
        .find(|kind| kind.tag() == tag)
        .ok_or_else(|| NsiError::Payload(format!("no type mapping for tag {tag}")))
    }
}

// =============================================================================
// HEADER
// =============================================================================

/// The NSI request header carried alongside every message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsiHeader {
    pub requester_nsa: String,
    pub provider_nsa: String,
    pub session_security_attrs: Option<Vec<TypeValuePair>>,
    pub reply_to: Option<String>,
    pub correlation_id: String,
}

impl NsiHeader {
    pub fn new(requester_nsa: impl Into<String>, provider_nsa: impl Into<String>) -> Self {
        Self {
            requester_nsa: requester_nsa.into(),
            provider_nsa: provider_nsa.into(),
            session_security_attrs: None,
            reply_to: None,
            correlation_id: new_correlation_id(),
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Replace the correlation id for a follow-up exchange.
    pub fn refresh_correlation_id(&mut self) {
        self.correlation_id = new_correlation_id();
    }
}

/// A fresh `urn:uuid:` correlation id (time-based UUID).
pub fn new_correlation_id() -> String {
    static NODE_ID: OnceLock<[u8; 6]> = OnceLock::new();
    let node_id = NODE_ID.get_or_init(rand::random);
    format!("{URN_UUID_PREFIX}{}", Uuid::now_v1(node_id))
}

// =============================================================================
// FRAMEWORK AND SERVICES TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeValuePair {
    pub type_uri: String,
    pub namespace: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StpType {
    pub network_id: String,
    pub local_id: String,
    pub labels: Option<Vec<TypeValuePair>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedStpType {
    pub order: u32,
    pub stp: StpType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceExceptionType {
    pub nsa_id: String,
    pub connection_id: Option<String>,
    pub service_type: Option<String>,
    pub error_id: String,
    pub text: String,
    pub variables: Option<Vec<TypeValuePair>>,
    pub child_exception: Vec<ServiceExceptionType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPlaneStatusType {
    pub active: bool,
    pub version: u32,
    pub version_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatesType {
    pub reservation_state: String,
    pub provision_state: String,
    pub lifecycle_state: String,
    pub data_plane_status: DataPlaneStatusType,
}

// =============================================================================
// POINT2POINT SERVICE DEFINITIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2PServiceType {
    pub capacity: u64,
    pub directionality: String,
    pub symmetric_path: Option<bool>,
    pub source_stp: StpType,
    pub dest_stp: StpType,
    pub ero: Option<Vec<OrderedStpType>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetServiceType {
    pub capacity: u64,
    pub directionality: String,
    pub symmetric_path: Option<bool>,
    pub source_stp: StpType,
    pub dest_stp: StpType,
    pub ero: Option<Vec<OrderedStpType>>,
    pub mtu: Option<u32>,
    pub burstsize: Option<u64>,
}

/// Ethernet VLAN service. The VLAN ids ride in dedicated fields next to the
/// termination points; the requester surface lifts them onto the STPs as
/// single-value labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetVlanServiceType {
    pub capacity: u64,
    pub directionality: String,
    pub symmetric_path: Option<bool>,
    pub source_stp: StpType,
    pub dest_stp: StpType,
    pub ero: Option<Vec<OrderedStpType>>,
    pub mtu: Option<u32>,
    pub burstsize: Option<u64>,
    pub source_vlan: u32,
    pub dest_vlan: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceDefinitionType {
    P2P(P2PServiceType),
    Ethernet(EthernetServiceType),
    EthernetVlan(EthernetVlanServiceType),
}

impl ServiceDefinitionType {
    pub fn element_kind(&self) -> ElementKind {
        match self {
            ServiceDefinitionType::P2P(_) => ElementKind::P2P,
            ServiceDefinitionType::Ethernet(_) => ElementKind::Ethernet,
            ServiceDefinitionType::EthernetVlan(_) => ElementKind::EthernetVlan,
        }
    }
}

// =============================================================================
// MESSAGE BODIES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleType {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaType {
    pub version: u32,
    pub schedule: ScheduleType,
    pub service_def: ServiceDefinitionType,
}

/// Body of a reserve request; the confirmed response shares its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveType {
    pub connection_id: String,
    pub global_reservation_id: Option<String>,
    pub description: Option<String>,
    pub criteria: CriteriaType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericConfirmType {
    pub connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericFailureType {
    pub connection_id: String,
    pub connection_states: ConnectionStatesType,
    pub service_exception: ServiceExceptionType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericAcknowledgementType {
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEventType {
    pub connection_id: String,
    pub notification_id: u32,
    pub time_stamp: NaiveDateTime,
    pub event: String,
    pub additional_info: Option<Vec<TypeValuePair>>,
    pub service_exception: Option<ServiceExceptionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPlaneStateChangeType {
    pub connection_id: String,
    pub notification_id: u32,
    pub time_stamp: NaiveDateTime,
    pub data_plane_status: DataPlaneStatusType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveTimeoutType {
    pub connection_id: String,
    pub notification_id: u32,
    pub time_stamp: NaiveDateTime,
    pub timeout_value: u32,
    pub originating_connection_id: String,
    pub originating_nsa: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeliveryTimeoutType {
    pub connection_id: String,
    pub notification_id: u32,
    pub time_stamp: NaiveDateTime,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySummaryResultType {
    pub connection_id: String,
    pub global_reservation_id: Option<String>,
    pub description: Option<String>,
    pub requester_nsa: String,
    pub criteria: Option<CriteriaType>,
    pub connection_states: ConnectionStatesType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySummaryConfirmedType {
    pub reservations: Vec<QuerySummaryResultType>,
}

/// Every message body the codec can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    Reserve(ReserveType),
    ReserveConfirmed(ReserveType),
    GenericConfirm(GenericConfirmType),
    GenericFailure(GenericFailureType),
    Acknowledgement(GenericAcknowledgementType),
    ErrorEvent(ErrorEventType),
    DataPlaneStateChange(DataPlaneStateChangeType),
    ReserveTimeout(ReserveTimeoutType),
    MessageDeliveryTimeout(MessageDeliveryTimeoutType),
    QuerySummaryConfirmed(QuerySummaryConfirmedType),
}

/// A decoded message: action name, header, body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,
    pub header: NsiHeader,
    pub body: MessageBody,
}
