//! Core data model: termination points, links, paths, schedules, service
//! definitions, and NSA identities.
//!
//! These are the objects the orchestrator hands to backends and peers; the
//! wire DTOs in [`crate::proto::types`] convert to and from them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::NsiError;
use crate::label::Label;

/// URN prefix for networks, ports, and NSA identities.
pub const OGF_PREFIX: &str = "urn:ogf:network:";

/// Label type URI for Ethernet VLAN ids.
pub const ETHERNET_VLAN: &str = "http://schemas.ogf.org/nml/2012/10/ethernet#vlan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directionality {
    Unidirectional,
    Bidirectional,
}

impl Default for Directionality {
    fn default() -> Self {
        Directionality::Bidirectional
    }
}

impl fmt::Display for Directionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directionality::Unidirectional => f.write_str("Unidirectional"),
            Directionality::Bidirectional => f.write_str("Bidirectional"),
        }
    }
}

// =============================================================================
// TOPOLOGY
// =============================================================================

/// Service Termination Point: a port on a named network, optionally
/// constrained to a label subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stp {
    pub network: String,
    pub port: String,
    pub labels: Vec<Label>,
}

impl Stp {
    pub fn new(network: impl Into<String>, port: impl Into<String>) -> Self {
        Self { network: network.into(), port: port.into(), labels: Vec::new() }
    }

    pub fn with_labels(
        network: impl Into<String>,
        port: impl Into<String>,
        labels: Vec<Label>,
    ) -> Self {
        Self { network: network.into(), port: port.into(), labels }
    }

    /// Parse the URN form `urn:ogf:network:<network>:<port>`, with an
    /// optional `?vlan=<values>` suffix attaching an Ethernet-VLAN label.
    pub fn from_urn(urn: &str) -> Result<Self, NsiError> {
        let rest = urn
            .strip_prefix(OGF_PREFIX)
            .ok_or_else(|| NsiError::Payload(format!("STP {urn} lacks the {OGF_PREFIX} prefix")))?;

        let (rest, labels) = match rest.split_once("?vlan=") {
            Some((head, vlan)) => (head, vec![Label::new(ETHERNET_VLAN, vlan)?]),
            None => (rest, Vec::new()),
        };

        let (network, port) = rest
            .split_once(':')
            .ok_or_else(|| NsiError::Payload(format!("STP {urn} lacks a port component")))?;
        if network.is_empty() || port.is_empty() {
            return Err(NsiError::Payload(format!("STP {urn} has an empty network or port")));
        }
        Ok(Self::with_labels(network, port, labels))
    }

    /// URN form; a single Ethernet-VLAN label is rendered as `?vlan=`.
    pub fn urn(&self) -> String {
        let mut urn = format!("{OGF_PREFIX}{}:{}", self.network, self.port);
        if let [label] = self.labels.as_slice() {
            if label.type_uri() == ETHERNET_VLAN {
                urn.push_str("?vlan=");
                urn.push_str(&label.text_value());
            }
        }
        urn
    }
}

impl fmt::Display for Stp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.port)?;
        for label in &self.labels {
            write!(f, " {label}")?;
        }
        Ok(())
    }
}

/// An intra-network edge between two ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    network: String,
    src_port: String,
    dst_port: String,
    src_labels: Option<Vec<Label>>,
    dst_labels: Option<Vec<Label>>,
}

impl Link {
    /// Source and destination labels must both be present or both absent.
    pub fn new(
        network: impl Into<String>,
        src_port: impl Into<String>,
        dst_port: impl Into<String>,
        src_labels: Option<Vec<Label>>,
        dst_labels: Option<Vec<Label>>,
    ) -> Result<Self, NsiError> {
        if src_labels.is_some() != dst_labels.is_some() {
            return Err(NsiError::Payload(
                "link labels must be specified on both sides or neither".into(),
            ));
        }
        Ok(Self {
            network: network.into(),
            src_port: src_port.into(),
            dst_port: dst_port.into(),
            src_labels,
            dst_labels,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn source_stp(&self) -> Stp {
        Stp::with_labels(
            self.network.clone(),
            self.src_port.clone(),
            self.src_labels.clone().unwrap_or_default(),
        )
    }

    pub fn dest_stp(&self) -> Stp {
        Stp::with_labels(
            self.network.clone(),
            self.dst_port.clone(),
            self.dst_labels.clone().unwrap_or_default(),
        )
    }

    fn labeled_sides(&self) -> impl Iterator<Item = &Label> {
        self.src_labels
            .iter()
            .flatten()
            .chain(self.dst_labels.iter().flatten())
    }
}

/// An ordered, non-empty chain of links from source to destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    links: Vec<Link>,
}

impl Path {
    pub fn new(links: Vec<Link>) -> Result<Self, NsiError> {
        if links.is_empty() {
            return Err(NsiError::Payload("path must contain at least one link".into()));
        }
        Ok(Self { links })
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn source_stp(&self) -> Stp {
        self.links[0].source_stp()
    }

    pub fn dest_stp(&self) -> Stp {
        self.links[self.links.len() - 1].dest_stp()
    }

    /// Negotiate a label acceptable on every labeled side of the chain.
    ///
    /// Folds intersection over all labels of `type_uri` along the path.
    /// `Ok(None)` when no side carries that type; `EmptyLabelSet` when the
    /// chain has no common value.
    pub fn common_label(&self, type_uri: &str) -> Result<Option<Label>, NsiError> {
        let mut common: Option<Label> = None;
        for link in &self.links {
            for label in link.labeled_sides().filter(|l| l.type_uri() == type_uri) {
                common = Some(match common {
                    Some(acc) => acc.intersect(label)?,
                    None => label.clone(),
                });
            }
        }
        Ok(common)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_stp(), self.dest_stp())
    }
}

// =============================================================================
// SERVICE PARAMETERS
// =============================================================================

/// Reservation window. Naive instants; UTC is assumed at ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

impl Schedule {
    pub fn new(start_time: NaiveDateTime, end_time: NaiveDateTime) -> Result<Self, NsiError> {
        if end_time <= start_time {
            return Err(NsiError::Payload(format!(
                "schedule end {end_time} is not after start {start_time}"
            )));
        }
        Ok(Self { start_time, end_time })
    }
}

/// Desired capacity with optional negotiable bounds, in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bandwidth {
    pub desired: u64,
    pub minimum: Option<u64>,
    pub maximum: Option<u64>,
}

impl Bandwidth {
    pub fn fixed(desired: u64) -> Self {
        Self { desired, minimum: None, maximum: None }
    }
}

/// What a single reserve operation asks of a backend or peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceParameters {
    pub schedule: Schedule,
    pub source_stp: Stp,
    pub dest_stp: Stp,
    pub directionality: Directionality,
    pub bandwidth: Bandwidth,
}

impl ServiceParameters {
    pub fn new(schedule: Schedule, source_stp: Stp, dest_stp: Stp, bandwidth: Bandwidth) -> Self {
        Self {
            schedule,
            source_stp,
            dest_stp,
            directionality: Directionality::default(),
            bandwidth,
        }
    }

    /// A fresh copy restricted to one segment's termination points.
    pub fn restricted(&self, source_stp: Stp, dest_stp: Stp) -> Self {
        Self { source_stp, dest_stp, ..self.clone() }
    }
}

// =============================================================================
// SERVICE DEFINITIONS
// =============================================================================

/// Point-to-point service request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2PService {
    pub capacity: u64,
    pub directionality: Directionality,
    pub symmetric: bool,
    pub source_stp: Stp,
    pub dest_stp: Stp,
    /// Explicit route: ordered intermediate termination points.
    pub ero: Option<Vec<Stp>>,
}

/// Point-to-point service with Ethernet framing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetService {
    pub capacity: u64,
    pub directionality: Directionality,
    pub symmetric: bool,
    pub source_stp: Stp,
    pub dest_stp: Stp,
    pub ero: Option<Vec<Stp>>,
    pub mtu: u32,
    pub burst_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceDefinition {
    P2P(P2PService),
    Ethernet(EthernetService),
    EthernetVlan(EthernetService),
}

impl ServiceDefinition {
    pub fn p2p(service: P2PService) -> Self {
        ServiceDefinition::P2P(service)
    }

    /// Plain Ethernet: the termination points must not carry labels.
    pub fn ethernet(service: EthernetService) -> Result<Self, NsiError> {
        for stp in [&service.source_stp, &service.dest_stp] {
            if !stp.labels.is_empty() {
                return Err(NsiError::Payload(format!(
                    "Ethernet service termination point {stp} must not carry labels"
                )));
            }
        }
        Ok(ServiceDefinition::Ethernet(service))
    }

    /// Ethernet VLAN: exactly one Ethernet-VLAN label on each termination
    /// point.
    pub fn ethernet_vlan(service: EthernetService) -> Result<Self, NsiError> {
        for stp in [&service.source_stp, &service.dest_stp] {
            match stp.labels.as_slice() {
                [label] if label.type_uri() == ETHERNET_VLAN => {}
                _ => {
                    return Err(NsiError::Payload(format!(
                        "Ethernet-VLAN service termination point {} must carry exactly \
                         one Ethernet-VLAN label",
                        stp.urn()
                    )));
                }
            }
        }
        Ok(ServiceDefinition::EthernetVlan(service))
    }

    pub fn source_stp(&self) -> &Stp {
        match self {
            ServiceDefinition::P2P(s) => &s.source_stp,
            ServiceDefinition::Ethernet(s) | ServiceDefinition::EthernetVlan(s) => &s.source_stp,
        }
    }

    pub fn dest_stp(&self) -> &Stp {
        match self {
            ServiceDefinition::P2P(s) => &s.dest_stp,
            ServiceDefinition::Ethernet(s) | ServiceDefinition::EthernetVlan(s) => &s.dest_stp,
        }
    }
}

/// Versioned reservation criteria carried by reserve messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    pub revision: u32,
    pub schedule: Schedule,
    pub service_def: ServiceDefinition,
}

// =============================================================================
// NSA IDENTITY
// =============================================================================

/// A peer (or our own) Network Service Agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsaIdentity {
    identity: String,
    endpoint: String,
    service_type: Option<String>,
}

impl NsaIdentity {
    pub fn new(
        identity: impl Into<String>,
        endpoint: &str,
        service_type: Option<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            endpoint: endpoint.trim().to_string(),
            service_type,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn urn(&self) -> String {
        format!("{OGF_PREFIX}{}", self.identity)
    }

    pub fn host_port(&self) -> Result<(String, u16), NsiError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| NsiError::Payload(format!("NSA endpoint {}: {e}", self.endpoint)))?;
        let host = url
            .host_str()
            .ok_or_else(|| NsiError::Payload(format!("NSA endpoint {} has no host", self.endpoint)))?
            .to_string();
        let port = url.port_or_known_default().ok_or_else(|| {
            NsiError::Payload(format!("NSA endpoint {} has no port", self.endpoint))
        })?;
        Ok((host, port))
    }

    pub fn service_type(&self) -> Result<&str, NsiError> {
        self.service_type.as_deref().ok_or_else(|| {
            NsiError::Internal(format!("NSA {} was constructed without a service type", self.identity))
        })
    }
}

impl fmt::Display for NsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}
