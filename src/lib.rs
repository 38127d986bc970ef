//! NSI connection service agent.
//!
//! Reserves, provisions, releases, and terminates inter-domain circuits: a
//! request against a source/destination termination-point pair is decomposed
//! into a local segment (driven by a hardware backend) and remote segments
//! (delegated to peer agents), each driven through the shared lifecycle
//! state machine, with outcomes aggregated back to the requester.

pub mod backend;
pub mod conn;
pub mod error;
pub mod label;
pub mod model;
pub mod proto;
pub mod state;

pub use backend::{Backend, DudBackend};
pub use conn::{Binding, Connection, ConnectionRegistry, RegistryStats, SubConnection};
pub use error::{FailureMode, NsiError};
pub use label::Label;
pub use model::{
    Bandwidth, Criteria, Directionality, EthernetService, Link, NsaIdentity, P2PService, Path,
    Schedule, ServiceDefinition, ServiceParameters, Stp, ETHERNET_VLAN, OGF_PREFIX,
};
pub use proto::{
    actions, new_correlation_id, Codec, Envelope, MessageBody, NsiEvent, NsiHeader, PeerReply,
    PendingReplies, PostcardCodec, ProviderProxy, RequesterService,
};
pub use state::{LifecycleState, StateMachine};
