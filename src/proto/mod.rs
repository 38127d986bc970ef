//! Protocol layer: action names, wire DTOs, codec and proxy boundaries, and
//! the requester callback surface.

pub mod actions;
pub mod codec;
pub mod proxy;
pub mod requester;
pub mod types;

pub use codec::{Codec, PostcardCodec};
pub use proxy::{PeerReply, PendingReplies, ProviderProxy};
pub use requester::{NsiEvent, RequesterService};
pub use types::{new_correlation_id, Envelope, MessageBody, NsiHeader};
