//! Pluggable message codec boundary.
//!
//! The orchestrator never touches wire syntax: it hands an [`Envelope`] to a
//! codec and gets one back. A SOAP/XML codec slots in behind the same trait;
//! the crate ships a compact postcard codec used by tests and co-located
//! deployments.

use crate::error::NsiError;
use crate::proto::types::Envelope;

pub trait Codec: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, NsiError>;
    fn decode(&self, data: &[u8]) -> Result<Envelope, NsiError>;
}

/// Serde/postcard codec.
pub struct PostcardCodec;

impl Codec for PostcardCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, NsiError> {
        postcard::to_allocvec(envelope)
            .map_err(|e| NsiError::Payload(format!("encode {}: {e}", envelope.action)))
    }

    fn decode(&self, data: &[u8]) -> Result<Envelope, NsiError> {
        postcard::from_bytes(data).map_err(|e| NsiError::Payload(format!("decode: {e}")))
    }
}
