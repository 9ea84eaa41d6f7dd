//! Payload encoding for peer descriptors.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{DecodeError, EncodeError, PeerDescriptor};

/// Encode a descriptor as a pub/sub payload.
pub fn encode(descriptor: &PeerDescriptor) -> Result<String, EncodeError> {
    let bytes = postcard::to_allocvec(descriptor)?;
    Ok(STANDARD.encode(bytes))
}

/// Decode a payload produced by [`encode`].
pub fn decode(payload: &str) -> Result<PeerDescriptor, DecodeError> {
    let bytes = STANDARD.decode(payload)?;
    let (descriptor, rest) =
        postcard::take_from_bytes::<PeerDescriptor>(&bytes).map_err(DecodeError::Corrupt)?;
    if !rest.is_empty() {
        return Err(DecodeError::TrailingBytes {
            remaining: rest.len(),
        });
    }
    Ok(descriptor)
}
