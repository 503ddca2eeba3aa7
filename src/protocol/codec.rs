//! JSON datagram codec. One message per datagram, no framing.

use thiserror::Error;

use super::message::CommandMessage;

/// Largest datagram the protocol produces or accepts
pub const MAX_DATAGRAM_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
    #[error("Encoded message is {0} bytes, larger than a single datagram")]
    Oversized(usize),
    #[error("Serialization error: {0}")]
    Encode(serde_json::Error),
}

pub fn encode(message: &CommandMessage) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(message).map_err(CodecError::Encode)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(CodecError::Oversized(bytes.len()));
    }
    Ok(bytes)
}

pub fn decode(datagram: &[u8]) -> Result<CommandMessage, CodecError> {
    Ok(serde_json::from_slice(datagram)?)
}
