//! Wire protocol shared by master and slaves

mod codec;
mod message;

pub use codec::{decode, encode, CodecError, MAX_DATAGRAM_SIZE};
pub use message::{Command, CommandMessage, Payload};
