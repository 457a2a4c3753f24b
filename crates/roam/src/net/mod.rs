mod endpoint;
mod message;

pub use endpoint::{Endpoint, NetError};
pub use message::{
    Message, OP_HANDSHAKE_ACCEPT, OP_HANDSHAKE_REQUEST, OP_POSITION_BROADCAST, OP_POSITION_UPDATE,
    PlayerPosition, WireError,
};

pub const DEFAULT_PORT: u16 = 25565;

/// Receive buffer size; comfortably above the largest broadcast
/// (2 header bytes + 255 player triples).
pub const MAX_DATAGRAM_SIZE: usize = 2048;
