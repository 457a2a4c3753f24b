use crate::player::Position;

pub const OP_HANDSHAKE_REQUEST: u8 = 1;
pub const OP_HANDSHAKE_ACCEPT: u8 = 2;
pub const OP_POSITION_UPDATE: u8 = 3;
pub const OP_POSITION_BROADCAST: u8 = 4;

/// One remote player's entry in a broadcast payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerPosition {
    pub id: u8,
    pub pos: Position,
}

impl PlayerPosition {
    pub fn new(id: u8, x: u8, y: u8) -> Self {
        Self {
            id,
            pos: Position { x, y },
        }
    }
}

/// A protocol message: opcode byte followed by a fixed payload shape.
///
/// The codec validates structural length only. Whether an id or coordinate
/// is semantically sensible is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    HandshakeRequest { id: u8 },
    HandshakeAccept { id: u8 },
    PositionUpdate { id: u8, x: u8, y: u8 },
    PositionBroadcast { players: Vec<PlayerPosition> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("truncated message: opcode {opcode} expects {expected} payload bytes, got {actual}")]
    Truncated {
        opcode: u8,
        expected: usize,
        actual: usize,
    },
}

impl Message {
    pub fn opcode(&self) -> u8 {
        match self {
            Message::HandshakeRequest { .. } => OP_HANDSHAKE_REQUEST,
            Message::HandshakeAccept { .. } => OP_HANDSHAKE_ACCEPT,
            Message::PositionUpdate { .. } => OP_POSITION_UPDATE,
            Message::PositionBroadcast { .. } => OP_POSITION_BROADCAST,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::HandshakeRequest { id } => vec![OP_HANDSHAKE_REQUEST, *id],
            Message::HandshakeAccept { id } => vec![OP_HANDSHAKE_ACCEPT, *id],
            Message::PositionUpdate { id, x, y } => vec![OP_POSITION_UPDATE, *id, *x, *y],
            Message::PositionBroadcast { players } => {
                let mut bytes = Vec::with_capacity(2 + players.len() * 3);
                bytes.push(OP_POSITION_BROADCAST);
                bytes.push(players.len() as u8);
                for p in players {
                    bytes.push(p.id);
                    bytes.push(p.pos.x);
                    bytes.push(p.pos.y);
                }
                bytes
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let (&opcode, payload) = data.split_first().ok_or(WireError::Empty)?;
        match opcode {
            OP_HANDSHAKE_REQUEST => {
                let id = expect_len::<1>(opcode, payload)?[0];
                Ok(Message::HandshakeRequest { id })
            }
            OP_HANDSHAKE_ACCEPT => {
                let id = expect_len::<1>(opcode, payload)?[0];
                Ok(Message::HandshakeAccept { id })
            }
            OP_POSITION_UPDATE => {
                let [id, x, y] = expect_len::<3>(opcode, payload)?;
                Ok(Message::PositionUpdate { id, x, y })
            }
            OP_POSITION_BROADCAST => {
                let count = *payload.first().ok_or(WireError::Truncated {
                    opcode,
                    expected: 1,
                    actual: 0,
                })? as usize;
                let body = &payload[1..];
                if body.len() < count * 3 {
                    return Err(WireError::Truncated {
                        opcode,
                        expected: 1 + count * 3,
                        actual: payload.len(),
                    });
                }
                let players = body
                    .chunks_exact(3)
                    .take(count)
                    .map(|triple| PlayerPosition::new(triple[0], triple[1], triple[2]))
                    .collect();
                Ok(Message::PositionBroadcast { players })
            }
            other => Err(WireError::UnknownOpcode(other)),
        }
    }
}

fn expect_len<const N: usize>(opcode: u8, payload: &[u8]) -> Result<[u8; N], WireError> {
    payload
        .get(..N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(WireError::Truncated {
            opcode,
            expected: N,
            actual: payload.len(),
        })
}
