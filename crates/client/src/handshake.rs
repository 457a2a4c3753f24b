//! Identifier negotiation: propose random ids until the peer confirms one.

use rand::Rng;

use roam::{Endpoint, Message, NetError};

/// Bound on negotiation attempts. `None` retries forever, which is what the
/// wire protocol expects; tests and cautious callers can cap it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("gave up negotiating an id after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error(transparent)]
    Net(NetError),
}

/// What one negotiation attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    /// Peer accepted our candidate.
    Confirmed(u8),
    /// Peer accepted a different id; ours is taken.
    Conflict(u8),
    /// Reply carried an opcode the handshake does not expect.
    Unexpected(u8),
}

fn classify(candidate: u8, reply: &Message) -> AttemptOutcome {
    match *reply {
        Message::HandshakeAccept { id } if id == candidate => AttemptOutcome::Confirmed(id),
        Message::HandshakeAccept { id } => AttemptOutcome::Conflict(id),
        ref other => AttemptOutcome::Unexpected(other.opcode()),
    }
}

/// Run the negotiation loop until the peer confirms a candidate id.
///
/// Every attempt proposes a fresh random id in [1,255] and waits one socket
/// timeout for the reply. Timeouts, conflicts and unexpected replies all
/// retry; only an exhausted retry budget or a hard socket error gives up.
pub fn negotiate<R: Rng>(
    endpoint: &mut Endpoint,
    rng: &mut R,
    policy: RetryPolicy,
) -> Result<u8, HandshakeError> {
    let mut attempts = 0u32;

    loop {
        if let Some(max) = policy.max_attempts {
            if attempts >= max {
                return Err(HandshakeError::Exhausted { attempts });
            }
        }
        attempts += 1;

        let candidate: u8 = rng.gen_range(1..=255);
        log::debug!("proposing id {} (attempt {})", candidate, attempts);

        match endpoint.exchange(&Message::HandshakeRequest { id: candidate }) {
            Ok((reply, _)) => match classify(candidate, &reply) {
                AttemptOutcome::Confirmed(id) => {
                    log::info!("server confirmed id {}", id);
                    return Ok(id);
                }
                AttemptOutcome::Conflict(taken) => {
                    log::info!("id {} already taken (server holds {}), retrying", candidate, taken);
                }
                AttemptOutcome::Unexpected(opcode) => {
                    log::warn!("unexpected opcode {} during handshake, retrying", opcode);
                }
            },
            Err(NetError::Timeout) => {
                log::debug!("no handshake reply for id {}, retrying", candidate);
            }
            Err(NetError::Wire(e)) => {
                log::warn!("malformed handshake reply: {}, retrying", e);
            }
            Err(e) => return Err(HandshakeError::Net(e)),
        }
    }
}
