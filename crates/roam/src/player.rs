use std::collections::HashMap;

use rand::Rng;

use crate::net::PlayerPosition;

/// A coordinate pair on the 256x256 field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

impl Position {
    pub fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Advance one tick: each axis gains an independent delta in {0,1,2}.
    pub fn step<R: Rng>(&mut self, rng: &mut R) {
        self.x = wrap_add(self.x, rng.gen_range(0..=2));
        self.y = wrap_add(self.y, rng.gen_range(0..=2));
    }
}

/// Wire-compatible wrap: values past 255 lose 255, not 256. A delta applied
/// at 255 lands in [1,2], never 0. The asymmetry is deliberate.
fn wrap_add(coord: u8, delta: u8) -> u8 {
    let sum = coord as u16 + delta as u16;
    if sum > 255 { (sum - 255) as u8 } else { sum as u8 }
}

/// Last known positions of the other participants, keyed by id.
///
/// Entries are only ever inserted or overwritten; the protocol defines no
/// removal, so a player that stops broadcasting stays at its last position.
#[derive(Debug, Default)]
pub struct Roster {
    players: HashMap<u8, Position>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one broadcast: existing ids are overwritten, new ids inserted.
    pub fn merge(&mut self, players: &[PlayerPosition]) {
        for p in players {
            self.players.insert(p.id, p.pos);
        }
    }

    pub fn get(&self, id: u8) -> Option<Position> {
        self.players.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, Position)> + '_ {
        self.players.iter().map(|(&id, &pos)| (id, pos))
    }
}
