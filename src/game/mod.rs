//! Game simulation modules

pub mod food;
pub mod food_state;
pub mod r#match;
pub mod match_state;
pub mod matches;
pub mod observer;
pub mod player;
pub mod player_state;
pub mod ticker;

pub use food::Food;
pub use food_state::FoodState;
pub use match_state::{Arena, MatchSnapshot, MatchState, MatchStateUpdate, MatchStatus};
pub use matches::MatchRegistry;
pub use player::{Movement, Player};
pub use player_state::{BatchError, PlayerSnapshot, PlayerState, PlayerStateUpdate};
pub use r#match::Match;
pub use ticker::Ticker;

use serde::{Deserialize, Serialize};

/// A single arena tile coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// One segment of a snake body; index 0 of a body is the head
pub type BodyFragment = Tile;

/// Outbound side of a client connection, as seen by the simulation
pub trait Connection: Send + Sync {
    /// Push a serialized state message to the client
    fn send(&self, payload: &[u8]) -> Result<(), ConnectionError>;
}

/// Connection send errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Player has no bound connection")]
    NotBound,

    #[error("Connection closed")]
    Closed,

    #[error("Payload is not valid UTF-8")]
    InvalidPayload,
}

/// Game-level errors reported to callers
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("The match already has the maximum number of players ({limit})")]
    MatchFull { limit: usize },

    #[error("There is no match with id {0}")]
    MatchNotFound(String),

    #[error("There is no match owned by {0}")]
    OwnerNotFound(String),

    #[error("Failed to deliver message to {failed} of {total} players")]
    Broadcast { failed: usize, total: usize },

    #[error("Failed to generate match id: {0}")]
    Id(#[from] crate::util::id::IdError),
}
