//! Observable match status, arena geometry and food limit

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::observer::Observers;
use super::Tile;

/// Match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Lobby, waiting for every player to be ready
    #[default]
    OnHold,
    /// Round in progress
    Running,
}

/// Toroidal tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Arena {
    /// Tile columns
    pub horizontal: i32,
    /// Tile rows
    pub vertical: i32,
}

impl Arena {
    pub const fn new(horizontal: i32, vertical: i32) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn contains(&self, tile: Tile) -> bool {
        (0..self.horizontal).contains(&tile.x) && (0..self.vertical).contains(&tile.y)
    }

    pub fn tile_count(&self) -> usize {
        (self.horizontal.max(0) as usize) * (self.vertical.max(0) as usize)
    }
}

/// Committed match state, handed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchSnapshot {
    pub status: MatchStatus,
    pub arena: Arena,
    pub foods_limit: usize,
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchStateUpdate {
    pub status: Option<MatchStatus>,
    pub arena: Option<Arena>,
    pub foods_limit: Option<usize>,
}

impl MatchStateUpdate {
    pub fn status(status: MatchStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct MatchState {
    data: Mutex<MatchSnapshot>,
    observers: Observers<MatchSnapshot>,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_state(&self, update: MatchStateUpdate) {
        let snapshot = {
            let mut data = self.data.lock();
            if let Some(status) = update.status {
                data.status = status;
            }
            if let Some(arena) = update.arena {
                data.arena = arena;
            }
            if let Some(foods_limit) = update.foods_limit {
                data.foods_limit = foods_limit;
            }
            *data
        };

        self.observers.notify(&snapshot);
    }

    /// Change status only if it currently equals `from`; returns whether it changed
    pub fn transition(&self, from: MatchStatus, to: MatchStatus) -> bool {
        let snapshot = {
            let mut data = self.data.lock();
            if data.status != from {
                return false;
            }
            data.status = to;
            *data
        };

        self.observers.notify(&snapshot);
        true
    }

    pub fn on_update_state<F>(&self, observer: F)
    where
        F: Fn(&MatchSnapshot) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer);
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        *self.data.lock()
    }

    pub fn status(&self) -> MatchStatus {
        self.data.lock().status
    }

    pub fn arena(&self) -> Arena {
        self.data.lock().arena
    }

    pub fn foods_limit(&self) -> usize {
        self.data.lock().foods_limit
    }
}
