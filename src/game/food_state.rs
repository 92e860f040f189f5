//! Observable food position cell

use parking_lot::Mutex;

use super::observer::Observers;
use super::Tile;

#[derive(Default)]
pub struct FoodState {
    position: Mutex<Tile>,
    observers: Observers<Tile>,
}

impl FoodState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the food and notify observers
    pub fn update_state(&self, position: Tile) {
        *self.position.lock() = position;
        self.observers.notify(&position);
    }

    pub fn on_update_state<F>(&self, observer: F)
    where
        F: Fn(&Tile) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer);
    }

    pub fn position(&self) -> Tile {
        *self.position.lock()
    }
}
