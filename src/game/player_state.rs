//! Observable per-player state cell with notification batching

use parking_lot::Mutex;

use super::observer::Observers;
use super::BodyFragment;

/// Committed player state, handed to observers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub is_alive: bool,
    pub is_ready: bool,
    /// Head first
    pub body: Vec<BodyFragment>,
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct PlayerStateUpdate {
    pub is_alive: Option<bool>,
    pub is_ready: Option<bool>,
    pub body: Option<Vec<BodyFragment>>,
}

impl PlayerStateUpdate {
    pub fn alive(is_alive: bool) -> Self {
        Self {
            is_alive: Some(is_alive),
            ..Default::default()
        }
    }

    pub fn ready(is_ready: bool) -> Self {
        Self {
            is_ready: Some(is_ready),
            ..Default::default()
        }
    }

    pub fn body(body: Vec<BodyFragment>) -> Self {
        Self {
            body: Some(body),
            ..Default::default()
        }
    }
}

/// Misuse of the batching window
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("A state batch is already open")]
    AlreadyOpen,

    #[error("No state batch is open")]
    NotOpen,
}

#[derive(Debug, Default)]
struct Batch {
    open: bool,
    /// An update was committed while the batch was open
    dirty: bool,
}

/// Player liveness, readiness and body, mutated only through [`PlayerState::update_state`]
#[derive(Default)]
pub struct PlayerState {
    data: Mutex<PlayerSnapshot>,
    batch: Mutex<Batch>,
    observers: Observers<PlayerSnapshot>,
}

impl PlayerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a partial update and notify observers unless a batch is open
    pub fn update_state(&self, update: PlayerStateUpdate) {
        let snapshot = {
            let mut data = self.data.lock();
            if let Some(is_alive) = update.is_alive {
                data.is_alive = is_alive;
            }
            if let Some(is_ready) = update.is_ready {
                data.is_ready = is_ready;
            }
            if let Some(body) = update.body {
                data.body = body;
            }
            data.clone()
        };

        {
            let mut batch = self.batch.lock();
            if batch.open {
                batch.dirty = true;
                return;
            }
        }

        self.observers.notify(&snapshot);
    }

    pub fn on_update_state<F>(&self, observer: F)
    where
        F: Fn(&PlayerSnapshot) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Start suppressing notifications until [`PlayerState::close_batch`]
    pub fn open_batch(&self) -> Result<(), BatchError> {
        let mut batch = self.batch.lock();
        if batch.open {
            return Err(BatchError::AlreadyOpen);
        }
        batch.open = true;
        batch.dirty = false;
        Ok(())
    }

    /// End the batch, firing one notification if anything changed inside it
    pub fn close_batch(&self) -> Result<(), BatchError> {
        let dirty = {
            let mut batch = self.batch.lock();
            if !batch.open {
                return Err(BatchError::NotOpen);
            }
            batch.open = false;
            std::mem::take(&mut batch.dirty)
        };

        if dirty {
            self.observers.notify(&self.snapshot());
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.data.lock().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.data.lock().is_alive
    }

    pub fn is_ready(&self) -> bool {
        self.data.lock().is_ready
    }

    pub fn body(&self) -> Vec<BodyFragment> {
        self.data.lock().body.clone()
    }

    pub fn head(&self) -> Option<BodyFragment> {
        self.data.lock().body.first().copied()
    }
}
