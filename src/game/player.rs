//! Player movement queue, per-tick behaviors and connection binding

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use super::player_state::{PlayerState, PlayerStateUpdate};
use super::r#match::Match;
use super::{BodyFragment, Connection, ConnectionError, MatchStatus, Tile};

/// Length of a freshly spawned body
pub const INITIAL_BODY_LENGTH: i32 = 3;
/// Column spacing of the spawn lanes
const SPAWN_LANE_WIDTH: i32 = 16;
/// Row spacing of the spawn lanes
const SPAWN_LANE_HEIGHT: i32 = 9;
/// Spawn lanes per row
const SPAWN_LANES_PER_ROW: usize = 3;

/// Heading of a snake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Movement {
    pub fn axis(&self) -> Axis {
        match self {
            Self::Left | Self::Right => Axis::Horizontal,
            Self::Up | Self::Down => Axis::Vertical,
        }
    }

    /// Neighbouring tile in this direction; y grows downwards
    pub fn apply(&self, tile: Tile) -> Tile {
        match self {
            Self::Up => Tile::new(tile.x, tile.y - 1),
            Self::Down => Tile::new(tile.x, tile.y + 1),
            Self::Left => Tile::new(tile.x - 1, tile.y),
            Self::Right => Tile::new(tile.x + 1, tile.y),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown movement: {0}")]
pub struct UnknownMovement(String);

impl FromStr for Movement {
    type Err = UnknownMovement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(UnknownMovement(other.to_string())),
        }
    }
}

#[derive(Debug)]
struct Motion {
    pending: VecDeque<Movement>,
    moving: Movement,
    /// Tail fragment dropped by the latest move, restored on growth
    last_tail: Option<BodyFragment>,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            moving: Movement::Right,
            last_tail: None,
        }
    }
}

type DieHook = Arc<dyn Fn() + Send + Sync>;

/// A snake in a match
pub struct Player {
    id: String,
    name: String,
    state: PlayerState,
    motion: Mutex<Motion>,
    to_increase: AtomicU32,
    connection: Mutex<Option<Arc<dyn Connection>>>,
    game: Mutex<Weak<Match>>,
    on_die: Mutex<Option<DieHook>>,
}

impl Player {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: PlayerState::new(),
            motion: Mutex::new(Motion::default()),
            to_increase: AtomicU32::new(0),
            connection: Mutex::new(None),
            game: Mutex::new(Weak::new()),
            on_die: Mutex::new(None),
        }
    }

    /// Account identity
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Attach the outbound side of a client connection, replacing any previous one
    pub fn bind_connection(&self, connection: Arc<dyn Connection>) {
        *self.connection.lock() = Some(connection);
    }

    /// Detach `connection` if it is still the bound one
    pub fn unbind_connection(&self, connection: &Arc<dyn Connection>) -> bool {
        let mut bound = self.connection.lock();
        match bound.as_ref() {
            Some(current) if Arc::ptr_eq(current, connection) => {
                *bound = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    pub fn send_message(&self, payload: &[u8]) -> Result<(), ConnectionError> {
        let connection = self.connection.lock();
        match connection.as_ref() {
            Some(connection) => connection.send(payload),
            None => Err(ConnectionError::NotBound),
        }
    }

    // ------------------------------------------------------------------
    // Match binding
    // ------------------------------------------------------------------

    pub fn set_match(&self, game: Weak<Match>) {
        *self.game.lock() = game;
    }

    pub fn current_match(&self) -> Option<Arc<Match>> {
        self.game.lock().upgrade()
    }

    /// Hook fired when a collision kills this player; replaces the previous hook
    pub fn on_die<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_die.lock() = Some(Arc::new(hook));
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Queue a turn, ignoring it when it stays on the axis of the last queued
    /// (or current) heading
    pub fn add_movement(&self, movement: Movement) {
        let mut motion = self.motion.lock();
        let last = motion.pending.back().copied().unwrap_or(motion.moving);

        if last.axis() == movement.axis() {
            return;
        }

        motion.pending.push_back(movement);
    }

    /// Dispatch a decoded client intent
    pub fn handle_intent(&self, move_to: Option<Movement>, ready: Option<bool>) {
        if let Some(movement) = move_to {
            self.add_movement(movement);
        }

        let Some(ready) = ready else {
            return;
        };
        let Some(game) = self.current_match() else {
            return;
        };

        if game.state().status() != MatchStatus::OnHold || self.state.is_ready() == ready {
            return;
        }

        self.state.update_state(PlayerStateUpdate::ready(ready));
        if ready {
            game.ready();
        } else {
            game.unready();
        }
    }

    pub fn pending_movements(&self) -> Vec<Movement> {
        self.motion.lock().pending.iter().copied().collect()
    }

    pub fn moving(&self) -> Movement {
        self.motion.lock().moving
    }

    // ------------------------------------------------------------------
    // Growth
    // ------------------------------------------------------------------

    pub fn to_increase(&self, amount: u32) {
        self.to_increase.fetch_add(amount, Ordering::AcqRel);
    }

    pub fn pending_growth(&self) -> u32 {
        self.to_increase.load(Ordering::Acquire)
    }

    /// Re-grow by the tail dropped on the last move, if growth is pending
    pub fn increase(&self) {
        if !self.state.is_alive() {
            return;
        }

        let consumed = self
            .to_increase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if !consumed {
            return;
        }

        let Some(tail) = self.motion.lock().last_tail else {
            return;
        };

        let mut body = self.state.body();
        body.push(tail);
        self.state.update_state(PlayerStateUpdate::body(body));
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    /// Shift the body one tile along the next queued (or current) heading
    pub fn advance(&self) {
        if !self.state.is_alive() {
            return;
        }

        let body = self.state.body();
        let Some(&head) = body.first() else {
            return;
        };

        let moving = {
            let mut motion = self.motion.lock();
            if let Some(next) = motion.pending.pop_front() {
                motion.moving = next;
            }
            motion.last_tail = body.last().copied();
            motion.moving
        };

        let mut moved = Vec::with_capacity(body.len());
        moved.push(moving.apply(head));
        moved.extend_from_slice(&body[..body.len() - 1]);

        self.state.update_state(PlayerStateUpdate::body(moved));
    }

    /// Wrap the head to the opposite edge once it leaves the arena
    pub fn teleport_corner_screen(&self) {
        if !self.state.is_alive() {
            return;
        }
        let Some(game) = self.current_match() else {
            return;
        };

        let arena = game.state().arena();
        let mut body = self.state.body();
        let Some(head) = body.first_mut() else {
            return;
        };

        let wrapped = Tile::new(
            wrap(head.x, arena.horizontal),
            wrap(head.y, arena.vertical),
        );
        if wrapped == *head {
            return;
        }

        *head = wrapped;
        self.state.update_state(PlayerStateUpdate::body(body));
    }

    /// Die if the head overlaps any living body; own head excluded
    pub fn die_on_player_collision(&self) {
        if !self.state.is_alive() {
            return;
        }
        let Some(head) = self.state.head() else {
            return;
        };
        let Some(game) = self.current_match() else {
            return;
        };

        let collided = game.players().iter().any(|other| {
            if !other.state.is_alive() {
                return false;
            }
            let own = other.id == self.id;
            other
                .state
                .body()
                .iter()
                .enumerate()
                .any(|(index, fragment)| !(own && index == 0) && *fragment == head)
        });

        if !collided {
            return;
        }

        self.motion.lock().pending.clear();
        self.state.update_state(PlayerStateUpdate::alive(false));
        info!(match_id = %game.id(), player_id = %self.id, "Player died");

        let hook = self.on_die.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    // ------------------------------------------------------------------
    // Round lifecycle
    // ------------------------------------------------------------------

    /// Seed a three-tile body in the spawn lane of roster slot `n`, heading right
    pub fn generate_initial_body(&self, n: usize) {
        let column = (n % SPAWN_LANES_PER_ROW) as i32 + 1;
        let row = (n + 1).div_ceil(SPAWN_LANES_PER_ROW) as i32;

        let x = SPAWN_LANE_WIDTH * column;
        let y = SPAWN_LANE_HEIGHT * row;

        let body = (0..INITIAL_BODY_LENGTH)
            .map(|offset| Tile::new(x - offset, y))
            .collect();

        self.state.update_state(PlayerStateUpdate::body(body));
    }

    /// Prepare for a new round in roster slot `index`
    pub fn spawn(&self, index: usize) {
        *self.motion.lock() = Motion::default();
        self.to_increase.store(0, Ordering::Release);

        self.generate_initial_body(index);
        self.state.update_state(PlayerStateUpdate {
            is_alive: Some(true),
            is_ready: Some(false),
            body: None,
        });
        debug!(player_id = %self.id, slot = index, "Player spawned");
    }

    /// Back to lobby state: not alive, not ready, no body
    pub fn reset(&self) {
        *self.motion.lock() = Motion::default();
        self.to_increase.store(0, Ordering::Release);

        self.state.update_state(PlayerStateUpdate {
            is_alive: Some(false),
            is_ready: Some(false),
            body: Some(Vec::new()),
        });
    }
}

fn wrap(value: i32, size: i32) -> i32 {
    if value >= size {
        0
    } else if value < 0 {
        size - 1
    } else {
        value
    }
}
