//! Match roster, round orchestration and broadcast

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use super::food::{self, Food};
use super::match_state::{MatchState, MatchStateUpdate, MatchStatus};
use super::player::Player;
use super::player_state::BatchError;
use super::ticker::Ticker;
use super::GameError;

/// Tick layer for movement and edge wrapping
pub const LAYER_MOVEMENT: u8 = 0;
/// Tick layer for food checks, after every player has moved
pub const LAYER_FOOD: u8 = 1;
/// Tick layer for growth and collisions
pub const LAYER_GROWTH: u8 = 2;

type RoundHandler = Box<dyn Fn(&Match) + Send + Sync>;

/// Owner plus the rest of the players, in join order
#[derive(Default)]
struct Roster {
    owner: Option<Arc<Player>>,
    players: Vec<Arc<Player>>,
}

impl Roster {
    fn len(&self) -> usize {
        usize::from(self.owner.is_some()) + self.players.len()
    }

    fn all(&self) -> Vec<Arc<Player>> {
        self.owner.iter().chain(self.players.iter()).cloned().collect()
    }
}

/// A match: roster, foods, tick schedule and observable state
pub struct Match {
    id: String,
    players_limit: usize,
    state: MatchState,
    roster: Mutex<Roster>,
    foods: Mutex<Vec<Arc<Food>>>,
    ready_count: Mutex<usize>,
    on_start: Mutex<Vec<RoundHandler>>,
    on_end: Mutex<Vec<RoundHandler>>,
    ticker: Ticker,
    /// Incremented by every round start; callbacks of older rounds short-circuit
    round: AtomicU64,
    rng: Mutex<ChaCha8Rng>,
    me: Weak<Match>,
}

impl Match {
    pub fn new(id: impl Into<String>, players_limit: usize, seed: u64, ticker: Ticker) -> Arc<Self> {
        let id = id.into();
        Arc::new_cyclic(|me| Self {
            id,
            players_limit,
            state: MatchState::new(),
            roster: Mutex::new(Roster::default()),
            foods: Mutex::new(Vec::new()),
            ready_count: Mutex::new(0),
            on_start: Mutex::new(Vec::new()),
            on_end: Mutex::new(Vec::new()),
            ticker,
            round: AtomicU64::new(0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            me: me.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn players_limit(&self) -> usize {
        self.players_limit
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Acquire)
    }

    pub fn owner(&self) -> Option<Arc<Player>> {
        self.roster.lock().owner.clone()
    }

    /// Whole roster, owner first
    pub fn players(&self) -> Vec<Arc<Player>> {
        self.roster.lock().all()
    }

    pub fn roster_len(&self) -> usize {
        self.roster.lock().len()
    }

    pub fn player_by_id(&self, id: &str) -> Option<Arc<Player>> {
        self.players().into_iter().find(|player| player.id() == id)
    }

    pub fn foods(&self) -> Vec<Arc<Food>> {
        self.foods.lock().clone()
    }

    pub fn ready_count(&self) -> usize {
        *self.ready_count.lock()
    }

    pub(crate) fn with_rng<R>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> R) -> R {
        f(&mut self.rng.lock())
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    /// Join the match; the first player to enter becomes the owner
    pub fn enter(&self, player: &Arc<Player>) -> Result<(), GameError> {
        {
            let mut roster = self.roster.lock();
            if roster.owner.is_none() {
                roster.owner = Some(player.clone());
            } else if roster.len() < self.players_limit {
                roster.players.push(player.clone());
            } else {
                return Err(GameError::MatchFull {
                    limit: self.players_limit,
                });
            }
        }

        player.set_match(self.me.clone());
        info!(match_id = %self.id, player_id = %player.id(), "Player entered match");
        Ok(())
    }

    /// Remove a player; the first remaining player inherits ownership.
    ///
    /// Returns whether the player was in the roster.
    pub fn remove_player(&self, player: &Player) -> bool {
        let mut roster = self.roster.lock();

        let is_owner = roster
            .owner
            .as_ref()
            .is_some_and(|owner| owner.id() == player.id());

        if is_owner {
            roster.owner = if roster.players.is_empty() {
                None
            } else {
                Some(roster.players.remove(0))
            };
        } else {
            let before = roster.players.len();
            roster.players.retain(|other| other.id() != player.id());
            if roster.players.len() == before {
                return false;
            }
        }

        info!(
            match_id = %self.id,
            player_id = %player.id(),
            new_owner = ?roster.owner.as_ref().map(|owner| owner.id().to_string()),
            "Player removed from match"
        );
        true
    }

    // ------------------------------------------------------------------
    // Lobby
    // ------------------------------------------------------------------

    /// Count one more ready player; starts the round once everyone is ready
    pub fn ready(&self) {
        let roster_len = self.roster_len();
        let everyone_ready = {
            let mut ready_count = self.ready_count.lock();
            *ready_count += 1;
            if *ready_count >= roster_len && roster_len > 0 {
                *ready_count = 0;
                true
            } else {
                false
            }
        };

        if everyone_ready && self.state.transition(MatchStatus::OnHold, MatchStatus::Running) {
            self.start();
        }
    }

    pub fn unready(&self) {
        let mut ready_count = self.ready_count.lock();
        *ready_count = ready_count.saturating_sub(1);
    }

    /// Register a handler run by every round start, once the round's foods exist
    pub fn on_start<F>(&self, handler: F)
    where
        F: Fn(&Match) + Send + Sync + 'static,
    {
        self.on_start.lock().push(Box::new(handler));
    }

    /// Register a handler run by every round end, once players are back in the lobby
    pub fn on_end<F>(&self, handler: F)
    where
        F: Fn(&Match) + Send + Sync + 'static,
    {
        self.on_end.lock().push(Box::new(handler));
    }

    // ------------------------------------------------------------------
    // Rounds
    // ------------------------------------------------------------------

    fn start(&self) {
        let players = self.players();

        self.ticker.reset();
        let round = self.round.fetch_add(1, Ordering::AcqRel) + 1;

        let foods = food::batch(&self.me, self.state.foods_limit());
        *self.foods.lock() = foods.clone();

        for (index, player) in players.iter().enumerate() {
            let p = player.clone();
            self.on_round_tick(round, LAYER_MOVEMENT, move || {
                check_batch(p.state().open_batch());
                p.advance();
                p.teleport_corner_screen();
            });

            let p = player.clone();
            self.on_round_tick(round, LAYER_GROWTH, move || {
                p.increase();
                p.die_on_player_collision();
                check_batch(p.state().close_batch());
            });

            player.spawn(index);

            let me = self.me.clone();
            player.on_die(move || {
                let Some(game) = me.upgrade() else {
                    return;
                };
                if game.round() == round && game.all_dead() {
                    game.end();
                }
            });
        }

        for handler in self.on_start.lock().iter() {
            handler(self);
        }

        for food in &foods {
            let f = food.clone();
            self.on_round_tick(round, LAYER_FOOD, move || f.check_was_eaten());
            food.summon();
        }

        self.ticker.start();

        info!(
            match_id = %self.id,
            round,
            players = players.len(),
            foods = foods.len(),
            "Round started"
        );
    }

    fn end(&self) {
        if !self.state.transition(MatchStatus::Running, MatchStatus::OnHold) {
            return;
        }

        self.ticker.stop();
        self.foods.lock().clear();
        *self.ready_count.lock() = 0;

        for player in self.players() {
            player.reset();
        }

        for handler in self.on_end.lock().iter() {
            handler(self);
        }

        info!(match_id = %self.id, round = self.round(), "Round ended");
    }

    fn all_dead(&self) -> bool {
        self.players()
            .iter()
            .all(|player| !player.state().is_alive())
    }

    /// Register a tick callback that only runs while `round` is current
    fn on_round_tick<F>(&self, round: u64, layer: u8, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let me = self.me.clone();
        self.ticker.on_tick(layer, move || {
            let Some(game) = me.upgrade() else {
                return;
            };
            if game.round() != round {
                debug!(match_id = %game.id(), round, "Skipping stale round callback");
                return;
            }
            callback();
        });
    }

    /// Stop ticking for good; called when the match leaves the registry
    pub fn shutdown(&self) {
        self.ticker.stop();
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    /// Send `payload` to every roster member, continuing past failed sends
    pub fn send_message(&self, payload: &[u8]) -> Result<(), GameError> {
        let players = self.players();
        let total = players.len();
        let mut failed = 0;

        for player in &players {
            if let Err(e) = player.send_message(payload) {
                debug!(match_id = %self.id, player_id = %player.id(), error = %e, "Send failed");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(GameError::Broadcast { failed, total });
        }
        Ok(())
    }
}

fn check_batch(result: Result<(), BatchError>) {
    if let Err(e) = &result {
        error!(error = %e, "Player state batch misuse");
    }
    debug_assert!(result.is_ok(), "player state batch misuse");
}

impl std::fmt::Debug for Match {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Match")
            .field("id", &self.id)
            .field("players_limit", &self.players_limit)
            .field("status", &self.state.status())
            .field("roster", &self.roster_len())
            .field("round", &self.round())
            .finish()
    }
}

impl Drop for Match {
    fn drop(&mut self) {
        if self.ticker.is_running() {
            warn!(match_id = %self.id, "Match dropped while ticking");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Arena, Connection, ConnectionError, Movement, PlayerStateUpdate, Tile};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Recorder {
        sent: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl Recorder {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    impl Connection for Recorder {
        fn send(&self, payload: &[u8]) -> Result<(), ConnectionError> {
            if self.fail {
                return Err(ConnectionError::Closed);
            }
            self.sent.lock().push(payload.to_vec());
            Ok(())
        }
    }

    fn lobby(players_limit: usize, arena: Arena, foods_limit: usize) -> Arc<Match> {
        let game = Match::new("100", players_limit, 1234, Ticker::manual());
        game.state().update_state(MatchStateUpdate {
            status: Some(MatchStatus::OnHold),
            arena: Some(arena),
            foods_limit: Some(foods_limit),
        });
        game
    }

    fn join(game: &Arc<Match>, id: &str) -> Arc<Player> {
        let player = Arc::new(Player::new(id, format!("{id}-name")));
        game.enter(&player).unwrap();
        player
    }

    fn occupied(game: &Match) -> Vec<Tile> {
        game.players()
            .iter()
            .flat_map(|player| player.state().body())
            .collect()
    }

    #[test]
    fn test_enter_respects_players_limit() {
        let game = lobby(2, Arena::new(10, 10), 1);
        let owner = join(&game, "a");
        let second = join(&game, "b");

        let third = Arc::new(Player::new("c", "c"));
        let result = game.enter(&third);

        assert!(matches!(result, Err(GameError::MatchFull { limit: 2 })));
        assert_eq!(game.roster_len(), 2);
        assert_eq!(game.owner().unwrap().id(), owner.id());
        assert!(third.current_match().is_none());
        assert!(second.current_match().is_some());
    }

    #[test]
    fn test_remove_owner_promotes_next_player() {
        let game = lobby(3, Arena::new(10, 10), 1);
        let a = join(&game, "a");
        let b = join(&game, "b");
        let c = join(&game, "c");

        assert!(game.remove_player(&a));
        assert_eq!(game.owner().unwrap().id(), "b");
        let ids: Vec<_> = game.players().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        assert!(game.remove_player(&c));
        assert!(!game.remove_player(&c));
        assert!(game.remove_player(&b));
        assert!(game.owner().is_none());
        assert_eq!(game.roster_len(), 0);
    }

    #[test]
    fn test_player_lookup_by_account() {
        let game = lobby(3, Arena::new(10, 10), 1);
        join(&game, "a");
        join(&game, "b");

        assert_eq!(game.player_by_id("b").unwrap().name(), "b-name");
        assert!(game.player_by_id("z").is_none());
    }

    #[test]
    fn test_everyone_ready_starts_round() {
        let game = lobby(3, Arena::new(64, 36), 2);
        let players = [join(&game, "a"), join(&game, "b"), join(&game, "c")];

        game.ready();
        game.ready();
        assert_eq!(game.state().status(), MatchStatus::OnHold);
        game.ready();

        assert_eq!(game.state().status(), MatchStatus::Running);
        assert_eq!(game.round(), 1);
        assert_eq!(game.ready_count(), 0);
        for player in &players {
            assert!(player.state().is_alive());
            assert!(!player.state().is_ready());
            assert_eq!(player.state().body().len(), 3);
        }
        assert_eq!(game.foods().len(), 2);

        let bodies = occupied(&game);
        for food in game.foods() {
            assert!(game.state().arena().contains(food.position()));
            assert!(!bodies.contains(&food.position()));
        }
    }

    #[test]
    fn test_unready_blocks_start() {
        let game = lobby(3, Arena::new(64, 36), 1);
        join(&game, "a");
        join(&game, "b");
        join(&game, "c");

        game.ready();
        game.ready();
        game.unready();
        game.ready();

        assert_eq!(game.ready_count(), 2);
        assert_eq!(game.state().status(), MatchStatus::OnHold);
        assert!(game.foods().is_empty());

        game.unready();
        game.unready();
        game.unready();
        assert_eq!(game.ready_count(), 0);
    }

    #[test]
    fn test_on_start_handlers_see_fresh_foods() {
        let game = lobby(1, Arena::new(20, 20), 3);
        join(&game, "a");
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();
        game.on_start(move |game| {
            sink.store(game.foods().len(), Ordering::SeqCst);
        });

        game.ready();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_round_setup_finishes_before_first_tick() {
        let game = Match::new("300", 1, 7, Ticker::new(Duration::from_millis(1)));
        game.state().update_state(MatchStateUpdate {
            status: Some(MatchStatus::OnHold),
            arena: Some(Arena::new(64, 36)),
            foods_limit: Some(1),
        });
        let player = join(&game, "a");
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        game.on_start(move |game| {
            std::thread::sleep(Duration::from_millis(30));
            *sink.lock() = game.players()[0].state().head();
        });

        game.ready();

        assert_eq!(*seen.lock(), Some(Tile::new(16, 9)));
        assert!(game.ticker().is_running());

        tokio::time::sleep(Duration::from_millis(20)).await;
        game.shutdown();
        assert_ne!(player.state().head(), Some(Tile::new(16, 9)));
    }

    #[test]
    fn test_tick_moves_every_player_with_one_notification() {
        let game = lobby(2, Arena::new(64, 36), 1);
        let a = join(&game, "a");
        let b = join(&game, "b");
        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        a.state().on_update_state(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        game.ready();
        game.ready();
        let before = notifications.load(Ordering::SeqCst);
        game.ticker().tick();

        assert_eq!(notifications.load(Ordering::SeqCst), before + 1);
        assert_eq!(a.state().head(), Some(Tile::new(17, 9)));
        assert_eq!(b.state().head(), Some(Tile::new(33, 9)));
    }

    #[test]
    fn test_one_v_one_round_until_both_die() {
        let game = lobby(2, Arena::new(10, 10), 1);
        let a = join(&game, "a");
        let b = join(&game, "b");

        game.ready();
        game.ready();

        assert_eq!(game.state().status(), MatchStatus::Running);
        assert_eq!(
            a.state().body(),
            vec![Tile::new(16, 9), Tile::new(15, 9), Tile::new(14, 9)]
        );
        assert_eq!(
            b.state().body(),
            vec![Tile::new(32, 9), Tile::new(31, 9), Tile::new(30, 9)]
        );
        let food = game.foods()[0].position();
        assert!(game.state().arena().contains(food));
        assert!(!occupied(&game).contains(&food));

        // Lay b along row 5 heading right and steer a down into its tail end
        b.state().update_state(PlayerStateUpdate::body(vec![
            Tile::new(3, 5),
            Tile::new(2, 5),
            Tile::new(1, 5),
            Tile::new(0, 5),
        ]));
        a.state().update_state(PlayerStateUpdate::body(vec![
            Tile::new(2, 3),
            Tile::new(1, 3),
            Tile::new(0, 3),
        ]));
        a.add_movement(Movement::Down);

        game.ticker().tick();
        assert_eq!(a.state().head(), Some(Tile::new(2, 4)));
        assert!(a.state().is_alive());
        game.ticker().tick();

        assert!(!a.state().is_alive());
        assert!(a.pending_movements().is_empty());
        assert!(b.state().is_alive());
        assert_eq!(game.state().status(), MatchStatus::Running);

        // b turns down into its own body
        b.state().update_state(PlayerStateUpdate::body(vec![
            Tile::new(5, 5),
            Tile::new(4, 5),
            Tile::new(4, 6),
            Tile::new(5, 6),
            Tile::new(6, 6),
            Tile::new(7, 6),
        ]));
        b.add_movement(Movement::Down);
        game.ticker().tick();

        assert!(!b.state().is_alive());
        assert_eq!(game.state().status(), MatchStatus::OnHold);
        assert!(game.foods().is_empty());
        for player in [&a, &b] {
            assert!(player.state().body().is_empty());
            assert!(!player.state().is_ready());
            assert!(!player.state().is_alive());
        }
    }

    #[test]
    fn test_next_round_runs_only_new_callbacks() {
        let game = lobby(1, Arena::new(64, 36), 1);
        let a = join(&game, "a");
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        game.on_end(move |game| {
            assert_eq!(game.state().status(), MatchStatus::OnHold);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        game.ready();
        // Straight into its own body is impossible, so kill directly
        a.state().update_state(PlayerStateUpdate::alive(false));
        game.end();
        assert_eq!(game.state().status(), MatchStatus::OnHold);
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        game.ready();
        assert_eq!(game.round(), 2);
        game.ticker().tick();

        // A single advance from the spawn lane
        assert_eq!(a.state().head(), Some(Tile::new(17, 9)));
    }

    #[test]
    fn test_broadcast_continues_past_failures() {
        let game = lobby(3, Arena::new(10, 10), 1);
        let healthy = Recorder::new(false);
        let broken = Recorder::new(true);
        let a = join(&game, "a");
        let b = join(&game, "b");
        let c = join(&game, "c");
        a.bind_connection(healthy.clone());
        b.bind_connection(broken);
        c.bind_connection(healthy.clone());

        let result = game.send_message(b"{\"removePlayer\":\"x\"}");

        assert!(matches!(
            result,
            Err(GameError::Broadcast {
                failed: 1,
                total: 3
            })
        ));
        assert_eq!(healthy.sent.lock().len(), 2);
    }
}
