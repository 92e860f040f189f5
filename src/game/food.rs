//! Food placement and consumption

use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::food_state::FoodState;
use super::r#match::Match;
use super::{Arena, Tile};

/// Random placements tried before falling back to a scan of free tiles
const SUMMON_ATTEMPTS: usize = 16;

pub struct Food {
    id: usize,
    state: FoodState,
    game: Weak<Match>,
}

impl Food {
    pub fn new(id: usize, game: Weak<Match>) -> Self {
        Self {
            id,
            state: FoodState::new(),
            game,
        }
    }

    /// Index of this food within its round
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> &FoodState {
        &self.state
    }

    pub fn position(&self) -> Tile {
        self.state.position()
    }

    /// Move to a random tile not covered by any player body.
    ///
    /// Returns `false` when the arena has no free tile; the food then stays put.
    pub fn summon(&self) -> bool {
        let Some(game) = self.game.upgrade() else {
            return false;
        };

        let arena = game.state().arena();
        let occupied: HashSet<Tile> = game
            .players()
            .iter()
            .flat_map(|player| player.state().body())
            .collect();

        match game.with_rng(|rng| pick_free_tile(rng, arena, &occupied)) {
            Some(position) => {
                debug!(match_id = %game.id(), food = self.id, x = position.x, y = position.y, "Food summoned");
                self.state.update_state(position);
                true
            }
            None => {
                warn!(match_id = %game.id(), food = self.id, "No free tile left for food");
                false
            }
        }
    }

    /// Grow every living player whose head sits on this food, then re-summon it
    pub fn check_was_eaten(&self) {
        let Some(game) = self.game.upgrade() else {
            return;
        };

        let position = self.position();
        for player in game.players() {
            if !player.state().is_alive() || player.state().head() != Some(position) {
                continue;
            }

            player.to_increase(1);
            debug!(match_id = %game.id(), player_id = %player.id(), "Food eaten");
            self.summon();
        }
    }
}

fn pick_free_tile<R: Rng>(rng: &mut R, arena: Arena, occupied: &HashSet<Tile>) -> Option<Tile> {
    if arena.horizontal <= 0 || arena.vertical <= 0 {
        return None;
    }

    for _ in 0..SUMMON_ATTEMPTS {
        let tile = Tile::new(
            rng.gen_range(0..arena.horizontal),
            rng.gen_range(0..arena.vertical),
        );
        if !occupied.contains(&tile) {
            return Some(tile);
        }
    }

    let free: Vec<Tile> = (0..arena.vertical)
        .flat_map(|y| (0..arena.horizontal).map(move |x| Tile::new(x, y)))
        .filter(|tile| !occupied.contains(tile))
        .collect();

    if free.is_empty() {
        None
    } else {
        Some(free[rng.gen_range(0..free.len())])
    }
}

impl std::fmt::Debug for Food {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Food")
            .field("id", &self.id)
            .field("position", &self.position())
            .finish()
    }
}

/// Foods for one round, not yet placed
pub fn batch(game: &Weak<Match>, count: usize) -> Vec<Arc<Food>> {
    (0..count)
        .map(|id| Arc::new(Food::new(id, game.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MatchStateUpdate, Player, PlayerStateUpdate, Ticker};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn game_with_arena(horizontal: i32, vertical: i32) -> Arc<Match> {
        let game = Match::new("1", 4, 42, Ticker::manual());
        game.state().update_state(MatchStateUpdate {
            arena: Some(Arena::new(horizontal, vertical)),
            foods_limit: Some(1),
            ..Default::default()
        });
        game
    }

    fn player_at(game: &Arc<Match>, id: &str, body: Vec<Tile>) -> Arc<Player> {
        let player = Arc::new(Player::new(id, id));
        player.state().update_state(PlayerStateUpdate {
            is_alive: Some(true),
            is_ready: None,
            body: Some(body),
        });
        game.enter(&player).unwrap();
        player
    }

    #[test]
    fn test_eaten_food_grows_player_and_moves() {
        let game = game_with_arena(10, 10);
        let player = player_at(
            &game,
            "p",
            vec![Tile::new(3, 3), Tile::new(2, 3), Tile::new(1, 3)],
        );
        let food = Food::new(0, Arc::downgrade(&game));
        food.state().update_state(Tile::new(3, 3));

        food.check_was_eaten();

        assert_eq!(player.pending_growth(), 1);
        let position = food.position();
        assert_ne!(position, Tile::new(3, 3));
        assert!(game.state().arena().contains(position));
        assert!(!player.state().body().contains(&position));
    }

    #[test]
    fn test_dead_player_does_not_eat() {
        let game = game_with_arena(10, 10);
        let player = player_at(&game, "p", vec![Tile::new(3, 3)]);
        player.state().update_state(PlayerStateUpdate::alive(false));
        let food = Food::new(0, Arc::downgrade(&game));
        food.state().update_state(Tile::new(3, 3));

        food.check_was_eaten();

        assert_eq!(player.pending_growth(), 0);
        assert_eq!(food.position(), Tile::new(3, 3));
    }

    #[test]
    fn test_coincident_heads_all_grow() {
        let game = game_with_arena(10, 10);
        let p1 = player_at(&game, "p1", vec![Tile::new(3, 3)]);
        let p2 = player_at(&game, "p2", vec![Tile::new(3, 3)]);
        let food = Food::new(0, Arc::downgrade(&game));
        food.state().update_state(Tile::new(3, 3));

        food.check_was_eaten();

        assert_eq!(p1.pending_growth(), 1);
        assert_eq!(p2.pending_growth(), 1);
    }

    #[test]
    fn test_summon_avoids_every_body_tile() {
        let game = game_with_arena(3, 3);
        // Everything but (2, 2) is covered, including by a dead player
        player_at(
            &game,
            "p1",
            vec![Tile::new(0, 0), Tile::new(1, 0), Tile::new(2, 0), Tile::new(2, 1)],
        );
        let dead = player_at(
            &game,
            "p2",
            vec![Tile::new(0, 1), Tile::new(1, 1), Tile::new(0, 2), Tile::new(1, 2)],
        );
        dead.state().update_state(PlayerStateUpdate::alive(false));

        let food = Food::new(0, Arc::downgrade(&game));
        assert!(food.summon());
        assert_eq!(food.position(), Tile::new(2, 2));
    }

    #[test]
    fn test_summon_on_full_arena_keeps_position() {
        let game = game_with_arena(2, 1);
        player_at(&game, "p", vec![Tile::new(0, 0), Tile::new(1, 0)]);
        let food = Food::new(0, Arc::downgrade(&game));
        food.state().update_state(Tile::new(1, 0));

        assert!(!food.summon());
        assert_eq!(food.position(), Tile::new(1, 0));
    }

    #[test]
    fn test_pick_free_tile_is_deterministic_per_seed() {
        let arena = Arena::new(64, 36);
        let occupied = HashSet::from([Tile::new(0, 0)]);

        let first = pick_free_tile(&mut ChaCha8Rng::seed_from_u64(9), arena, &occupied);
        let second = pick_free_tile(&mut ChaCha8Rng::seed_from_u64(9), arena, &occupied);

        assert_eq!(first, second);
        assert!(arena.contains(first.unwrap()));
    }
}
