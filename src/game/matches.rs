//! Registry of live matches

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::util::id::IdGenerator;

use super::r#match::Match;
use super::ticker::Ticker;
use super::GameError;

/// Directory of live matches keyed by generated id; one lock guards every operation
pub struct MatchRegistry {
    matches: Mutex<HashMap<String, Arc<Match>>>,
    ids: Arc<dyn IdGenerator>,
    /// `None` builds matches with manual tickers
    tick_period: Option<Duration>,
}

impl MatchRegistry {
    pub fn new(ids: Arc<dyn IdGenerator>, tick_period: Duration) -> Self {
        Self {
            matches: Mutex::new(HashMap::new()),
            ids,
            tick_period: Some(tick_period),
        }
    }

    /// Registry whose matches only advance when their ticker is stepped by hand
    pub fn manual(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            matches: Mutex::new(HashMap::new()),
            ids,
            tick_period: None,
        }
    }

    /// Create and register an empty match
    pub fn add(&self, players_limit: usize) -> Result<Arc<Match>, GameError> {
        let id = self.ids.next_id()?;
        let ticker = match self.tick_period {
            Some(period) => Ticker::new(period),
            None => Ticker::manual(),
        };
        let game = Match::new(id.clone(), players_limit, rand::random::<u64>(), ticker);

        self.matches.lock().insert(id.clone(), game.clone());

        info!(match_id = %id, players_limit, "Match created");
        Ok(game)
    }

    pub fn get_match_by_id(&self, id: &str) -> Result<Arc<Match>, GameError> {
        self.matches
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| GameError::MatchNotFound(id.to_string()))
    }

    /// Find the match whose owner has the given account id
    pub fn get_match_by_owner_id(&self, owner_id: &str) -> Result<Arc<Match>, GameError> {
        self.matches
            .lock()
            .values()
            .find(|game| game.owner().is_some_and(|owner| owner.id() == owner_id))
            .cloned()
            .ok_or_else(|| GameError::OwnerNotFound(owner_id.to_string()))
    }

    /// Unregister a match and halt its ticker
    pub fn delete_by_id(&self, id: &str) {
        let removed = self.matches.lock().remove(id);
        if let Some(game) = removed {
            game.shutdown();
            info!(match_id = %id, "Match deleted");
        }
    }

    pub fn active_matches(&self) -> usize {
        self.matches.lock().len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .lock()
            .values()
            .map(|game| game.roster_len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Player;
    use crate::util::id::{FlakeIdGenerator, IdError};
    use sonyflake::Error as FlakeError;
    use tokio_test::{assert_err, assert_ok};

    struct BrokenClock;

    impl IdGenerator for BrokenClock {
        fn next_id(&self) -> Result<String, IdError> {
            Err(IdError::Sonyflake(FlakeError::OverTimeLimit))
        }
    }

    fn registry() -> MatchRegistry {
        MatchRegistry::manual(Arc::new(FlakeIdGenerator::new(1).unwrap()))
    }

    #[test]
    fn test_add_and_lookup() {
        let registry = registry();
        let first = assert_ok!(registry.add(5));
        let second = assert_ok!(registry.add(2));

        assert_ne!(first.id(), second.id());
        assert_eq!(registry.active_matches(), 2);
        assert_eq!(second.players_limit(), 2);

        let found = assert_ok!(registry.get_match_by_id(first.id()));
        assert!(Arc::ptr_eq(&found, &first));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = registry();
        let err = assert_err!(registry.get_match_by_id("404"));
        assert!(matches!(err, GameError::MatchNotFound(id) if id == "404"));
    }

    #[test]
    fn test_lookup_by_owner() {
        let registry = registry();
        let empty = assert_ok!(registry.add(5));
        let owned = assert_ok!(registry.add(5));
        let owner = Arc::new(Player::new("account-1", "owner"));
        let guest = Arc::new(Player::new("account-2", "guest"));
        assert_ok!(owned.enter(&owner));
        assert_ok!(owned.enter(&guest));

        let found = assert_ok!(registry.get_match_by_owner_id("account-1"));
        assert_eq!(found.id(), owned.id());
        assert_ne!(found.id(), empty.id());
        assert_err!(registry.get_match_by_owner_id("account-2"));
        assert_eq!(registry.total_players(), 2);
    }

    #[test]
    fn test_delete_by_id() {
        let registry = registry();
        let game = assert_ok!(registry.add(5));

        registry.delete_by_id(game.id());
        registry.delete_by_id(game.id());

        assert_err!(registry.get_match_by_id(game.id()));
        assert_eq!(registry.active_matches(), 0);
    }

    #[test]
    fn test_id_failure_is_reported() {
        let registry = MatchRegistry::manual(Arc::new(BrokenClock));
        let err = assert_err!(registry.add(5));

        assert!(matches!(err, GameError::Id(IdError::Sonyflake(_))));
        assert_eq!(registry.active_matches(), 0);
    }
}
