//! Bridges simulation state changes to connected clients

use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

use crate::game::{Match, Player};
use crate::ws::protocol::ServerMsg;

/// Broadcast match status changes, and every round's food moves, to the roster.
///
/// Players who lost their connection during a round leave the roster when it
/// ends, so the ones still connected can ready up again.
pub fn attach_match_observers(game: &Arc<Match>) {
    let me = Arc::downgrade(game);
    game.state().on_update_state(move |snapshot| {
        let Some(game) = me.upgrade() else {
            return;
        };
        broadcast(&game, &ServerMsg::match_state(game.id(), snapshot));
    });

    // Foods are rebuilt by each round start, so their observers are too
    let me = Arc::downgrade(game);
    game.on_start(move |game| {
        for food in game.foods() {
            let me = me.clone();
            let food_id = food.id();
            food.state().on_update_state(move |position| {
                let Some(game) = me.upgrade() else {
                    return;
                };
                broadcast(&game, &ServerMsg::food(food_id, *position));
            });
        }
    });

    game.on_end(|game| {
        for player in game.players() {
            if player.is_connected() || !game.remove_player(&player) {
                continue;
            }
            info!(match_id = %game.id(), player_id = %player.id(), "Dropped disconnected player");
            broadcast(game, &ServerMsg::remove_player(player.id()));
        }
    });
}

/// Broadcast every committed change of `player` to the roster of `game`
pub fn attach_player_observer(game: &Arc<Match>, player: &Player) {
    let me: Weak<Match> = Arc::downgrade(game);
    let player_id = player.id().to_string();
    let username = player.name().to_string();

    player.state().on_update_state(move |snapshot| {
        let Some(game) = me.upgrade() else {
            return;
        };
        broadcast(&game, &ServerMsg::player(&player_id, &username, snapshot));
    });
}

/// Serialize and fan out one message; delivery failures are logged, never raised
pub fn broadcast(game: &Match, msg: &ServerMsg) {
    let payload = match msg.to_bytes() {
        Ok(payload) => payload,
        Err(e) => {
            error!(match_id = %game.id(), error = %e, "Failed to serialize state message");
            return;
        }
    };

    if let Err(e) = game.send_message(&payload) {
        debug!(match_id = %game.id(), error = %e, "Broadcast partially failed");
    }
}
