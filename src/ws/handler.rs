//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{
    Connection, ConnectionError, GameError, Match, MatchStatus, Player, PlayerStateUpdate,
};
use crate::http::routes::AppError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};
use crate::ws::sync::{attach_player_observer, broadcast};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Account identity; guests get a generated one
    pub account_id: Option<String>,
    pub username: Option<String>,
}

/// Outbound half of a client socket, fed through the session's writer task
pub struct WsConnection {
    tx: mpsc::UnboundedSender<Message>,
}

impl WsConnection {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl Connection for WsConnection {
    fn send(&self, payload: &[u8]) -> Result<(), ConnectionError> {
        let text =
            String::from_utf8(payload.to_vec()).map_err(|_| ConnectionError::InvalidPayload)?;
        self.tx
            .send(Message::Text(text))
            .map_err(|_| ConnectionError::Closed)
    }
}

/// WebSocket upgrade handler for `GET /v1/matches/:id/ws`
pub async fn connect_match_handler(
    ws: WebSocketUpgrade,
    Path(match_id): Path<String>,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    // Resolve the match before upgrading so unknown ids get a plain 404
    let game = state.matches.get_match_by_id(&match_id)?;

    let account_id = query
        .account_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let username = query
        .username
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| guest_name(&account_id));

    info!(match_id = %match_id, account_id = %account_id, "WebSocket upgrade for match");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, game, account_id, username)))
}

fn guest_name(account_id: &str) -> String {
    let short: String = account_id.chars().take(8).collect();
    format!("Player_{}", short)
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    game: Arc<Match>,
    account_id: String,
    username: String,
) {
    let (mut ws_sink, ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Spawn writer task: simulation pushes -> WebSocket
    let writer_account_id = account_id.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sink.send(msg).await {
                debug!(account_id = %writer_account_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let connection: Arc<dyn Connection> = Arc::new(WsConnection::new(tx.clone()));

    let player = match join(&game, &account_id, &username, &connection) {
        Ok(player) => player,
        Err(e) => {
            warn!(match_id = %game.id(), account_id = %account_id, error = %e, "Player rejected");
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: e.to_string().into(),
            })));
            drop(connection);
            drop(tx);
            let _ = writer_handle.await;
            return;
        }
    };
    drop(tx);

    send_initial_state(&game, &player);

    run_session(&player, ws_stream).await;

    leave(&state, &game, &player, &connection);
    writer_handle.abort();

    info!(match_id = %game.id(), account_id = %account_id, "WebSocket connection closed");
}

/// Bind the connection to the account's player, creating and entering a new one if needed
fn join(
    game: &Arc<Match>,
    account_id: &str,
    username: &str,
    connection: &Arc<dyn Connection>,
) -> Result<Arc<Player>, GameError> {
    if let Some(player) = game.player_by_id(account_id) {
        player.bind_connection(connection.clone());
        info!(match_id = %game.id(), player_id = %account_id, "Player reconnected");
        return Ok(player);
    }

    let player = Arc::new(Player::new(account_id, username));
    admit(game, &player)?;
    player.bind_connection(connection.clone());
    Ok(player)
}

/// Enter the roster; only admitted players get their state broadcast
fn admit(game: &Arc<Match>, player: &Arc<Player>) -> Result<(), GameError> {
    game.enter(player)?;
    attach_player_observer(game, player);
    Ok(())
}

/// Bring a freshly bound client up to date and announce it to the roster
fn send_initial_state(game: &Match, player: &Arc<Player>) {
    let mut direct = vec![ServerMsg::match_state(game.id(), &game.state().snapshot())];

    for other in game.players() {
        if other.id() != player.id() {
            direct.push(ServerMsg::player(
                other.id(),
                other.name(),
                &other.state().snapshot(),
            ));
        }
    }

    for food in game.foods() {
        direct.push(ServerMsg::food(food.id(), food.position()));
    }

    for msg in &direct {
        if let Err(e) = send_to(player, msg) {
            debug!(match_id = %game.id(), player_id = %player.id(), error = %e, "Initial sync failed");
            return;
        }
    }

    broadcast(
        game,
        &ServerMsg::player(player.id(), player.name(), &player.state().snapshot()),
    );
}

fn send_to(player: &Player, msg: &ServerMsg) -> anyhow::Result<()> {
    let payload = msg.to_bytes()?;
    player.send_message(&payload)?;
    Ok(())
}

/// Reader loop: WebSocket -> player intents
async fn run_session(player: &Player, mut ws_stream: futures::stream::SplitStream<WebSocket>) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_intent() {
                    warn!(player_id = %player.id(), "Rate limited intent message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => player.handle_intent(msg.movement(), msg.ready),
                    Err(e) => {
                        warn!(player_id = %player.id(), error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player.id(), "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player.id(), "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player.id(), error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Disconnect cleanup.
///
/// Lobby players leave the roster; players of a running round stay in it,
/// unbound, so they can reconnect until the round ends. The match is deleted
/// once no roster member holds a connection.
fn leave(state: &AppState, game: &Arc<Match>, player: &Arc<Player>, connection: &Arc<dyn Connection>) {
    if !player.unbind_connection(connection) {
        debug!(player_id = %player.id(), "Connection superseded by a reconnect");
        return;
    }

    if game.state().status() == MatchStatus::OnHold {
        if player.state().is_ready() {
            player.state().update_state(PlayerStateUpdate::ready(false));
            game.unready();
        }
        if game.remove_player(player) {
            broadcast(game, &ServerMsg::remove_player(player.id()));
        }
    }

    let abandoned = game.players().iter().all(|other| !other.is_connected());
    if abandoned {
        state.matches.delete_by_id(game.id());
    }
}
