//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::{MatchSnapshot, MatchStatus, Movement, PlayerSnapshot, Tile};

/// Intent sent from client to server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMsg {
    /// "up", "down", "left" or "right"; anything else is ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_to: Option<String>,
    /// Lobby readiness toggle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
}

impl ClientMsg {
    pub fn movement(&self) -> Option<Movement> {
        self.move_to.as_deref().and_then(|raw| raw.parse().ok())
    }
}

/// State push sent from server to client; exactly one key per message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerMsg {
    Match(MatchInfo),
    Player(PlayerInfo),
    Food(FoodInfo),
    /// Id of the player that left the lobby
    RemovePlayer(String),
}

impl ServerMsg {
    pub fn match_state(id: &str, snapshot: &MatchSnapshot) -> Self {
        Self::Match(MatchInfo {
            id: id.to_string(),
            status: snapshot.status,
            map: MapInfo {
                tiles: TilesInfo {
                    horizontal: snapshot.arena.horizontal,
                    vertical: snapshot.arena.vertical,
                },
            },
        })
    }

    pub fn player(id: &str, username: &str, snapshot: &PlayerSnapshot) -> Self {
        Self::Player(PlayerInfo {
            id: id.to_string(),
            username: username.to_string(),
            body: snapshot.body.iter().copied().map(Point::from).collect(),
            ready: snapshot.is_ready,
            alive: snapshot.is_alive,
        })
    }

    pub fn food(id: usize, position: Tile) -> Self {
        Self::Food(FoodInfo {
            id: id.to_string(),
            position: position.into(),
        })
    }

    pub fn remove_player(id: &str) -> Self {
        Self::RemovePlayer(id.to_string())
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    pub id: String,
    /// "ON_HOLD" or "RUNNING" on the wire
    pub status: MatchStatus,
    pub map: MapInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapInfo {
    pub tiles: TilesInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilesInfo {
    pub horizontal: i32,
    pub vertical: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub username: String,
    /// Head first
    pub body: Vec<Point>,
    pub ready: bool,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodInfo {
    pub id: String,
    pub position: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl From<Tile> for Point {
    fn from(tile: Tile) -> Self {
        Self {
            x: tile.x,
            y: tile.y,
        }
    }
}
