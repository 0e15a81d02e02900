//! Game data model. The server owns the mutable versions of these
//! records; clients only ever see them inside a [`GameSnapshot`].

use serde::{Deserialize, Serialize};

/// Which side of the protocol a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    CapturePoint,
}

/// Liveness of a node record. Disconnects flip nodes to offline; they
/// are never silently deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    Online,
    Offline,
}

/// A WGS84 coordinate pair. Range checks live in the validation
/// guards, not here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub score: f64,
}

impl Team {
    pub fn new(id: u32, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
            score: 0.0,
        }
    }
}

/// A capturable location. The identity string is the primary key and
/// doubles as the join key to the [`Node`] holding the connection for
/// the device at that location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePoint {
    pub id: String,
    pub team_id: Option<u32>,
    pub position: Option<Position>,
    pub static_position: Option<Position>,
    pub use_static_position: bool,
    pub last_capture_time: Option<u64>,
    pub total_captures: u32,
}

impl CapturePoint {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            id: identity.into(),
            team_id: None,
            position: None,
            static_position: None,
            use_static_position: false,
            last_capture_time: None,
            total_captures: 0,
        }
    }

    /// The position clients should display: the static placement when
    /// it is enabled, the live GPS fix otherwise.
    pub fn displayed_position(&self) -> Option<Position> {
        if self.use_static_position {
            self.static_position
        } else {
            self.position
        }
    }
}

/// Connection/session record for a participant. Distinct from the
/// capture point so a device can drop and reconnect without its
/// location entity losing standings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub role: Role,
    pub status: NodeStatus,
    pub last_seen: u64,
    pub position: Option<Position>,
}

impl Node {
    pub fn new(identity: impl Into<String>, role: Role, now_ms: u64) -> Self {
        Self {
            id: identity.into(),
            role,
            status: NodeStatus::Online,
            last_seen: now_ms,
            position: None,
        }
    }
}

/// One entry in the activity feed shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub team_id: Option<u32>,
    pub timestamp: u64,
}

/// Full authoritative state as pushed to clients. Clients must treat
/// every snapshot as overwrite-compatible, never as a diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub teams: Vec<Team>,
    pub capture_points: Vec<CapturePoint>,
    pub nodes: Vec<Node>,
    pub game_active: bool,
    pub game_start_time: Option<u64>,
    #[serde(default)]
    pub activity_feed: Vec<ActivityEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_creation() {
        let team = Team::new(1, "Red Team", "#ef4444");
        assert_eq!(team.id, 1);
        assert_eq!(team.name, "Red Team");
        assert_eq!(team.color, "#ef4444");
        assert_eq!(team.score, 0.0);
    }

    #[test]
    fn test_capture_point_starts_unclaimed() {
        let point = CapturePoint::new("Alpha");
        assert_eq!(point.id, "Alpha");
        assert_eq!(point.team_id, None);
        assert_eq!(point.position, None);
        assert_eq!(point.last_capture_time, None);
        assert_eq!(point.total_captures, 0);
        assert!(!point.use_static_position);
    }

    #[test]
    fn test_displayed_position_prefers_static() {
        let mut point = CapturePoint::new("Bravo");
        point.position = Some(Position { lat: 1.0, lon: 2.0 });
        point.static_position = Some(Position { lat: 9.0, lon: 8.0 });

        point.use_static_position = false;
        assert_eq!(point.displayed_position(), point.position);

        point.use_static_position = true;
        assert_eq!(point.displayed_position(), point.static_position);
    }

    #[test]
    fn test_node_starts_online() {
        let node = Node::new("Charlie", Role::CapturePoint, 1000);
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.last_seen, 1000);
        assert_eq!(node.position, None);
    }

    #[test]
    fn test_snapshot_wire_field_names() {
        let snapshot = GameSnapshot {
            teams: vec![Team::new(1, "Red Team", "#ef4444")],
            capture_points: vec![CapturePoint::new("Alpha")],
            nodes: vec![],
            game_active: true,
            game_start_time: Some(123),
            activity_feed: vec![],
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["gameActive"], true);
        assert_eq!(json["gameStartTime"], 123);
        assert_eq!(json["capturePoints"][0]["id"], "Alpha");
        assert!(json["capturePoints"][0]["teamId"].is_null());
    }
}
