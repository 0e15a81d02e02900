//! The single in-memory game state. Owned exclusively by the
//! [`StateManager`](crate::state::StateManager); everything else sees
//! it only through snapshots.

use log::info;
use shared::{
    ActivityEvent, CapturePoint, GameSnapshot, Node, NodeStatus, Position, Role, Team,
};

use crate::config::TeamSeed;

/// Cap on activity feed length; older entries fall off the end.
const ACTIVITY_FEED_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct GameState {
    pub teams: Vec<Team>,
    pub capture_points: Vec<CapturePoint>,
    pub nodes: Vec<Node>,
    pub active: bool,
    pub start_time: Option<u64>,
    pub activity_feed: Vec<ActivityEvent>,
    next_activity_seq: u64,
}

impl GameState {
    pub fn new(default_teams: &[TeamSeed]) -> Self {
        let teams = default_teams
            .iter()
            .enumerate()
            .map(|(i, seed)| Team::new(i as u32 + 1, &seed.name, &seed.color))
            .collect();

        Self {
            teams,
            capture_points: Vec::new(),
            nodes: Vec::new(),
            active: false,
            start_time: None,
            activity_feed: Vec::new(),
            next_activity_seq: 0,
        }
    }

    pub fn team(&self, id: u32) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn team_mut(&mut self, id: u32) -> Option<&mut Team> {
        self.teams.iter_mut().find(|t| t.id == id)
    }

    /// Next team id: `max(existing) + 1`, or 1 when the list is empty.
    pub fn next_team_id(&self) -> u32 {
        self.teams.iter().map(|t| t.id).max().map_or(1, |id| id + 1)
    }

    pub fn capture_point(&self, identity: &str) -> Option<&CapturePoint> {
        self.capture_points.iter().find(|cp| cp.id == identity)
    }

    pub fn capture_point_mut(&mut self, identity: &str) -> Option<&mut CapturePoint> {
        self.capture_points.iter_mut().find(|cp| cp.id == identity)
    }

    /// Creates the capture point for an identity if it doesn't already
    /// exist. Registering twice must not produce duplicates.
    pub fn ensure_capture_point(&mut self, identity: &str) -> &mut CapturePoint {
        if let Some(idx) = self.capture_points.iter().position(|cp| cp.id == identity) {
            return &mut self.capture_points[idx];
        }

        info!("Created capture point {}", identity);
        self.capture_points.push(CapturePoint::new(identity));
        let idx = self.capture_points.len() - 1;
        &mut self.capture_points[idx]
    }

    pub fn remove_capture_point(&mut self, identity: &str) {
        let before = self.capture_points.len();
        self.capture_points.retain(|cp| cp.id != identity);
        if self.capture_points.len() < before {
            info!("Removed capture point {}", identity);
        }
    }

    pub fn node_mut(&mut self, identity: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == identity)
    }

    /// Creates the node record online, or flips an existing one back
    /// online and refreshes its liveness timestamp.
    pub fn upsert_node(&mut self, identity: &str, role: Role, now_ms: u64) -> &mut Node {
        if let Some(idx) = self.nodes.iter().position(|n| n.id == identity) {
            let node = &mut self.nodes[idx];
            node.status = NodeStatus::Online;
            node.last_seen = now_ms;
            return node;
        }

        info!("Node {} joined as {:?}", identity, role);
        self.nodes.push(Node::new(identity, role, now_ms));
        let idx = self.nodes.len() - 1;
        &mut self.nodes[idx]
    }

    pub fn set_node_offline(&mut self, identity: &str, now_ms: u64) {
        if let Some(node) = self.node_mut(identity) {
            node.status = NodeStatus::Offline;
            node.last_seen = now_ms;
        }
    }

    pub fn set_node_position(&mut self, identity: &str, position: Position) {
        if let Some(node) = self.node_mut(identity) {
            node.position = Some(position);
        }
    }

    /// Prepends an activity feed entry and returns a clone for
    /// broadcasting.
    pub fn push_activity(
        &mut self,
        kind: &str,
        message: String,
        team_id: Option<u32>,
        now_ms: u64,
    ) -> ActivityEvent {
        self.next_activity_seq += 1;
        let event = ActivityEvent {
            id: format!("activity-{}-{}", now_ms, self.next_activity_seq),
            kind: kind.to_string(),
            message,
            team_id,
            timestamp: now_ms,
        };

        self.activity_feed.insert(0, event.clone());
        self.activity_feed.truncate(ACTIVITY_FEED_LIMIT);
        event
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            teams: self.teams.clone(),
            capture_points: self.capture_points.clone(),
            nodes: self.nodes.clone(),
            game_active: self.active,
            game_start_time: self.start_time,
            activity_feed: self.activity_feed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> Vec<TeamSeed> {
        vec![
            TeamSeed {
                name: "Red Team".to_string(),
                color: "#ef4444".to_string(),
            },
            TeamSeed {
                name: "Blue Team".to_string(),
                color: "#3b82f6".to_string(),
            },
        ]
    }

    #[test]
    fn test_new_game_has_default_teams() {
        let game = GameState::new(&seeds());
        assert_eq!(game.teams.len(), 2);
        assert_eq!(game.teams[0].id, 1);
        assert_eq!(game.teams[1].id, 2);
        assert!(!game.active);
        assert!(game.capture_points.is_empty());
    }

    #[test]
    fn test_next_team_id() {
        let mut game = GameState::new(&seeds());
        assert_eq!(game.next_team_id(), 3);

        game.teams.clear();
        assert_eq!(game.next_team_id(), 1);

        game.teams.push(Team::new(7, "X", "#000000"));
        assert_eq!(game.next_team_id(), 8);
    }

    #[test]
    fn test_ensure_capture_point_is_idempotent() {
        let mut game = GameState::new(&seeds());
        game.ensure_capture_point("Alpha");
        game.ensure_capture_point("Alpha");
        assert_eq!(game.capture_points.len(), 1);
    }

    #[test]
    fn test_upsert_node_flips_back_online() {
        let mut game = GameState::new(&seeds());
        game.upsert_node("Alpha", Role::CapturePoint, 100);
        game.set_node_offline("Alpha", 200);
        assert_eq!(game.nodes[0].status, NodeStatus::Offline);

        game.upsert_node("Alpha", Role::CapturePoint, 300);
        assert_eq!(game.nodes.len(), 1);
        assert_eq!(game.nodes[0].status, NodeStatus::Online);
        assert_eq!(game.nodes[0].last_seen, 300);
    }

    #[test]
    fn test_activity_feed_is_prepended_and_bounded() {
        let mut game = GameState::new(&seeds());
        for i in 0..(ACTIVITY_FEED_LIMIT + 10) {
            game.push_activity("test", format!("event {}", i), None, i as u64);
        }

        assert_eq!(game.activity_feed.len(), ACTIVITY_FEED_LIMIT);
        // Newest first.
        assert!(game.activity_feed[0].message.ends_with("209"));
    }

    #[test]
    fn test_activity_ids_are_unique_within_one_instant() {
        let mut game = GameState::new(&seeds());
        let a = game.push_activity("test", "a".to_string(), None, 5);
        let b = game.push_activity("test", "b".to_string(), None, 5);
        assert_ne!(a.id, b.id);
    }
}
