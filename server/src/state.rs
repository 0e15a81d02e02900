//! The state manager: single authority over the game state.
//!
//! Every mutation comes through here, behind one async mutex, so
//! handlers never race each other. Each mutating operation follows the
//! same shape: validate, apply to [`GameState`], record activity,
//! schedule a durable write, broadcast.

use std::sync::Arc;

use log::{info, warn};
use shared::{
    ActivityEvent, GameSnapshot, NodeStatus, Role, ServerMessage, TeamPatch, ValidationError,
    ADMIN_IDENTITY,
};
use thiserror::Error;

use crate::broadcast::{Audience, Broadcaster};
use crate::config::Config;
use crate::game::GameState;
use crate::identity::IdentityAllocator;
use crate::scoring;
use crate::store::{PersistHandle, PersistedState};
use crate::utils;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("at least two teams are required")]
    MinimumTeams,

    #[error("no static position configured")]
    NoStaticPosition,

    #[error("no GPS fix received yet")]
    NoGpsFix,
}

/// Result of a node registration, echoed back to the connecting peer.
#[derive(Debug)]
pub struct RegisterOutcome {
    pub identity: String,
    pub newly_assigned: bool,
    pub snapshot: GameSnapshot,
}

/// Where a position report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    Gps,
    Static,
}

pub struct StateManager {
    game: GameState,
    identities: IdentityAllocator,
    config: Arc<Config>,
    persist: PersistHandle,
    broadcaster: Broadcaster,
}

impl StateManager {
    /// Builds the manager, seeding from the durable record when one
    /// was loaded. Only teams, game activity, and the feed are
    /// restored; capture points and nodes start empty and reappear as
    /// devices register.
    pub fn new(
        config: Arc<Config>,
        persist: PersistHandle,
        broadcaster: Broadcaster,
        restored: Option<PersistedState>,
    ) -> Self {
        let mut game = GameState::new(&config.default_teams);

        if let Some(saved) = restored {
            game.teams = saved.teams;
            game.active = saved.game_active;
            game.start_time = saved.game_start_time;
            game.activity_feed = saved.activity_feed;
        }

        Self {
            game,
            identities: IdentityAllocator::new(),
            config,
            persist,
            broadcaster,
        }
    }

    // --- registration ---------------------------------------------------

    /// Registers a node. Admins always get the fixed command identity;
    /// capture points either reclaim the identity they present or are
    /// assigned a fresh one from the pool.
    pub fn register_node(
        &mut self,
        identity: Option<String>,
        role: Role,
    ) -> Result<RegisterOutcome, CommandError> {
        let now = utils::now_ms();

        let (identity, newly_assigned) = match role {
            Role::Admin => (ADMIN_IDENTITY.to_string(), false),
            Role::CapturePoint => match identity {
                Some(identity) => {
                    self.identities.mark_used(&identity, now);
                    self.game.ensure_capture_point(&identity);
                    (identity, false)
                }
                None => {
                    let assigned = self.identities.assign(now);
                    self.game.ensure_capture_point(&assigned);
                    let event = self.game.push_activity(
                        "node",
                        format!("{} came online", assigned),
                        None,
                        now,
                    );
                    self.broadcast_activity(event);
                    (assigned, true)
                }
            },
        };

        self.game.upsert_node(&identity, role, now);
        self.schedule_save(false);

        Ok(RegisterOutcome {
            identity,
            newly_assigned,
            snapshot: self.game.snapshot(),
        })
    }

    // --- captures -------------------------------------------------------

    pub fn handle_capture(&mut self, identity: &str, team_id: Option<u32>) -> Result<(), CommandError> {
        self.handle_capture_at(identity, team_id, utils::now_ms())
    }

    /// Applies a capture event. Re-capturing by the current holder is
    /// a silent no-op, as is a press inside the cooldown window.
    pub fn handle_capture_at(
        &mut self,
        identity: &str,
        team_id: Option<u32>,
        now_ms: u64,
    ) -> Result<(), CommandError> {
        if self.game.capture_point(identity).is_none() {
            return Err(CommandError::UnknownIdentity(identity.to_string()));
        }
        let team_id = shared::validate_team_id(team_id, &self.game.teams)?;

        let cooldown_ms = self.config.capture_cooldown.as_millis() as u64;
        let point = match self.game.capture_point_mut(identity) {
            Some(point) => point,
            None => return Err(CommandError::UnknownIdentity(identity.to_string())),
        };

        if point.team_id == Some(team_id) {
            return Ok(());
        }
        if let Some(last) = point.last_capture_time {
            if now_ms.saturating_sub(last) < cooldown_ms {
                return Ok(());
            }
        }

        point.team_id = Some(team_id);
        point.last_capture_time = Some(now_ms);
        point.total_captures += 1;

        let bonus = self.config.points_per_capture;
        let team_name = match self.game.team_mut(team_id) {
            Some(team) => {
                scoring::award_capture_bonus(team, bonus);
                team.name.clone()
            }
            None => return Err(CommandError::Validation(ValidationError::TeamNotFound(team_id))),
        };

        info!("{} captured by {}", identity, team_name);
        let event = self.game.push_activity(
            "capture",
            format!("{} captured {}", team_name, identity),
            Some(team_id),
            now_ms,
        );
        self.broadcast_activity(event);
        self.schedule_save(true);
        self.broadcast_state();
        Ok(())
    }

    // --- positions ------------------------------------------------------

    /// Applies a position report. Static placements reject invalid
    /// coordinates; live GPS noise is logged and dropped without
    /// failing the connection.
    pub fn update_position(
        &mut self,
        identity: &str,
        lat: f64,
        lon: f64,
        source: PositionSource,
        from_admin: bool,
    ) -> Result<(), CommandError> {
        let position = match shared::validate_coordinate(lat, lon) {
            Ok(position) => position,
            Err(e) if source == PositionSource::Static => return Err(e.into()),
            Err(e) => {
                warn!("Dropping invalid GPS report from {}: {}", identity, e);
                return Ok(());
            }
        };

        if self.game.capture_point(identity).is_none() {
            if from_admin {
                // Admins may place points that haven't connected yet.
                self.game.ensure_capture_point(identity);
            } else {
                warn!("Position report for unknown identity {}", identity);
                return Ok(());
            }
        }

        self.game.set_node_position(identity, position);

        let point = match self.game.capture_point_mut(identity) {
            Some(point) => point,
            None => return Err(CommandError::UnknownIdentity(identity.to_string())),
        };

        match source {
            PositionSource::Static => {
                point.static_position = Some(position);
                point.use_static_position = true;
                point.position = point.displayed_position();
            }
            PositionSource::Gps => {
                if !point.use_static_position {
                    point.position = Some(position);
                }
            }
        }

        self.broadcast_state();
        Ok(())
    }

    /// Flips a point between its static placement and live GPS.
    pub fn toggle_position_source(&mut self, identity: &str) -> Result<(), CommandError> {
        let point = match self.game.capture_point_mut(identity) {
            Some(point) => point,
            None => return Err(CommandError::UnknownIdentity(identity.to_string())),
        };

        if point.use_static_position {
            // Switching back to GPS needs a fix to fall back on.
            let gps = match self.game.node_mut(identity).and_then(|n| n.position) {
                Some(gps) => gps,
                None => return Err(CommandError::NoGpsFix),
            };
            let point = match self.game.capture_point_mut(identity) {
                Some(point) => point,
                None => return Err(CommandError::UnknownIdentity(identity.to_string())),
            };
            point.use_static_position = false;
            point.position = Some(gps);
        } else {
            if point.static_position.is_none() {
                return Err(CommandError::NoStaticPosition);
            }
            point.use_static_position = true;
            point.position = point.displayed_position();
        }

        self.broadcast_state();
        Ok(())
    }

    // --- game lifecycle -------------------------------------------------

    /// Starts the scoring clock. Starting an already-active game is a
    /// no-op and keeps the original start time.
    pub fn start_game(&mut self) {
        if self.game.active {
            return;
        }
        let now = utils::now_ms();
        self.game.active = true;
        self.game.start_time = Some(now);

        info!("Game started");
        let event = self
            .game
            .push_activity("game", "Game started".to_string(), None, now);
        self.broadcast_activity(event);
        self.schedule_save(true);
        self.broadcast_state();
    }

    /// Stops the game: clock halts, every point is neutralized, and
    /// capture cooldowns are cleared. Scores are kept for review.
    pub fn stop_game(&mut self) {
        if !self.game.active {
            return;
        }
        let now = utils::now_ms();
        self.game.active = false;
        self.game.start_time = None;
        for point in &mut self.game.capture_points {
            point.team_id = None;
            point.last_capture_time = None;
        }

        info!("Game stopped");
        let event = self
            .game
            .push_activity("game", "Game stopped".to_string(), None, now);
        self.broadcast_activity(event);
        self.schedule_save(true);
        self.broadcast_state();
    }

    /// Resets scores, capture counters, and ownership without touching
    /// the team roster or the running/stopped state. Works whether or
    /// not a game is running; a running game keeps its clock going.
    pub fn reset_game(&mut self) {
        let now = utils::now_ms();
        scoring::reset_scores(&mut self.game);
        for point in &mut self.game.capture_points {
            point.team_id = None;
            point.last_capture_time = None;
            point.total_captures = 0;
        }

        info!("Game reset");
        let event = self
            .game
            .push_activity("game", "Game reset".to_string(), None, now);
        self.broadcast_activity(event);
        self.schedule_save(true);
        self.broadcast_state();
    }

    // --- team roster ----------------------------------------------------

    pub fn add_team(&mut self, name: &str, color: &str) -> Result<u32, CommandError> {
        let name = shared::validate_team_name(name)?;
        shared::validate_team_color(color)?;

        let id = self.game.next_team_id();
        self.game.teams.push(shared::Team::new(id, &name, color));

        info!("Team {} added ({})", name, id);
        let now = utils::now_ms();
        let event = self
            .game
            .push_activity("team", format!("Team {} joined", name), Some(id), now);
        self.broadcast_activity(event);
        self.schedule_save(true);
        self.broadcast_state();
        Ok(id)
    }

    pub fn update_team(&mut self, team_id: u32, updates: TeamPatch) -> Result<(), CommandError> {
        let name = match &updates.name {
            Some(name) => Some(shared::validate_team_name(name)?),
            None => None,
        };
        if let Some(color) = &updates.color {
            shared::validate_team_color(color)?;
        }

        let team = self
            .game
            .team_mut(team_id)
            .ok_or(ValidationError::TeamNotFound(team_id))?;
        if let Some(name) = name {
            team.name = name;
        }
        if let Some(color) = updates.color {
            team.color = color;
        }

        self.schedule_save(true);
        self.broadcast_state();
        Ok(())
    }

    /// Removes a team, releasing any points it holds. The roster can
    /// never drop below two teams.
    pub fn remove_team(&mut self, team_id: u32) -> Result<(), CommandError> {
        if self.game.team(team_id).is_none() {
            return Err(ValidationError::TeamNotFound(team_id).into());
        }
        if self.game.teams.len() <= 2 {
            return Err(CommandError::MinimumTeams);
        }

        for point in &mut self.game.capture_points {
            if point.team_id == Some(team_id) {
                point.team_id = None;
                point.last_capture_time = None;
            }
        }
        let name = self
            .game
            .team(team_id)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        self.game.teams.retain(|t| t.id != team_id);

        info!("Team {} removed", name);
        let now = utils::now_ms();
        let event = self
            .game
            .push_activity("team", format!("Team {} removed", name), None, now);
        self.broadcast_activity(event);
        self.schedule_save(true);
        self.broadcast_state();
        Ok(())
    }

    // --- disconnects & ticks --------------------------------------------

    /// Handles a capture-point peer dropping. While a game is running
    /// the point and its identity are retained so a flaky link can't
    /// erase board state; outside a game both are released.
    pub fn release_connection(&mut self, identity: &str) {
        let now = utils::now_ms();
        self.game.set_node_offline(identity, now);

        if self.game.active {
            self.identities.touch(identity, now);
        } else {
            self.game.remove_capture_point(identity);
            self.identities.release(identity);
        }

        let event = self
            .game
            .push_activity("node", format!("{} went offline", identity), None, now);
        self.broadcast_activity(event);
        self.schedule_save(false);
        self.broadcast_state();
    }

    /// One scoring-clock tick. Cheap no-op while the game is inactive.
    pub fn tick_scores(&mut self) {
        let awarded = scoring::tick(&mut self.game, self.config.points_per_second);
        if !awarded.is_empty() {
            self.schedule_save(false);
        }
    }

    /// Wipes everything back to defaults and overwrites the durable
    /// record. Identities and capture points go too.
    pub fn clear_all(&mut self) {
        self.game = GameState::new(&self.config.default_teams);
        self.identities.reset();
        info!("State cleared to defaults");
        self.schedule_save(true);
        self.broadcast_state();
    }

    // --- accessors & plumbing -------------------------------------------

    pub fn snapshot(&self) -> GameSnapshot {
        self.game.snapshot()
    }

    pub fn game_active(&self) -> bool {
        self.game.active
    }

    pub fn touch_identity(&mut self, identity: &str) {
        let now = utils::now_ms();
        self.identities.touch(identity, now);
        if let Some(node) = self.game.node_mut(identity) {
            node.last_seen = now;
            node.status = NodeStatus::Online;
        }
    }

    fn persisted(&self) -> PersistedState {
        PersistedState {
            teams: self.game.teams.clone(),
            game_active: self.game.active,
            game_start_time: self.game.start_time,
            activity_feed: self.game.activity_feed.clone(),
        }
    }

    fn schedule_save(&self, immediate: bool) {
        self.persist.schedule(self.persisted(), immediate);
    }

    pub fn broadcast_state(&self) {
        self.broadcaster.broadcast(
            &ServerMessage::ServerState {
                state: self.game.snapshot(),
            },
            Audience::All,
            None,
        );
    }

    fn broadcast_activity(&self, activity: ActivityEvent) {
        self.broadcaster
            .broadcast(&ServerMessage::ActivityAdded { activity }, Audience::All, None);
    }
}
