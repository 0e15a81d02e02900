//! Types shared between the authoritative server and its clients: the
//! wire protocol, the game data model, the validation guards, and the
//! game constants.
//!
//! Everything in this crate is pure data plus pure functions. Nothing
//! here performs I/O or holds state, which keeps the protocol and the
//! validation rules testable in isolation from the server runtime.

pub mod models;
pub mod protocol;
pub mod validation;

pub use models::{
    ActivityEvent, CapturePoint, GameSnapshot, Node, NodeStatus, Position, Role, Team,
};
pub use protocol::{ClientMessage, ServerMessage, TeamPatch};
pub use validation::{
    validate_coordinate, validate_team_color, validate_team_id, validate_team_name,
    ValidationError,
};

/// Fixed identity of the single admin participant. Every other
/// participant gets a callsign from [`CAPTURE_POINT_NAMES`].
pub const ADMIN_IDENTITY: &str = "HQ Command";

/// Ordered callsign pool for capture-point identities. When all 36 are
/// in use, the allocator degrades to `<name>-<n>` overflow variants.
pub const CAPTURE_POINT_NAMES: [&str; 36] = [
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India", "Juliet",
    "Kilo", "Lima", "Mike", "November", "Oscar", "Papa", "Quebec", "Romeo", "Sierra", "Tango",
    "Uniform", "Victor", "Whiskey", "Xray", "Yankee", "Zulu", "Ada", "Clara", "Diana", "Elsa",
    "Fiona", "Greta", "Iris", "Nina", "Sonia", "Zara",
];

/// Bonus awarded to a team at the moment of a successful capture.
pub const DEFAULT_POINTS_PER_CAPTURE: f64 = 10.0;

/// Points awarded per held capture point per scoring tick.
pub const DEFAULT_POINTS_PER_SECOND: f64 = 1.0;

/// Minimum interval between two captures of the same point.
pub const DEFAULT_CAPTURE_COOLDOWN_MS: u64 = 500;

/// Debounce window collapsing rapid persistence requests.
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 100;

/// Interval of the unconditional full-state broadcast and of the
/// scoring clock.
pub const SYNC_TICK_MS: u64 = 1000;

/// Upper bound on team name length, applied after trimming.
pub const TEAM_NAME_MAX_LEN: usize = 50;
