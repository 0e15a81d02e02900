//! Wire protocol: JSON text frames with a `type` discriminator.
//!
//! Both directions use internally tagged enums so dispatch is
//! exhaustive; a frame whose `type` the server does not know collapses
//! into [`ClientMessage::Unrecognized`] and is handled in one place.
//! Every outbound frame carries a `timestamp` added by the envelope in
//! [`ServerMessage::to_frame`].

use serde::{Deserialize, Serialize};

use crate::models::{ActivityEvent, GameSnapshot, Position, Role};

/// Patch applied by the `update-team` admin command. Absent fields are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Messages a client may send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Identity is absent on a device's very first connection; the
    /// server assigns one and the client re-registers with it.
    Register {
        #[serde(default)]
        identity: Option<String>,
        role: Role,
    },
    CaptureEvent {
        identity: String,
        team_id: u32,
    },
    PositionUpdate {
        identity: String,
        position: Position,
    },
    Heartbeat,
    ServerStateRequest,

    // Admin commands. Accepted over the socket only from the peer
    // currently holding the admin role; also exposed as PIN-guarded
    // HTTP routes.
    StartGame,
    StopGame,
    ResetGame,
    AddTeam {
        name: String,
        color: String,
    },
    UpdateTeam {
        team_id: u32,
        updates: TeamPatch,
    },
    RemoveTeam {
        team_id: u32,
    },
    SetStaticPosition {
        identity: String,
        position: Position,
    },
    TogglePositionSource {
        identity: String,
    },

    /// Any `type` value this build does not know.
    #[serde(other)]
    Unrecognized,
}

impl ClientMessage {
    /// Parses one inbound text frame. Unknown top-level fields (such
    /// as client-side timestamps) are ignored.
    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

/// Messages the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First frame on every new connection.
    Connected,
    /// Full authoritative snapshot; sent on register, on request, and
    /// on the periodic self-healing tick.
    ServerState { state: GameSnapshot },
    /// Sent only to a newly connecting, not-yet-identified
    /// capture-point peer. The client must re-register with this
    /// identity.
    IdentityAssigned { identity: String },
    NodeJoined { identity: String, role: Role },
    NodeLeft { identity: String },
    NodeDisconnect { identity: String },
    ActivityAdded { activity: ActivityEvent },
    HeartbeatAck,
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    message: &'a ServerMessage,
    timestamp: u64,
}

impl ServerMessage {
    /// Serializes the message with the given send timestamp attached.
    pub fn to_frame(&self, timestamp: u64) -> serde_json::Result<String> {
        serde_json::to_string(&Envelope {
            message: self,
            timestamp,
        })
    }
}
