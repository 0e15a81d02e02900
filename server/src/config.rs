//! Server configuration. Defaults come from the shared constants;
//! every value can be overridden via environment variables, and the
//! most common ones also via CLI flags in `main`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::warn;
use rand::Rng;
use serde::Deserialize;

/// Seed for one default team, also the shape of the `DEFAULT_TEAMS`
/// environment override (a JSON array of `{name, color}` objects).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TeamSeed {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/WebSocket listener binds to.
    pub host: String,
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Durable store location.
    /// Env: STATE_FILE_PATH (default: ".capturemesh-state.json")
    pub state_file: PathBuf,

    /// Shared secret for admin operations. Generated randomly at
    /// startup when not supplied.
    /// Env: ADMIN_PIN
    pub admin_pin: String,

    /// Env: POINTS_PER_CAPTURE (default: 10)
    pub points_per_capture: f64,

    /// Env: POINTS_PER_SECOND (default: 1)
    pub points_per_second: f64,

    /// Env: CAPTURE_COOLDOWN_MS (default: 500)
    pub capture_cooldown: Duration,

    /// Env: SAVE_DEBOUNCE_MS (default: 100)
    pub save_debounce: Duration,

    /// Teams created when no durable state exists.
    /// Env: DEFAULT_TEAMS (JSON array of {name, color})
    pub default_teams: Vec<TeamSeed>,
}

impl Config {
    /// Builds the configuration from CLI-provided basics plus
    /// environment overrides for the tuning knobs.
    pub fn load(host: String, port: u16, state_file: Option<PathBuf>, pin: Option<String>) -> Self {
        Self {
            host,
            port,
            state_file: state_file.unwrap_or_else(|| {
                PathBuf::from(env_or_default(
                    "STATE_FILE_PATH",
                    ".capturemesh-state.json".to_string(),
                ))
            }),
            admin_pin: pin
                .or_else(|| std::env::var("ADMIN_PIN").ok())
                .unwrap_or_else(generate_pin),
            points_per_capture: env_or_default(
                "POINTS_PER_CAPTURE",
                shared::DEFAULT_POINTS_PER_CAPTURE,
            ),
            points_per_second: env_or_default(
                "POINTS_PER_SECOND",
                shared::DEFAULT_POINTS_PER_SECOND,
            ),
            capture_cooldown: Duration::from_millis(env_or_default(
                "CAPTURE_COOLDOWN_MS",
                shared::DEFAULT_CAPTURE_COOLDOWN_MS,
            )),
            save_debounce: Duration::from_millis(env_or_default(
                "SAVE_DEBOUNCE_MS",
                shared::DEFAULT_SAVE_DEBOUNCE_MS,
            )),
            default_teams: default_teams_from_env(),
        }
    }
}

impl Default for Config {
    /// Baseline configuration with no environment lookups; used by
    /// tests and as the starting point for `load`.
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            state_file: PathBuf::from(".capturemesh-state.json"),
            admin_pin: "000000".to_string(),
            points_per_capture: shared::DEFAULT_POINTS_PER_CAPTURE,
            points_per_second: shared::DEFAULT_POINTS_PER_SECOND,
            capture_cooldown: Duration::from_millis(shared::DEFAULT_CAPTURE_COOLDOWN_MS),
            save_debounce: Duration::from_millis(shared::DEFAULT_SAVE_DEBOUNCE_MS),
            default_teams: builtin_default_teams(),
        }
    }
}

fn builtin_default_teams() -> Vec<TeamSeed> {
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

fn default_teams_from_env() -> Vec<TeamSeed> {
    match std::env::var("DEFAULT_TEAMS") {
        Ok(raw) => match serde_json::from_str::<Vec<TeamSeed>>(&raw) {
            Ok(teams) if teams.len() >= 2 => teams,
            Ok(_) => {
                warn!("DEFAULT_TEAMS must contain at least 2 teams, using built-in defaults");
                builtin_default_teams()
            }
            Err(e) => {
                warn!("Failed to parse DEFAULT_TEAMS: {}", e);
                builtin_default_teams()
            }
        },
        Err(_) => builtin_default_teams(),
    }
}

/// Random 6-digit PIN for installs that don't configure one.
fn generate_pin() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}

fn env_or_default<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}, using default", key);
            default
        }),
        Err(_) => default,
    }
}
