//! Validation guards invoked before any state mutation.
//!
//! All guards are pure and return `Result` instead of panicking so
//! callers can choose between rejecting a command outright (admin
//! input) and warn-and-ignore (routine telemetry such as GPS fixes).

use thiserror::Error;

use crate::models::{Position, Team};
use crate::TEAM_NAME_MAX_LEN;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("team name cannot be empty")]
    TeamNameEmpty,

    #[error("team name must be {max} characters or less (got {actual})")]
    TeamNameTooLong { max: usize, actual: usize },

    #[error("team name can only contain letters, numbers, spaces, and hyphens")]
    TeamNameInvalidChars,

    #[error("color must be a hex code like #FF0000")]
    InvalidColor,

    #[error("coordinates must be finite numbers")]
    CoordinateNotFinite,

    #[error("latitude must be between -90 and 90")]
    LatitudeOutOfRange,

    #[error("longitude must be between -180 and 180")]
    LongitudeOutOfRange,

    #[error("team id is required")]
    TeamIdMissing,

    #[error("team {0} not found")]
    TeamNotFound(u32),
}

/// Validates and normalizes a team name. Returns the trimmed name.
pub fn validate_team_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::TeamNameEmpty);
    }

    if trimmed.len() > TEAM_NAME_MAX_LEN {
        return Err(ValidationError::TeamNameTooLong {
            max: TEAM_NAME_MAX_LEN,
            actual: trimmed.len(),
        });
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
    {
        return Err(ValidationError::TeamNameInvalidChars);
    }

    Ok(trimmed.to_string())
}

/// Validates a `#RRGGBB` color code.
pub fn validate_team_color(color: &str) -> Result<String, ValidationError> {
    let hex = color
        .strip_prefix('#')
        .ok_or(ValidationError::InvalidColor)?;

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidColor);
    }

    Ok(color.to_string())
}

/// Validates a WGS84 coordinate pair.
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<Position, ValidationError> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(ValidationError::CoordinateNotFinite);
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::LatitudeOutOfRange);
    }

    if !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError::LongitudeOutOfRange);
    }

    Ok(Position { lat, lon })
}

/// Checks that the id refers to an existing team.
pub fn validate_team_id(team_id: Option<u32>, teams: &[Team]) -> Result<u32, ValidationError> {
    let id = team_id.ok_or(ValidationError::TeamIdMissing)?;

    if !teams.iter().any(|t| t.id == id) {
        return Err(ValidationError::TeamNotFound(id));
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_name_trimmed() {
        assert_eq!(validate_team_name("  Red Team  ").unwrap(), "Red Team");
    }

    #[test]
    fn test_team_name_empty_after_trim() {
        assert_eq!(validate_team_name("   "), Err(ValidationError::TeamNameEmpty));
        assert_eq!(validate_team_name(""), Err(ValidationError::TeamNameEmpty));
    }

    #[test]
    fn test_team_name_too_long() {
        let name = "a".repeat(51);
        assert_eq!(
            validate_team_name(&name),
            Err(ValidationError::TeamNameTooLong {
                max: 50,
                actual: 51
            })
        );
        assert!(validate_team_name(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_team_name_invalid_chars() {
        assert_eq!(
            validate_team_name("Red<script>"),
            Err(ValidationError::TeamNameInvalidChars)
        );
        assert!(validate_team_name("Team-42 Bravo").is_ok());
    }

    #[test]
    fn test_team_color() {
        assert!(validate_team_color("#ef4444").is_ok());
        assert!(validate_team_color("#ABCDEF").is_ok());
        assert_eq!(
            validate_team_color("ef4444"),
            Err(ValidationError::InvalidColor)
        );
        assert_eq!(
            validate_team_color("#ef444"),
            Err(ValidationError::InvalidColor)
        );
        assert_eq!(
            validate_team_color("#ef44zz"),
            Err(ValidationError::InvalidColor)
        );
    }

    #[test]
    fn test_coordinate_ranges() {
        assert!(validate_coordinate(59.91, 10.75).is_ok());
        assert!(validate_coordinate(-90.0, 180.0).is_ok());
        assert_eq!(
            validate_coordinate(90.1, 0.0),
            Err(ValidationError::LatitudeOutOfRange)
        );
        assert_eq!(
            validate_coordinate(0.0, -180.5),
            Err(ValidationError::LongitudeOutOfRange)
        );
    }

    #[test]
    fn test_coordinate_must_be_finite() {
        assert_eq!(
            validate_coordinate(f64::NAN, 0.0),
            Err(ValidationError::CoordinateNotFinite)
        );
        assert_eq!(
            validate_coordinate(0.0, f64::INFINITY),
            Err(ValidationError::CoordinateNotFinite)
        );
    }

    #[test]
    fn test_team_id_lookup() {
        let teams = vec![Team::new(1, "Red Team", "#ef4444")];
        assert_eq!(validate_team_id(Some(1), &teams), Ok(1));
        assert_eq!(
            validate_team_id(Some(2), &teams),
            Err(ValidationError::TeamNotFound(2))
        );
        assert_eq!(
            validate_team_id(None, &teams),
            Err(ValidationError::TeamIdMissing)
        );
    }
}
