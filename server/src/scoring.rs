//! Pure score computation. The state manager owns the clock; these
//! functions only do the arithmetic, so they are trivially testable.

use std::collections::HashMap;

use shared::Team;

use crate::game::GameState;

/// Awards each team `points_per_second` for every capture point it
/// holds. Runs only while the game is active; the returned map is the
/// per-team delta applied this tick (empty when nothing was awarded).
pub fn tick(game: &mut GameState, points_per_second: f64) -> HashMap<u32, f64> {
    let mut awarded: HashMap<u32, f64> = HashMap::new();

    if !game.active {
        return awarded;
    }

    for point in &game.capture_points {
        if let Some(team_id) = point.team_id {
            *awarded.entry(team_id).or_insert(0.0) += points_per_second;
        }
    }

    for team in &mut game.teams {
        if let Some(points) = awarded.get(&team.id) {
            team.score += points;
        }
    }

    awarded
}

/// Adds the capture bonus to a team's score; returns the amount
/// applied for the activity feed.
pub fn award_capture_bonus(team: &mut Team, bonus: f64) -> f64 {
    team.score += bonus;
    bonus
}

/// Zeroes every team's score. Does not touch capture-point ownership;
/// callers clear claims separately when that's the intent.
pub fn reset_scores(game: &mut GameState) {
    for team in &mut game.teams {
        team.score = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TeamSeed;
    use assert_approx_eq::assert_approx_eq;

    fn game_with_two_teams() -> GameState {
        GameState::new(&[
            TeamSeed {
                name: "Red Team".to_string(),
                color: "#ef4444".to_string(),
            },
            TeamSeed {
                name: "Blue Team".to_string(),
                color: "#3b82f6".to_string(),
            },
        ])
    }

    #[test]
    fn test_tick_awards_per_held_point() {
        let mut game = game_with_two_teams();
        game.active = true;
        game.ensure_capture_point("Alpha").team_id = Some(1);
        game.ensure_capture_point("Bravo").team_id = Some(1);
        game.ensure_capture_point("Charlie").team_id = Some(2);

        for _ in 0..3 {
            tick(&mut game, 1.0);
        }

        assert_approx_eq!(game.team(1).unwrap().score, 6.0);
        assert_approx_eq!(game.team(2).unwrap().score, 3.0);
    }

    #[test]
    fn test_tick_is_noop_while_inactive() {
        let mut game = game_with_two_teams();
        game.ensure_capture_point("Alpha").team_id = Some(1);

        let awarded = tick(&mut game, 1.0);
        assert!(awarded.is_empty());
        assert_eq!(game.team(1).unwrap().score, 0.0);
    }

    #[test]
    fn test_tick_ignores_unclaimed_points() {
        let mut game = game_with_two_teams();
        game.active = true;
        game.ensure_capture_point("Alpha");

        let awarded = tick(&mut game, 1.0);
        assert!(awarded.is_empty());
    }

    #[test]
    fn test_fractional_points_per_second() {
        let mut game = game_with_two_teams();
        game.active = true;
        game.ensure_capture_point("Alpha").team_id = Some(2);

        tick(&mut game, 0.5);
        tick(&mut game, 0.5);
        assert_approx_eq!(game.team(2).unwrap().score, 1.0);
    }

    #[test]
    fn test_capture_bonus() {
        let mut game = game_with_two_teams();
        let applied = award_capture_bonus(game.team_mut(1).unwrap(), 10.0);
        assert_approx_eq!(applied, 10.0);
        assert_approx_eq!(game.team(1).unwrap().score, 10.0);
    }

    #[test]
    fn test_reset_scores_leaves_ownership() {
        let mut game = game_with_two_teams();
        game.active = true;
        game.ensure_capture_point("Alpha").team_id = Some(1);
        tick(&mut game, 1.0);

        reset_scores(&mut game);

        assert_eq!(game.team(1).unwrap().score, 0.0);
        assert_eq!(game.capture_point("Alpha").unwrap().team_id, Some(1));
    }
}
