//! Match Statistics
//!
//! Aggregates a player's match history into totals, win rate and rating.

use serde::{Deserialize, Serialize};

use crate::game::state::GameResult;

/// Starting profile rating.
pub const BASE_RATING: i64 = 800;
/// Profile rating gained per win.
pub const WIN_POINTS: i64 = 25;
/// Profile rating lost per loss.
pub const LOSS_POINTS: i64 = 15;
/// Profile rating gained per draw.
pub const DRAW_POINTS: i64 = 5;

/// One entry of a user's match history, as written by the outcome recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Opponent display label.
    pub opponent: String,
    /// Result for the user.
    pub status: GameResult,
}

/// Win/loss/draw counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    /// Games won.
    #[serde(default)]
    pub wins: u32,
    /// Games lost. Named `loses` by the profile service.
    #[serde(default, rename = "loses")]
    pub losses: u32,
    /// Games drawn.
    #[serde(default)]
    pub draws: u32,
}

impl MatchStats {
    /// Stats from explicit counters.
    pub fn new(wins: u32, losses: u32, draws: u32) -> Self {
        Self { wins, losses, draws }
    }

    /// Stats from a match history.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MatchRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut stats, record| {
            stats.record(record.status);
            stats
        })
    }

    /// Count one result.
    pub fn record(&mut self, result: GameResult) {
        match result {
            GameResult::Win => self.wins += 1,
            GameResult::Loss => self.losses += 1,
            GameResult::Draw => self.draws += 1,
        }
    }

    /// Games played.
    pub fn total_games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Percentage of games won, rounded. 0 with no games.
    pub fn win_rate(&self) -> u32 {
        let total = self.total_games();
        if total == 0 {
            return 0;
        }
        (f64::from(self.wins) / f64::from(total) * 100.0).round() as u32
    }

    /// Profile rating: points per result on top of a base.
    pub fn rating(&self) -> i64 {
        BASE_RATING + i64::from(self.wins) * WIN_POINTS - i64::from(self.losses) * LOSS_POINTS
            + i64::from(self.draws) * DRAW_POINTS
    }

    /// Rating shown on in-game player cards: scaled win ratio. 0 with no games.
    pub fn card_rating(&self) -> u32 {
        let total = self.total_games();
        if total == 0 {
            return 0;
        }
        let ratio = f64::from(self.wins) / f64::from(total);
        (900.0 + ratio * 2100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats() {
        let stats = MatchStats::default();
        assert_eq!(stats.total_games(), 0);
        assert_eq!(stats.win_rate(), 0);
        assert_eq!(stats.rating(), BASE_RATING);
        assert_eq!(stats.card_rating(), 0);
    }

    #[test]
    fn test_from_records() {
        let records = vec![
            MatchRecord { opponent: "bob".into(), status: GameResult::Win },
            MatchRecord { opponent: "carol".into(), status: GameResult::Win },
            MatchRecord { opponent: "dave".into(), status: GameResult::Loss },
            MatchRecord { opponent: "Opponent".into(), status: GameResult::Draw },
        ];
        let stats = MatchStats::from_records(&records);
        assert_eq!(stats, MatchStats::new(2, 1, 1));
        assert_eq!(stats.total_games(), 4);
        assert_eq!(stats.win_rate(), 50);
        assert_eq!(stats.rating(), 800 + 50 - 15 + 5);
        assert_eq!(stats.card_rating(), 1950);
    }

    #[test]
    fn test_rating_can_drop_below_base() {
        let stats = MatchStats::new(0, 3, 0);
        assert_eq!(stats.rating(), 755);
        assert_eq!(stats.win_rate(), 0);
        assert_eq!(stats.card_rating(), 900);
    }

    #[test]
    fn test_win_rate_rounds() {
        assert_eq!(MatchStats::new(2, 1, 0).win_rate(), 67);
        assert_eq!(MatchStats::new(1, 2, 0).win_rate(), 33);
    }

    #[test]
    fn test_profile_counters_deserialize() {
        let stats: MatchStats = serde_json::from_str(r#"{"wins":3,"loses":2}"#).unwrap();
        assert_eq!(stats, MatchStats::new(3, 2, 0));
    }

    #[test]
    fn test_record_json_shape() {
        let record: MatchRecord = serde_json::from_str(r#"{"opponent":"bob","status":"lose"}"#).unwrap();
        assert_eq!(record.status, GameResult::Loss);
    }
}
