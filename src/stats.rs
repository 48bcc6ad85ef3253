//! Statistics payload model, request targets and the derived win/loss ratio.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::source::FetchError;

/// Games offered by the upstream service, in display order.
pub const GAME_CATALOG: [&str; 13] = [
    "Dice",
    "Limbo",
    "Crash",
    "Plinko",
    "Mines",
    "Blackjack",
    "Roulette",
    "Keno",
    "Wheel",
    "Hilo",
    "Baccarat",
    "Slots",
    "Tower",
];

/// Ratio written into exports when there are wins but no losses.
pub const EXPORT_RATIO_SENTINEL: f64 = 999.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Hourly,
    Weekly,
    Monthly,
    #[default]
    Overall,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Overall => "overall",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "overall" => Ok(Self::Overall),
            other => Err(format!("unknown timeframe '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTab {
    #[default]
    Overall,
    Game,
    Help,
    Realities,
    About,
}

impl ActiveTab {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overall => "overall",
            Self::Game => "game",
            Self::Help => "help",
            Self::Realities => "realities",
            Self::About => "about",
        }
    }
}

impl FromStr for ActiveTab {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "overall" => Ok(Self::Overall),
            "game" => Ok(Self::Game),
            "help" => Ok(Self::Help),
            "realities" => Ok(Self::Realities),
            "about" => Ok(Self::About),
            other => Err(format!("unknown tab '{other}'")),
        }
    }
}

/// Statistics snapshot as returned by `stats/...` endpoints.
///
/// Counts accept plain integers or thousands-separated strings such as
/// `"1,234"`. Percentages default to zero when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    #[serde(deserialize_with = "deserialize_count")]
    pub wins: u64,
    #[serde(deserialize_with = "deserialize_count")]
    pub losses: u64,
    #[serde(deserialize_with = "deserialize_count")]
    pub games_played: u64,
    #[serde(default, deserialize_with = "deserialize_percentage")]
    pub win_percentage: f64,
    #[serde(default, deserialize_with = "deserialize_percentage")]
    pub loss_percentage: f64,
}

impl GameStats {
    pub fn ratio(&self) -> WinLossRatio {
        win_loss_ratio(self.wins, self.losses)
    }
}

/// Endpoint a fetch is issued against, relative to the relay mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatsTarget {
    Overall { timeframe: Timeframe },
    Game { timeframe: Timeframe, game: String },
}

impl StatsTarget {
    pub fn overall(timeframe: Timeframe) -> Self {
        Self::Overall { timeframe }
    }

    pub fn game(timeframe: Timeframe, game: &str) -> Self {
        Self::Game {
            timeframe,
            game: game.trim().to_lowercase(),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Overall { timeframe } => format!("/stats/{timeframe}"),
            Self::Game { timeframe, game } => format!("/stats/game/{timeframe}/{game}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WinLossRatio {
    Finite(f64),
    Infinite,
}

impl fmt::Display for WinLossRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(value) => write!(f, "{value:.2}"),
            Self::Infinite => f.write_str("∞"),
        }
    }
}

pub fn win_loss_ratio(wins: u64, losses: u64) -> WinLossRatio {
    if losses == 0 {
        return if wins > 0 {
            WinLossRatio::Infinite
        } else {
            WinLossRatio::Finite(0.0)
        };
    }
    WinLossRatio::Finite(round2(wins as f64 / losses as f64))
}

/// Ratio used in export tables. Never infinite: wins without losses map to
/// [`EXPORT_RATIO_SENTINEL`].
pub fn export_ratio(wins: u64, losses: u64) -> f64 {
    match win_loss_ratio(wins, losses) {
        WinLossRatio::Finite(value) => value,
        WinLossRatio::Infinite => EXPORT_RATIO_SENTINEL,
    }
}

/// Parses a count that may carry thousands separators (`"12,345"`).
pub fn parse_count(raw: &str) -> Option<u64> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|ch| *ch != ',' && *ch != '_' && !ch.is_whitespace())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Validates an upstream body into [`GameStats`].
pub fn parse_game_stats(body: &[u8]) -> Result<GameStats, FetchError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| FetchError::MalformedResponse(format!("body is not JSON: {err}")))?;
    if !value.is_object() {
        return Err(FetchError::MalformedResponse(
            "expected a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|err| FetchError::MalformedResponse(err.to_string()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(u64),
    Float(f64),
    Text(String),
}

fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Int(value) => Ok(value),
        NumberOrText::Float(value) if value >= 0.0 && value.fract() == 0.0 => Ok(value as u64),
        NumberOrText::Float(value) => Err(serde::de::Error::custom(format!(
            "count must be a non-negative integer, got {value}"
        ))),
        NumberOrText::Text(raw) => parse_count(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid count '{raw}'"))),
    }
}

fn deserialize_percentage<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Int(value) => Ok(value as f64),
        NumberOrText::Float(value) => Ok(value),
        NumberOrText::Text(raw) => raw
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid percentage '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_rounds_to_two_decimals() {
        assert_eq!(win_loss_ratio(150, 50), WinLossRatio::Finite(3.0));
        assert_eq!(win_loss_ratio(150, 50).to_string(), "3.00");
        assert_eq!(win_loss_ratio(2, 3).to_string(), "0.67");
        assert_eq!(win_loss_ratio(1_000, 7).to_string(), "142.86");
    }

    #[test]
    fn ratio_with_wins_and_no_losses_is_infinite() {
        assert_eq!(win_loss_ratio(10, 0), WinLossRatio::Infinite);
        assert_eq!(win_loss_ratio(10, 0).to_string(), "∞");
    }

    #[test]
    fn ratio_without_games_is_zero() {
        assert_eq!(win_loss_ratio(0, 0).to_string(), "0.00");
        assert_eq!(win_loss_ratio(0, 5).to_string(), "0.00");
    }

    #[test]
    fn export_ratio_uses_finite_sentinel() {
        assert_eq!(export_ratio(10, 0), EXPORT_RATIO_SENTINEL);
        assert_eq!(export_ratio(0, 0), 0.0);
        assert_eq!(export_ratio(150, 50), 3.0);
    }

    #[test]
    fn counts_accept_thousands_separators() {
        assert_eq!(parse_count("1,234"), Some(1_234));
        assert_eq!(parse_count(" 12,345,678 "), Some(12_345_678));
        assert_eq!(parse_count("42"), Some(42));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("-3"), None);
        assert_eq!(parse_count("abc"), None);
    }

    #[test]
    fn format_count_inserts_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn parses_camel_case_payload_with_mixed_count_encodings() {
        let body = br#"{"wins":"1,500","losses":500,"gamesPlayed":2000.0,"winPercentage":"75%","lossPercentage":25}"#;
        let stats = parse_game_stats(body).unwrap();
        assert_eq!(stats.wins, 1_500);
        assert_eq!(stats.losses, 500);
        assert_eq!(stats.games_played, 2_000);
        assert_eq!(stats.win_percentage, 75.0);
        assert_eq!(stats.loss_percentage, 25.0);
        assert_eq!(stats.ratio().to_string(), "3.00");
    }

    #[test]
    fn missing_percentages_default_to_zero() {
        let stats = parse_game_stats(br#"{"wins":1,"losses":2,"gamesPlayed":3}"#).unwrap();
        assert_eq!(stats.win_percentage, 0.0);
        assert_eq!(stats.loss_percentage, 0.0);
    }

    #[test]
    fn non_object_bodies_are_malformed() {
        for body in [&b"[1,2,3]"[..], b"\"text\"", b"null", b"<html>"] {
            let err = parse_game_stats(body).unwrap_err();
            assert!(matches!(err, FetchError::MalformedResponse(_)), "{err:?}");
        }
    }

    #[test]
    fn wrong_shape_object_is_malformed() {
        let err = parse_game_stats(br#"{"wins":-1,"losses":2,"gamesPlayed":3}"#).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));

        let err = parse_game_stats(br#"{"losses":2}"#).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn targets_build_relay_paths_with_lowercased_game() {
        assert_eq!(StatsTarget::overall(Timeframe::Weekly).path(), "/stats/weekly");
        assert_eq!(
            StatsTarget::game(Timeframe::Hourly, "BlackJack").path(),
            "/stats/game/hourly/blackjack"
        );
    }

    #[test]
    fn timeframe_and_tab_parse_case_insensitively() {
        assert_eq!("Monthly".parse::<Timeframe>(), Ok(Timeframe::Monthly));
        assert!("daily".parse::<Timeframe>().is_err());
        assert_eq!(" GAME ".parse::<ActiveTab>(), Ok(ActiveTab::Game));
        assert!("settings".parse::<ActiveTab>().is_err());
    }

    #[test]
    fn catalog_has_thirteen_unique_games() {
        let mut names: Vec<String> = GAME_CATALOG.iter().map(|g| g.to_lowercase()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 13);
    }
}
