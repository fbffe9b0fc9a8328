//! Defensive highlight classification for a single play.
//!
//! Everything here is a pure function of the upstream play-type code and the
//! free-text description, so it can be exercised without a network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scoreboard::{GameSnapshot, LastPlay};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefensivePlay {
    Sack,
    Interception,
    FumbleRecovery,
    Safety,
}

impl DefensivePlay {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefensivePlay::Sack => "sack",
            DefensivePlay::Interception => "interception",
            DefensivePlay::FumbleRecovery => "fumble_recovery",
            DefensivePlay::Safety => "safety",
        }
    }

    /// Turnovers are credited to whoever the description says took the ball.
    pub fn is_turnover(&self) -> bool {
        matches!(self, DefensivePlay::Interception | DefensivePlay::FumbleRecovery)
    }
}

static SACK_YARDAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)sacked.*\bfor -\d+|loss of \d+").expect("valid sack regex")
});
static RECOVERED_BY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)recovered by ([A-Z]{2,4})-").expect("valid recovery regex")
});
static INTERCEPTED_BY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)intercepted by ([A-Z]{2,4})-").expect("valid interception regex")
});
static SAFETY_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsafety\b").expect("valid safety regex"));

/// ESPN play-type ids that map onto a defensive highlight.
pub fn classify_type_code(code: u32) -> Option<DefensivePlay> {
    match code {
        7 => Some(DefensivePlay::Sack),
        26 => Some(DefensivePlay::Interception),
        // interception return touchdown
        36 => Some(DefensivePlay::Interception),
        29 => Some(DefensivePlay::FumbleRecovery),
        // fumble return touchdown
        39 => Some(DefensivePlay::FumbleRecovery),
        20 => Some(DefensivePlay::Safety),
        _ => None,
    }
}

/// Guarded keyword matching on the play description.
///
/// A sack mention only counts with an explicit yardage loss, and a fumble
/// only counts with a `RECOVERED by TEAM-` attribution; incidental mentions
/// (a sack inside a completed-pass line, a muffed punt) yield nothing.
pub fn classify_text(description: &str) -> Option<DefensivePlay> {
    let lower = description.to_lowercase();

    if lower.contains("sack") && SACK_YARDAGE.is_match(description) {
        return Some(DefensivePlay::Sack);
    }
    if lower.contains("fumble") && RECOVERED_BY.is_match(description) {
        return Some(DefensivePlay::FumbleRecovery);
    }
    if lower.contains("intercept") {
        return Some(DefensivePlay::Interception);
    }
    if SAFETY_WORD.is_match(description) {
        return Some(DefensivePlay::Safety);
    }
    None
}

/// Classify a play, preferring the upstream type code over the text.
pub fn classify_play(type_code: Option<u32>, description: &str) -> Option<DefensivePlay> {
    let from_code = type_code.and_then(classify_type_code);
    let from_text = classify_text(description);

    match (from_code, from_text) {
        (Some(code), Some(text)) if code != text => {
            warn!(
                code = type_code.unwrap_or_default(),
                code_kind = code.as_str(),
                text_kind = text.as_str(),
                "Play code and description disagree, using code"
            );
            Some(code)
        }
        (Some(code), _) => Some(code),
        (None, text) => text,
    }
}

/// Pull the team abbreviation that took the ball away out of the description.
pub fn turnover_team(kind: DefensivePlay, description: &str) -> Option<String> {
    let re = match kind {
        DefensivePlay::FumbleRecovery => &*RECOVERED_BY,
        DefensivePlay::Interception => &*INTERCEPTED_BY,
        _ => return None,
    };
    re.captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
}

/// Work out which team a defensive play should be credited to.
///
/// Turnovers are read straight from the description; possession data does
/// not reliably say who came up with a loose ball. Sacks and safeties go to
/// the defense, i.e. the opponent of the play's offensive team.
pub fn attribute_team(kind: DefensivePlay, play: &LastPlay, game: &GameSnapshot) -> Option<String> {
    if kind.is_turnover() {
        return turnover_team(kind, &play.description);
    }

    let offense_id = play.team_id.as_deref().or_else(|| {
        game.situation
            .as_ref()
            .and_then(|s| s.possession_team_id.as_deref())
    })?;
    game.opponent_of(offense_id)
        .map(|t| t.abbreviation.clone())
        .filter(|abbr| !abbr.is_empty())
}
