//! Game mode tokens
//!
//! A mode is announced to the cloud as `CATEGORY[number]{color}:text`,
//! e.g. `MB2{red}:Double Multiball`. A set of modes travels as its tokens
//! sorted and joined by `;`, so two sets with the same members always
//! serialize identically.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("mode token '{0}' has no ':' separator")]
    MissingSeparator(String),
    #[error("unknown mode category '{0}'")]
    UnknownCategory(String),
    #[error("unknown mode color '{0}'")]
    UnknownColor(String),
    #[error("malformed mode token '{0}'")]
    Malformed(String),
    #[error("mode text must not contain ';'")]
    ReservedCharacter,
}

/// Mode category, sent as a two-letter code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModeCategory {
    Multiball,
    BallLocked,
    WizardMode,
    ExtraBall,
    BonusMultiplier,
    Other,
    Completed,
    HideFromSessionLog,
    HideFromClients,
    OverrideGameOn,
}

impl ModeCategory {
    pub const ALL: [ModeCategory; 10] = [
        ModeCategory::Multiball,
        ModeCategory::BallLocked,
        ModeCategory::WizardMode,
        ModeCategory::ExtraBall,
        ModeCategory::BonusMultiplier,
        ModeCategory::Other,
        ModeCategory::Completed,
        ModeCategory::HideFromSessionLog,
        ModeCategory::HideFromClients,
        ModeCategory::OverrideGameOn,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ModeCategory::Multiball => "MB",
            ModeCategory::BallLocked => "BL",
            ModeCategory::WizardMode => "WM",
            ModeCategory::ExtraBall => "EB",
            ModeCategory::BonusMultiplier => "BX",
            ModeCategory::Other => "NA",
            ModeCategory::Completed => "CP",
            ModeCategory::HideFromSessionLog => "XX",
            ModeCategory::HideFromClients => "ZZ",
            ModeCategory::OverrideGameOn => "XY",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for ModeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Display color hint for a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
}

impl ModeColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeColor::Red => "red",
            ModeColor::Orange => "orange",
            ModeColor::Yellow => "yellow",
            ModeColor::Green => "green",
            ModeColor::Blue => "blue",
            ModeColor::Purple => "purple",
            ModeColor::Pink => "pink",
        }
    }
}

impl FromStr for ModeColor {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "red" => Ok(ModeColor::Red),
            "orange" => Ok(ModeColor::Orange),
            "yellow" => Ok(ModeColor::Yellow),
            "green" => Ok(ModeColor::Green),
            "blue" => Ok(ModeColor::Blue),
            "purple" => Ok(ModeColor::Purple),
            "pink" => Ok(ModeColor::Pink),
            _ => Err(ModeError::UnknownColor(s.to_string())),
        }
    }
}

/// A single game mode
///
/// The text never contains `;`, the separator of a mode set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameMode {
    pub category: ModeCategory,
    pub number: Option<u32>,
    pub color: Option<ModeColor>,
    text: String,
}

impl GameMode {
    pub fn new(category: ModeCategory, text: impl Into<String>) -> Result<Self, ModeError> {
        let text = text.into();
        if text.contains(';') {
            return Err(ModeError::ReservedCharacter);
        }
        Ok(Self {
            category,
            number: None,
            color: None,
            text,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_color(mut self, color: ModeColor) -> Self {
        self.color = Some(color);
        self
    }

    /// Serialized token, e.g. `MB2{red}:Double Multiball`
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category.code())?;
        if let Some(number) = self.number {
            write!(f, "{}", number)?;
        }
        if let Some(color) = self.color {
            write!(f, "{{{}}}", color.as_str())?;
        }
        write!(f, ":{}", self.text)
    }
}

impl FromStr for GameMode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, text) = s
            .split_once(':')
            .ok_or_else(|| ModeError::MissingSeparator(s.to_string()))?;
        if text.contains(';') {
            return Err(ModeError::ReservedCharacter);
        }
        if head.len() < 2 || !head.is_char_boundary(2) {
            return Err(ModeError::Malformed(s.to_string()));
        }

        let (code, mut rest) = head.split_at(2);
        let category =
            ModeCategory::from_code(code).ok_or_else(|| ModeError::UnknownCategory(code.into()))?;

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let number = if digits > 0 {
            let n = rest[..digits]
                .parse()
                .map_err(|_| ModeError::Malformed(s.to_string()))?;
            rest = &rest[digits..];
            Some(n)
        } else {
            None
        };

        let color = if rest.is_empty() {
            None
        } else {
            let inner = rest
                .strip_prefix('{')
                .and_then(|r| r.strip_suffix('}'))
                .ok_or_else(|| ModeError::Malformed(s.to_string()))?;
            Some(inner.parse()?)
        };

        Ok(Self {
            category,
            number,
            color,
            text: text.to_string(),
        })
    }
}

/// Set of active mode tokens, ordered lexicographically
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Modes {
    tokens: BTreeSet<String>,
}

impl Modes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the mode was already present
    pub fn add(&mut self, mode: &GameMode) -> bool {
        self.tokens.insert(mode.token())
    }

    /// Returns false if the mode was not present
    pub fn remove(&mut self, mode: &GameMode) -> bool {
        self.tokens.remove(&mode.token())
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    pub fn contains(&self, mode: &GameMode) -> bool {
        self.tokens.contains(&mode.token())
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// Tokens that may appear in a session log
    pub fn loggable(&self) -> impl Iterator<Item = &str> {
        let hidden = ModeCategory::HideFromSessionLog.code();
        self.iter().filter(move |t| !t.starts_with(hidden))
    }
}

impl fmt::Display for Modes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for token in &self.tokens {
            if !first {
                f.write_str(";")?;
            }
            f.write_str(token)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Modes {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modes = Modes::new();
        for token in s.split(';').filter(|t| !t.is_empty()) {
            let mode: GameMode = token.parse()?;
            modes.add(&mode);
        }
        Ok(modes)
    }
}

impl Serialize for Modes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Modes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
