//! Session defaults read from a YAML file.
//!
//! ```yaml
//! tempo: 90
//! velocity: 110
//! time-signature: 3/4
//! port: "IAC Driver Bus 1"
//! ```
//!
//! Every key is optional. Values are checked against the same ranges the
//! interpreter enforces.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::ast::validate_note_value;
use crate::constants::{
    DEFAULT_TEMPO, DEFAULT_TIME_SIGNATURE, DEFAULT_VELOCITY, MAX_BEATS_PER_BAR, MAX_VALUE,
};
use crate::error::BalafonError;

/// Raw config for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    tempo: Option<i64>,
    velocity: Option<i64>,
    time_signature: Option<String>,
    port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Initial tempo of the sequencer and player.
    pub tempo: u16,
    /// Initial note velocity.
    pub velocity: u8,
    /// Initial time signature.
    pub time_signature: (u8, u8),
    /// MIDI output port name, the first available port when `None`.
    pub port: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            velocity: DEFAULT_VELOCITY,
            time_signature: DEFAULT_TIME_SIGNATURE,
            port: None,
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, BalafonError> {
        // An empty document deserializes as null.
        let raw: Option<RawConfig> =
            serde_yaml::from_str(content).map_err(|e| BalafonError::Config(e.to_string()))?;
        let raw = raw.unwrap_or_default();

        let mut config = Config::default();

        if let Some(tempo) = raw.tempo {
            if !(1..=u16::MAX as i64).contains(&tempo) {
                return Err(BalafonError::Config(format!(
                    "tempo must be in range [1, {}], got: {}",
                    u16::MAX,
                    tempo
                )));
            }
            config.tempo = tempo as u16;
        }

        if let Some(velocity) = raw.velocity {
            if !(0..=MAX_VALUE as i64).contains(&velocity) {
                return Err(BalafonError::Config(format!(
                    "velocity must be in range [0, {}], got: {}",
                    MAX_VALUE, velocity
                )));
            }
            config.velocity = velocity as u8;
        }

        if let Some(ts) = &raw.time_signature {
            config.time_signature = parse_time_signature(ts)?;
        }

        config.port = raw.port;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BalafonError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| BalafonError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }
}

fn parse_time_signature(s: &str) -> Result<(u8, u8), BalafonError> {
    let invalid = || BalafonError::Config(format!("Invalid time signature: {}", s));

    let (numerator, denominator) = s.split_once('/').ok_or_else(invalid)?;
    let numerator: u32 = numerator.trim().parse().map_err(|_| invalid())?;
    let denominator: u32 = denominator.trim().parse().map_err(|_| invalid())?;

    if !(1..=MAX_BEATS_PER_BAR as u32).contains(&numerator)
        || validate_note_value(denominator).is_err()
    {
        return Err(invalid());
    }

    Ok((numerator as u8, denominator as u8))
}
