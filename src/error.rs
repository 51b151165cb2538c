//! # Error Types
//!
//! This module defines all error types for the balafon interpreter and player.
//!
//! Every evaluation error carries the offending value together with the allowed
//! range or the conflicting entities, so a caller can present a precise diagnostic.
//!
//! ## Error Groups
//! - **Range** - `OutOfRange`, `InvalidNoteValue`, `InvalidTuplet`, `InvalidTimeSignature`, `UnknownScale`
//! - **Scope** - `ForbiddenInBar`
//! - **Reference** - `UnknownBar`, `UndefinedNote`
//! - **Conflict** - `DuplicateAssignment`, `DuplicateBar`, `DuplicateProperty`, `ConflictingProperty`,
//!   `AccidentalOnBlackKey`
//! - **Structural** - `EmptyBar`, `BarOverflow`
//!
//! Playback failures live in a separate [`PlayError`], since cancelling playback
//! is a control signal and not an evaluation failure.
//!
//! ## Usage
//! ```rust
//! use balafon::{BalafonError, Declaration, Interpreter};
//!
//! let mut it = Interpreter::new();
//! match it.evaluate(&[Declaration::Play("chorus".to_string())]) {
//!     Ok(()) => println!("Success!"),
//!     Err(BalafonError::UnknownBar(name)) => eprintln!("no such bar: {}", name),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

use crate::ast::PropertyKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BalafonError {
    /// A numeric value outside of its legal domain.
    ///
    /// # Example
    /// ```
    /// # use balafon::BalafonError;
    /// let err = BalafonError::OutOfRange { what: "velocity", value: 300, min: 0, max: 127 };
    /// assert_eq!(err.to_string(), "velocity must be in range [0, 127], got: 300");
    /// ```
    #[error("{what} must be in range [{min}, {max}], got: {value}")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("note value must be a power of 2 in the range [1, 128], got: {0}")]
    InvalidNoteValue(u32),

    #[error("tuplet division must be 3 or 5, got: {0}")]
    InvalidTuplet(u32),

    #[error("invalid time signature {numerator}/{denominator}: numerator must be in range [1, 128] and denominator a power of 2 in the range [1, 128]")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },

    #[error("unknown scale '{0}'")]
    UnknownScale(String),

    /// A command that mutates global scope was used inside a bar body.
    ///
    /// # Example
    /// ```
    /// # use balafon::BalafonError;
    /// let err = BalafonError::ForbiddenInBar { command: "assign" };
    /// assert_eq!(err.to_string(), "command 'assign' not allowed in bar");
    /// ```
    #[error("command '{command}' not allowed in bar")]
    ForbiddenInBar { command: &'static str },

    #[error("unknown bar '{0}'")]
    UnknownBar(String),

    #[error("note '{note}' undefined on channel {channel}")]
    UndefinedNote { note: char, channel: u8 },

    #[error("note '{note}' already assigned to key '{key}' on channel '{channel}'")]
    DuplicateAssignment { note: char, key: u8, channel: u8 },

    #[error("bar '{0}' already defined")]
    DuplicateBar(String),

    #[error("duplicate note property '{0}'")]
    DuplicateProperty(PropertyKind),

    #[error("conflicting note properties '{0}' and '{1}'")]
    ConflictingProperty(PropertyKind, PropertyKind),

    /// A sharp or flat on a note that is bound to a black key.
    ///
    /// # Example
    /// ```
    /// # use balafon::BalafonError;
    /// let err = BalafonError::AccidentalOnBlackKey { note: 'x', key: 61, channel: 0 };
    /// assert_eq!(
    ///     err.to_string(),
    ///     "cannot use sharp/flat on note 'x' assigned to key '61' on channel '0'"
    /// );
    /// ```
    #[error("cannot use sharp/flat on note '{note}' assigned to key '{key}' on channel '{channel}'")]
    AccidentalOnBlackKey { note: char, key: u8, channel: u8 },

    #[error("invalid empty bar '{0}'")]
    EmptyBar(String),

    /// The notes of a single note list do not fit into the bar.
    ///
    /// # Example
    /// ```
    /// # use balafon::BalafonError;
    /// let err = BalafonError::BarOverflow { excess: 960, numerator: 1, denominator: 4 };
    /// assert_eq!(err.to_string(), "bar too long by 960 ticks, timesig is 1/4");
    /// ```
    #[error("bar too long by {excess} ticks, timesig is {numerator}/{denominator}")]
    BarOverflow {
        excess: u32,
        numerator: u8,
        denominator: u8,
    },

    /// Invalid configuration file or value.
    #[error("Invalid config: {0}")]
    Config(String),

    #[error("SMF error: {0}")]
    Smf(String),
}

/// Error returned by the player.
#[derive(Error, Debug)]
pub enum PlayError {
    /// The output sink rejected a message.
    #[error("failed to send MIDI message: {0}")]
    Send(#[from] io::Error),

    /// Playback was stopped through its cancellation token.
    #[error("playback cancelled")]
    Cancelled,
}

impl PlayError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PlayError::Cancelled)
    }
}
