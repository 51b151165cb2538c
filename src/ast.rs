//! # Declaration Tree Types
//!
//! This module defines the node types an external parser hands to the
//! [`Interpreter`](crate::Interpreter), and the note model used to derive timing
//! and performance attributes from a note's properties.
//!
//! ## Type Hierarchy
//! ```text
//! Vec<Declaration>
//!   ├── Assign { note, key }
//!   ├── DefineBar { name, body: Vec<Declaration> }
//!   ├── Play(name)
//!   ├── Tempo | TimeSignature | Velocity | Channel
//!   ├── Program | Control | Start | Stop | Key | Text
//!   └── NoteList(Vec<Note>)
//!         └── Note
//!               ├── name: char ('-' is a rest)
//!               └── properties: PropertyList (always canonically sorted)
//! ```
//!
//! ## Duration Calculation
//! - Base length is `TICKS_PER_WHOLE / value`, with an implicit quarter note (value 4)
//! - Each dot adds half of the previous increment: `x`, `x.` = 1.5x, `x..` = 1.75x
//! - A tuplet of division `d` scales the dotted length by `2/d`
//! - All arithmetic is integer; fractions are truncated
//! - Example: dotted triplet quarter = `960 * 1.5 * 2/3 = 960`, a plain quarter note
//!
//! ## Property Kinds
//! Unique kinds (sharp, flat, value, tuplet, let ring) may appear once per note.
//! Additive kinds (accent, marcato, ghost, staccato, dot) stack and are counted.
//! Sharp excludes flat and accent excludes ghost.
//!
//! ## Interchange
//! Every node is serde-(de)serializable. Declaration files are read with
//! [`load_declarations`](crate::load_declarations), which writes enum variants
//! as single-key maps. A property list deserializes through
//! [`PropertyList::new`], so invalid lists are rejected at load time:
//! ```yaml
//! - assign: { note: c, key: 60 }
//! - tempo: 90
//! - note_list:
//!     - { name: c, properties: [{ value: 8 }, dot] }
//!     - { name: "-" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ACCENT_VELOCITY, GHOST_VELOCITY, MARCATO_VELOCITY, MAX_VALUE, MIN_VALUE, TICKS_PER_WHOLE,
};
use crate::error::BalafonError;

/// The reserved rest symbol.
pub const REST: char = '-';

/// Kind of a note property, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyKind {
    Sharp,
    Flat,
    Accent,
    Marcato,
    Ghost,
    Staccato,
    Value,
    Dot,
    Tuplet,
    LetRing,
}

impl PropertyKind {
    /// Whether the kind may occur at most once per note.
    pub fn is_unique(self) -> bool {
        matches!(
            self,
            PropertyKind::Sharp
                | PropertyKind::Flat
                | PropertyKind::Value
                | PropertyKind::Tuplet
                | PropertyKind::LetRing
        )
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyKind::Sharp => "sharp",
            PropertyKind::Flat => "flat",
            PropertyKind::Accent => "accent",
            PropertyKind::Marcato => "marcato",
            PropertyKind::Ghost => "ghost",
            PropertyKind::Staccato => "staccato",
            PropertyKind::Value => "value",
            PropertyKind::Dot => "dot",
            PropertyKind::Tuplet => "tuplet",
            PropertyKind::LetRing => "let ring",
        };
        f.write_str(name)
    }
}

/// A single note modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    Sharp,
    Flat,
    Accent,
    Marcato,
    Ghost,
    Staccato,
    /// Denominator of the base duration: 1 = whole, 4 = quarter, 8 = eighth...
    Value(u8),
    Dot,
    /// Irregular division, 3 for a triplet or 5 for a quintuplet.
    Tuplet(u8),
    LetRing,
}

impl Property {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Property::Sharp => PropertyKind::Sharp,
            Property::Flat => PropertyKind::Flat,
            Property::Accent => PropertyKind::Accent,
            Property::Marcato => PropertyKind::Marcato,
            Property::Ghost => PropertyKind::Ghost,
            Property::Staccato => PropertyKind::Staccato,
            Property::Value(_) => PropertyKind::Value,
            Property::Dot => PropertyKind::Dot,
            Property::Tuplet(_) => PropertyKind::Tuplet,
            Property::LetRing => PropertyKind::LetRing,
        }
    }

    fn validate(&self) -> Result<(), BalafonError> {
        match *self {
            Property::Value(v) => validate_note_value(v as u32),
            Property::Tuplet(d) if d != 3 && d != 5 => Err(BalafonError::InvalidTuplet(d as u32)),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Sharp => f.write_str("#"),
            Property::Flat => f.write_str("$"),
            Property::Accent => f.write_str(">"),
            Property::Marcato => f.write_str("^"),
            Property::Ghost => f.write_str(")"),
            Property::Staccato => f.write_str("`"),
            Property::Value(v) => write!(f, "{}", v),
            Property::Dot => f.write_str("."),
            Property::Tuplet(d) => write!(f, "/{}", d),
            Property::LetRing => f.write_str("*"),
        }
    }
}

/// Check that `v` is a power of two in `[1, 128]`.
pub(crate) fn validate_note_value(v: u32) -> Result<(), BalafonError> {
    if !(1..=128).contains(&v) || !v.is_power_of_two() {
        return Err(BalafonError::InvalidNoteValue(v));
    }
    Ok(())
}

/// Validated note properties, always kept in canonical kind order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Property>", into = "Vec<Property>")]
pub struct PropertyList(Vec<Property>);

impl PropertyList {
    /// Build a property list: collect, validate, then sort once.
    pub fn new(properties: impl IntoIterator<Item = Property>) -> Result<Self, BalafonError> {
        let mut props: Vec<Property> = properties.into_iter().collect();

        for (i, prop) in props.iter().enumerate() {
            prop.validate()?;
            let kind = prop.kind();
            if kind.is_unique() && props[..i].iter().any(|p| p.kind() == kind) {
                return Err(BalafonError::DuplicateProperty(kind));
            }
        }

        for (a, b) in [
            (PropertyKind::Sharp, PropertyKind::Flat),
            (PropertyKind::Accent, PropertyKind::Ghost),
        ] {
            let has = |kind| props.iter().any(|p| p.kind() == kind);
            if has(a) && has(b) {
                return Err(BalafonError::ConflictingProperty(a, b));
            }
        }

        props.sort_by_key(Property::kind);

        Ok(Self(props))
    }

    /// Return a new list with `property` added.
    pub fn insert(self, property: Property) -> Result<Self, BalafonError> {
        let mut props = self.0;
        props.push(property);
        Self::new(props)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self, kind: PropertyKind) -> u32 {
        self.0.iter().filter(|p| p.kind() == kind).count() as u32
    }

    pub fn has(&self, kind: PropertyKind) -> bool {
        self.0.iter().any(|p| p.kind() == kind)
    }

    /// The note value, 4 (quarter note) when not given explicitly.
    pub fn value(&self) -> u8 {
        self.0
            .iter()
            .find_map(|p| match p {
                Property::Value(v) => Some(*v),
                _ => None,
            })
            .unwrap_or(4)
    }

    pub fn tuplet(&self) -> Option<u8> {
        self.0.iter().find_map(|p| match p {
            Property::Tuplet(d) => Some(*d),
            _ => None,
        })
    }
}

impl TryFrom<Vec<Property>> for PropertyList {
    type Error = BalafonError;

    fn try_from(props: Vec<Property>) -> Result<Self, Self::Error> {
        Self::new(props)
    }
}

impl From<PropertyList> for Vec<Property> {
    fn from(list: PropertyList) -> Self {
        list.0
    }
}

impl fmt::Display for PropertyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for prop in &self.0 {
            write!(f, "{}", prop)?;
        }
        Ok(())
    }
}

/// A note symbol with its properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub name: char,
    #[serde(default, skip_serializing_if = "PropertyList::is_empty")]
    pub properties: PropertyList,
}

impl Note {
    pub fn new(
        name: char,
        properties: impl IntoIterator<Item = Property>,
    ) -> Result<Self, BalafonError> {
        Ok(Self {
            name,
            properties: PropertyList::new(properties)?,
        })
    }

    /// A quarter note without properties.
    pub fn plain(name: char) -> Self {
        Self {
            name,
            properties: PropertyList::default(),
        }
    }

    pub fn is_rest(&self) -> bool {
        self.name == REST
    }

    /// Length of the note in ticks. This is how far the note advances the bar cursor.
    pub fn length(&self) -> u32 {
        let mut length = TICKS_PER_WHOLE / self.properties.value() as u32;
        let mut total = length;
        for _ in 0..self.properties.count(PropertyKind::Dot) {
            length /= 2;
            total += length;
        }
        if let Some(division) = self.properties.tuplet() {
            total = total * 2 / division as u32;
        }
        total
    }

    /// Divisor applied to the length for the sounding part of the note.
    pub fn truncation_factor(&self) -> u32 {
        1u32.checked_shl(self.properties.count(PropertyKind::Staccato)).unwrap_or(0)
    }

    /// Length in ticks until the note-off, at least one tick.
    pub fn sounding_length(&self) -> u32 {
        match self.truncation_factor() {
            0 => 1,
            factor => (self.length() / factor).max(1),
        }
    }

    pub fn pitch_delta(&self) -> i32 {
        self.properties.count(PropertyKind::Sharp) as i32
            - self.properties.count(PropertyKind::Flat) as i32
    }

    /// Velocity after applying dynamics to `base`, clamped to the valid range.
    pub fn velocity(&self, base: u8) -> u8 {
        let props = &self.properties;
        let v = base as i32
            + props.count(PropertyKind::Accent) as i32 * ACCENT_VELOCITY
            + props.count(PropertyKind::Marcato) as i32 * MARCATO_VELOCITY
            - props.count(PropertyKind::Ghost) as i32 * GHOST_VELOCITY;
        v.clamp(MIN_VALUE as i32, MAX_VALUE as i32) as u8
    }

    pub fn rings_out(&self) -> bool {
        self.properties.has(PropertyKind::LetRing)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.properties)
    }
}

/// A top-level or bar-body declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Declaration {
    /// Bind a note name to a MIDI key on the current channel.
    Assign { note: char, key: u8 },
    /// Define a named bar.
    DefineBar {
        name: String,
        body: Vec<Declaration>,
    },
    /// Play a named bar.
    Play(String),
    /// Tempo in quarter notes per minute.
    Tempo(u16),
    TimeSignature { numerator: u8, denominator: u8 },
    Velocity(u8),
    Channel(u8),
    Program(u8),
    Control { control: u8, value: u8 },
    Start,
    Stop,
    /// Key signature for the current channel, e.g. `"G"` or `"Ebm"`.
    Key(String),
    /// Free text, carried as a text meta event.
    Text(String),
    NoteList(Vec<Note>),
}

impl Declaration {
    /// The command keyword, used in diagnostics.
    pub fn command_name(&self) -> &'static str {
        match self {
            Declaration::Assign { .. } => "assign",
            Declaration::DefineBar { .. } => "bar",
            Declaration::Play(_) => "play",
            Declaration::Tempo(_) => "tempo",
            Declaration::TimeSignature { .. } => "time",
            Declaration::Velocity(_) => "velocity",
            Declaration::Channel(_) => "channel",
            Declaration::Program(_) => "program",
            Declaration::Control { .. } => "control",
            Declaration::Start => "start",
            Declaration::Stop => "stop",
            Declaration::Key(_) => "key",
            Declaration::Text(_) => "text",
            Declaration::NoteList(_) => "notes",
        }
    }

    pub fn notes(notes: impl IntoIterator<Item = Note>) -> Self {
        Declaration::NoteList(notes.into_iter().collect())
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Assign { note, key } => write!(f, ":assign {} {}", note, key),
            Declaration::DefineBar { name, body } => {
                write!(f, ":bar {}", name)?;
                for decl in body {
                    write!(f, " {};", decl)?;
                }
                f.write_str(" :end")
            }
            Declaration::Play(name) => write!(f, ":play {}", name),
            Declaration::Tempo(bpm) => write!(f, ":tempo {}", bpm),
            Declaration::TimeSignature {
                numerator,
                denominator,
            } => write!(f, ":time {} {}", numerator, denominator),
            Declaration::Velocity(v) => write!(f, ":velocity {}", v),
            Declaration::Channel(ch) => write!(f, ":channel {}", ch),
            Declaration::Program(p) => write!(f, ":program {}", p),
            Declaration::Control { control, value } => write!(f, ":control {} {}", control, value),
            Declaration::Start => f.write_str(":start"),
            Declaration::Stop => f.write_str(":stop"),
            Declaration::Key(scale) => write!(f, ":key {}", scale),
            Declaration::Text(text) => write!(f, "/* {} */", text),
            Declaration::NoteList(notes) => {
                for note in notes {
                    write!(f, "{}", note)?;
                }
                Ok(())
            }
        }
    }
}
