//! Key signatures.
//!
//! A scale implicitly raises or lowers the letter names in its key signature.
//! Sharps are added in the order `F C G D A E`, flats in the order `B E A D G C`.

use crate::ast::{Note, PropertyKind};

static PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
static SHARP_ORDER: [&str; 6] = ["F", "C", "G", "D", "A", "E"];
static FLAT_ORDER: [&str; 6] = ["B", "E", "A", "D", "G", "C"];

/// Key signature: positive fifths are sharps, negative are flats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scale {
    pub fifths: i8,
    pub minor: bool,
}

impl Scale {
    /// Look up a scale by name, e.g. `"G"`, `"GMaj"`, `"Ebm"`, `"EbMin"`.
    pub fn from_name(name: &str) -> Option<Self> {
        let (fifths, minor) = match name.trim() {
            "C" | "CMaj" => (0, false),
            "G" | "GMaj" => (1, false),
            "D" | "DMaj" => (2, false),
            "A" | "AMaj" => (3, false),
            "E" | "EMaj" => (4, false),
            "B" | "BMaj" => (5, false),
            "F#" | "FsharpMaj" => (6, false),
            "F" | "FMaj" => (-1, false),
            "Bb" | "BbMaj" => (-2, false),
            "Eb" | "EbMaj" => (-3, false),
            "Ab" | "AbMaj" => (-4, false),
            "Db" | "DbMaj" => (-5, false),
            "Gb" | "GbMaj" => (-6, false),

            "Am" | "AMin" => (0, true),
            "Em" | "EMin" => (1, true),
            "Bm" | "BMin" => (2, true),
            "F#m" | "FsharpMin" => (3, true),
            "C#m" | "CsharpMin" => (4, true),
            "G#m" | "GsharpMin" => (5, true),
            "D#m" | "DsharpMin" => (6, true),
            "Dm" | "DMin" => (-1, true),
            "Gm" | "GMin" => (-2, true),
            "Cm" | "CMin" => (-3, true),
            "Fm" | "FMin" => (-4, true),
            "Bbm" | "BbMin" => (-5, true),
            "Ebm" | "EbMin" => (-6, true),
            _ => return None,
        };
        Some(Self { fifths, minor })
    }

    fn sharpened(&self) -> &'static [&'static str] {
        if self.fifths > 0 {
            &SHARP_ORDER[..self.fifths as usize]
        } else {
            &[]
        }
    }

    fn flattened(&self) -> &'static [&'static str] {
        if self.fifths < 0 {
            &FLAT_ORDER[..self.fifths.unsigned_abs() as usize]
        } else {
            &[]
        }
    }

    /// Resolve the sounding key of `note` bound to `key` under this key signature.
    ///
    /// An explicit accidental on a letter the key signature already alters in
    /// the same direction is a courtesy accidental and does not move the key again.
    /// The result is not range checked.
    pub fn apply(&self, key: u8, note: &Note) -> i32 {
        let step = pitch_name(key);
        let is_sharp = note.properties.has(PropertyKind::Sharp);
        let is_flat = note.properties.has(PropertyKind::Flat);

        let mut result = key as i32;
        let mut sharpened = false;
        let mut flattened = false;

        if self.sharpened().contains(&step) && !is_flat {
            result += 1;
            sharpened = true;
        }
        if self.flattened().contains(&step) && !is_sharp {
            result -= 1;
            flattened = true;
        }

        if is_sharp && !sharpened {
            result += 1;
        }
        if is_flat && !flattened {
            result -= 1;
        }

        result
    }
}

/// Pitch class name of a MIDI key, e.g. 61 is `"C#"`.
pub fn pitch_name(key: u8) -> &'static str {
    PITCH_NAMES[(key % 12) as usize]
}
