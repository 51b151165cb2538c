//! # Interpreter
//!
//! Evaluates declaration trees into [`Bar`]s.
//!
//! ## Session Model
//! An [`Interpreter`] is a long-lived session: call [`Interpreter::evaluate`] any
//! number of times, then [`Interpreter::flush`] to take the bars produced so far.
//! Note assignments, named bars and key signatures live for the whole session.
//!
//! ## Scoping
//! Channel, velocity and time signature form a scope frame. The frame is saved
//! before a bar body is evaluated and restored afterwards, so changes made in a
//! body never leak out of it. Tempo, program, control, start, stop, key and text
//! produce events and are not undone when a body ends.
//!
//! Inside a bar body, `assign`, `bar` and `play` are rejected.
//!
//! ## Bars
//! Every top-level declaration other than `assign`, `bar` and `play` is
//! evaluated into its own bar under the current time signature. A bar that
//! received no events and whose cursor never moved is dropped. Each note list
//! is measured from the start of its bar.
//!
//! ## Flushing
//! Bars carrying only zero-duration events are merged forward into the next
//! bar that takes up time, so tempo and program changes reach the output right
//! before the notes they apply to.
//!
//! ## Example
//! ```rust
//! use balafon::{Declaration, Interpreter, Note};
//!
//! let mut it = Interpreter::new();
//! it.evaluate(&[
//!     Declaration::Assign { note: 'c', key: 60 },
//!     Declaration::TimeSignature { numerator: 1, denominator: 4 },
//!     Declaration::Tempo(60),
//!     Declaration::notes([Note::plain('c')]),
//! ])?;
//!
//! let bars = it.flush();
//! assert_eq!(bars.len(), 1);
//! assert_eq!(bars[0].events.len(), 3);
//! # Ok::<(), balafon::BalafonError>(())
//! ```

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::ast::{validate_note_value, Declaration, Note, PropertyKind};
use crate::bar::{Bar, Event, Message};
use crate::config::Config;
use crate::constants::{
    DEFAULT_TIME_SIGNATURE, DEFAULT_VELOCITY, MAX_BEATS_PER_BAR, MAX_CHANNEL, MAX_VALUE,
    MIN_VALUE,
};
use crate::error::BalafonError;
use crate::keymap::KeyMap;
use crate::scale::{pitch_name, Scale};


/// State that is restored when a bar body ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scope {
    channel: u8,
    velocity: u8,
    time_signature: (u8, u8),
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            channel: 0,
            velocity: DEFAULT_VELOCITY,
            time_signature: DEFAULT_TIME_SIGNATURE,
        }
    }
}

/// The bar under construction.
struct Builder {
    bar: Bar,
    advanced: bool,
}

impl Builder {
    fn new(time_signature: (u8, u8)) -> Self {
        Self {
            bar: Bar::new(time_signature),
            advanced: false,
        }
    }

    fn push(&mut self, message: Message, channel: u8) {
        self.bar.events.push(Event {
            message,
            position: 0,
            duration: 0,
            channel,
        });
    }

    /// The finished bar, or `None` if nothing happened in it.
    fn finish(self) -> Option<Bar> {
        if self.bar.events.is_empty() && !self.advanced {
            return None;
        }
        Some(self.bar)
    }
}

/// Declaration evaluator and bar buffer.
///
/// Bars are shared between the named-bar table and the output buffer, so an
/// interpreter is confined to the thread that created it.
#[derive(Debug, Default)]
pub struct Interpreter {
    scope: Scope,
    in_bar: bool,
    keymap: KeyMap,
    bars: HashMap<String, Rc<Bar>>,
    scales: HashMap<u8, Scale>,
    buffer: Vec<Rc<Bar>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an interpreter whose default velocity and time signature come from `config`.
    pub fn with_config(config: &Config) -> Self {
        Self {
            scope: Scope {
                channel: 0,
                velocity: config.velocity,
                time_signature: config.time_signature,
            },
            ..Self::default()
        }
    }

    pub fn key_map(&self) -> &KeyMap {
        &self.keymap
    }

    /// Evaluate declarations in order.
    ///
    /// On error, the bars produced by this call are dropped. Bars from earlier
    /// calls stay in the buffer.
    pub fn evaluate(&mut self, declarations: &[Declaration]) -> Result<(), BalafonError> {
        let mark = self.buffer.len();
        for decl in declarations {
            if let Err(err) = self.evaluate_top_level(decl) {
                self.buffer.truncate(mark);
                return Err(err);
            }
        }
        Ok(())
    }

    fn evaluate_top_level(&mut self, decl: &Declaration) -> Result<(), BalafonError> {
        let mut builder = Builder::new(self.scope.time_signature);
        self.eval(&mut builder, decl)?;
        if let Some(bar) = builder.finish() {
            self.buffer.push(Rc::new(bar));
        }
        Ok(())
    }

    fn eval(&mut self, builder: &mut Builder, decl: &Declaration) -> Result<(), BalafonError> {
        let channel = self.scope.channel;

        match decl {
            Declaration::Assign { note, key } => {
                self.check_top_level(decl)?;
                check_range("key", *key as i64, MIN_VALUE as i64, MAX_VALUE as i64)?;
                if let Some(existing) = self.keymap.get(channel, *note) {
                    return Err(BalafonError::DuplicateAssignment {
                        note: *note,
                        key: existing,
                        channel,
                    });
                }
                self.keymap.set(channel, *note, *key);
            }

            Declaration::DefineBar { name, body } => {
                self.check_top_level(decl)?;
                self.define_bar(name, body)?;
            }

            Declaration::Play(name) => {
                self.check_top_level(decl)?;
                let bar = self
                    .bars
                    .get(name)
                    .ok_or_else(|| BalafonError::UnknownBar(name.clone()))?;
                debug!("play bar '{}'", name);
                self.buffer.push(Rc::clone(bar));
            }

            Declaration::Tempo(bpm) => {
                check_range("tempo", *bpm as i64, 1, u16::MAX as i64)?;
                builder.push(Message::Tempo(*bpm), channel);
            }

            Declaration::TimeSignature {
                numerator,
                denominator,
            } => {
                let numerator = *numerator as u32;
                let denominator = *denominator as u32;
                if !(1..=MAX_BEATS_PER_BAR as u32).contains(&numerator)
                    || validate_note_value(denominator).is_err()
                {
                    return Err(BalafonError::InvalidTimeSignature {
                        numerator,
                        denominator,
                    });
                }
                let signature = (numerator as u8, denominator as u8);
                builder.bar.time_signature = signature;
                self.scope.time_signature = signature;
            }

            Declaration::Velocity(v) => {
                check_range("velocity", *v as i64, MIN_VALUE as i64, MAX_VALUE as i64)?;
                self.scope.velocity = *v;
            }

            Declaration::Channel(ch) => {
                check_range("channel", *ch as i64, 0, MAX_CHANNEL as i64)?;
                self.scope.channel = *ch;
            }

            Declaration::Program(program) => {
                check_range("program", *program as i64, MIN_VALUE as i64, MAX_VALUE as i64)?;
                builder.push(
                    Message::ProgramChange {
                        channel,
                        program: *program,
                    },
                    channel,
                );
            }

            Declaration::Control { control, value } => {
                check_range("control", *control as i64, MIN_VALUE as i64, MAX_VALUE as i64)?;
                check_range("control value", *value as i64, MIN_VALUE as i64, MAX_VALUE as i64)?;
                builder.push(
                    Message::ControlChange {
                        channel,
                        control: *control,
                        value: *value,
                    },
                    channel,
                );
            }

            Declaration::Start => builder.push(Message::Start, channel),

            Declaration::Stop => builder.push(Message::Stop, channel),

            Declaration::Key(name) => {
                let scale =
                    Scale::from_name(name).ok_or_else(|| BalafonError::UnknownScale(name.clone()))?;
                self.scales.insert(channel, scale);
                builder.push(
                    Message::KeySignature {
                        channel,
                        fifths: scale.fifths,
                        minor: scale.minor,
                    },
                    channel,
                );
            }

            Declaration::Text(text) => builder.push(Message::Text(text.clone()), channel),

            Declaration::NoteList(notes) => self.eval_notes(builder, notes)?,
        }

        Ok(())
    }

    fn check_top_level(&self, decl: &Declaration) -> Result<(), BalafonError> {
        if self.in_bar {
            return Err(BalafonError::ForbiddenInBar {
                command: decl.command_name(),
            });
        }
        Ok(())
    }

    fn define_bar(&mut self, name: &str, body: &[Declaration]) -> Result<(), BalafonError> {
        if self.bars.contains_key(name) {
            return Err(BalafonError::DuplicateBar(name.to_string()));
        }

        let saved = self.scope;
        let saved_scales = self.scales.clone();
        self.in_bar = true;
        let mut builder = Builder::new(self.scope.time_signature);
        let result = body.iter().try_for_each(|decl| self.eval(&mut builder, decl));
        self.in_bar = false;
        self.scope = saved;
        if let Err(err) = result {
            self.scales = saved_scales;
            return Err(err);
        }

        let bar = builder
            .finish()
            .ok_or_else(|| BalafonError::EmptyBar(name.to_string()))?;
        debug!(
            "define bar '{}': {} events, timesig {}/{}",
            name,
            bar.events.len(),
            bar.time_signature.0,
            bar.time_signature.1
        );
        self.bars.insert(name.to_string(), Rc::new(bar));
        Ok(())
    }

    /// Evaluate one note list, measured from the start of the bar.
    ///
    /// Events are only added to the bar once the whole list has been checked.
    fn eval_notes(&self, builder: &mut Builder, notes: &[Note]) -> Result<(), BalafonError> {
        let channel = self.scope.channel;
        let scale = self.scales.get(&channel).copied().unwrap_or_default();

        let mut events = Vec::with_capacity(notes.len() * 2);
        let mut cursor: u32 = 0;

        for note in notes {
            let length = note.length();
            if note.is_rest() {
                cursor += length;
                continue;
            }

            let key = self
                .keymap
                .get(channel, note.name)
                .ok_or(BalafonError::UndefinedNote {
                    note: note.name,
                    channel,
                })?;
            if pitch_name(key).ends_with('#')
                && (note.properties.has(PropertyKind::Sharp)
                    || note.properties.has(PropertyKind::Flat))
            {
                return Err(BalafonError::AccidentalOnBlackKey {
                    note: note.name,
                    key,
                    channel,
                });
            }
            let key = scale.apply(key, note);
            check_range("key", key as i64, MIN_VALUE as i64, MAX_VALUE as i64)?;
            let key = key as u8;

            let sounding = note.sounding_length();
            events.push(Event {
                message: Message::NoteOn {
                    channel,
                    key,
                    velocity: note.velocity(self.scope.velocity),
                },
                position: cursor,
                duration: sounding,
                channel,
            });
            if !note.rings_out() {
                events.push(Event {
                    message: Message::NoteOff { channel, key },
                    position: cursor + sounding,
                    duration: 0,
                    channel,
                });
            }

            cursor += length;
        }

        let capacity = builder.bar.capacity();
        if cursor > capacity {
            let (numerator, denominator) = builder.bar.time_signature;
            return Err(BalafonError::BarOverflow {
                excess: cursor - capacity,
                numerator,
                denominator,
            });
        }

        builder.bar.events.extend(events);
        builder.advanced |= cursor > 0;
        Ok(())
    }

    /// Take the bars produced so far.
    ///
    /// Events of zero-duration bars are moved to the front of the next bar that
    /// takes up time. Leftover events end up in a final zero-duration bar.
    /// The events of every returned bar are stably sorted by position.
    pub fn flush(&mut self) -> Vec<Bar> {
        let buffer = std::mem::take(&mut self.buffer);
        let mut bars = Vec::with_capacity(buffer.len());
        let mut pending: Vec<Event> = Vec::new();
        let mut time_signature = self.scope.time_signature;

        for bar in &buffer {
            time_signature = bar.time_signature;
            if bar.is_zero_duration() {
                pending.extend(bar.events.iter().cloned());
                continue;
            }

            let mut events = std::mem::take(&mut pending);
            events.extend(bar.events.iter().cloned());
            bars.push(sorted_bar(bar.time_signature, events));
        }

        if !pending.is_empty() {
            bars.push(sorted_bar(time_signature, pending));
        }

        debug!("flush: {} bars in, {} bars out", buffer.len(), bars.len());
        bars
    }
}

fn sorted_bar(time_signature: (u8, u8), mut events: Vec<Event>) -> Bar {
    events.sort_by_key(|ev| ev.position);
    Bar {
        time_signature,
        events,
    }
}

fn check_range(what: &'static str, value: i64, min: i64, max: i64) -> Result<(), BalafonError> {
    if value < min || value > max {
        return Err(BalafonError::OutOfRange {
            what,
            value,
            min,
            max,
        });
    }
    Ok(())
}
