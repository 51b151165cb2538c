//! Bars, timed events and event messages.
//!
//! A [`Bar`] is one measure of [`Event`]s under a single time signature.
//! Event positions are in ticks relative to the start of the bar.

use std::fmt;
use std::time::Duration;

use midly::live::{LiveEvent, SystemRealtime};
use midly::MidiMessage;
use serde::Serialize;

use crate::constants::{ticks_to_duration, TICKS_PER_WHOLE};

/// Event payload.
///
/// Channel messages and transport messages are playable and have a MIDI wire
/// encoding. Tempo, key signature and text are descriptors for the sequencer
/// and file export only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8 },
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    Start,
    Stop,
    Tempo(u16),
    KeySignature { channel: u8, fifths: i8, minor: bool },
    Text(String),
}

impl Message {
    /// Whether the message is sent to an output port.
    pub fn is_playable(&self) -> bool {
        !matches!(
            self,
            Message::Tempo(_) | Message::KeySignature { .. } | Message::Text(_)
        )
    }

    /// The tempo carried by a tempo meta message.
    pub fn tempo(&self) -> Option<u16> {
        match self {
            Message::Tempo(bpm) => Some(*bpm),
            _ => None,
        }
    }

    pub fn to_live_event(&self) -> Option<LiveEvent<'static>> {
        let (channel, message) = match *self {
            Message::NoteOn {
                channel,
                key,
                velocity,
            } => (
                channel,
                MidiMessage::NoteOn {
                    key: key.into(),
                    vel: velocity.into(),
                },
            ),
            Message::NoteOff { channel, key } => (
                channel,
                MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                },
            ),
            Message::ProgramChange { channel, program } => (
                channel,
                MidiMessage::ProgramChange {
                    program: program.into(),
                },
            ),
            Message::ControlChange {
                channel,
                control,
                value,
            } => (
                channel,
                MidiMessage::Controller {
                    controller: control.into(),
                    value: value.into(),
                },
            ),
            Message::Start => return Some(LiveEvent::Realtime(SystemRealtime::Start)),
            Message::Stop => return Some(LiveEvent::Realtime(SystemRealtime::Stop)),
            Message::Tempo(_) | Message::KeySignature { .. } | Message::Text(_) => return None,
        };

        Some(LiveEvent::Midi {
            channel: channel.into(),
            message,
        })
    }

    /// MIDI wire bytes of a playable message.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let event = self.to_live_event()?;
        let mut buf = Vec::with_capacity(3);
        event.write_std(&mut buf).ok()?;
        Some(buf)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::NoteOn {
                channel,
                key,
                velocity,
            } => write!(
                f,
                "NoteOn channel: {} key: {} velocity: {}",
                channel, key, velocity
            ),
            Message::NoteOff { channel, key } => {
                write!(f, "NoteOff channel: {} key: {}", channel, key)
            }
            Message::ProgramChange { channel, program } => {
                write!(f, "ProgramChange channel: {} program: {}", channel, program)
            }
            Message::ControlChange {
                channel,
                control,
                value,
            } => write!(
                f,
                "ControlChange channel: {} controller: {} value: {}",
                channel, control, value
            ),
            Message::Start => f.write_str("Start"),
            Message::Stop => f.write_str("Stop"),
            Message::Tempo(bpm) => write!(f, "MetaTempo bpm: {}", bpm),
            Message::KeySignature {
                channel,
                fifths,
                minor,
            } => write!(
                f,
                "MetaKeySig channel: {} fifths: {} {}",
                channel,
                fifths,
                if *minor { "minor" } else { "major" }
            ),
            Message::Text(text) => write!(f, "MetaText text: {:?}", text),
        }
    }
}

/// A message placed inside a bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub message: Message,
    /// Ticks from the start of the bar.
    pub position: u32,
    /// Sounding length in ticks, zero for meta and control events.
    pub duration: u32,
    pub channel: u8,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel: {} pos: {} dur: {} message: {}",
            self.channel, self.position, self.duration, self.message
        )
    }
}

/// A single bar of events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub time_signature: (u8, u8),
    pub events: Vec<Event>,
}

impl Bar {
    pub fn new(time_signature: (u8, u8)) -> Self {
        Self {
            time_signature,
            events: Vec::new(),
        }
    }

    /// Capacity in ticks.
    pub fn capacity(&self) -> u32 {
        let (numerator, denominator) = self.time_signature;
        numerator as u32 * (TICKS_PER_WHOLE / denominator as u32)
    }

    /// Whether the bar carries only zero-duration events.
    ///
    /// A bar without any events (only rests) is not zero-duration: it still
    /// takes up its capacity in time.
    pub fn is_zero_duration(&self) -> bool {
        !self.events.is_empty() && self.events.iter().all(|ev| ev.duration == 0)
    }

    /// Wall-clock length of the bar at `tempo`.
    pub fn duration(&self, tempo: f64) -> Duration {
        if self.is_zero_duration() {
            return Duration::ZERO;
        }
        ticks_to_duration(tempo, self.capacity())
    }
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "time: {}/{}", self.time_signature.0, self.time_signature.1)?;
        if !self.events.is_empty() {
            f.write_str("\nevents:")?;
            for ev in &self.events {
                write!(f, "\n{}", ev)?;
            }
        }
        Ok(())
    }
}
