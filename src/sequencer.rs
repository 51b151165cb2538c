//! Flattens bars into absolute-time events.
//!
//! Each event gets an absolute tick and nanosecond timestamp. A tempo event
//! changes the tempo starting at its own position, so everything after it in
//! the same bar, and every later bar, is timed at the new tempo.

use std::fmt;

use log::debug;
use serde::Serialize;

use crate::bar::{Bar, Message};
use crate::constants::{ticks_to_nanos, DEFAULT_TEMPO};

/// An event with absolute timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    pub message: Message,
    pub absolute_ticks: u32,
    pub absolute_nanoseconds: i64,
}

impl fmt::Display for TrackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick: {} ns: {} message: {}",
            self.absolute_ticks, self.absolute_nanoseconds, self.message
        )
    }
}

#[derive(Debug)]
pub struct Sequencer {
    events: Vec<TrackEvent>,
    tempo: u16,
    ticks: u32,
    nanos: i64,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::with_tempo(DEFAULT_TEMPO)
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tempo(tempo: u16) -> Self {
        Self {
            events: Vec::new(),
            tempo,
            ticks: 0,
            nanos: 0,
        }
    }

    /// Current tempo in quarter notes per minute.
    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    /// Tick offset of the next bar.
    pub fn position(&self) -> u32 {
        self.ticks
    }

    pub fn add_bars(&mut self, bars: &[Bar]) {
        for bar in bars {
            for ev in &bar.events {
                self.events.push(TrackEvent {
                    message: ev.message.clone(),
                    absolute_ticks: self.ticks + ev.position,
                    absolute_nanoseconds: self.nanos
                        + ticks_to_nanos(self.tempo as f64, ev.position),
                });
                if let Some(tempo) = ev.message.tempo() {
                    self.tempo = tempo;
                }
            }

            let capacity = bar.capacity();
            self.ticks += capacity;
            self.nanos += ticks_to_nanos(self.tempo as f64, capacity);
        }
        debug!(
            "sequenced {} bars, now at tick {} tempo {}",
            bars.len(),
            self.ticks,
            self.tempo
        );
    }

    /// Take the buffered events, stably sorted by absolute tick.
    pub fn flush(&mut self) -> Vec<TrackEvent> {
        let mut events = std::mem::take(&mut self.events);
        events.sort_by_key(|ev| ev.absolute_ticks);
        events
    }
}
