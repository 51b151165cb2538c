//! # Player
//!
//! Sends events to a [`MidiSink`] at their wall-clock time.
//!
//! ## Timing
//! Playback starts at the first event's timestamp, so the first event is sent
//! right away. Before every later event the player sleeps for
//! [`delay_between`] the previous and the next timestamp. Sleeping is
//! interruptible through a [`CancelToken`].
//!
//! Tempo events are never sent. They set the tick duration used by
//! [`Player::play_bars`], which plays bars directly without a sequencer.
//!
//! ## Example
//! ```rust
//! use balafon::player::{CancelToken, Player};
//! use balafon::{Declaration, Interpreter, Note, Sequencer};
//!
//! let mut it = Interpreter::new();
//! it.evaluate(&[
//!     Declaration::Assign { note: 'c', key: 60 },
//!     Declaration::notes([Note::plain('c')]),
//! ])?;
//!
//! let mut seq = Sequencer::new();
//! seq.add_bars(&it.flush());
//! let events = seq.flush();
//!
//! let mut sent: Vec<Vec<u8>> = Vec::new();
//! let mut player = Player::new(&mut sent);
//! player.play(&events, &CancelToken::never()).unwrap();
//! assert_eq!(sent, vec![vec![0x90, 60, 100], vec![0x80, 60, 0]]);
//! # Ok::<(), balafon::BalafonError>(())
//! ```

mod cancel;

use std::io;
use std::time::Duration;

use log::{debug, trace};

pub use cancel::{cancellation, CancelToken, Canceller};

use crate::bar::{Bar, Message};
use crate::constants::{ticks_to_duration, DEFAULT_TEMPO};
use crate::error::PlayError;
use crate::sequencer::TrackEvent;

/// Destination for MIDI wire messages.
pub trait MidiSink {
    fn send(&mut self, message: &[u8]) -> io::Result<()>;
}

impl<S: MidiSink + ?Sized> MidiSink for &mut S {
    fn send(&mut self, message: &[u8]) -> io::Result<()> {
        (**self).send(message)
    }
}

/// Collects messages in memory.
impl MidiSink for Vec<Vec<u8>> {
    fn send(&mut self, message: &[u8]) -> io::Result<()> {
        self.push(message.to_vec());
        Ok(())
    }
}

#[cfg(feature = "midi-out")]
impl MidiSink for midir::MidiOutputConnection {
    fn send(&mut self, message: &[u8]) -> io::Result<()> {
        midir::MidiOutputConnection::send(self, message)
            .map_err(|e| io::Error::other(format!("MIDI send: {e}")))
    }
}

/// Connect to the output port whose name contains `name`, or the first port.
#[cfg(feature = "midi-out")]
pub fn open_output(name: Option<&str>) -> io::Result<midir::MidiOutputConnection> {
    let midi_out = midir::MidiOutput::new("balafon")
        .map_err(|e| io::Error::other(format!("MIDI init: {e}")))?;

    let ports = midi_out.ports();
    if ports.is_empty() {
        return Err(io::Error::other("no MIDI output ports available"));
    }

    let port = match name {
        Some(filter) => ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|n| n.contains(filter))
                    .unwrap_or(false)
            })
            .cloned()
            .ok_or_else(|| io::Error::other(format!("MIDI port matching '{filter}' not found")))?,
        None => ports[0].clone(),
    };

    let port_name = midi_out
        .port_name(&port)
        .unwrap_or_else(|_| "unknown".to_string());
    debug!("connecting to MIDI output '{}'", port_name);

    midi_out
        .connect(&port, "balafon-output")
        .map_err(|e| io::Error::other(format!("MIDI connect: {e}")))
}

/// Names of all MIDI output ports.
#[cfg(feature = "midi-out")]
pub fn list_output_ports() -> io::Result<Vec<String>> {
    let midi_out = midir::MidiOutput::new("balafon")
        .map_err(|e| io::Error::other(format!("MIDI init: {e}")))?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect())
}

/// How long to wait between two event timestamps, if at all.
pub fn delay_between(prev_nanos: i64, next_nanos: i64) -> Option<Duration> {
    if next_nanos > prev_nanos {
        Some(Duration::from_nanos((next_nanos - prev_nanos) as u64))
    } else {
        None
    }
}

pub struct Player<S> {
    sink: S,
    tempo: u16,
}

impl<S: MidiSink> Player<S> {
    pub fn new(sink: S) -> Self {
        Self::with_tempo(sink, DEFAULT_TEMPO)
    }

    pub fn with_tempo(sink: S, tempo: u16) -> Self {
        Self { sink, tempo }
    }

    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Wall-clock length of `ticks` at the current tempo.
    fn ticks(&self, ticks: u32) -> Duration {
        ticks_to_duration(self.tempo as f64, ticks)
    }

    /// Play sequenced events in order.
    pub fn play(&mut self, events: &[TrackEvent], cancel: &CancelToken) -> Result<(), PlayError> {
        let Some(first) = events.first() else {
            return Ok(());
        };
        debug!("playing {} events", events.len());

        let mut last = first.absolute_nanoseconds;
        for ev in events {
            if cancel.is_cancelled() {
                return Err(PlayError::Cancelled);
            }
            if let Some(delay) = delay_between(last, ev.absolute_nanoseconds) {
                cancel.sleep(delay)?;
            }
            last = ev.absolute_nanoseconds;
            self.dispatch(&ev.message)?;
        }
        Ok(())
    }

    /// Play bars directly, timing events with the tempo-derived tick duration.
    ///
    /// Each bar that takes up time lasts for its full capacity, rests included.
    pub fn play_bars(&mut self, bars: &[Bar], cancel: &CancelToken) -> Result<(), PlayError> {
        debug!("playing {} bars", bars.len());

        for bar in bars {
            let mut position = 0;
            for ev in &bar.events {
                if cancel.is_cancelled() {
                    return Err(PlayError::Cancelled);
                }
                if ev.position > position {
                    cancel.sleep(self.ticks(ev.position - position))?;
                    position = ev.position;
                }
                self.dispatch(&ev.message)?;
            }

            let end = bar.capacity();
            if !bar.is_zero_duration() && end > position {
                cancel.sleep(self.ticks(end - position))?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, message: &Message) -> Result<(), PlayError> {
        if let Some(tempo) = message.tempo() {
            self.tempo = tempo;
            return Ok(());
        }
        if let Some(bytes) = message.to_bytes() {
            trace!("send {}", message);
            self.sink.send(&bytes)?;
        }
        Ok(())
    }
}
