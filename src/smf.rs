//! Standard MIDI File export.
//!
//! Writes format 1 files with 960 ticks per quarter note. Track 0 carries the
//! tempo map, time and key signatures, text and transport events. Every MIDI
//! channel in use gets its own track.

use std::collections::BTreeMap;

use log::debug;
use midly::live::LiveEvent;
use midly::{Format, Header, MetaMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};

use crate::bar::{Bar, Message};
use crate::constants::{DEFAULT_TEMPO, TICKS_PER_QUARTER};
use crate::error::BalafonError;
use crate::sequencer::{Sequencer, TrackEvent as SequencedEvent};

static START: [u8; 1] = [0xFA];
static STOP: [u8; 1] = [0xFC];

/// Largest tick that fits a variable-length delta.
const MAX_TICKS: u32 = (1 << 28) - 1;

/// Largest tempo meta value, in microseconds per quarter note.
const MAX_MICROS_PER_QUARTER: u32 = (1 << 24) - 1;

/// Write bars as a Standard MIDI File, starting at the default tempo.
pub fn write_smf(bars: &[Bar], out: &mut Vec<u8>) -> Result<(), BalafonError> {
    write_smf_with_tempo(bars, DEFAULT_TEMPO, out)
}

/// Write bars as a Standard MIDI File, starting at `tempo`.
pub fn write_smf_with_tempo(
    bars: &[Bar],
    tempo: u16,
    out: &mut Vec<u8>,
) -> Result<(), BalafonError> {
    let mut sequencer = Sequencer::with_tempo(tempo);
    sequencer.add_bars(bars);
    let end = sequencer.position();
    if end > MAX_TICKS {
        return Err(BalafonError::Smf(format!("song too long: {} ticks", end)));
    }
    let events = sequencer.flush();

    let mut tracks = vec![build_conductor_track(bars, tempo, &events)?];
    tracks.extend(build_channel_tracks(&events));
    debug!("writing SMF with {} tracks, {} ticks", tracks.len(), end);

    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical((TICKS_PER_QUARTER as u16).into()),
    };

    let smf = Smf { header, tracks };

    smf.write(out)
        .map_err(|e| BalafonError::Smf(format!("Failed to write MIDI: {}", e)))?;

    Ok(())
}

fn tempo_meta<'a>(bpm: u16) -> Result<TrackEventKind<'a>, BalafonError> {
    let micros = 60_000_000 / bpm.max(1) as u32;
    if micros > MAX_MICROS_PER_QUARTER {
        return Err(BalafonError::Smf(format!(
            "tempo {} bpm is too slow for a tempo meta event",
            bpm
        )));
    }
    Ok(TrackEventKind::Meta(MetaMessage::Tempo(micros.into())))
}

fn build_conductor_track<'a>(
    bars: &[Bar],
    tempo: u16,
    events: &'a [SequencedEvent],
) -> Result<Track<'a>, BalafonError> {
    let mut timed: Vec<(u32, TrackEventKind<'a>)> = vec![(0, tempo_meta(tempo)?)];

    // Time signature changes, from the bar layout.
    let mut tick = 0;
    let mut previous = None;
    for bar in bars {
        if previous != Some(bar.time_signature) {
            let (numerator, denominator) = bar.time_signature;
            timed.push((
                tick,
                TrackEventKind::Meta(MetaMessage::TimeSignature(
                    numerator,
                    denominator.trailing_zeros() as u8,
                    24, // MIDI clocks per metronome click
                    8,  // 32nd notes per quarter note
                )),
            ));
            previous = Some(bar.time_signature);
        }
        tick += bar.capacity();
    }

    for ev in events {
        let kind = match &ev.message {
            Message::Tempo(bpm) => tempo_meta(*bpm)?,
            Message::KeySignature { fifths, minor, .. } => {
                TrackEventKind::Meta(MetaMessage::KeySignature(*fifths, *minor))
            }
            Message::Text(text) => TrackEventKind::Meta(MetaMessage::Text(text.as_bytes())),
            Message::Start => TrackEventKind::Escape(&START),
            Message::Stop => TrackEventKind::Escape(&STOP),
            _ => continue,
        };
        timed.push((ev.absolute_ticks, kind));
    }

    Ok(finish_track(timed))
}

fn build_channel_tracks<'a>(events: &[SequencedEvent]) -> Vec<Track<'a>> {
    let mut channels: BTreeMap<u8, Vec<(u32, TrackEventKind<'a>)>> = BTreeMap::new();

    for ev in events {
        if let Some(LiveEvent::Midi { channel, message }) = ev.message.to_live_event() {
            channels
                .entry(channel.as_int())
                .or_default()
                .push((ev.absolute_ticks, TrackEventKind::Midi { channel, message }));
        }
    }

    channels.into_values().map(finish_track).collect()
}

/// Sort by absolute tick, convert to delta times and close the track.
fn finish_track(mut timed: Vec<(u32, TrackEventKind<'_>)>) -> Track<'_> {
    timed.sort_by_key(|(tick, _)| *tick);

    let mut track: Track = Vec::with_capacity(timed.len() + 1);
    let mut prev_tick = 0u32;
    for (tick, kind) in timed {
        track.push(TrackEvent {
            delta: tick.saturating_sub(prev_tick).into(),
            kind,
        });
        prev_tick = tick;
    }

    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Declaration, Note};
    use crate::interpreter::Interpreter;
    use midly::num::{u15, u24};
    use midly::MidiMessage;

    fn compile(decls: &[Declaration]) -> Vec<Bar> {
        let mut it = Interpreter::new();
        it.evaluate(decls).unwrap();
        it.flush()
    }

    fn notes(symbols: &str) -> Declaration {
        Declaration::notes(symbols.chars().map(Note::plain))
    }

    #[test]
    fn test_header_and_tracks() {
        let bars = compile(&[
            Declaration::Assign { note: 'c', key: 60 },
            Declaration::Tempo(90),
            Declaration::TimeSignature {
                numerator: 3,
                denominator: 4,
            },
            notes("c"),
            Declaration::Channel(1),
            Declaration::Assign { note: 'c', key: 64 },
            notes("-c"),
        ]);

        let mut out = Vec::new();
        write_smf(&bars, &mut out).unwrap();
        assert_eq!(&out[0..4], b"MThd");

        let smf = Smf::parse(&out).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(960)));
        assert_eq!(smf.tracks.len(), 3);

        let conductor = &smf.tracks[0];
        assert_eq!(
            conductor[0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))
        );
        assert_eq!(
            conductor[1].kind,
            TrackEventKind::Meta(MetaMessage::TimeSignature(3, 2, 24, 8))
        );
        assert_eq!(
            conductor[2].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(666_666)))
        );
        assert_eq!(
            conductor.last().map(|ev| ev.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        );

        // The second bar starts after one 3/4 bar, plus a quarter rest.
        let second = &smf.tracks[2];
        assert_eq!(second[0].delta.as_int(), 2880 + 960);
        match second[0].kind {
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel },
            } => {
                assert_eq!(channel.as_int(), 1);
                assert_eq!(key.as_int(), 64);
                assert_eq!(vel.as_int(), 100);
            }
            other => panic!("expected note on, got {:?}", other),
        }
        assert_eq!(second[1].delta.as_int(), 960);
    }

    #[test]
    fn test_time_signature_changes_only() {
        let bars = compile(&[
            Declaration::Assign { note: 'c', key: 60 },
            notes("c"),
            notes("c"),
            Declaration::TimeSignature {
                numerator: 6,
                denominator: 8,
            },
            notes("c"),
        ]);

        let mut out = Vec::new();
        write_smf(&bars, &mut out).unwrap();
        let smf = Smf::parse(&out).unwrap();

        let signatures: Vec<(u32, u8, u8)> = smf.tracks[0]
            .iter()
            .scan(0u32, |tick, ev| {
                *tick += ev.delta.as_int();
                Some((*tick, ev.kind))
            })
            .filter_map(|(tick, kind)| match kind {
                TrackEventKind::Meta(MetaMessage::TimeSignature(n, d, _, _)) => Some((tick, n, d)),
                _ => None,
            })
            .collect();
        assert_eq!(signatures, vec![(0, 4, 2), (7680, 6, 3)]);
    }

    #[test]
    fn test_transport_and_text() {
        let bars = compile(&[
            Declaration::Text("intro".to_string()),
            Declaration::Key("Eb".to_string()),
            Declaration::Start,
            notes("-"),
            Declaration::Stop,
        ]);

        let mut out = Vec::new();
        write_smf(&bars, &mut out).unwrap();
        let smf = Smf::parse(&out).unwrap();
        assert_eq!(smf.tracks.len(), 1);

        let kinds: Vec<TrackEventKind> = smf.tracks[0].iter().map(|ev| ev.kind).collect();
        assert!(kinds.contains(&TrackEventKind::Meta(MetaMessage::Text(b"intro"))));
        assert!(kinds.contains(&TrackEventKind::Meta(MetaMessage::KeySignature(-3, false))));
        assert!(kinds.contains(&TrackEventKind::Escape(&[0xFA])));
        assert!(kinds.contains(&TrackEventKind::Escape(&[0xFC])));
    }

    #[test]
    fn test_no_bars() {
        let mut out = Vec::new();
        write_smf_with_tempo(&[], 60, &mut out).unwrap();
        let smf = Smf::parse(&out).unwrap();
        assert_eq!(smf.tracks.len(), 1);
        assert_eq!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000)))
        );
    }

    #[test]
    fn test_slowest_tempo_that_fits() {
        let mut out = Vec::new();
        write_smf_with_tempo(&[], 4, &mut out).unwrap();
        let smf = Smf::parse(&out).unwrap();
        assert_eq!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(15_000_000)))
        );
    }

    #[test]
    fn test_tempo_too_slow_for_smf() {
        for bpm in [1, 3] {
            let mut out = Vec::new();
            let result = write_smf_with_tempo(&[], bpm, &mut out);
            assert!(matches!(result, Err(BalafonError::Smf(_))));
        }

        let bars = compile(&[Declaration::Tempo(2), Declaration::Start]);
        let mut out = Vec::new();
        assert!(matches!(
            write_smf(&bars, &mut out),
            Err(BalafonError::Smf(_))
        ));
    }
}
