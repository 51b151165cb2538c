//! Integration tests for balafon
//!
//! Tests the full pipeline from YAML declarations to bars, timed events,
//! MIDI files and playback.

use std::io::Write;

use balafon::player::{CancelToken, Player};
use balafon::{
    compile, compile_with_config, load_declarations, sequence, to_smf, BalafonError, Config,
    Declaration, Message,
};

fn load(source: &str) -> Vec<Declaration> {
    load_declarations(source).expect("valid declaration list")
}

fn timeline(source: &str, config: &Config) -> Vec<(u32, i64, Message)> {
    sequence(&load(source), config)
        .unwrap()
        .into_iter()
        .map(|ev| (ev.absolute_ticks, ev.absolute_nanoseconds, ev.message))
        .collect()
}

fn on(channel: u8, key: u8, velocity: u8) -> Message {
    Message::NoteOn {
        channel,
        key,
        velocity,
    }
}

fn off(channel: u8, key: u8) -> Message {
    Message::NoteOff { channel, key }
}

#[test]
fn test_single_quarter_note_at_60_bpm() {
    let source = r#"
- assign: { note: c, key: 60 }
- time_signature: { numerator: 1, denominator: 4 }
- tempo: 60
- note_list: [{ name: c }]
"#;
    let result = compile(&load(source));
    assert!(result.is_ok());
    let bars = result.unwrap();
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].events.len(), 3);
    assert_eq!(bars[0].events[1].duration, 960);
    assert_eq!(bars[0].events[2].position, 960);

    assert_eq!(
        timeline(source, &Config::default()),
        vec![
            (0, 0, Message::Tempo(60)),
            (0, 0, on(0, 60, 100)),
            (960, 1_000_000_000, off(0, 60)),
        ]
    );
}

#[test]
fn test_two_quarters_overflow_one_beat_bar() {
    let source = r#"
- assign: { note: c, key: 60 }
- time_signature: { numerator: 1, denominator: 4 }
- note_list: [{ name: c }, { name: c }]
"#;
    let result = compile(&load(source));
    assert_eq!(
        result,
        Err(BalafonError::BarOverflow {
            excess: 960,
            numerator: 1,
            denominator: 4
        })
    );
}

#[test]
fn test_named_bars_with_rests() {
    let source = r#"
- assign: { note: x, key: 42 }
- time_signature: { numerator: 2, denominator: 4 }
- tempo: 60
- define_bar:
    name: one
    body:
      - note_list: [{ name: x }, { name: "-" }]
- define_bar:
    name: two
    body:
      - note_list: [{ name: "-" }, { name: x }]
- play: one
- play: two
"#;
    assert_eq!(
        timeline(source, &Config::default()),
        vec![
            (0, 0, Message::Tempo(60)),
            (0, 0, on(0, 42, 100)),
            (960, 1_000_000_000, off(0, 42)),
            (2880, 3_000_000_000, on(0, 42, 100)),
            (3840, 4_000_000_000, off(0, 42)),
        ]
    );
}

#[test]
fn test_bar_body_scope() {
    let source = r#"
- assign: { note: c, key: 60 }
- channel: 2
- assign: { note: c, key: 48 }
- channel: 0
- define_bar:
    name: slow
    body:
      - tempo: 60
      - velocity: 50
      - channel: 2
      - time_signature: { numerator: 1, denominator: 4 }
      - note_list: [{ name: c }]
- play: slow
- note_list: [{ name: c }]
"#;
    let bars = compile(&load(source)).unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].time_signature, (1, 4));
    assert_eq!(bars[1].time_signature, (4, 4));

    // Tempo persists after the body, velocity and channel do not.
    assert_eq!(
        timeline(source, &Config::default()),
        vec![
            (0, 0, Message::Tempo(60)),
            (0, 0, on(2, 48, 50)),
            (960, 1_000_000_000, off(2, 48)),
            (960, 1_000_000_000, on(0, 60, 100)),
            (1920, 2_000_000_000, off(0, 60)),
        ]
    );
}

#[test]
fn test_tempo_change_between_bars() {
    let source = r#"
- assign: { note: c, key: 60 }
- note_list: [{ name: c }]
- tempo: 60
- note_list: [{ name: c }]
"#;
    let events = timeline(source, &Config::default());
    // The first 4/4 bar lasts two seconds at 120 bpm.
    assert_eq!(events[1], (960, 500_000_000, off(0, 60)));
    assert_eq!(events[2], (3840, 2_000_000_000, Message::Tempo(60)));
    assert_eq!(events[4], (3840 + 960, 3_000_000_000, off(0, 60)));
}

#[test]
fn test_config_tempo_seeds_sequencer() {
    let source = r#"
- assign: { note: c, key: 60 }
- note_list: [{ name: c }]
"#;
    let config = Config {
        tempo: 60,
        ..Config::default()
    };
    let events = timeline(source, &config);
    assert_eq!(events[1], (960, 1_000_000_000, off(0, 60)));
}

#[test]
fn test_config_file_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "velocity: 90").unwrap();
    writeln!(file, "time-signature: 1/4").unwrap();
    let config = Config::load(file.path()).unwrap();

    let source = r#"
- assign: { note: c, key: 60 }
- note_list: [{ name: c }]
"#;
    let bars = compile_with_config(&load(source), &config).unwrap();
    assert_eq!(bars[0].time_signature, (1, 4));
    assert_eq!(bars[0].events[0].message, on(0, 60, 90));
}

#[test]
fn test_note_properties_from_yaml() {
    let source = r#"
- assign: { note: c, key: 60 }
- key: F
- assign: { note: b, key: 71 }
- note_list:
    - { name: c, properties: [accent, staccato, { value: 8 }] }
    - { name: b, properties: [dot, { value: 8 }] }
    - { name: c, properties: [let_ring, { value: 8 }, { tuplet: 3 }] }
"#;
    let bars = compile(&load(source)).unwrap();
    let notes: Vec<(u32, u32, &Message)> = bars[0]
        .events
        .iter()
        .map(|ev| (ev.position, ev.duration, &ev.message))
        .collect();
    assert_eq!(
        notes,
        vec![
            (0, 0, &Message::KeySignature { channel: 0, fifths: -1, minor: false }),
            (0, 240, &on(0, 60, 105)),
            (240, 0, &off(0, 60)),
            (480, 720, &on(0, 70, 100)),
            (1200, 0, &off(0, 70)),
            (1200, 320, &on(0, 60, 100)),
        ]
    );
}

#[test]
fn test_invalid_property_list_is_rejected_at_load() {
    let source = r#"
- note_list: [{ name: c, properties: [sharp, flat] }]
"#;
    let err = load_declarations(source).unwrap_err();
    assert!(err
        .to_string()
        .contains("conflicting note properties 'sharp' and 'flat'"));
}

#[test]
fn test_smf_export() {
    let source = r#"
- assign: { note: c, key: 60 }
- program: 12
- note_list: [{ name: c }, { name: "-" }, { name: c }]
"#;
    let result = to_smf(&load(source), &Config::default());
    assert!(result.is_ok());
    let bytes = result.unwrap();
    assert_eq!(&bytes[0..4], b"MThd");

    let smf = midly::Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks.len(), 2);
    let channel_events = smf.tracks[1]
        .iter()
        .filter(|ev| matches!(ev.kind, midly::TrackEventKind::Midi { .. }))
        .count();
    assert_eq!(channel_events, 5);
}

#[test]
fn test_play_compiled_events() {
    let source = r#"
- assign: { note: c, key: 60 }
- tempo: 6000
- note_list: [{ name: c }, { name: c, properties: [let_ring] }]
- stop
"#;
    let events = sequence(&load(source), &Config::default()).unwrap();

    let mut sent: Vec<Vec<u8>> = Vec::new();
    let mut player = Player::new(&mut sent);
    let result = player.play(&events, &CancelToken::never());
    assert!(result.is_ok());

    assert_eq!(
        sent,
        vec![
            vec![0x90, 60, 100],
            vec![0x80, 60, 0],
            vec![0x90, 60, 100],
            vec![0xFC],
        ]
    );
}
