pub mod ast;
pub mod bar;
pub mod config;
pub mod constants;
pub mod error;
pub mod interpreter;
pub mod keymap;
pub mod player;
pub mod scale;
pub mod sequencer;
pub mod smf;

pub use ast::{Declaration, Note, Property, PropertyKind, PropertyList, REST};
pub use bar::{Bar, Event, Message};
pub use config::Config;
pub use error::{BalafonError, PlayError};
pub use interpreter::Interpreter;
pub use keymap::KeyMap;
pub use scale::Scale;
pub use sequencer::{Sequencer, TrackEvent};
pub use smf::{write_smf, write_smf_with_tempo};

/// Parse a YAML declaration list.
///
/// Enum variants are written as single-key maps (`- tempo: 90`, `{ value: 8 }`)
/// and unit variants as plain strings (`- start`, `dot`), at any depth.
pub fn load_declarations(source: &str) -> Result<Vec<Declaration>, serde_yaml::Error> {
    serde_yaml::with::singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(
        source,
    ))
}

/// Evaluate declarations in a fresh session and return the flushed bars.
pub fn compile(declarations: &[Declaration]) -> Result<Vec<Bar>, BalafonError> {
    compile_with_config(declarations, &Config::default())
}

/// Like [`compile`], with session defaults taken from `config`.
pub fn compile_with_config(
    declarations: &[Declaration],
    config: &Config,
) -> Result<Vec<Bar>, BalafonError> {
    let mut it = Interpreter::with_config(config);
    it.evaluate(declarations)?;
    Ok(it.flush())
}

/// Compile and sequence declarations into absolute-time events.
pub fn sequence(
    declarations: &[Declaration],
    config: &Config,
) -> Result<Vec<TrackEvent>, BalafonError> {
    let bars = compile_with_config(declarations, config)?;
    let mut seq = Sequencer::with_tempo(config.tempo);
    seq.add_bars(&bars);
    Ok(seq.flush())
}

/// Compile declarations into the bytes of a Standard MIDI File.
pub fn to_smf(declarations: &[Declaration], config: &Config) -> Result<Vec<u8>, BalafonError> {
    let bars = compile_with_config(declarations, config)?;
    let mut out = Vec::new();
    write_smf_with_tempo(&bars, config.tempo, &mut out)?;
    Ok(out)
}
