//! balafon CLI - compile, sequence, export and play declaration files

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use balafon::{Config, Declaration};

#[derive(Parser)]
#[command(name = "balafon")]
#[command(about = "Interpreter, sequencer and player for balafon MIDI notation", long_about = None)]
struct Cli {
    /// Session defaults (tempo, velocity, time-signature, port)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more, repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the compiled bars
    Compile {
        /// YAML file with a list of declarations
        input: PathBuf,
    },

    /// Print the sequenced events with absolute timestamps
    Sequence {
        /// YAML file with a list of declarations
        input: PathBuf,
    },

    /// Write a Standard MIDI File
    Smf {
        /// YAML file with a list of declarations
        input: PathBuf,

        /// Output .mid file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Play to a MIDI output port
    Play {
        /// YAML file with a list of declarations
        input: PathBuf,

        /// Output port name, or a part of it
        #[arg(short, long)]
        port: Option<String>,
    },

    /// List MIDI output ports
    ListPorts,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path).unwrap_or_else(|e| fail(e)),
        None => Config::default(),
    };

    match cli.command {
        Commands::Compile { input } => {
            let bars = balafon::compile_with_config(&read_declarations(&input), &config)
                .unwrap_or_else(|e| fail(format!("Compilation error: {}", e)));
            for bar in &bars {
                println!("{}", bar);
            }
        }

        Commands::Sequence { input } => {
            let events = balafon::sequence(&read_declarations(&input), &config)
                .unwrap_or_else(|e| fail(format!("Compilation error: {}", e)));
            for ev in &events {
                println!("{}", ev);
            }
        }

        Commands::Smf { input, output } => {
            let bytes = balafon::to_smf(&read_declarations(&input), &config)
                .unwrap_or_else(|e| fail(format!("Compilation error: {}", e)));
            if let Err(e) = fs::write(&output, &bytes) {
                fail(format!("Error writing to '{}': {}", output.display(), e));
            }
            eprintln!("Wrote MIDI file to {}", output.display());
        }

        Commands::Play { input, port } => {
            let declarations = read_declarations(&input);
            let port = port.or_else(|| config.port.clone());
            play(&declarations, &config, port.as_deref());
        }

        Commands::ListPorts => list_ports(),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn read_declarations(path: &Path) -> Vec<Declaration> {
    let source = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("Error reading file '{}': {}", path.display(), e)));
    balafon::load_declarations(&source)
        .unwrap_or_else(|e| fail(format!("Error parsing '{}': {}", path.display(), e)))
}

#[cfg(feature = "midi-out")]
fn play(declarations: &[Declaration], config: &Config, port: Option<&str>) {
    use balafon::player::{cancellation, open_output, Player};

    let events = balafon::sequence(declarations, config)
        .unwrap_or_else(|e| fail(format!("Compilation error: {}", e)));

    let connection = open_output(port).unwrap_or_else(|e| fail(e));

    let (canceller, token) = cancellation();
    if let Err(e) = ctrlc::set_handler(move || canceller.cancel()) {
        fail(format!("Error setting Ctrl-C handler: {}", e));
    }

    let mut player = Player::with_tempo(connection, config.tempo);
    match player.play(&events, &token) {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => eprintln!("Stopped"),
        Err(e) => fail(format!("Playback error: {}", e)),
    }
    player.into_inner().close();
}

#[cfg(not(feature = "midi-out"))]
fn play(_declarations: &[Declaration], _config: &Config, _port: Option<&str>) {
    fail("balafon was built without MIDI output, rebuild with --features midi-out");
}

#[cfg(feature = "midi-out")]
fn list_ports() {
    let ports = balafon::player::list_output_ports().unwrap_or_else(|e| fail(e));
    if ports.is_empty() {
        eprintln!("No MIDI output ports available");
    }
    for name in ports {
        println!("{}", name);
    }
}

#[cfg(not(feature = "midi-out"))]
fn list_ports() {
    fail("balafon was built without MIDI output, rebuild with --features midi-out");
}
