//! Console command parsing and dispatch
//!
//! One line per command, mapped straight onto engine operations. All
//! values are the same normalized scalars the engine expects; the
//! console adds no units of its own.

use std::path::PathBuf;

use duomix_core::engine::MixEngine;
use duomix_core::library::ItemId;
use duomix_core::{DeckId, EqBand, PadMode};

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(DeckId),
    Load(DeckId, ItemId),
    Ratio(DeckId, f64),
    Trim(DeckId, f32),
    Fader(DeckId, f32),
    Eq(DeckId, EqBand, f32),
    Filter(DeckId, f32),
    Crossfader(f32),
    Master(f32),
    Pitch(f32),
    Mode(DeckId, PadMode),
    Pad(DeckId, usize),
    PadUp(DeckId, usize),
    FxCycle(DeckId, usize),
    Shift(DeckId, bool),
    Follow(DeckId, bool),
    Sync(DeckId),
    Match,
    Cue(Option<DeckId>),
    Import(PathBuf),
    Grid(ItemId, String),
    Library,
    Status,
    Help,
    Quit,
}

fn parse_deck(token: &str) -> Result<DeckId, String> {
    match token {
        "a" | "A" => Ok(DeckId::A),
        "b" | "B" => Ok(DeckId::B),
        other => Err(format!("unknown deck '{}'", other)),
    }
}

fn parse_band(token: &str) -> Result<EqBand, String> {
    match token {
        "low" => Ok(EqBand::Low),
        "mid" => Ok(EqBand::Mid),
        "high" => Ok(EqBand::High),
        other => Err(format!("unknown EQ band '{}'", other)),
    }
}

fn parse_mode(token: &str) -> Result<PadMode, String> {
    match token {
        "hotcue" => Ok(PadMode::Hotcue),
        "loop" => Ok(PadMode::Loop),
        "fx" => Ok(PadMode::Fx),
        "sampler" => Ok(PadMode::Sampler),
        other => Err(format!("unknown pad mode '{}'", other)),
    }
}

fn parse_num<T: std::str::FromStr>(token: &str, what: &str) -> Result<T, String> {
    token.parse().map_err(|_| format!("bad {} '{}'", what, token))
}

fn parse_switch(token: &str) -> Result<bool, String> {
    match token {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(format!("expected on/off, got '{}'", other)),
    }
}

/// Parse one input line into a command
pub fn parse(line: &str) -> Result<Command, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (head, rest) = tokens.split_first().ok_or("empty line")?;

    let arg = |i: usize| -> Result<&str, String> {
        rest.get(i).copied().ok_or_else(|| "missing argument".to_string())
    };

    match *head {
        "play" => Ok(Command::Play(parse_deck(arg(0)?)?)),
        "load" => Ok(Command::Load(parse_deck(arg(0)?)?, parse_num(arg(1)?, "item id")?)),
        "ratio" => Ok(Command::Ratio(parse_deck(arg(0)?)?, parse_num(arg(1)?, "ratio")?)),
        "trim" => Ok(Command::Trim(parse_deck(arg(0)?)?, parse_num(arg(1)?, "trim")?)),
        "fader" => Ok(Command::Fader(parse_deck(arg(0)?)?, parse_num(arg(1)?, "fader")?)),
        "eq" => Ok(Command::Eq(
            parse_deck(arg(0)?)?,
            parse_band(arg(1)?)?,
            parse_num(arg(2)?, "value")?,
        )),
        "filter" => Ok(Command::Filter(parse_deck(arg(0)?)?, parse_num(arg(1)?, "value")?)),
        "xfade" => Ok(Command::Crossfader(parse_num(arg(0)?, "position")?)),
        "master" => Ok(Command::Master(parse_num(arg(0)?, "volume")?)),
        "pitch" => Ok(Command::Pitch(parse_num(arg(0)?, "position")?)),
        "mode" => Ok(Command::Mode(parse_deck(arg(0)?)?, parse_mode(arg(1)?)?)),
        "pad" => Ok(Command::Pad(parse_deck(arg(0)?)?, parse_num(arg(1)?, "pad")?)),
        "padup" => Ok(Command::PadUp(parse_deck(arg(0)?)?, parse_num(arg(1)?, "pad")?)),
        "fxcycle" => Ok(Command::FxCycle(parse_deck(arg(0)?)?, parse_num(arg(1)?, "pad")?)),
        "shift" => Ok(Command::Shift(parse_deck(arg(0)?)?, parse_switch(arg(1)?)?)),
        "follow" => Ok(Command::Follow(parse_deck(arg(0)?)?, parse_switch(arg(1)?)?)),
        "sync" => Ok(Command::Sync(parse_deck(arg(0)?)?)),
        "match" => Ok(Command::Match),
        "cue" => match arg(0)? {
            "off" => Ok(Command::Cue(None)),
            token => Ok(Command::Cue(Some(parse_deck(token)?))),
        },
        "import" => Ok(Command::Import(PathBuf::from(arg(0)?))),
        "grid" => {
            let item = parse_num(arg(0)?, "item id")?;
            let json = rest[1..].join(" ");
            if json.is_empty() {
                return Err("missing beatgrid JSON".to_string());
            }
            Ok(Command::Grid(item, json))
        }
        "library" | "lib" => Ok(Command::Library),
        "status" => Ok(Command::Status),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}' (try help)", other)),
    }
}

const HELP: &str = "\
play a|b              toggle deck transport
load a|b <id>         load a library item onto a deck
ratio a|b <r>         set tempo ratio (clamped 0.5..2.0)
trim/fader a|b <v>    set gain stages (0..1)
eq a|b low|mid|high <v>
filter a|b <v>        filter knob (0.5 = bypass)
xfade <x>             crossfader (-1..1)
master <v>            master volume (0..1)
pitch <v>             master pitch knob (0..1)
mode a|b hotcue|loop|fx|sampler
pad / padup a|b <n>   press / release pad 0-3
fxcycle a|b <n>       cycle a pad's effect assignment
shift a|b on|off      shift modifier
follow a|b on|off     tempo follow-sync
sync a|b              one-shot tempo match
match                 auto beat-match
cue a|b|off           headphone preview
import <path>         import raw stereo f32 PCM
grid <id> <json>      apply a beatgrid import payload
library, status, help, quit";

/// Execute a command against the engine; returns false on quit
pub fn dispatch(engine: &mut MixEngine, command: Command) -> bool {
    match command {
        Command::Play(deck) => engine.toggle_play(deck),
        Command::Load(deck, item) => engine.load_source(deck, item),
        Command::Ratio(deck, ratio) => engine.set_tempo_ratio(deck, ratio),
        Command::Trim(deck, value) => engine.set_trim(deck, value),
        Command::Fader(deck, value) => engine.set_fader(deck, value),
        Command::Eq(deck, band, value) => engine.set_eq(deck, band, value),
        Command::Filter(deck, value) => engine.set_filter(deck, value),
        Command::Crossfader(value) => engine.set_crossfader(value),
        Command::Master(value) => engine.set_master_volume(value),
        Command::Pitch(value) => engine.set_master_pitch(value),
        Command::Mode(deck, mode) => engine.set_pad_mode(deck, mode),
        Command::Pad(deck, pad) => engine.press_pad(deck, pad),
        Command::PadUp(deck, pad) => engine.release_pad(deck, pad),
        Command::FxCycle(deck, pad) => {
            let kind = engine.cycle_fx_assignment(deck, pad);
            println!("deck {} pad {} -> {}", deck, pad, kind.name());
        }
        Command::Shift(deck, held) => engine.set_shift(deck, held),
        Command::Follow(deck, enabled) => engine.set_follow(deck, enabled),
        Command::Sync(deck) => engine.sync_once(deck),
        Command::Match => {
            let result = engine.auto_beat_match();
            println!("{}", result.status);
        }
        Command::Cue(deck) => engine.set_cue(deck),
        Command::Import(path) => match std::fs::read(&path) {
            Ok(bytes) => {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "import".to_string());
                match engine.import_sample(&name, &bytes) {
                    Some(id) => println!("imported \"{}\" as item {}", name, id),
                    None => println!("import failed (see log)"),
                }
            }
            Err(e) => println!("cannot read {:?}: {}", path, e),
        },
        Command::Grid(item, json) => {
            if engine.import_beatgrid(item, &json) {
                println!("beatgrid applied to item {}", item);
            } else {
                println!("beatgrid rejected");
            }
        }
        Command::Library => {
            for item in engine.library().iter() {
                println!(
                    "{:>3}  [{}] {:<20} {}",
                    item.id(),
                    if item.is_sampled() { "smp" } else { "gen" },
                    item.name(),
                    item.bpm().map(|b| format!("{:.1} bpm", b)).unwrap_or_default()
                );
            }
        }
        Command::Status => {
            let snap = engine.snapshot();
            for deck in &snap.decks {
                println!(
                    "deck {}: {:<20} {} ratio {:.3} ({:.1} bpm) gain {:.2} mode {} pos {:.1}/{:.1}s",
                    deck.id,
                    deck.item_name,
                    if deck.playing { "playing" } else { "stopped" },
                    deck.tempo_ratio,
                    deck.effective_bpm,
                    deck.gain,
                    deck.pad_mode.name(),
                    deck.position_sec,
                    deck.duration_sec,
                );
            }
            println!(
                "xfade {:+.2}  master {:.2}  follow {}",
                snap.crossfader,
                snap.master_volume,
                snap.follow.map(|d| d.name()).unwrap_or("off")
            );
            println!("program: {}", snap.program);
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse("play a").unwrap(), Command::Play(DeckId::A));
        assert_eq!(parse("xfade -0.5").unwrap(), Command::Crossfader(-0.5));
        assert_eq!(
            parse("eq b mid 0.7").unwrap(),
            Command::Eq(DeckId::B, EqBand::Mid, 0.7)
        );
        assert_eq!(
            parse("mode a loop").unwrap(),
            Command::Mode(DeckId::A, PadMode::Loop)
        );
    }

    #[test]
    fn test_parse_grid_keeps_json_whole() {
        let cmd = parse(r#"grid 4 {"bpm": 126, "downbeatMs": 250}"#).unwrap();
        match cmd {
            Command::Grid(4, json) => assert!(json.contains("downbeatMs")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("play c").is_err());
        assert!(parse("ratio a notanumber").is_err());
        assert!(parse("frobnicate").is_err());
    }
}
