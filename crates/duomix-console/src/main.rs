//! Duomix Console - headless driver for the mixing control plane
//!
//! Opens an audio session over the null pattern backend and the raw
//! PCM decoder, builds the engine from the configured catalog, then
//! runs the control tick loop while mapping stdin lines onto engine
//! commands. `help` lists the command set.

mod commands;
mod decoder;

use std::io::BufRead;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::mpsc;

use duomix_core::backend::NullPatternBackend;
use duomix_core::config::{default_config_path, load_config, ConsoleConfig};
use duomix_core::engine::MixEngine;
use duomix_core::library::Library;
use duomix_core::session::AudioSession;
use duomix_core::{StereoBuffer, DEFAULT_SAMPLE_RATE};

use commands::{dispatch, parse};
use decoder::RawPcmDecoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config: ConsoleConfig = load_config(&default_config_path());
    log::info!(
        "duomix-console starting ({} catalog entries, {}ms tick)",
        config.catalog.len(),
        config.tick_interval_ms
    );

    let library = Library::from_catalog(
        config
            .catalog
            .iter()
            .map(|entry| (entry.name.clone(), entry.bpm, entry.program.clone())),
    );

    let session = AudioSession::new(Box::new(NullPatternBackend), Box::new(RawPcmDecoder));
    let mut engine = MixEngine::new(session, library);
    engine
        .open()
        .await
        .context("audio session initialization failed")?;
    engine.set_master_volume(config.master_volume);

    // Blocking stdin reader feeding the async loop
    let (tx, mut rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let tick = Duration::from_millis(config.tick_interval_ms.max(1));
    let mut interval = tokio::time::interval(tick);
    // One render block per tick keeps sample transport moving
    let block =
        (DEFAULT_SAMPLE_RATE as u64 * config.tick_interval_ms.max(1) / 1000).max(1) as usize;
    let mut master_bus = StereoBuffer::silence(block);

    println!("duomix console ready - type 'help' for commands");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.tick(Instant::now());
                engine.render(&mut master_bus);
            }
            line = rx.recv() => {
                let Some(line) = line else { break };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse(trimmed) {
                    Ok(command) => {
                        if !dispatch(&mut engine, command) {
                            break;
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    engine.session().close();
    log::info!("duomix-console shut down");
    Ok(())
}
