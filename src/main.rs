//! Application entry point: headless avatar-sync engine.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Open the default audio output, or fall back to a simulated device.
//! 4. Create the tokio runtime.
//! 5. Spawn the connection manager, the speech queue and the orchestrator.
//! 6. Connect, then log stage events until Ctrl-C.
//!
//! Each line typed on stdin is sent to the backend as user narrative; an
//! empty line interrupts the current turn.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use avatar_sync::{
    audio::{DeviceOutput, PlaybackNotice, PlaybackSink, SimulatedOutput, StreamHandle},
    backend::HttpBackend,
    config::AppConfig,
    link::ConnectionManager,
    pipeline::{new_shared_state, Orchestrator, StageEvent},
    speech::{SpeechQueue, TurnTiming},
};

// ---------------------------------------------------------------------------
// Audio output
// ---------------------------------------------------------------------------

/// Open the configured output.  The stream handle must outlive playback.
fn open_output(
    config: &AppConfig,
    notices: mpsc::UnboundedSender<PlaybackNotice>,
) -> (Arc<dyn PlaybackSink>, Option<StreamHandle>) {
    if config.audio.use_device {
        match DeviceOutput::open(notices.clone()) {
            Ok((output, handle)) => return (Arc::new(output), Some(handle)),
            Err(e) => log::warn!("Audio output unavailable ({e}); using simulated clock"),
        }
    } else {
        log::info!("Audio device disabled in settings; using simulated clock");
    }
    (Arc::new(SimulatedOutput::new(notices)), None)
}

// ---------------------------------------------------------------------------
// Stage event log
// ---------------------------------------------------------------------------

fn log_event(event: &StageEvent) {
    match event {
        StageEvent::Connection(state) => log::info!("stage: link {state}"),
        StageEvent::StreamText { speaker, text, .. } => log::debug!("stage: {speaker} … {text}"),
        StageEvent::Directive {
            speaker, directive, ..
        } => log::info!("stage: {speaker} {directive}"),
        StageEvent::TurnStarted {
            speaker,
            text,
            duration,
            ..
        } => log::info!("stage: {speaker} ({duration:?}): {text}"),
        StageEvent::SpeakerIdle => log::info!("stage: idle"),
        StageEvent::History {
            speaker,
            text,
            from_user,
            ..
        } => {
            let who = if *from_user { "me" } else { speaker.as_str() };
            log::info!("history: {who}: {text}");
        }
        StageEvent::Component { component, status } => {
            log::info!("stage: {component} is {status}")
        }
        StageEvent::Log(line) => log::info!("backend log: {line}"),
        StageEvent::Roster(agents) => log::info!(
            "stage: agents {:?}",
            agents.iter().map(|a| a.id.as_str()).collect::<Vec<_>>()
        ),
        other => log::debug!("stage: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("avatar-sync starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Audio output (before the runtime; the cpal stream stays on this thread)
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let (sink, _stream_handle) = open_output(&config, notice_tx);

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async move {
        // 5. Components
        let state = new_shared_state();
        let (stage_tx, mut stage_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let (link, link_task) = ConnectionManager::new(&config.link, link_tx).spawn();
        let (speech, _speech_task) = SpeechQueue::new(
            TurnTiming::from(&config.speech),
            stage_tx.clone(),
            Arc::clone(&state),
        )
        .spawn();

        let orchestrator = Orchestrator::new(&config, link.clone(), speech, sink, stage_tx, state)
            .with_backend(Arc::new(HttpBackend::from_config(&config.backend)));
        let control = orchestrator.handle();
        let orchestrator_task = tokio::spawn(orchestrator.run(link_rx, notice_rx));

        // 6. Connect and run
        link.connect()?;
        log::info!("Connecting to {}", config.link.url);

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                event = stage_rx.recv() => match event {
                    Some(event) => log_event(&event),
                    None => break,
                },
                line = stdin.next_line(), if stdin_open => match line {
                    Ok(Some(line)) if line.trim().is_empty() => control.barge_in(),
                    Ok(Some(line)) => control.send_text(line.trim(), "broadcast"),
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        log::warn!("stdin closed: {e}");
                        stdin_open = false;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Ctrl-C received, shutting down");
                    break;
                }
            }
        }

        control.shutdown();
        let stopped = tokio::time::timeout(Duration::from_secs(2), async {
            let _ = orchestrator_task.await;
            let _ = link_task.await;
        })
        .await;
        if stopped.is_err() {
            log::warn!("Shutdown timed out");
        }
        anyhow::Ok(())
    })
}
