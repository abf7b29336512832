//! Replay a JSON-lines message script against the simulated engine.
//!
//! Every non-empty line of the script that does not start with `#` is sent
//! to the message relay as-is. A frame driver advances the simulated engine
//! once per frame interval, so animated moves, tour loads and collection
//! loads complete one frame after they are issued. Replies are printed to
//! stdout as one JSON object per line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wwt_bridge::config::BridgeConfig;
use wwt_bridge::engine::{SimulatedCatalog, SimulatedEngine};
use wwt_bridge::facade::LoadImageCollection;
use wwt_bridge::messages::{MessageRelay, Outbound};
use wwt_bridge::WwtFacade;

use crate::error::CliError;

/// Arguments for `wwt-bridge replay`.
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON-lines file of client messages
    pub script: PathBuf,

    /// Frame interval in milliseconds (overrides [engine] frame_interval_ms)
    #[arg(long)]
    pub frame_ms: Option<u64>,

    /// JSON catalogue of collections, tours and imagesets
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Also print view state updates
    #[arg(long)]
    pub view_state: bool,

    /// Give up on outstanding replies after this many seconds
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,
}

/// Run the replay command.
pub fn run(args: ReplayArgs, config: &BridgeConfig) -> Result<(), CliError> {
    let lines = read_script(&args.script)?;
    let catalog = match &args.catalog {
        Some(path) => load_catalog(path)?,
        None => SimulatedCatalog::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(replay(args, config, lines, catalog))
}

async fn replay(
    args: ReplayArgs,
    config: &BridgeConfig,
    lines: Vec<String>,
    catalog: SimulatedCatalog,
) -> Result<(), CliError> {
    let frame = args
        .frame_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(config.engine.frame_interval);

    let engine = Arc::new(SimulatedEngine::with_catalog(catalog));
    let facade = Arc::new(WwtFacade::new(engine.clone()));
    let shutdown = CancellationToken::new();

    info!(
        script = %args.script.display(),
        messages = lines.len(),
        frame_ms = frame.as_millis() as u64,
        "Starting replay"
    );

    let frames = spawn_frame_driver(Arc::clone(&engine), frame, shutdown.clone());
    let refresh = facade
        .store()
        .spawn_refresh_loop(facade.engine().clone(), frame, shutdown.clone());

    for url in &config.collections.preload {
        let facade = Arc::clone(&facade);
        let url = url.clone();
        tokio::spawn(async move {
            if let Err(e) = facade
                .load_image_collection(LoadImageCollection::new(url.as_str()))
                .await
            {
                warn!(url = %url, error = %e, "Preload failed");
            }
        });
    }

    let capacity = config.relay.channel_capacity;
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, mut out_rx) = mpsc::channel(capacity);

    let relay = MessageRelay::new(Arc::clone(&facade));
    let relay_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { relay.run(in_rx, out_tx, shutdown).await })
    };

    tokio::spawn(async move {
        for line in lines {
            if in_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut stdout = tokio::io::stdout();
    let deadline = tokio::time::sleep(Duration::from_secs(args.timeout_secs));
    tokio::pin!(deadline);
    let mut replies = 0usize;

    loop {
        tokio::select! {
            message = out_rx.recv() => {
                let Some(message) = message else { break };
                if matches!(message, Outbound::ViewState(_)) && !args.view_state {
                    continue;
                }
                if matches!(message, Outbound::Reply(_)) {
                    replies += 1;
                }
                let mut line = serde_json::to_string(&message)
                    .map_err(|e| CliError::Output(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
                line.push('\n');
                stdout.write_all(line.as_bytes()).await.map_err(CliError::Output)?;
            }

            _ = &mut deadline => {
                warn!(timeout_secs = args.timeout_secs, "Replay timed out with requests outstanding");
                break;
            }
        }
    }
    stdout.flush().await.map_err(CliError::Output)?;

    shutdown.cancel();
    let _ = relay_task.await;
    let _ = frames.await;
    let _ = refresh.await;

    info!(replies, "Replay finished");
    Ok(())
}

fn spawn_frame_driver(
    engine: Arc<SimulatedEngine>,
    frame: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(frame);
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    engine.fire_ready();
                    engine.step();
                }
            }
        }
    })
}

fn read_script(path: &Path) -> Result<Vec<String>, CliError> {
    let content = std::fs::read_to_string(path).map_err(|error| CliError::FileRead {
        path: path.to_path_buf(),
        error,
    })?;
    Ok(script_lines(&content))
}

fn script_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn load_catalog(path: &Path) -> Result<SimulatedCatalog, CliError> {
    let content = std::fs::read_to_string(path).map_err(|error| CliError::FileRead {
        path: path.to_path_buf(),
        error,
    })?;
    serde_json::from_str(&content).map_err(|error| CliError::Catalog {
        path: path.to_path_buf(),
        error,
    })
}
