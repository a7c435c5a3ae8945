use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scanline::prelude::*;

/// Real-time video-capture processing engine.
///
/// Captures frames from the input device, runs them through anti-tearing,
/// the filter graph, and the scaler, and shows the result in a preview
/// window. Files given on the command line are loaded at startup; a missing
/// argument means nothing is auto-loaded.
#[derive(Parser, Debug)]
#[command(name = "scanline", version)]
struct Cli {
    /// Alias resolutions file to load at startup.
    alias_file: Option<PathBuf>,

    /// Mode parameter file to load at startup.
    mode_params_file: Option<PathBuf>,

    /// Filter graph file to load at startup.
    filter_graph_file: Option<PathBuf>,

    /// Capture input channel to open.
    #[arg(long, default_value_t = 0)]
    input: u32,

    /// Frames per hundred for the device to drop at the source.
    #[arg(long, default_value_t = 0)]
    frame_drop: u32,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let status = StatusBus::new();
    status.subscribe(|event| {
        if let StatusEvent::NewLogEntry(line) = event {
            info!("{line}");
        }
    });

    let mut engine = match Engine::new(
        Box::new(VirtualDriver::new(60)),
        status,
        EngineConfig {
            input_channel: cli.input,
            frame_drop: cli.frame_drop,
        },
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "failed to initialize capture");
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &cli.alias_file
        && let Err(e) = engine.load_aliases(path)
    {
        error!(error = %e, "failed to load aliases");
        return ExitCode::FAILURE;
    }
    if let Some(path) = &cli.mode_params_file
        && let Err(e) = engine.load_mode_params(path)
    {
        error!(error = %e, "failed to load mode parameters");
        return ExitCode::FAILURE;
    }
    if let Some(path) = &cli.filter_graph_file
        && let Err(e) = engine.load_filter_graph(path)
    {
        error!(error = %e, "failed to load the filter graph");
        return ExitCode::FAILURE;
    }

    // Announce the initial mode so the stored parameters apply from the
    // very first frame.
    engine.ingress().on_mode_changed();

    let outcome = run(&mut engine);
    engine.shutdown();
    if engine.missed_frame_count() > 0 {
        info!(missed = engine.missed_frame_count(), "frames arrived faster than they were processed");
    }
    outcome
}

#[cfg(feature = "preview")]
fn run(engine: &mut Engine) -> ExitCode {
    let mut window = match PreviewWindow::new("scanline") {
        Ok(window) => window,
        Err(e) => {
            error!(error = %e, "failed to open the preview window");
            return ExitCode::FAILURE;
        }
    };

    while window.is_open() {
        match engine.tick() {
            TickOutcome::Fatal => return ExitCode::FAILURE,
            TickOutcome::Processed => {
                let (px, res) = engine.scaler().output();
                let shown = if px.is_empty() {
                    window.pump()
                } else {
                    window.present(px, res)
                };
                if let Err(e) = shown {
                    error!(error = %e, "preview window failed");
                    return ExitCode::FAILURE;
                }
            }
            TickOutcome::Idle => {
                if let Err(e) = window.pump() {
                    error!(error = %e, "preview window failed");
                    return ExitCode::FAILURE;
                }
                window.idle_wait();
            }
        }
    }
    ExitCode::SUCCESS
}

#[cfg(not(feature = "preview"))]
fn run(engine: &mut Engine) -> ExitCode {
    loop {
        match engine.tick() {
            TickOutcome::Fatal => return ExitCode::FAILURE,
            TickOutcome::Processed => {}
            TickOutcome::Idle => std::thread::sleep(std::time::Duration::from_millis(1)),
        }
    }
}
