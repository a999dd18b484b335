use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::ViewerConfig;
use crate::context::AppContext;
use crate::engine::{FrameEngine, Recording, ReplayEngine};
use crate::gpu::target::OffscreenBackend;
use crate::runtime::{DisplaySize, RenderBackend};
use crate::sampler::hours_to_seconds;
use crate::status::StatusTable;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render frames to disk
    Render {
        /// Recorded pose tracks (JSON)
        #[arg(long)]
        recording: PathBuf,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Frames per second
        #[arg(long, default_value_t = 30.0)]
        fps: f64,

        /// Wall-clock duration in seconds (defaults to the whole recording)
        #[arg(long)]
        duration: Option<f64>,

        /// Simulated hours per wall-clock second
        #[arg(long, default_value_t = 1.0)]
        hours_per_second: f64,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Viewer config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Open a window and play the recording
    View {
        #[arg(long)]
        recording: PathBuf,

        #[arg(long, default_value_t = 1.0)]
        hours_per_second: f64,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print every frame of the recording at one instant
    Frames {
        #[arg(long)]
        recording: PathBuf,

        /// Simulated time, hours
        #[arg(long, default_value_t = 0.0)]
        at_hours: f64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            recording,
            out,
            fps,
            duration,
            hours_per_second,
            width,
            height,
            config,
        } => {
            let options = RenderOptions {
                fps,
                duration,
                hours_per_second,
                width,
                height,
            };
            pollster::block_on(render_offline(&recording, &out, config.as_deref(), options))?;
        }
        Commands::View {
            recording,
            hours_per_second,
            config,
        } => {
            let config = ViewerConfig::load_or_default(config.as_deref())?;
            let recording = Recording::load(&recording)?;
            crate::viewer::run(recording, config, hours_per_second)?;
        }
        Commands::Frames {
            recording,
            at_hours,
            json,
            config,
        } => {
            let config = ViewerConfig::load_or_default(config.as_deref())?;
            let recording = Recording::load(&recording)?;
            let table = pollster::block_on(frame_table(recording, &config, at_hours))?;
            if json {
                println!("{}", table.to_json()?);
            } else {
                print!("{}", table);
            }
        }
    }
    Ok(())
}

/// Create every recorded frame and body in `ctx`. Frames the engine refuses
/// are skipped; returns how many were added.
pub async fn populate<B: RenderBackend>(ctx: &mut AppContext<B>, recording: &Recording) -> usize {
    let mut added = 0;
    for request in recording.create_requests() {
        match ctx.add_frame(&request).await {
            Ok(_) => added += 1,
            Err(e) => log::warn!("Skipping frame '{}': {}", request.id(), e),
        }
    }
    for body in &recording.bodies {
        ctx.add_body(&body.name, body.position, body.radius);
    }
    added
}

struct RenderOptions {
    fps: f64,
    duration: Option<f64>,
    hours_per_second: f64,
    width: u32,
    height: u32,
}

async fn render_offline(
    recording_path: &Path,
    out_dir: &Path,
    config_path: Option<&Path>,
    options: RenderOptions,
) -> Result<()> {
    anyhow::ensure!(options.fps > 0.0, "fps must be positive");
    let config = ViewerConfig::load_or_default(config_path)?;
    let recording = Recording::load(recording_path)?;

    let render_duration = match options.duration {
        Some(seconds) => seconds,
        None if options.hours_per_second > 0.0 => {
            recording.duration_seconds() / hours_to_seconds(options.hours_per_second)
        }
        None => 0.0,
    };
    let total_frames = (render_duration * options.fps).ceil().max(1.0) as usize;
    let dt = 1.0 / options.fps;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let backend = OffscreenBackend::new(options.width, options.height, config.background).await?;
    let engine: Rc<dyn FrameEngine> = Rc::new(ReplayEngine::new(recording.clone()));
    let mut ctx = AppContext::new(engine, backend, &config);

    let added = populate(&mut ctx, &recording).await;
    log::info!("{} of {} frames created", added, recording.frames.len());
    ctx.fit_camera();

    let display = DisplaySize::physical(options.width, options.height);
    println!("Rendering {} frames to {:?}...", total_frames, out_dir);

    for i in 0..total_frames {
        let elapsed = i as f64 * dt;
        ctx.set_sim_time(elapsed * options.hours_per_second);
        ctx.advance(display, elapsed * 1000.0);

        let backend = ctx.runtime().backend();
        let pixels = backend.read_pixels()?;
        let (width, height) = backend.surface_size();

        let frame_path = out_dir.join(format!("frame_{:05}.png", i));
        image::save_buffer(&frame_path, &pixels, width, height, image::ColorType::Rgba8)
            .with_context(|| format!("Failed to write {}", frame_path.display()))?;

        if i % 60 == 0 {
            print!(".");
            std::io::stdout().flush()?;
        }
    }
    println!("\nDone.");
    print!("{}", ctx.status_table());

    Ok(())
}

/// Every recorded frame as reported by the engine at `at_hours`.
async fn frame_table(recording: Recording, config: &ViewerConfig, at_hours: f64) -> Result<StatusTable> {
    let requests = recording.create_requests();
    let engine = ReplayEngine::new(recording);
    for request in &requests {
        if let Err(e) = engine.create_frame(request).await {
            log::warn!("Skipping frame '{}': {}", request.id(), e);
        }
    }
    let records = engine
        .frames(hours_to_seconds(at_hours))
        .await
        .context("Failed to list frames")?;
    Ok(StatusTable::from_records(records, config.position_scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_frames_command_args() {
        let cli = Cli::try_parse_from([
            "framescope", "frames", "--recording", "r.json", "--at-hours", "6", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Frames { at_hours, json, .. } => {
                assert_eq!(at_hours, 6.0);
                assert!(json);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
