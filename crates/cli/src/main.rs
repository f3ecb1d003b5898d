#![deny(unsafe_code)]
//! CLI binary for the prism rendering engine.
//!
//! Subcommands:
//! - `render [scene]`: run a scene headless for N frames, write PNG frames
//! - `list`: print available scenes
//! - `config [scene]`: print a scene's default configuration as JSON

mod decode;
mod error;
mod snapshot;

use clap::{Parser, Subcommand};
use error::CliError;
use prism_engine_core::{
    init_logging, FramePump, LoggingConfig, Pacing, RenderLoop, SceneConfig, SceneVariant,
    SoftwareDevice, WriteStyle,
};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "prism", about = "Animated triangle and cube renderer")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Log filter in env_logger syntax (e.g. "debug"). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log: Option<String>,

    /// More log detail: -v for debug, -vv for trace. Ignored with --log.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scene for N frames and write PNG snapshots.
    Render {
        /// Scene name (triangle, color-cube, textured-cube).
        scene: Option<String>,

        /// Scene configuration JSON file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Surface width in pixels.
        #[arg(short = 'W', long)]
        width: Option<u32>,

        /// Surface height in pixels.
        #[arg(short = 'H', long)]
        height: Option<u32>,

        /// Number of frames to render.
        #[arg(short, long, default_value_t = 60)]
        frames: u64,

        /// Simulated seconds per frame.
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f64,

        /// Image file to use instead of the built-in checkerboard.
        #[arg(short, long)]
        texture: Option<PathBuf>,

        /// Directory for frame_NNNN.png files.
        #[arg(short, long, default_value = "frames")]
        output: PathBuf,

        /// Write every Nth frame. 0 writes only the last frame.
        #[arg(short, long, default_value_t = 0)]
        every: u64,
    },
    /// List available scenes.
    List,
    /// Print a scene's default configuration as JSON.
    Config {
        /// Scene name.
        #[arg(default_value = "triangle")]
        scene: String,
    },
}

struct RenderArgs {
    scene: Option<String>,
    config: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    frames: u64,
    dt: f64,
    texture: Option<PathBuf>,
    output: PathBuf,
    every: u64,
}

fn load_config(args: &RenderArgs) -> Result<SceneConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
            SceneConfig::from_json(&json)?
        }
        None => SceneConfig::default(),
    };
    if let Some(name) = &args.scene {
        config.variant = name.parse::<SceneVariant>()?;
    }
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    config.validate()?;
    Ok(config)
}

fn should_write(frame_index: u64, every: u64, frames: u64) -> bool {
    let number = frame_index + 1;
    number == frames || (every > 0 && number.is_multiple_of(every))
}

fn render(args: RenderArgs, json: bool) -> Result<(), CliError> {
    if args.frames == 0 {
        return Err(CliError::Input("--frames must be at least 1".into()));
    }
    if !(args.dt.is_finite() && args.dt > 0.0) {
        return Err(CliError::Input(format!("--dt {} must be positive", args.dt)));
    }

    let config = load_config(&args)?;
    let (width, height) = (config.width, config.height);
    let variant = config.variant;

    std::fs::create_dir_all(&args.output)
        .map_err(|e| CliError::Io(format!("{}: {e}", args.output.display())))?;

    let mut scene = RenderLoop::new(SoftwareDevice::new(width, height), config)?;
    if let Some(path) = &args.texture {
        if !variant.uses_texture() {
            log::warn!("scene {variant} does not sample a texture; {} is unused", path.display());
        }
        scene = scene.with_texture(decode::load_texture(path)?);
    }

    let mut written: Vec<PathBuf> = Vec::new();
    let mut write_error: Option<CliError> = None;
    let report = FramePump::new(width, height)
        .with_pacing(Pacing::Fixed(args.dt))
        .with_max_frames(args.frames)
        .run_with(&mut scene, |scene, time, control| {
            if !should_write(time.frame_index, args.every, args.frames) {
                return;
            }
            let (w, h) = scene.device().surface_size();
            let path = snapshot::frame_path(&args.output, time.frame_index);
            match snapshot::write_png(scene.device().front_buffer_rgba(), w, h, &path) {
                Ok(()) => written.push(path),
                Err(e) => {
                    write_error = Some(e);
                    control.request_exit();
                }
            }
        })?;
    if let Some(e) = write_error {
        return Err(e);
    }

    if json {
        let info = serde_json::json!({
            "scene": variant.name(),
            "width": width,
            "height": height,
            "frames": report.frames,
            "elapsed": report.elapsed,
            "written": written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        eprintln!(
            "rendered {variant} ({width}x{height}, {} frames, {:.3}s) -> {} file(s) in {}",
            report.frames,
            report.elapsed,
            written.len(),
            args.output.display()
        );
    }
    Ok(())
}

fn list(json: bool) -> Result<(), CliError> {
    if json {
        let scenes: Vec<_> = SceneVariant::ALL
            .iter()
            .map(|v| {
                serde_json::json!({
                    "name": v.name(),
                    "description": v.description(),
                    "textured": v.uses_texture(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "scenes": scenes }))?);
    } else {
        println!("Scenes:");
        for v in SceneVariant::ALL {
            println!("  {:<14} {}", v.name(), v.description());
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::List => list(cli.json)?,
        Command::Config { scene } => {
            let config = SceneConfig::for_variant(scene.parse()?);
            println!("{}", config.to_json()?);
        }
        Command::Render {
            scene,
            config,
            width,
            height,
            frames,
            dt,
            texture,
            output,
            every,
        } => {
            let args = RenderArgs {
                scene,
                config,
                width,
                height,
                frames,
                dt,
                texture,
                output,
                every,
            };
            render(args, cli.json)?;
        }
    }

    Ok(())
}

/// Log records go to stderr; with `--json` they stay uncoloured so the
/// stream remains machine-readable.
fn logging_config(cli: &Cli) -> LoggingConfig {
    LoggingConfig {
        filter: cli.log.clone(),
        verbosity: cli.verbose,
        write_style: if cli.json {
            WriteStyle::Never
        } else {
            WriteStyle::Auto
        },
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(logging_config(&cli));
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}
