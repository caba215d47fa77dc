use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use rhythm_highway_core::{
    chart::{AnalogSegment, ControlPoint},
    control::SpinParams,
    AutoPlay, ButtonJudge, Chart, EffectBoard, EventKind, FrameOrchestrator, GameConfig,
    HighwayParams, Lane, PathKind, SharedClock, Time, TransformState, ViewSettings,
};
use tracing_subscriber::EnvFilter;

fn main() -> rhythm_highway_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            chart,
            config,
            frames,
            fps,
        } => run_simulate(chart.as_ref(), config.as_ref(), frames, fps),
        Commands::Transform {
            pitch,
            roll,
            laser_roll,
            zoom,
            offset,
        } => run_transform(HighwayParams {
            pitch,
            base_roll: roll,
            laser_roll,
            zoom,
            offset,
            ..Default::default()
        }),
    }
}

fn run_simulate(
    chart: Option<&PathBuf>,
    config: Option<&PathBuf>,
    frames: u32,
    fps: f32,
) -> rhythm_highway_core::Result<()> {
    let chart = match chart {
        Some(path) => {
            tracing::info!(?path, "loading chart");
            Chart::from_json_str(&std::fs::read_to_string(path)?)?
        }
        None => demo_chart()?,
    };
    let config = match config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig {
            input: rhythm_highway_core::config::InputConfig {
                auto_play: AutoPlay::BUTTONS_AND_LASERS,
                ..Default::default()
            },
            ..Default::default()
        },
    };
    let fps = fps.max(1.0);
    tracing::info!(
        frames,
        fps,
        objects = chart.objects().len(),
        events = chart.events().len(),
        track_volume = config.audio.track_volume,
        "starting simulation"
    );

    let chart = Arc::new(chart);
    let clock = SharedClock::new(0.0);
    let judge = ButtonJudge::from_config(Arc::clone(&chart), &config.input);
    let mut game = FrameOrchestrator::new(chart, config, clock.clone(), EffectBoard::new(), judge);

    game.start();
    let delta = 1.0 / fps;
    let mut crossings = 0;
    for frame in 0..frames {
        clock.advance(Time::from(delta));
        let report = game.tick(delta);
        crossings += report.crossings;
        if frame % (fps as u32).max(1) == 0 {
            tracing::info!(
                position = report.position,
                crossings,
                laser_alpha = report.laser_alpha,
                roll = report.highway.laser_roll,
                near = report.near,
                far = report.far,
                "frame summary"
            );
        }
    }

    println!("{}", serde_json::to_string_pretty(game.report())?);
    game.teardown();
    Ok(())
}

fn run_transform(params: HighwayParams) -> rhythm_highway_core::Result<()> {
    tracing::info!(?params, "computing highway transforms");
    let state = TransformState::compute(&params, &ViewSettings::default());
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Short chart exercising holds, a slam-connected laser and a spin.
fn demo_chart() -> rhythm_highway_core::Result<Chart> {
    let mut builder = Chart::builder();
    builder.control_point(ControlPoint::new(0.0, 150.0));
    for i in 0..8 {
        let lane = Lane::BUTTONS[i % 4];
        builder.button(lane, 1.0 + i as Time * 0.4, 0.0)?;
    }
    builder.button(Lane::FX_L, 4.4, 1.6)?;
    builder.analog(Lane::LASER_L, 2.0, 1.6, AnalogSegment::new(0.0, 1.0))?;
    builder.analog(Lane::LASER_L, 3.6, 0.0, AnalogSegment::new(1.0, 0.2).connected())?;
    builder.analog(Lane::LASER_L, 3.6, 0.8, AnalogSegment::new(0.2, 0.2).connected())?;
    builder.analog(Lane::LASER_R, 5.0, 0.0, AnalogSegment::new(1.0, 0.0))?;
    builder.event(
        5.0,
        EventKind::SpinImpulse {
            params: SpinParams {
                direction: -1,
                duration: 0.5,
            },
        },
    );
    builder.path_point(PathKind::Zoom, 0.0, 0.0);
    builder.path_point(PathKind::Zoom, 6.0, 0.3);
    builder.build()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Rhythm highway gameplay core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a chart headlessly with auto-play and print the last frame.
    Simulate {
        /// Chart JSON file; a built-in demo chart is used when omitted.
        #[arg(short, long)]
        chart: Option<PathBuf>,
        /// Game configuration JSON file.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value_t = 480)]
        frames: u32,
        #[arg(long, default_value_t = 60.0)]
        fps: f32,
    },
    /// Print the highway transforms and clip planes for a set of motion values.
    Transform {
        /// Degrees.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        pitch: f32,
        /// Turns.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        roll: f32,
        /// Degrees.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        laser_roll: f32,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        zoom: f32,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        offset: f32,
    },
}
