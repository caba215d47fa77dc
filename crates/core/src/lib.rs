//! Core library for the rhythm highway.
//!
//! Each module owns one subsystem of the real-time gameplay loop: chart data,
//! the sliding-window playback scheduler, judgement, highway motion and
//! transforms, lane activity and audio-effect gating, and the per-frame
//! orchestrator that ties them to the audio clock. Nothing here talks to a GPU
//! or an audio device directly; hosts plug in through the [`AudioClock`],
//! [`AudioEffectController`] and [`Judgement`] traits.

pub mod audio;
pub mod chart;
pub mod config;
pub mod control;
pub mod error;
pub mod game;
pub mod judge;
pub mod mapping;
pub mod render;
pub mod scene;
pub mod sync;
pub mod timeline;

pub use audio::{AudioClock, AudioEffectController, EffectBoard, EffectDef, EffectType, SharedClock};
pub use chart::{Chart, ChartBuilder, ChartDescriptor, EventKind, Lane, ObjectId, PerLane, Time};
pub use config::{AutoPlay, GameConfig};
pub use control::{HighwayControl, HighwayControlConfig};
pub use error::{HighwayError, Result};
pub use game::{FrameOrchestrator, FrameReport};
pub use judge::{ButtonJudge, JudgeKind, JudgeResult, Judgement};
pub use mapping::{PathKind, PathSet, PathValues};
pub use render::{Camera, HighwayParams, HighwayView, TransformState, ViewSettings};
pub use scene::{Renderable, RenderableKind};
pub use sync::{laser_mix, LaneActivity, BASE_LASER_MIX};
pub use timeline::{Crossing, CrossingKind, PlayDirection, PlaybackScheduler};
