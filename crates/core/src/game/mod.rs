//! Per-frame orchestration: reads the clock, advances the scheduler and judge,
//! routes their notifications, and refreshes the highway for rendering.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use serde::Serialize;

use crate::{
    audio::{AudioClock, AudioEffectController},
    chart::{Chart, EventId, EventKind, Lane, ObjectId, Time},
    config::GameConfig,
    control::{ControlInputs, HighwayControl, HighwayControlConfig},
    judge::{JudgeEvent, Judgement},
    mapping::PathValues,
    render::{HighwayParams, HighwayView, ViewSettings},
    scene::LaserColors,
    sync::{sample_laser, LaneActivity, LaserSample},
    timeline::{Crossing, CrossingKind, PlayDirection, PlaybackItem, PlaybackScheduler},
};

/// Degrees of critical-line tilt at full effect roll.
const CRIT_LINE_EFFECT_DEGREES: f32 = 25.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LaneVisual {
    pub active_object: Option<ObjectId>,
    pub effect_active: bool,
    pub glow: f32,
    pub glow_state: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CriticalLine {
    /// Screen position of the line's center in pixels.
    pub position: Vec2,
    /// Degrees.
    pub rotation: f32,
    /// Screen-space x offsets of the left and right laser cursors.
    pub cursors: [f32; 2],
}

/// Snapshot of everything computed during one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub position: Time,
    pub crossings: usize,
    pub judgements: usize,
    pub path: PathValues,
    pub highway: HighwayParams,
    pub near: f32,
    pub far: f32,
    pub horizon_height: f32,
    pub critical_line: CriticalLine,
    pub laser_alpha: f32,
    pub lanes: [LaneVisual; Lane::COUNT],
}

pub struct FrameOrchestrator<C, A, J> {
    chart: Arc<Chart>,
    config: GameConfig,
    clock: C,
    audio: A,
    judge: J,
    scheduler: PlaybackScheduler,
    control: HighwayControl,
    view: HighwayView,
    activity: LaneActivity,
    laser_inputs: [f32; 2],
    crossings: Vec<Crossing>,
    judge_events: Vec<JudgeEvent>,
    report: FrameReport,
}

impl<C, A, J> FrameOrchestrator<C, A, J>
where
    C: AudioClock,
    A: AudioEffectController,
    J: Judgement,
{
    pub fn new(chart: Arc<Chart>, config: GameConfig, clock: C, audio: A, judge: J) -> Self {
        let playback = &config.playback;
        let settings = ViewSettings {
            field_of_view: config.view.field_of_view,
            crit_screen_y: config.view.crit_screen_y,
            viewport_width: config.view.viewport_width,
            viewport_height: config.view.viewport_height,
        };

        Self {
            scheduler: PlaybackScheduler::new(
                Arc::clone(&chart),
                playback.look_ahead,
                playback.look_behind,
            ),
            control: HighwayControl::new(HighwayControlConfig::default_ksh168()),
            view: HighwayView::new(
                settings,
                playback.look_ahead,
                LaserColors::from_hues(config.view.laser_hues),
            ),
            activity: LaneActivity::new(config.audio.laser_gain, config.audio.slam_volume),
            laser_inputs: [0.0; 2],
            crossings: Vec::new(),
            judge_events: Vec::new(),
            report: FrameReport::default(),
            chart,
            config,
            clock,
            audio,
            judge,
        }
    }

    pub fn chart(&self) -> &Arc<Chart> {
        &self.chart
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn judge(&self) -> &J {
        &self.judge
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn control(&self) -> &HighwayControl {
        &self.control
    }

    pub fn view(&self) -> &HighwayView {
        &self.view
    }

    pub fn activity(&self) -> &LaneActivity {
        &self.activity
    }

    pub fn report(&self) -> &FrameReport {
        &self.report
    }

    /// Clock position in chart time; the clock runs on audio time, which
    /// leads chart time by the chart offset.
    pub fn chart_position(&self) -> Time {
        self.clock.position() - self.chart.offset()
    }

    /// Seeks to the lead-in before the first object and enables effects.
    pub fn start(&mut self) {
        let first = self.chart.first_object_time().unwrap_or(0.0);
        let start = (first - self.config.playback.lead_in).min(0.0);
        self.audio.set_effects_enabled(true);
        self.seek(start);
        tracing::info!(start, first, "session started");
    }

    /// Jumps to `position` and rebuilds every piece of frame state as if
    /// playback had arrived there, without emitting crossings.
    pub fn seek(&mut self, position: Time) {
        if !position.is_finite() {
            tracing::warn!(position, "ignoring seek to non-finite position");
            return;
        }
        let chart = Arc::clone(&self.chart);
        self.clock.seek(position + chart.offset());

        self.view.reset();
        self.activity.release_all(&mut self.audio);
        self.control.reset();
        self.scheduler.reset_to(position);
        self.judge.reset_to(position);

        let quarter_note = chart.control_point_at(position).quarter_note_duration();
        let passed: Vec<EventId> = self.scheduler.passed_events().collect();
        for id in &passed {
            self.trigger_event(&chart, *id, PlayDirection::Forward, quarter_note);
        }

        for lane in Lane::ALL {
            for id in self.scheduler.visible_objects(lane) {
                self.view.appear(&chart, id);
            }
            if let Some(id) = self.scheduler.active_object(lane) {
                self.activity
                    .resume_object(&chart, id, quarter_note, &mut self.audio);
            }
        }

        tracing::debug!(
            position,
            events = passed.len(),
            renderables = self.view.renderable_count(),
            "seek rebuilt frame state"
        );
    }

    /// Runs one frame. `delta` is the wall-clock time since the previous one.
    pub fn tick(&mut self, delta: f32) -> &FrameReport {
        let chart = Arc::clone(&self.chart);
        let position = self.chart_position();
        let quarter_note = chart.control_point_at(position).quarter_note_duration();

        let mut crossings = std::mem::take(&mut self.crossings);
        self.scheduler.set_position(position, &mut crossings);
        for crossing in &crossings {
            self.dispatch_crossing(&chart, crossing, quarter_note);
        }
        let crossing_count = crossings.len();
        self.crossings = crossings;

        let mut judge_events = std::mem::take(&mut self.judge_events);
        judge_events.clear();
        self.judge.set_position(position, &mut judge_events);
        for event in &judge_events {
            self.dispatch_judgement(&chart, event);
        }
        let judgement_count = judge_events.len();
        self.judge_events = judge_events;

        let path = chart.paths().resolve(position);
        let left = sample_laser(&chart, Lane::LASER_L, position);
        let right = sample_laser(&chart, Lane::LASER_R, position);
        self.control.set_inputs(ControlInputs {
            position,
            left_laser: left.value,
            right_laser: right.value,
            path,
        });

        self.activity.apply_effect_activity(&mut self.audio);
        self.activity
            .update_laser_effects(&chart, position, quarter_note, &mut self.audio);

        self.control.update(delta);
        let highway = self.control.highway_params();
        self.view.set_playback_position(position);
        for lane in Lane::ALL {
            self.view
                .set_lane_active(lane, self.activity.has_active_effect(lane));
            match self.activity.active_object(lane) {
                Some(object) => {
                    let (glow, state) = self.activity.lane_glow(lane, position);
                    self.view.set_object_glow(lane, object, glow, state);
                }
                None => self.view.clear_object_glow(lane),
            }
        }
        self.view.update(delta, &highway);

        let (left, right) = if self.config.input.auto_play.lasers {
            (left, right)
        } else {
            (
                LaserSample {
                    value: self.laser_inputs[0],
                    ..LaserSample::IDLE
                },
                LaserSample {
                    value: self.laser_inputs[1],
                    ..LaserSample::IDLE
                },
            )
        };
        let critical_line = self.critical_line(left, right);

        let transforms = self.view.transforms();
        self.report = FrameReport {
            position,
            crossings: crossing_count,
            judgements: judgement_count,
            path,
            highway,
            near: transforms.camera.near,
            far: transforms.camera.far,
            horizon_height: transforms.horizon_height,
            critical_line,
            laser_alpha: self.activity.laser_state().alpha(),
            lanes: std::array::from_fn(|i| {
                let lane = Lane::ALL[i];
                let (glow, glow_state) = self.activity.lane_glow(lane, position);
                LaneVisual {
                    active_object: self.activity.active_object(lane),
                    effect_active: self.activity.effect_active(lane),
                    glow,
                    glow_state,
                }
            }),
        };
        tracing::trace!(position, crossings = crossing_count, "frame");
        &self.report
    }

    fn critical_line(&self, left: LaserSample, right: LaserSample) -> CriticalLine {
        let transforms = self.view.transforms();
        let camera = &transforms.camera;

        let origin = camera.project(&transforms.reference_zoomed, Vec3::ZERO);
        let cursor = |x: f32| {
            camera.project(&transforms.reference_zoomed, Vec3::new(x, 0.0, 0.0)).x - origin.x
        };

        let crit = &transforms.critical_line;
        let west = camera.project(crit, Vec3::NEG_X);
        let east = camera.project(crit, Vec3::X);
        let across = east - west;
        let rotation = across.y.atan2(across.x).to_degrees()
            + self.control.crit_line_effect_roll() * CRIT_LINE_EFFECT_DEGREES;

        CriticalLine {
            position: camera.project(crit, Vec3::ZERO),
            rotation,
            cursors: [
                cursor(left.cursor_x(Lane::LASER_L)),
                cursor(right.cursor_x(Lane::LASER_R)),
            ],
        }
    }

    fn dispatch_crossing(&mut self, chart: &Chart, crossing: &Crossing, quarter_note: Time) {
        use CrossingKind::*;
        use PlayDirection::*;

        let direction = crossing.direction;
        match (crossing.item, crossing.kind, direction) {
            (PlaybackItem::Object(id), HeadCrossPrimary, Forward)
            | (PlaybackItem::Object(id), TailCrossSecondary, Backward) => {
                self.view.appear(chart, id);
            }
            (PlaybackItem::Object(id), HeadCrossPrimary, Backward)
            | (PlaybackItem::Object(id), TailCrossSecondary, Forward) => {
                self.view.disappear(chart, id);
            }
            (PlaybackItem::Object(id), HeadCrossCritical, Forward)
            | (PlaybackItem::Object(id), TailCrossCritical, Backward) => {
                let cue =
                    self.activity
                        .object_begin(chart, id, direction, quarter_note, &mut self.audio);
                if let Some(cue) = cue {
                    self.control.shake_camera(cue.shake);
                    if let Some(roll) = cue.roll_impulse {
                        self.control.apply_roll_impulse(roll);
                    }
                }
            }
            (PlaybackItem::Object(id), TailCrossCritical, Forward)
            | (PlaybackItem::Object(id), HeadCrossCritical, Backward) => {
                self.activity.object_end(chart, id, direction, &mut self.audio);
            }
            (PlaybackItem::Event(id), HeadCrossCritical, Forward)
            | (PlaybackItem::Event(id), TailCrossCritical, Backward) => {
                self.trigger_event(chart, id, direction, quarter_note);
            }
            (PlaybackItem::Event(_), ..) => {}
        }
    }

    fn trigger_event(
        &mut self,
        chart: &Chart,
        id: EventId,
        direction: PlayDirection,
        quarter_note: Time,
    ) {
        let event = chart.event(id);
        tracing::trace!(event = id.index(), ?direction, "event triggered");

        if direction == PlayDirection::Forward {
            if self
                .activity
                .apply_audio_event(&event.kind, quarter_note, &mut self.audio)
            {
                return;
            }
            match event.kind {
                EventKind::LaserParams { side, params } => {
                    self.control.set_laser_params(side, params);
                }
                EventKind::LaserApplication { application } => {
                    self.control.set_laser_application(application);
                }
                _ => {}
            }
        }

        let measure = chart.control_point_at(event.position).measure_duration();
        match event.kind {
            EventKind::SpinImpulse { params } => {
                self.control.apply_spin(params, event.position, measure);
            }
            EventKind::SwingImpulse { params } => {
                self.control.apply_swing(params, event.position, measure);
            }
            EventKind::WobbleImpulse { params } => {
                self.control.apply_wobble(params, event.position, measure);
            }
            _ => {}
        }
    }

    fn dispatch_judgement(&mut self, chart: &Chart, event: &JudgeEvent) {
        if let Some(cue) = self.activity.handle_judgement(chart, event) {
            self.view.create_key_beam(cue.lane, cue.color);
        }
    }

    /// Button state change from the player. Ignored for auto-played buttons.
    pub fn button_input(&mut self, lane: Lane, pressed: bool) {
        if !lane.is_button() || self.config.input.auto_play.buttons {
            return;
        }
        let chart = Arc::clone(&self.chart);
        let position = self.chart_position();

        let mut events = std::mem::take(&mut self.judge_events);
        events.clear();
        if pressed {
            if self.judge.press(lane, position, &mut events).is_none() {
                self.view.create_key_beam(lane, Vec3::ONE);
            }
        } else {
            self.judge.release(lane, position, &mut events);
        }
        for event in &events {
            self.dispatch_judgement(&chart, event);
        }
        self.judge_events = events;
    }

    /// Player laser cursor in `[0, 1]`, used when lasers are not auto-played.
    pub fn laser_input(&mut self, lane: Lane, value: f32) {
        if let Some(side) = lane.laser_side() {
            self.laser_inputs[side] = value.clamp(0.0, 1.0);
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.config.view.viewport_width = width;
        self.config.view.viewport_height = height;
        self.view.resize(width, height);
    }

    /// Releases every effect and renderable; the orchestrator can be started
    /// again afterwards.
    pub fn teardown(&mut self) {
        self.activity.release_all(&mut self.audio);
        self.audio.set_effects_enabled(false);
        self.view.reset();
        self.scheduler.reset();
        tracing::info!("session torn down");
    }
}
