//! Keeps per-lane gameplay activity (held objects, judgement-driven effect
//! flags, the shared laser effect) in step with the playback clock.

use std::f32::consts::TAU;

use glam::Vec3;

use crate::{
    audio::{AudioEffectController, EffectDef, EffectType},
    chart::{Chart, EventKind, Lane, ObjectId, PerLane, Time},
    judge::{JudgeEvent, JudgeKind, JudgeResult},
    render::laser_range,
    timeline::PlayDirection,
};

/// Mix of the peaking filter before gain is applied.
pub const BASE_LASER_MIX: f32 = 0.8;

const FADE_IN_END: f32 = 0.1;
const FADE_OUT_START: f32 = 0.8;

const GLOW_FREQUENCY: f32 = 10.0;
const GLOW_AMPLITUDE: f32 = 0.35;
const IDLE_GLOW: f32 = -0.5;

/// Mixer slot shared by both lasers.
pub const LASER_SLOT: Lane = Lane::LASER_L;

/// Mix level for the laser effect at sweep `alpha`.
pub fn laser_mix(effect: EffectDef, alpha: f32, gain: f32) -> f32 {
    match effect.kind {
        EffectType::PeakingFilter => {
            let mut mix = BASE_LASER_MIX * gain;
            if alpha < FADE_IN_END {
                mix *= alpha / FADE_IN_END;
            } else if alpha > FADE_OUT_START {
                mix *= (1.0 - alpha) / (1.0 - FADE_OUT_START);
            }
            mix
        }
        EffectType::HighPassFilter | EffectType::LowPassFilter => gain,
        _ => 1.0,
    }
}

/// Color of the key beam flashed for a judgement.
pub fn key_beam_color(result: JudgeResult) -> Vec3 {
    match result.kind {
        JudgeKind::Passive | JudgeKind::Perfect | JudgeKind::Critical => Vec3::new(1.0, 1.0, 0.0),
        JudgeKind::Near if result.is_early() => Vec3::new(1.0, 0.0, 1.0),
        JudgeKind::Near => Vec3::new(0.5, 1.0, 0.25),
        JudgeKind::Bad | JudgeKind::Miss => Vec3::new(1.0, 0.0, 0.0),
    }
}

/// Laser value at a position, read from the most recent object on the lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserSample {
    /// Right lane values are mirrored so both lanes read 0 at home.
    pub value: f32,
    /// 2 for range-extended segments.
    pub range: f32,
}

impl LaserSample {
    pub const IDLE: LaserSample = LaserSample {
        value: 0.0,
        range: 1.0,
    };

    /// Lateral cursor position in highway widths.
    pub fn cursor_x(&self, lane: Lane) -> f32 {
        let x = (self.value - 0.5) * laser_range(false) * self.range;
        if lane == Lane::LASER_R {
            -x
        } else {
            x
        }
    }
}

pub fn sample_laser(chart: &Chart, lane: Lane, position: Time) -> LaserSample {
    let Some(obj) = chart.most_recent_object(lane, position) else {
        return LaserSample::IDLE;
    };
    if position > obj.end_position() {
        return LaserSample::IDLE;
    }
    let value = chart.sample_value(obj.id, position);
    let range_extended = obj.analog().is_some_and(|a| a.range_extended);
    LaserSample {
        value: if lane == Lane::LASER_R { 1.0 - value } else { value },
        range: if range_extended { 2.0 } else { 1.0 },
    }
}

/// Visual and audio side effects of a slam reaching the critical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlamCue {
    pub shake: i8,
    pub roll_impulse: Option<i8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyBeamCue {
    pub lane: Lane,
    pub color: Vec3,
}

/// State of the shared laser effect for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LaserState {
    pub active: [bool; 2],
    pub alphas: [f32; 2],
}

impl LaserState {
    pub fn any_active(&self) -> bool {
        self.active[0] || self.active[1]
    }

    /// Sweep driving the shared slot; the louder lane wins when both play.
    pub fn alpha(&self) -> f32 {
        match self.active {
            [true, true] => self.alphas[0].max(self.alphas[1]),
            [true, false] => self.alphas[0],
            [false, true] => self.alphas[1],
            [false, false] => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaneActivity {
    active_objects: PerLane<Option<ObjectId>>,
    has_active_effect: PerLane<bool>,
    current_effects: PerLane<Option<EffectDef>>,
    laser_effect: EffectDef,
    laser: LaserState,
    laser_slot_installed: bool,
    laser_gain: f32,
    slam_volume: f32,
    defaults: (f32, f32),
}

fn sign(value: f32) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

impl LaneActivity {
    pub fn new(laser_gain: f32, slam_volume: f32) -> Self {
        Self {
            active_objects: PerLane::default(),
            has_active_effect: PerLane::filled(true),
            current_effects: PerLane::default(),
            laser_effect: EffectDef::default(),
            laser: LaserState::default(),
            laser_slot_installed: false,
            laser_gain,
            slam_volume,
            defaults: (laser_gain, slam_volume),
        }
    }

    pub fn active_object(&self, lane: Lane) -> Option<ObjectId> {
        self.active_objects[lane]
    }

    pub fn has_active_effect(&self, lane: Lane) -> bool {
        self.has_active_effect[lane]
    }

    pub fn current_effect(&self, lane: Lane) -> Option<EffectDef> {
        self.current_effects[lane]
    }

    pub fn laser_effect(&self) -> EffectDef {
        self.laser_effect
    }

    pub fn laser_gain(&self) -> f32 {
        self.laser_gain
    }

    pub fn slam_volume(&self) -> f32 {
        self.slam_volume
    }

    pub fn laser_state(&self) -> &LaserState {
        &self.laser
    }

    pub fn lasers_active(&self) -> bool {
        self.laser.any_active()
    }

    /// Whether the shared laser slot currently holds an effect, with or
    /// without a laser playing.
    pub fn laser_slot_installed(&self) -> bool {
        self.laser_slot_installed
    }

    fn install_laser_effect(
        &mut self,
        quarter_note: Time,
        effect: EffectDef,
        mix: f32,
        audio: &mut impl AudioEffectController,
    ) {
        audio.set_effect(LASER_SLOT, quarter_note, effect, mix);
        self.laser_slot_installed = true;
    }

    fn remove_laser_effect(&mut self, audio: &mut impl AudioEffectController) {
        audio.remove_effect(LASER_SLOT);
        self.laser_slot_installed = false;
    }

    /// `has_active_effect && active object`, with the left laser slot also
    /// reflecting the right laser.
    pub fn effect_active(&self, lane: Lane) -> bool {
        let own = |l: Lane| self.has_active_effect[l] && self.active_objects[l].is_some();
        if lane == LASER_SLOT {
            own(Lane::LASER_L) || own(Lane::LASER_R)
        } else {
            own(lane)
        }
    }

    fn activate_laser(
        &mut self,
        side: usize,
        quarter_note: Time,
        audio: &mut impl AudioEffectController,
    ) {
        if !self.laser.any_active() {
            self.install_laser_effect(quarter_note, self.laser_effect, BASE_LASER_MIX, audio);
        }
        self.laser.active[side] = true;
    }

    /// An object entered the critical line. Slams only cue while moving
    /// forward.
    pub fn object_begin(
        &mut self,
        chart: &Chart,
        object: ObjectId,
        direction: PlayDirection,
        quarter_note: Time,
        audio: &mut impl AudioEffectController,
    ) -> Option<SlamCue> {
        let obj = chart.object(object);
        let lane = obj.lane;

        let Some(analog) = obj.analog() else {
            if !obj.is_instant() {
                self.active_objects[lane] = Some(object);
            }
            return None;
        };

        let mut cue = None;
        if obj.is_instant() && direction == PlayDirection::Forward {
            let shake = -sign(analog.final_value - analog.initial_value);
            let outer_edge = if lane == Lane::LASER_L { 0.0 } else { 1.0 };
            let roll_impulse =
                (analog.initial_value == outer_edge && analog.next.is_none()).then_some(-shake);
            audio.play_slam(self.slam_volume);
            cue = Some(SlamCue {
                shake,
                roll_impulse,
            });
        }

        if let Some(side) = lane.laser_side() {
            if !self.laser.active[side] {
                self.activate_laser(side, quarter_note, audio);
            }
        }
        self.active_objects[lane] = Some(chart.head(object));
        cue
    }

    /// An object left the critical line.
    pub fn object_end(
        &mut self,
        chart: &Chart,
        object: ObjectId,
        direction: PlayDirection,
        audio: &mut impl AudioEffectController,
    ) {
        let obj = chart.object(object);
        let lane = obj.lane;

        let Some(analog) = obj.analog() else {
            // a hold starting where this one ended may already own the lane
            if self.active_objects[lane] == Some(object) {
                self.active_objects[lane] = None;
            }
            return;
        };

        let chain_edge = match direction {
            PlayDirection::Forward => analog.next.is_none(),
            PlayDirection::Backward => analog.previous.is_none(),
        };
        if !chain_edge {
            return;
        }

        let head = chart.head(object);
        let owner = self.active_objects[lane];
        if owner.is_none() {
            tracing::warn!(lane = lane.index(), object = object.index(), "laser ended while idle");
        }
        debug_assert!(owner.is_some(), "laser {object:?} ended on an idle lane");
        match owner {
            Some(active) if active == head => self.active_objects[lane] = None,
            Some(_) => return,
            None => {}
        }
        if let Some(side) = lane.laser_side() {
            self.laser.active[side] = false;
            if !self.laser.any_active() {
                self.remove_laser_effect(audio);
            }
        }
    }

    /// Restores the state of an object already spanning the critical line
    /// after a seek, without cues.
    pub fn resume_object(
        &mut self,
        chart: &Chart,
        object: ObjectId,
        quarter_note: Time,
        audio: &mut impl AudioEffectController,
    ) {
        let obj = chart.object(object);
        if obj.is_instant() && !obj.lane.is_analog() {
            return;
        }
        if let Some(side) = obj.lane.laser_side() {
            if !self.laser.active[side] {
                self.activate_laser(side, quarter_note, audio);
            }
        }
        self.active_objects[obj.lane] = Some(chart.head(object));
    }

    /// Updates effect flags from a judgement and returns the key beam to
    /// flash, if any.
    pub fn handle_judgement(&mut self, chart: &Chart, event: &JudgeEvent) -> Option<KeyBeamCue> {
        match *event {
            JudgeEvent::TickProcessed { object, result, .. } => {
                let obj = chart.object(object);
                if obj.is_instant() {
                    (result.kind != JudgeKind::Miss).then(|| KeyBeamCue {
                        lane: obj.lane,
                        color: key_beam_color(result),
                    })
                } else {
                    self.has_active_effect[obj.lane] = result.kind != JudgeKind::Miss;
                    None
                }
            }
            JudgeEvent::HoldPressed { object, .. } => {
                let lane = chart.object(object).lane;
                self.has_active_effect[lane] = true;
                Some(KeyBeamCue {
                    lane,
                    color: key_beam_color(JudgeResult::new(JudgeKind::Passive, 0.0)),
                })
            }
            JudgeEvent::HoldReleased { object, .. } => {
                self.has_active_effect[chart.object(object).lane] = false;
                None
            }
            JudgeEvent::ChipPressed { .. } => None,
        }
    }

    /// Applies the audio-side events that only fire in forward playback.
    /// Returns false for events handled elsewhere.
    pub fn apply_audio_event(
        &mut self,
        kind: &EventKind,
        quarter_note: Time,
        audio: &mut impl AudioEffectController,
    ) -> bool {
        match kind {
            EventKind::EffectKind { slot, effect } => {
                self.current_effects[*slot] = *effect;
                match effect {
                    Some(effect) => audio.set_effect(*slot, quarter_note, *effect, 1.0),
                    None => audio.remove_effect(*slot),
                }
                if *slot == LASER_SLOT {
                    self.laser_slot_installed = effect.is_some();
                }
            }
            EventKind::LaserFilterKind { effect } => {
                self.laser_effect = *effect;
                let mix = audio.effect_mix(LASER_SLOT);
                self.install_laser_effect(quarter_note, *effect, mix, audio);
            }
            EventKind::LaserFilterGain { gain } => self.laser_gain = *gain,
            EventKind::SlamVolume { volume } => self.slam_volume = *volume,
            _ => return false,
        }
        true
    }

    pub fn apply_effect_activity(&self, audio: &mut impl AudioEffectController) {
        for lane in Lane::ALL {
            audio.set_effect_active(lane, self.effect_active(lane));
        }
    }

    /// Recomputes the laser sweep and mix for `position`.
    pub fn update_laser_effects(
        &mut self,
        chart: &Chart,
        position: Time,
        quarter_note: Time,
        audio: &mut impl AudioEffectController,
    ) {
        if !self.laser.any_active() {
            self.laser.alphas = [0.0; 2];
            audio.set_effect_mix(LASER_SLOT, 0.0);
            return;
        }

        for (side, lane) in Lane::LASERS.into_iter().enumerate() {
            self.laser.alphas[side] = if self.laser.active[side] {
                sample_laser(chart, lane, position).value
            } else {
                0.0
            };
        }

        let alpha = self.laser.alpha();
        audio.update_effect(LASER_SLOT, quarter_note, alpha);
        audio.set_effect_mix(
            LASER_SLOT,
            laser_mix(self.laser_effect, alpha, self.laser_gain),
        );
    }

    /// Glow intensity and state for the object held on `lane`.
    pub fn lane_glow(&self, lane: Lane, position: Time) -> (f32, u8) {
        if self.has_active_effect[lane] {
            let t = position as f32;
            let glow = (GLOW_FREQUENCY * TAU * t).cos() * GLOW_AMPLITUDE;
            let state = 2 + ((position * 20.0).floor() as i64).rem_euclid(2) as u8;
            (glow, state)
        } else {
            (IDLE_GLOW, 0)
        }
    }

    /// Removes every installed effect and clears activity.
    pub fn release_all(&mut self, audio: &mut impl AudioEffectController) {
        for lane in Lane::ALL {
            let installed = self.current_effects[lane].is_some()
                || (lane == LASER_SLOT && self.laser_slot_installed);
            audio.set_effect_active(lane, false);
            if installed {
                audio.remove_effect(lane);
            }
        }
        tracing::debug!("released all lane effects");
        self.reset();
    }

    pub fn reset(&mut self) {
        let (gain, volume) = self.defaults;
        *self = Self::new(gain, volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::EffectBoard,
        chart::{AnalogSegment, ControlPoint},
    };

    fn peaking() -> EffectDef {
        EffectDef::new(EffectType::PeakingFilter)
    }

    #[test]
    fn peaking_mix_fades_at_the_extremes() {
        assert_eq!(laser_mix(peaking(), 0.0, 0.5), 0.0);
        assert_eq!(laser_mix(peaking(), 1.0, 0.5), 0.0);
        assert_eq!(laser_mix(peaking(), 0.45, 0.5), BASE_LASER_MIX * 0.5);
        assert!((laser_mix(peaking(), 0.05, 1.0) - 0.4).abs() < 1e-6);
        assert!((laser_mix(peaking(), 0.9, 1.0) - 0.4).abs() < 1e-5);
    }

    #[test]
    fn pass_filters_use_gain_and_others_full_mix() {
        let low = EffectDef::new(EffectType::LowPassFilter);
        assert_eq!(laser_mix(low, 0.0, 0.3), 0.3);
        assert_eq!(laser_mix(EffectDef::new(EffectType::Echo), 0.0, 0.3), 1.0);
    }

    fn laser_chart() -> (Chart, ObjectId) {
        let mut builder = Chart::builder();
        builder.control_point(ControlPoint::new(0.0, 120.0));
        let id = builder
            .analog(Lane::LASER_L, 1.0, 2.0, AnalogSegment::new(0.2, 0.8))
            .unwrap();
        (builder.build().unwrap(), id)
    }

    #[test]
    fn single_laser_drives_shared_slot() {
        let (chart, id) = laser_chart();
        let mut audio = EffectBoard::new();
        let mut activity = LaneActivity::new(0.5, 1.0);

        activity.object_begin(&chart, id, PlayDirection::Forward, 0.5, &mut audio);
        activity.update_laser_effects(&chart, 2.0, 0.5, &mut audio);
        activity.apply_effect_activity(&mut audio);

        let slot = audio.slot(LASER_SLOT);
        assert!(slot.active);
        assert_eq!(slot.effect, Some(peaking()));
        assert!((slot.alpha - 0.5).abs() < 1e-6);
        assert_eq!(activity.laser_state().alphas[1], 0.0);
        assert!((slot.mix - BASE_LASER_MIX * 0.5).abs() < 1e-6);

        activity.object_end(&chart, id, PlayDirection::Forward, &mut audio);
        activity.update_laser_effects(&chart, 3.1, 0.5, &mut audio);
        assert_eq!(audio.installed_count(), 0);
        assert_eq!(activity.active_object(Lane::LASER_L), None);
    }

    #[test]
    fn both_lasers_use_the_louder_sweep() {
        let mut builder = Chart::builder();
        let left = builder
            .analog(Lane::LASER_L, 0.0, 2.0, AnalogSegment::new(0.3, 0.3))
            .unwrap();
        let right = builder
            .analog(Lane::LASER_R, 0.0, 2.0, AnalogSegment::new(0.4, 0.4))
            .unwrap();
        let chart = builder.build().unwrap();
        let mut audio = EffectBoard::new();
        let mut activity = LaneActivity::new(0.5, 1.0);

        activity.object_begin(&chart, left, PlayDirection::Forward, 0.5, &mut audio);
        activity.object_begin(&chart, right, PlayDirection::Forward, 0.5, &mut audio);
        activity.update_laser_effects(&chart, 1.0, 0.5, &mut audio);

        assert!((audio.slot(LASER_SLOT).alpha - 0.6).abs() < 1e-6);
    }

    #[test]
    fn slam_at_outer_edge_cues_roll_impulse() {
        let mut builder = Chart::builder();
        let slam = builder
            .analog(Lane::LASER_L, 1.0, 0.0, AnalogSegment::new(0.0, 1.0))
            .unwrap();
        let chart = builder.build().unwrap();
        let mut audio = EffectBoard::new();
        let mut activity = LaneActivity::new(0.5, 0.7);

        let cue = activity.object_begin(&chart, slam, PlayDirection::Forward, 0.5, &mut audio);
        assert_eq!(
            cue,
            Some(SlamCue {
                shake: -1,
                roll_impulse: Some(1)
            })
        );
        assert_eq!(audio.slams_played(), 1);
        assert_eq!(audio.last_slam_volume(), 0.7);

        activity.object_end(&chart, slam, PlayDirection::Forward, &mut audio);
        let cue = activity.object_begin(&chart, slam, PlayDirection::Backward, 0.5, &mut audio);
        assert_eq!(cue, None);
    }

    #[test]
    fn judgements_drive_effect_flags_and_key_beams() {
        let mut builder = Chart::builder();
        let chip = builder.button(Lane::BT_A, 1.0, 0.0).unwrap();
        let hold = builder.button(Lane::FX_L, 1.0, 1.0).unwrap();
        let chart = builder.build().unwrap();
        let mut audio = EffectBoard::new();
        let mut activity = LaneActivity::new(0.5, 1.0);

        activity.object_begin(&chart, hold, PlayDirection::Forward, 0.5, &mut audio);
        assert!(activity.effect_active(Lane::FX_L));

        let miss = JudgeResult::new(JudgeKind::Miss, 0.0);
        let tick = JudgeEvent::TickProcessed {
            object: hold,
            position: 1.5,
            result: miss,
        };
        assert_eq!(activity.handle_judgement(&chart, &tick), None);
        assert!(!activity.effect_active(Lane::FX_L));

        let pressed = JudgeEvent::HoldPressed {
            position: 1.6,
            object: hold,
        };
        let cue = activity.handle_judgement(&chart, &pressed);
        assert_eq!(cue.map(|c| c.color), Some(Vec3::new(1.0, 1.0, 0.0)));
        assert!(activity.effect_active(Lane::FX_L));

        let early_near = JudgeEvent::TickProcessed {
            object: chip,
            position: 1.0,
            result: JudgeResult::new(JudgeKind::Near, -0.04),
        };
        let cue = activity.handle_judgement(&chart, &early_near);
        assert_eq!(
            cue,
            Some(KeyBeamCue {
                lane: Lane::BT_A,
                color: Vec3::new(1.0, 0.0, 1.0)
            })
        );
        let chip_miss = JudgeEvent::TickProcessed {
            object: chip,
            position: 1.2,
            result: miss,
        };
        assert_eq!(activity.handle_judgement(&chart, &chip_miss), None);
    }

    #[test]
    fn glow_pulses_only_with_active_effect() {
        let mut activity = LaneActivity::new(0.5, 1.0);
        let (glow, state) = activity.lane_glow(Lane::BT_A, 0.0);
        assert!((glow - 0.35).abs() < 1e-6);
        assert_eq!(state, 2);
        assert_eq!(activity.lane_glow(Lane::BT_A, 0.06).1, 3);

        let mut builder = Chart::builder();
        let hold = builder.button(Lane::BT_A, 0.0, 1.0).unwrap();
        let chart = builder.build().unwrap();
        activity.handle_judgement(
            &chart,
            &JudgeEvent::HoldReleased {
                position: 0.5,
                object: hold,
            },
        );
        assert_eq!(activity.lane_glow(Lane::BT_A, 0.5), (-0.5, 0));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "ended on an idle lane")]
    fn laser_ending_on_an_idle_lane_asserts() {
        let (chart, id) = laser_chart();
        let mut audio = EffectBoard::new();
        let mut activity = LaneActivity::new(0.5, 1.0);
        activity.object_end(&chart, id, PlayDirection::Forward, &mut audio);
    }

    #[test]
    fn laser_filter_outside_a_laser_is_released() {
        let mut audio = EffectBoard::new();
        let mut activity = LaneActivity::new(0.5, 1.0);
        activity.apply_audio_event(
            &EventKind::LaserFilterKind {
                effect: EffectDef::new(EffectType::LowPassFilter),
            },
            0.5,
            &mut audio,
        );
        assert!(!activity.lasers_active());
        assert!(activity.laser_slot_installed());
        assert_eq!(audio.installed_count(), 1);

        activity.release_all(&mut audio);
        assert_eq!(audio.installed_count(), 0);
        assert!(!activity.laser_slot_installed());
    }

    #[test]
    fn release_all_removes_every_effect() {
        let (chart, id) = laser_chart();
        let mut audio = EffectBoard::new();
        let mut activity = LaneActivity::new(0.5, 1.0);

        activity.object_begin(&chart, id, PlayDirection::Forward, 0.5, &mut audio);
        activity.apply_audio_event(
            &EventKind::EffectKind {
                slot: Lane::BT_B,
                effect: Some(EffectDef::new(EffectType::Flanger)),
            },
            0.5,
            &mut audio,
        );
        assert_eq!(audio.installed_count(), 2);

        activity.release_all(&mut audio);
        assert_eq!(audio.installed_count(), 0);
        assert!(!activity.lasers_active());
        assert_eq!(activity.active_object(Lane::LASER_L), None);
    }
}
