//! Highway motion: laser-driven roll, camera shake, slam roll impulses and the
//! spin / swing / wobble animations triggered by chart events.

use std::f32::consts::PI;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    chart::{LaserSide, Time},
    mapping::PathValues,
    render::HighwayParams,
};

/// How strongly a laser tilts the highway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollScale {
    Zero,
    Normal,
    Bigger,
    Biggest,
}

impl RollScale {
    pub fn multiplier(self) -> f32 {
        match self {
            RollScale::Zero => 0.0,
            RollScale::Normal => 1.0,
            RollScale::Bigger => 1.75,
            RollScale::Biggest => 2.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaserParams {
    pub scale: RollScale,
}

impl Default for LaserParams {
    fn default() -> Self {
        Self {
            scale: RollScale::Normal,
        }
    }
}

/// How the two laser contributions combine into one roll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaserApplication {
    #[default]
    Additive,
    /// Only the contribution with the larger magnitude is used.
    KeepMax,
}

/// Full turn of extra roll over `duration` measures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinParams {
    pub direction: i8,
    pub duration: f64,
}

/// Damped back-and-forth roll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingParams {
    pub direction: i8,
    pub duration: f64,
    /// Peak roll in degrees.
    pub amplitude: f32,
    pub repeat: u8,
}

/// Damped lateral oscillation of the highway.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WobbleParams {
    pub direction: i8,
    pub duration: f64,
    /// Peak offset in lane-widths.
    pub amplitude: f32,
    pub frequency: u8,
    pub decay: f32,
}

/// Motion tuning for a highway layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighwayControlConfig {
    /// Roll in degrees for a laser fully deflected at normal scale.
    pub laser_roll_degrees: f32,
    /// Maximum change of laser roll per second, in degrees.
    pub laser_roll_speed: f32,
    pub shake_duration: f32,
    pub shake_amplitude: f32,
    pub roll_impulse_duration: f32,
    pub roll_impulse_degrees: f32,
}

impl HighwayControlConfig {
    /// Preset matching the classic 16:8 KSH highway.
    pub fn default_ksh168() -> Self {
        Self {
            laser_roll_degrees: 10.0,
            laser_roll_speed: 120.0,
            shake_duration: 0.083,
            shake_amplitude: 0.05,
            roll_impulse_duration: 0.35,
            roll_impulse_degrees: 6.0,
        }
    }
}

impl Default for HighwayControlConfig {
    fn default() -> Self {
        Self::default_ksh168()
    }
}

/// Per-frame inputs resolved by the frame loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInputs {
    pub position: Time,
    pub left_laser: f32,
    /// Already mirrored so both lasers read zero at their home edge.
    pub right_laser: f32,
    pub path: PathValues,
}

#[derive(Debug, Clone, Copy)]
struct Decay {
    direction: f32,
    remaining: f32,
}

#[derive(Debug, Clone, Copy)]
struct Animation<P> {
    params: P,
    start: Time,
    length: Time,
}

impl<P> Animation<P> {
    fn new(params: P, measures: f64, start: Time, measure_duration: Time) -> Self {
        Self {
            params,
            start,
            length: measures * measure_duration,
        }
    }

    /// Progress in `[0, 1)` while running.
    fn progress(&self, position: Time) -> Option<f32> {
        if self.length <= 0.0 {
            return None;
        }
        let progress = (position - self.start) / self.length;
        (0.0..1.0).contains(&progress).then_some(progress as f32)
    }
}

#[derive(Debug, Clone)]
pub struct HighwayControl {
    config: HighwayControlConfig,
    inputs: ControlInputs,
    laser_params: [LaserParams; 2],
    application: LaserApplication,
    laser_roll: f32,
    shake: Option<Decay>,
    roll_impulse: Option<Decay>,
    spin: Option<Animation<SpinParams>>,
    swing: Option<Animation<SwingParams>>,
    wobble: Option<Animation<WobbleParams>>,
    effect_roll: f32,
    effect_offset: f32,
    crit_line_effect_roll: f32,
    camera_offset: Vec3,
}

impl HighwayControl {
    pub fn new(config: HighwayControlConfig) -> Self {
        Self {
            config,
            inputs: ControlInputs::default(),
            laser_params: [LaserParams::default(); 2],
            application: LaserApplication::default(),
            laser_roll: 0.0,
            shake: None,
            roll_impulse: None,
            spin: None,
            swing: None,
            wobble: None,
            effect_roll: 0.0,
            effect_offset: 0.0,
            crit_line_effect_roll: 0.0,
            camera_offset: Vec3::ZERO,
        }
    }

    pub fn set_inputs(&mut self, inputs: ControlInputs) {
        self.inputs = inputs;
    }

    pub fn inputs(&self) -> &ControlInputs {
        &self.inputs
    }

    pub fn set_laser_params(&mut self, side: LaserSide, params: LaserParams) {
        for (i, slot) in self.laser_params.iter_mut().enumerate() {
            if side.includes(i) {
                *slot = params;
            }
        }
    }

    pub fn laser_params(&self, side: usize) -> LaserParams {
        self.laser_params[side.min(1)]
    }

    pub fn set_laser_application(&mut self, application: LaserApplication) {
        self.application = application;
    }

    pub fn shake_camera(&mut self, direction: i8) {
        self.shake = Some(Decay {
            direction: f32::from(direction),
            remaining: self.config.shake_duration,
        });
    }

    pub fn apply_roll_impulse(&mut self, direction: i8) {
        self.roll_impulse = Some(Decay {
            direction: f32::from(direction),
            remaining: self.config.roll_impulse_duration,
        });
    }

    /// Starts a spin at chart position `start`; its length is given in
    /// measures of `measure_duration` seconds.
    pub fn apply_spin(&mut self, params: SpinParams, start: Time, measure_duration: Time) {
        self.spin = Some(Animation::new(params, params.duration, start, measure_duration));
    }

    pub fn apply_swing(&mut self, params: SwingParams, start: Time, measure_duration: Time) {
        self.swing = Some(Animation::new(params, params.duration, start, measure_duration));
    }

    pub fn apply_wobble(&mut self, params: WobbleParams, start: Time, measure_duration: Time) {
        self.wobble = Some(Animation::new(params, params.duration, start, measure_duration));
    }

    /// Clears every impulse and animation; used when a session restarts.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Target roll in degrees for the current laser inputs.
    pub fn target_laser_roll(&self) -> f32 {
        let amplitude = self.config.laser_roll_degrees;
        let left = -self.inputs.left_laser * self.laser_params[0].scale.multiplier() * amplitude;
        let right = self.inputs.right_laser * self.laser_params[1].scale.multiplier() * amplitude;
        match self.application {
            LaserApplication::Additive => left + right,
            LaserApplication::KeepMax => {
                if left.abs() >= right.abs() {
                    left
                } else {
                    right
                }
            }
        }
    }

    /// Advances smoothing and time-based impulses by `delta` seconds, then
    /// evaluates the position-based animations.
    pub fn update(&mut self, delta: f32) {
        let delta = delta.max(0.0);

        let target = self.target_laser_roll();
        let max_step = self.config.laser_roll_speed * delta;
        self.laser_roll += (target - self.laser_roll).clamp(-max_step, max_step);

        let shake_duration = self.config.shake_duration;
        let shake = Self::tick_decay(&mut self.shake, delta, shake_duration);
        self.camera_offset = Vec3::new(shake * self.config.shake_amplitude, 0.0, 0.0);

        let impulse_duration = self.config.roll_impulse_duration;
        let impulse = Self::tick_decay(&mut self.roll_impulse, delta, impulse_duration);
        let impulse_roll = impulse * self.config.roll_impulse_degrees / 360.0;

        let position = self.inputs.position;
        let mut effect_roll = impulse_roll;
        let mut crit_roll = 0.0;

        if let Some((spin, p)) = self.spin.and_then(|a| a.progress(position).map(|p| (a, p))) {
            let direction = f32::from(spin.params.direction);
            effect_roll += direction * (1.0 - (1.0 - p) * (1.0 - p));
            crit_roll += direction * (PI * p).sin();
        }
        if let Some((swing, p)) = self.swing.and_then(|a| a.progress(position).map(|p| (a, p))) {
            let direction = f32::from(swing.params.direction);
            let wave = (PI * p * f32::from(swing.params.repeat.max(1))).sin() * (1.0 - p);
            effect_roll += direction * swing.params.amplitude / 360.0 * wave;
            crit_roll += direction * wave;
        }
        self.effect_roll = effect_roll;
        self.crit_line_effect_roll = crit_roll.clamp(-1.0, 1.0);

        self.effect_offset = match self.wobble.and_then(|a| a.progress(position).map(|p| (a, p))) {
            Some((wobble, p)) => {
                let params = wobble.params;
                let wave = (2.0 * PI * f32::from(params.frequency) * p).sin();
                f32::from(params.direction) * params.amplitude * wave * (1.0 - p).powf(params.decay)
            }
            None => 0.0,
        };
    }

    /// Returns the normalised strength (1 at the start, 0 once finished) of a
    /// decaying impulse after advancing it.
    fn tick_decay(slot: &mut Option<Decay>, delta: f32, duration: f32) -> f32 {
        let Some(decay) = slot.as_mut() else {
            return 0.0;
        };
        decay.remaining -= delta;
        if decay.remaining <= 0.0 || duration <= 0.0 {
            *slot = None;
            return 0.0;
        }
        let alpha = decay.remaining / duration;
        let phase = 1.0 - alpha;
        decay.direction * (PI * phase).sin().max(alpha * alpha)
    }

    pub fn laser_roll(&self) -> f32 {
        self.laser_roll
    }

    /// Base roll from the path track, in turns.
    pub fn roll(&self) -> f32 {
        self.inputs.path.roll
    }

    /// Additive roll from impulses, in turns.
    pub fn effect_roll(&self) -> f32 {
        self.effect_roll
    }

    pub fn effect_offset(&self) -> f32 {
        self.effect_offset
    }

    /// Extra critical-line tilt in `[-1, 1]`.
    pub fn crit_line_effect_roll(&self) -> f32 {
        self.crit_line_effect_roll
    }

    pub fn camera_offset(&self) -> Vec3 {
        self.camera_offset
    }

    pub fn highway_params(&self) -> HighwayParams {
        HighwayParams {
            laser_roll: self.laser_roll,
            base_roll: self.inputs.path.roll,
            effect_roll: self.effect_roll,
            pitch: self.inputs.path.pitch,
            zoom: self.inputs.path.zoom,
            offset: self.inputs.path.offset,
            effect_offset: self.effect_offset,
            camera_offset: self.camera_offset,
        }
    }
}

impl Default for HighwayControl {
    fn default() -> Self {
        Self::new(HighwayControlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(position: Time) -> ControlInputs {
        ControlInputs {
            position,
            ..Default::default()
        }
    }

    #[test]
    fn laser_roll_approaches_target_at_bounded_speed() {
        let mut control = HighwayControl::default();
        control.set_inputs(ControlInputs {
            left_laser: 1.0,
            ..inputs(0.0)
        });

        control.update(0.05);
        assert!((control.laser_roll() + 6.0).abs() < 1e-4);

        control.update(1.0);
        assert!((control.laser_roll() + 10.0).abs() < 1e-4);
    }

    #[test]
    fn keep_max_uses_the_stronger_laser() {
        let mut control = HighwayControl::default();
        control.set_laser_application(LaserApplication::KeepMax);
        control.set_laser_params(LaserSide::Right, LaserParams { scale: RollScale::Biggest });
        control.set_inputs(ControlInputs {
            left_laser: 0.5,
            right_laser: 0.5,
            ..inputs(0.0)
        });

        assert!((control.target_laser_roll() - 12.5).abs() < 1e-4);
    }

    #[test]
    fn spin_follows_position_and_ends() {
        let mut control = HighwayControl::default();
        control.set_inputs(inputs(10.0));
        control.apply_spin(SpinParams { direction: 1, duration: 0.5 }, 10.0, 2.0);

        control.set_inputs(inputs(10.5));
        control.update(0.0);
        assert!((control.effect_roll() - 0.75).abs() < 1e-4);
        assert!(control.crit_line_effect_roll() > 0.99);

        control.set_inputs(inputs(11.0));
        control.update(0.0);
        assert_eq!(control.effect_roll(), 0.0);

        control.set_inputs(inputs(9.0));
        control.update(0.0);
        assert_eq!(control.effect_roll(), 0.0);
    }

    #[test]
    fn shake_decays_to_rest() {
        let mut control = HighwayControl::default();
        control.shake_camera(-1);
        control.update(0.01);
        assert!(control.camera_offset().x < 0.0);

        control.update(1.0);
        assert_eq!(control.camera_offset(), Vec3::ZERO);
    }

    #[test]
    fn wobble_moves_the_offset() {
        let mut control = HighwayControl::default();
        control.set_inputs(inputs(0.0));
        control.apply_wobble(
            WobbleParams {
                direction: 1,
                duration: 1.0,
                amplitude: 0.5,
                frequency: 1,
                decay: 1.0,
            },
            0.0,
            2.0,
        );
        control.set_inputs(inputs(0.5));
        control.update(0.0);
        assert!(control.effect_offset() > 0.0);
        assert_eq!(control.highway_params().effect_offset, control.effect_offset());
    }
}
