use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

use crate::chart::{Lane, PerLane, Time};

/// Source of the authoritative playback position.
///
/// The clock advances independently of the frame loop; the core reads it once
/// per frame and only writes it when seeking.
pub trait AudioClock {
    fn position(&self) -> Time;
    fn seek(&mut self, position: Time);
}

/// Clock shared between the audio thread (which advances it) and the frame
/// loop (which snapshots it). Reads and writes are single atomic operations.
#[derive(Debug, Clone, Default)]
pub struct SharedClock {
    bits: Arc<AtomicU64>,
}

impl SharedClock {
    pub fn new(position: Time) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(position.to_bits())),
        }
    }

    /// Moves the clock by `delta` seconds. Called by the audio producer.
    pub fn advance(&self, delta: Time) {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }
}

impl AudioClock for SharedClock {
    fn position(&self) -> Time {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    fn seek(&mut self, position: Time) {
        self.bits.store(position.to_bits(), Ordering::Release);
    }
}

/// Audio effects the mixer can apply to a lane slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectType {
    PeakingFilter,
    LowPassFilter,
    HighPassFilter,
    BitCrusher,
    Retrigger,
    Gate,
    Flanger,
    Phaser,
    Wobble,
    TapeStop,
    SideChain,
    Echo,
}

/// Effect definition handed to the mixer. Musical-time parameters are scaled
/// by the period hint passed alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectDef {
    pub kind: EffectType,
}

impl EffectDef {
    pub fn new(kind: EffectType) -> Self {
        Self { kind }
    }

    pub fn is_filter(&self) -> bool {
        matches!(
            self.kind,
            EffectType::PeakingFilter | EffectType::LowPassFilter | EffectType::HighPassFilter
        )
    }
}

impl Default for EffectDef {
    fn default() -> Self {
        Self::new(EffectType::PeakingFilter)
    }
}

/// Operations the core issues to the audio mixer. Slots are lane indices; both
/// lasers share the [`Lane::LASER_L`] slot.
pub trait AudioEffectController {
    fn set_effect(&mut self, slot: Lane, period: Time, effect: EffectDef, mix: f32);
    fn update_effect(&mut self, slot: Lane, period: Time, alpha: f32);
    fn remove_effect(&mut self, slot: Lane);
    fn set_effect_mix(&mut self, slot: Lane, mix: f32);
    fn effect_mix(&self, slot: Lane) -> f32;
    fn set_effect_active(&mut self, slot: Lane, active: bool);
    /// Global bypass for every slot.
    fn set_effects_enabled(&mut self, enabled: bool);
    /// One-shot slam sample.
    fn play_slam(&mut self, _volume: f32) {}
}

/// Observable state of one effect slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SlotState {
    pub effect: Option<EffectDef>,
    pub period: Time,
    pub alpha: f32,
    pub mix: f32,
    pub active: bool,
}

/// In-memory [`AudioEffectController`] that records the latest value of every
/// slot parameter.
#[derive(Debug, Clone)]
pub struct EffectBoard {
    slots: PerLane<SlotState>,
    enabled: bool,
    slams_played: usize,
    last_slam_volume: f32,
}

impl Default for EffectBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectBoard {
    pub fn new() -> Self {
        Self {
            slots: PerLane::default(),
            enabled: false,
            slams_played: 0,
            last_slam_volume: 0.0,
        }
    }

    pub fn slot(&self, slot: Lane) -> &SlotState {
        &self.slots[slot]
    }

    pub fn effects_enabled(&self) -> bool {
        self.enabled
    }

    pub fn slams_played(&self) -> usize {
        self.slams_played
    }

    pub fn last_slam_volume(&self) -> f32 {
        self.last_slam_volume
    }

    /// Number of slots that currently hold an effect.
    pub fn installed_count(&self) -> usize {
        self.slots.iter().filter(|(_, s)| s.effect.is_some()).count()
    }
}

impl AudioEffectController for EffectBoard {
    fn set_effect(&mut self, slot: Lane, period: Time, effect: EffectDef, mix: f32) {
        tracing::trace!(slot = slot.index(), kind = ?effect.kind, mix, "set effect");
        let state = &mut self.slots[slot];
        state.effect = Some(effect);
        state.period = period;
        state.mix = mix;
        state.alpha = 0.0;
    }

    fn update_effect(&mut self, slot: Lane, period: Time, alpha: f32) {
        let state = &mut self.slots[slot];
        state.period = period;
        state.alpha = alpha;
    }

    fn remove_effect(&mut self, slot: Lane) {
        tracing::trace!(slot = slot.index(), "remove effect");
        let state = &mut self.slots[slot];
        state.effect = None;
        state.mix = 0.0;
        state.alpha = 0.0;
    }

    fn set_effect_mix(&mut self, slot: Lane, mix: f32) {
        self.slots[slot].mix = mix;
    }

    fn effect_mix(&self, slot: Lane) -> f32 {
        self.slots[slot].mix
    }

    fn set_effect_active(&mut self, slot: Lane, active: bool) {
        self.slots[slot].active = active;
    }

    fn set_effects_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn play_slam(&mut self, volume: f32) {
        self.slams_played += 1;
        self.last_slam_volume = volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_clock_handles_see_the_same_position() {
        let mut frame_side = SharedClock::new(-2.0);
        let audio_side = frame_side.clone();

        audio_side.advance(0.5);
        assert_eq!(frame_side.position(), -1.5);

        frame_side.seek(10.0);
        assert_eq!(audio_side.position(), 10.0);
    }

    #[test]
    fn board_tracks_slot_lifecycle() {
        let mut board = EffectBoard::new();
        board.set_effect(Lane::LASER_L, 0.5, EffectDef::default(), 0.4);
        board.update_effect(Lane::LASER_L, 0.5, 0.3);
        board.set_effect_active(Lane::LASER_L, true);

        let slot = board.slot(Lane::LASER_L);
        assert_eq!(slot.effect, Some(EffectDef::default()));
        assert_eq!(slot.alpha, 0.3);
        assert_eq!(board.effect_mix(Lane::LASER_L), 0.4);
        assert_eq!(board.installed_count(), 1);

        board.remove_effect(Lane::LASER_L);
        assert_eq!(board.installed_count(), 0);
    }
}
