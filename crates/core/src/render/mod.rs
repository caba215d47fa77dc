//! Highway view: owns the per-lane renderables, key beams and glow state, and
//! turns them into an ordered draw list under the current transforms.

mod camera;
mod transform;

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use serde::Serialize;

pub use camera::Camera;
pub use transform::{
    apply_zoom, clip_distances, highway_at_roll, HighwayParams, TransformState, ViewSettings,
    CLIP_EPSILON, LENGTH_ADD, LENGTH_BASE, MIN_NEAR,
};

use crate::{
    chart::{Chart, Lane, ObjectId, PerLane, Time},
    scene::{LaserColors, Renderable, RenderableKind, LASER_LANE_SPACE},
};

/// Lanes that own a key beam (BT and FX).
pub const KEY_BEAM_LANES: usize = 6;

const KEY_BEAM_DECAY: f32 = 10.0;
const OVERLAP_CHIP_WIDTH: f32 = 0.8;
const LASER_Z_SCALE: f32 = 1.0;
const INACTIVE_GLOW: f32 = -0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KeyBeam {
    pub color: Vec3,
    pub alpha: f32,
}

/// Glow override for the renderable currently held on a lane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlowInfo {
    pub object: ObjectId,
    pub glow: f32,
    pub glow_state: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DrawKind {
    Highway,
    KeyBeam(KeyBeam),
    Object(RenderableKind),
    LaserEntry,
    LaserExit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawItem {
    pub lane: Option<Lane>,
    pub object: Option<ObjectId>,
    pub kind: DrawKind,
    pub transform: Mat4,
    /// Highway-space length of object items, already folded into the
    /// transform of holds.
    pub length: f32,
    pub glow: f32,
    pub glow_state: u8,
}

impl DrawItem {
    fn plain(kind: DrawKind, lane: Option<Lane>, transform: Mat4) -> Self {
        Self {
            lane,
            object: None,
            kind,
            transform,
            length: 0.0,
            glow: 0.0,
            glow_state: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HighwayView {
    settings: ViewSettings,
    view_duration: Time,
    colors: LaserColors,
    renderables: PerLane<BTreeMap<ObjectId, Renderable>>,
    key_beams: [KeyBeam; KEY_BEAM_LANES],
    glow_infos: PerLane<Option<GlowInfo>>,
    lanes_active: PerLane<bool>,
    playback_position: Time,
    transforms: TransformState,
}

impl HighwayView {
    pub fn new(settings: ViewSettings, view_duration: Time, colors: LaserColors) -> Self {
        Self {
            settings,
            view_duration,
            colors,
            renderables: PerLane::default(),
            key_beams: [KeyBeam::default(); KEY_BEAM_LANES],
            glow_infos: PerLane::default(),
            lanes_active: PerLane::default(),
            playback_position: 0.0,
            transforms: TransformState::compute(&HighwayParams::default(), &settings),
        }
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn transforms(&self) -> &TransformState {
        &self.transforms
    }

    pub fn camera(&self) -> &Camera {
        &self.transforms.camera
    }

    pub fn critical_height(&self) -> f32 {
        self.transforms.critical_height
    }

    pub fn set_playback_position(&mut self, position: Time) {
        self.playback_position = position;
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.settings.viewport_width = width;
        self.settings.viewport_height = height;
    }

    /// Creates the renderable for an object entering the window.
    pub fn appear(&mut self, chart: &Chart, object: ObjectId) {
        let renderable =
            Renderable::for_object(chart, object, self.view_duration, LENGTH_BASE, &self.colors);
        let lane = renderable.lane;
        let previous = self.renderables[lane].insert(object, renderable);
        if previous.is_some() {
            tracing::warn!(lane = lane.index(), object = object.index(), "object appeared twice");
        }
        debug_assert!(previous.is_none(), "object {object:?} appeared twice");
    }

    /// Drops the renderable of an object leaving the window.
    pub fn disappear(&mut self, chart: &Chart, object: ObjectId) {
        let lane = chart.object(object).lane;
        let removed = self.renderables[lane].remove(&object);
        if removed.is_none() {
            tracing::warn!(lane = lane.index(), object = object.index(), "unknown object disappeared");
        }
        debug_assert!(removed.is_some(), "object {object:?} disappeared without appearing");
    }

    pub fn renderable(&self, lane: Lane, object: ObjectId) -> Option<&Renderable> {
        self.renderables[lane].get(&object)
    }

    pub fn renderable_count(&self) -> usize {
        self.renderables.iter().map(|(_, r)| r.len()).sum()
    }

    pub fn contains(&self, lane: Lane, object: ObjectId) -> bool {
        self.renderables[lane].contains_key(&object)
    }

    pub fn create_key_beam(&mut self, lane: Lane, color: Vec3) {
        if let Some(beam) = self.key_beams.get_mut(lane.index()) {
            *beam = KeyBeam { color, alpha: 1.0 };
        }
    }

    pub fn key_beam(&self, lane: Lane) -> Option<&KeyBeam> {
        self.key_beams.get(lane.index())
    }

    pub fn set_lane_active(&mut self, lane: Lane, active: bool) {
        self.lanes_active[lane] = active;
    }

    pub fn set_object_glow(&mut self, lane: Lane, object: ObjectId, glow: f32, glow_state: u8) {
        self.glow_infos[lane] = Some(GlowInfo {
            object,
            glow,
            glow_state,
        });
    }

    pub fn clear_object_glow(&mut self, lane: Lane) {
        self.glow_infos[lane] = None;
    }

    /// Fades key beams by `delta` seconds and recomputes the transforms.
    pub fn update(&mut self, delta: f32, params: &HighwayParams) {
        for beam in &mut self.key_beams {
            beam.alpha = (beam.alpha - delta * KEY_BEAM_DECAY).max(0.0);
        }
        self.transforms = TransformState::compute(params, &self.settings);
    }

    /// Drops every renderable and visual effect; used when seeking.
    pub fn reset(&mut self) {
        for (_, lane) in self.renderables.iter_mut() {
            lane.clear();
        }
        self.key_beams = [KeyBeam::default(); KEY_BEAM_LANES];
        self.glow_infos = PerLane::default();
        self.lanes_active = PerLane::default();
    }

    fn z_of(&self, position: Time) -> (f32, f32) {
        let z_abs = ((position - self.playback_position) / self.view_duration.max(f64::EPSILON)) as f32;
        (z_abs, LENGTH_BASE * z_abs)
    }

    fn glow_for(&self, lane: Lane, object: ObjectId, glowing: bool) -> (f32, u8) {
        match self.glow_infos[lane] {
            Some(info) if info.object == object => (info.glow, info.glow_state),
            _ if !glowing => (0.0, 0),
            _ if self.lanes_active[lane] => (0.0, 1),
            _ => (INACTIVE_GLOW, 0),
        }
    }

    /// Ordered draw list: highway, key beams, FX lanes, BT lanes, then lasers
    /// so that later items render on top.
    pub fn draw_list(&self, chart: &Chart) -> Vec<DrawItem> {
        let world = self.transforms.world;
        let mut items = Vec::with_capacity(self.renderable_count() + KEY_BEAM_LANES + 1);

        items.push(DrawItem::plain(
            DrawKind::Highway,
            None,
            world * Mat4::from_translation(Vec3::new(0.0, 0.0, LENGTH_ADD)),
        ));

        for (i, beam) in self.key_beams.iter().enumerate() {
            if beam.alpha <= 0.0 {
                continue;
            }
            let Some(lane) = Lane::new(i as u8) else {
                continue;
            };
            let width = if lane.is_fx() { 2.0 / 6.0 } else { 1.0 / 6.0 };
            let transform = world
                * Mat4::from_translation(Vec3::new(lane_x(lane), 0.0, LENGTH_ADD))
                * Mat4::from_scale(Vec3::new(width, 1.0, 1.0));
            items.push(DrawItem::plain(DrawKind::KeyBeam(*beam), Some(lane), transform));
        }

        for lane in [Lane::FX_L, Lane::FX_R, Lane::BT_A, Lane::BT_B, Lane::BT_C, Lane::BT_D] {
            for (id, renderable) in &self.renderables[lane] {
                let obj = chart.object(*id);
                let (z_abs, z) = self.z_of(obj.position);

                let scale = if obj.is_instant() {
                    let overlapped = !lane.is_fx()
                        && chart
                            .object_at(fx_lane_for(lane), obj.position)
                            .is_some_and(|fx| fx.is_instant());
                    let width = if overlapped { OVERLAP_CHIP_WIDTH } else { 1.0 };
                    Vec3::new(width, 1.0, 1.0 + z_abs)
                } else {
                    Vec3::new(1.0, 1.0, renderable.length)
                };

                let (glow, glow_state) = self.glow_for(lane, *id, renderable.glows());
                items.push(DrawItem {
                    lane: Some(lane),
                    object: Some(*id),
                    kind: DrawKind::Object(renderable.kind),
                    transform: world
                        * Mat4::from_translation(Vec3::new(lane_x(lane), 0.0, -z))
                        * Mat4::from_scale(scale),
                    length: renderable.length,
                    glow,
                    glow_state,
                });
            }
        }

        let laser_scale = Mat4::from_scale(Vec3::new(1.0, 1.0, LASER_Z_SCALE));
        for lane in Lane::LASERS {
            for (id, renderable) in &self.renderables[lane] {
                let obj = chart.object(*id);
                let previous = chart.previous_connected(*id);
                let next = chart.next_connected(*id);
                let slam_duration = chart.slam_duration(*id);

                let mut position = obj.position;
                if previous.is_some_and(|p| p.is_instant()) {
                    position += slam_duration;
                }
                let (_, z) = self.z_of(position);
                let (glow, glow_state) =
                    self.glow_for(lane, chart.head(*id), renderable.glows());

                items.push(DrawItem {
                    lane: Some(lane),
                    object: Some(*id),
                    kind: DrawKind::Object(renderable.kind),
                    transform: world * laser_scale * Mat4::from_translation(Vec3::new(0.0, 0.0, -z)),
                    length: renderable.length,
                    glow,
                    glow_state,
                });

                let range = laser_range(obj.analog().is_some_and(|a| a.range_extended));
                if previous.is_none() {
                    let x = (chart.sample_value(*id, obj.position) - 0.5) * range;
                    items.push(DrawItem {
                        object: Some(*id),
                        glow,
                        glow_state,
                        ..DrawItem::plain(
                            DrawKind::LaserEntry,
                            Some(lane),
                            world * laser_scale * Mat4::from_translation(Vec3::new(x, 0.0, -z)),
                        )
                    });
                }
                if next.is_none() && obj.is_instant() {
                    let (_, z_exit) = self.z_of(obj.end_position() + slam_duration);
                    let x = (chart.sample_value(*id, obj.end_position()) - 0.5) * range;
                    items.push(DrawItem {
                        object: Some(*id),
                        glow,
                        glow_state,
                        ..DrawItem::plain(
                            DrawKind::LaserExit,
                            Some(lane),
                            world
                                * laser_scale
                                * Mat4::from_translation(Vec3::new(x, 0.0, -z_exit)),
                        )
                    });
                }
            }
        }

        items
    }
}

/// Lateral center of a button lane in highway widths.
pub fn lane_x(lane: Lane) -> f32 {
    let i = lane.index() as f32;
    if lane.is_fx() {
        -1.0 / 6.0 + (i - 4.0) / 3.0
    } else {
        -3.0 / 12.0 + i / 6.0
    }
}

/// Lateral distance covered by a laser moving across its full value range.
pub fn laser_range(range_extended: bool) -> f32 {
    if range_extended {
        LASER_LANE_SPACE * 2.0
    } else {
        LASER_LANE_SPACE
    }
}

fn fx_lane_for(bt: Lane) -> Lane {
    if bt.index() < 2 {
        Lane::FX_L
    } else {
        Lane::FX_R
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::AnalogSegment;

    fn chart() -> (Chart, Vec<ObjectId>) {
        let mut builder = Chart::builder();
        let chip = builder.button(Lane::BT_A, 1.0, 0.0).unwrap();
        let fx = builder.button(Lane::FX_L, 1.0, 0.0).unwrap();
        let hold = builder.button(Lane::BT_C, 1.0, 2.0).unwrap();
        let laser = builder
            .analog(Lane::LASER_L, 1.0, 1.0, AnalogSegment::new(0.0, 1.0))
            .unwrap();
        (builder.build().unwrap(), vec![chip, fx, hold, laser])
    }

    fn view() -> HighwayView {
        HighwayView::new(ViewSettings::default(), 1.0, LaserColors::default())
    }

    #[test]
    fn renderables_follow_appear_and_disappear() {
        let (chart, ids) = chart();
        let mut view = view();
        for id in &ids {
            view.appear(&chart, *id);
        }
        assert_eq!(view.renderable_count(), 4);
        assert!(view.contains(Lane::BT_C, ids[2]));

        view.disappear(&chart, ids[2]);
        assert!(!view.contains(Lane::BT_C, ids[2]));
        assert_eq!(view.renderable_count(), 3);

        view.reset();
        assert_eq!(view.renderable_count(), 0);
    }

    #[test]
    fn key_beams_fade_out() {
        let mut view = view();
        view.create_key_beam(Lane::FX_R, Vec3::ONE);
        view.create_key_beam(Lane::LASER_L, Vec3::ONE);
        assert!(view.key_beam(Lane::LASER_L).is_none());

        view.update(0.05, &HighwayParams::default());
        let beam = view.key_beam(Lane::FX_R).copied().unwrap_or_default();
        assert!((beam.alpha - 0.5).abs() < 1e-5);

        view.update(0.1, &HighwayParams::default());
        assert_eq!(view.key_beam(Lane::FX_R).map(|b| b.alpha), Some(0.0));
    }

    #[test]
    fn draw_list_orders_layers_and_applies_glow() {
        let (chart, ids) = chart();
        let mut view = view();
        for id in &ids {
            view.appear(&chart, *id);
        }
        view.set_playback_position(1.5);
        view.set_lane_active(Lane::BT_C, true);
        view.set_object_glow(Lane::LASER_L, ids[3], 0.35, 2);
        view.create_key_beam(Lane::BT_A, Vec3::ONE);

        let items = view.draw_list(&chart);
        assert_eq!(items[0].kind, DrawKind::Highway);
        assert!(matches!(items[1].kind, DrawKind::KeyBeam(_)));

        let objects: Vec<_> = items.iter().filter_map(|item| item.object).collect();
        assert_eq!(objects, vec![ids[1], ids[0], ids[2], ids[3], ids[3]]);

        let hold = items.iter().find(|i| i.object == Some(ids[2])).map(|i| (i.glow, i.glow_state));
        assert_eq!(hold, Some((0.0, 1)));

        let laser = items
            .iter()
            .find(|i| i.object == Some(ids[3]) && matches!(i.kind, DrawKind::Object(_)));
        assert_eq!(laser.map(|i| i.glow_state), Some(2));
        assert!(items.iter().any(|i| i.kind == DrawKind::LaserEntry));
    }

    #[test]
    fn bt_chip_narrows_over_fx_chip() {
        let (chart, ids) = chart();
        let mut view = view();
        view.appear(&chart, ids[0]);
        view.appear(&chart, ids[1]);
        let items = view.draw_list(&chart);
        let chip = items.iter().find(|i| i.object == Some(ids[0])).map(|i| i.transform);
        let fx = items.iter().find(|i| i.object == Some(ids[1])).map(|i| i.transform);

        let width = |m: Option<Mat4>| m.map(|m| m.x_axis.truncate().length()).unwrap_or(0.0);
        assert!((width(chip) - 0.8).abs() < 1e-4);
        assert!((width(fx) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn holds_stretch_to_their_length() {
        let (chart, ids) = chart();
        let mut view = view();
        view.appear(&chart, ids[2]);
        let length = view.renderable(Lane::BT_C, ids[2]).map(|r| r.length);
        assert!(length.is_some_and(|l| l > 1.0));

        let items = view.draw_list(&chart);
        let hold = items.iter().find(|i| i.object == Some(ids[2]));
        assert_eq!(hold.map(|i| i.length), length);
        let depth = hold.map(|i| i.transform.z_axis.truncate().length());
        assert!((depth.unwrap_or(0.0) - length.unwrap_or(0.0)).abs() < 1e-4);
    }
}
