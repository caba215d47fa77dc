use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::chart::{Chart, Lane, ObjectId, ObjectKind, Time};

/// Lateral lane space a laser value spans, in highway widths.
pub const LASER_LANE_SPACE: f32 = 5.0 / 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RenderableKind {
    ButtonChip,
    ButtonHold,
    Slam { color: Vec3 },
    Laser { color: Vec3 },
}

/// Per-object drawing state owned by the highway view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Renderable {
    pub object: ObjectId,
    pub lane: Lane,
    pub kind: RenderableKind,
    /// Highway-space length along the lane.
    pub length: f32,
}

impl Renderable {
    /// Picks the drawing for a chart object. `view_duration` is the look-ahead
    /// covered by the full highway length.
    pub fn for_object(
        chart: &Chart,
        object: ObjectId,
        view_duration: Time,
        highway_length: f32,
        colors: &LaserColors,
    ) -> Self {
        let obj = chart.object(object);
        let to_length =
            |duration: Time| (duration / view_duration.max(f64::EPSILON)) as f32 * highway_length;

        let (kind, length) = match &obj.kind {
            ObjectKind::Button if obj.is_instant() => (RenderableKind::ButtonChip, 0.0),
            ObjectKind::Button => (RenderableKind::ButtonHold, to_length(obj.duration)),
            ObjectKind::Analog(_) => {
                let color = colors.for_lane(obj.lane);
                if obj.is_instant() {
                    let length = to_length(chart.slam_duration(object));
                    (RenderableKind::Slam { color }, length)
                } else {
                    let mut duration = obj.duration;
                    if chart
                        .previous_connected(object)
                        .is_some_and(|prev| prev.is_instant())
                    {
                        duration -= chart.slam_duration(object);
                    }
                    (RenderableKind::Laser { color }, to_length(duration.max(0.0)))
                }
            }
        };

        Self {
            object,
            lane: obj.lane,
            kind,
            length,
        }
    }

    /// Chips never glow.
    pub fn glows(&self) -> bool {
        !matches!(self.kind, RenderableKind::ButtonChip)
    }
}

/// Colors of the left and right lasers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserColors {
    pub left: Vec3,
    pub right: Vec3,
}

impl LaserColors {
    pub fn from_hues(hues: [u16; 2]) -> Self {
        Self {
            left: hue_to_rgb(hues[0]),
            right: hue_to_rgb(hues[1]),
        }
    }

    pub fn for_lane(&self, lane: Lane) -> Vec3 {
        match lane.laser_side() {
            Some(1) => self.right,
            _ => self.left,
        }
    }
}

impl Default for LaserColors {
    fn default() -> Self {
        Self::from_hues([200, 330])
    }
}

/// Fully saturated color for a hue in degrees.
pub fn hue_to_rgb(hue: u16) -> Vec3 {
    let h = f32::from(hue % 360) / 60.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    match h as u32 {
        0 => Vec3::new(1.0, x, 0.0),
        1 => Vec3::new(x, 1.0, 0.0),
        2 => Vec3::new(0.0, 1.0, x),
        3 => Vec3::new(0.0, x, 1.0),
        4 => Vec3::new(x, 0.0, 1.0),
        _ => Vec3::new(1.0, 0.0, x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{AnalogSegment, ControlPoint};

    #[test]
    fn picks_renderable_by_object_shape() {
        let mut builder = Chart::builder();
        builder.control_point(ControlPoint::new(0.0, 120.0));
        let chip = builder.button(Lane::BT_A, 1.0, 0.0).unwrap();
        let hold = builder.button(Lane::BT_B, 1.0, 1.0).unwrap();
        let slam = builder
            .analog(Lane::LASER_R, 2.0, 0.0, AnalogSegment::new(1.0, 0.0))
            .unwrap();
        let laser = builder
            .analog(Lane::LASER_R, 2.0, 1.0, AnalogSegment::new(0.0, 0.0).connected())
            .unwrap();
        let chart = builder.build().unwrap();
        let colors = LaserColors::default();

        let chip = Renderable::for_object(&chart, chip, 1.0, 11.0, &colors);
        assert_eq!(chip.kind, RenderableKind::ButtonChip);
        assert!(!chip.glows());

        let hold = Renderable::for_object(&chart, hold, 1.0, 11.0, &colors);
        assert_eq!(hold.kind, RenderableKind::ButtonHold);
        assert!((hold.length - 11.0).abs() < 1e-5);

        // 120 BPM in 4/4: a measure is 2 s, a slam 1/16 s.
        let slam = Renderable::for_object(&chart, slam, 1.0, 11.0, &colors);
        assert!(matches!(slam.kind, RenderableKind::Slam { .. }));
        assert!((slam.length - 11.0 / 16.0).abs() < 1e-5);

        let laser = Renderable::for_object(&chart, laser, 1.0, 11.0, &colors);
        assert_eq!(laser.kind, RenderableKind::Laser { color: colors.right });
        assert!((laser.length - 11.0 * 15.0 / 16.0).abs() < 1e-5);
    }

    #[test]
    fn primary_hues_convert_exactly() {
        assert_eq!(hue_to_rgb(0), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(hue_to_rgb(120), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(hue_to_rgb(240), Vec3::new(0.0, 0.0, 1.0));
    }
}
