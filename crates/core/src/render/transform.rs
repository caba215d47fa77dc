//! Pure highway transform pipeline: motion parameters in, world / reference /
//! critical-line transforms and a clipped camera out.

use glam::{Mat4, Quat, Vec3};
use serde::Serialize;

use super::Camera;

/// Length of the visible highway in local units.
pub const LENGTH_BASE: f32 = 11.0;
/// Extra highway drawn behind the critical line.
pub const LENGTH_ADD: f32 = 1.1;
/// Near plane floor.
pub const MIN_NEAR: f32 = 0.01;
/// Minimum separation between near and far planes.
pub const CLIP_EPSILON: f32 = 0.001;

const ANCHOR_HEIGHT: f32 = -0.7925;
const ANCHOR_TILT: f32 = 2.5;
const CONTAINER_DEPTH: f32 = -0.975;
const HORIZON_DISTANCE: f32 = 1000.0;

/// Motion inputs for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HighwayParams {
    /// Degrees.
    pub laser_roll: f32,
    /// Turns.
    pub base_roll: f32,
    /// Turns.
    pub effect_roll: f32,
    /// Degrees.
    pub pitch: f32,
    pub zoom: f32,
    pub offset: f32,
    pub effect_offset: f32,
    pub camera_offset: Vec3,
}

impl HighwayParams {
    /// Total roll applied to the drawn highway, in degrees.
    pub fn world_roll(&self) -> f32 {
        (self.base_roll + self.effect_roll) * 360.0 + self.laser_roll
    }

    /// Roll of the critical line, which ignores impulse effects.
    pub fn critical_roll(&self) -> f32 {
        self.base_roll * 360.0 + self.laser_roll
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSettings {
    pub field_of_view: f32,
    /// Fraction of the viewport height, from the bottom, where the critical
    /// line sits.
    pub crit_screen_y: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            field_of_view: 60.0,
            crit_screen_y: 0.1,
            viewport_width: 1280.0,
            viewport_height: 720.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransformState {
    pub world: Mat4,
    /// Unrolled, unshifted highway without zoom.
    pub reference: Mat4,
    pub reference_zoomed: Mat4,
    pub critical_line: Mat4,
    pub camera: Camera,
    pub horizon_height: f32,
    pub critical_height: f32,
}

/// Builds the highway transform for a given pitch, roll and lateral offset.
/// Angles are in degrees.
pub fn highway_at_roll(pitch: f32, roll: f32, x_offset: f32) -> Mat4 {
    Mat4::from_rotation_z(roll.to_radians())
        * Mat4::from_translation(Vec3::new(x_offset, ANCHOR_HEIGHT, 0.0))
        * Mat4::from_rotation_x(ANCHOR_TILT.to_radians())
        * Mat4::from_translation(Vec3::new(0.0, 0.0, CONTAINER_DEPTH))
        * Mat4::from_rotation_x(pitch.to_radians())
}

/// Moves `transform` along the line from the camera to its origin by
/// `zoom` times that distance.
pub fn apply_zoom(transform: Mat4, zoom: f32) -> Mat4 {
    let translation = transform.w_axis.truncate();
    let distance = translation.length();
    let direction = if distance > f32::EPSILON {
        translation / distance
    } else {
        Vec3::NEG_Z
    };
    Mat4::from_translation(direction * zoom * distance) * transform
}

/// Near and far distances enclosing the four highway corners, clamped so
/// that `MIN_NEAR <= near` and `far - near >= CLIP_EPSILON`.
pub fn clip_distances(world: &Mat4, camera: &Camera) -> (f32, f32) {
    let corners = [
        Vec3::new(-1.0, 0.0, LENGTH_ADD),
        Vec3::new(1.0, 0.0, LENGTH_ADD),
        Vec3::new(-1.0, 0.0, -LENGTH_BASE),
        Vec3::new(1.0, 0.0, -LENGTH_BASE),
    ];
    let (min, max) = corners
        .iter()
        .map(|corner| camera.depth_of(world.transform_point3(*corner)))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        });

    let near = MIN_NEAR.max(min);
    let mut far = max;
    // also catches NaN
    if !(far - near >= CLIP_EPSILON) {
        far = near + CLIP_EPSILON;
    }
    (near, far)
}

impl TransformState {
    pub fn compute(params: &HighwayParams, view: &ViewSettings) -> Self {
        let lane_offset = params.offset + params.effect_offset;
        let world_normal = highway_at_roll(params.pitch, params.world_roll(), lane_offset);
        let reference = highway_at_roll(params.pitch, 0.0, 0.0);
        let critical_line = highway_at_roll(params.pitch, params.critical_roll(), lane_offset);

        let world = apply_zoom(world_normal, params.zoom);
        let reference_zoomed = apply_zoom(reference, params.zoom);

        let mut camera = Camera::new(
            view.field_of_view,
            view.viewport_width,
            view.viewport_height,
        );

        let crit_dir = reference.w_axis.truncate().normalize_or(Vec3::NEG_Z);
        let to_crit = crit_dir.y.atan2(-crit_dir.z);
        let screen_shift =
            (view.field_of_view / 2.0 - view.field_of_view * view.crit_screen_y).to_radians();
        camera.rotation = Quat::from_rotation_x(to_crit + screen_shift);
        camera.position = params.camera_offset;

        let (near, far) = clip_distances(&world, &camera);
        camera.near = near;
        camera.far = far;

        let horizon_height = camera
            .project(&world, Vec3::new(0.0, 0.0, -HORIZON_DISTANCE))
            .y;
        let critical_height = camera.project(&reference, Vec3::ZERO).y;

        Self {
            world,
            reference,
            reference_zoomed,
            critical_line,
            camera,
            horizon_height,
            critical_height,
        }
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::compute(&HighwayParams::default(), &ViewSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_planes_stay_ordered_for_extreme_motion() {
        let view = ViewSettings::default();
        for pitch in [-90.0, -45.0, 0.0, 30.0, 90.0, 300.0] {
            for roll in [-2.0, -0.5, 0.0, 0.25, 3.0] {
                for zoom in [-3.0, -1.0, 0.0, 0.5, 10.0] {
                    for offset in [-5.0, 0.0, 2.5] {
                        let params = HighwayParams {
                            laser_roll: 45.0,
                            base_roll: roll,
                            effect_roll: roll * 0.5,
                            pitch,
                            zoom,
                            offset,
                            effect_offset: 0.0,
                            camera_offset: Vec3::new(0.05, 0.0, 0.0),
                        };
                        let state = TransformState::compute(&params, &view);
                        let camera = state.camera;
                        assert!(camera.near >= MIN_NEAR, "{params:?}");
                        assert!(camera.far - camera.near >= CLIP_EPSILON * 0.99, "{params:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn critical_point_lands_on_configured_screen_height() {
        let view = ViewSettings::default();
        let state = TransformState::compute(&HighwayParams::default(), &view);
        let crit = state.camera.project(&state.reference, Vec3::ZERO);

        let half_fov = (view.field_of_view / 2.0).to_radians();
        let shift = (view.field_of_view / 2.0 - view.field_of_view * view.crit_screen_y).to_radians();
        let expected = view.viewport_height / 2.0 * (1.0 + shift.tan() / half_fov.tan());
        assert!((crit.y - expected).abs() < 0.5, "{crit:?}");
        assert!((crit.x - view.viewport_width / 2.0).abs() < 0.5);
        assert_eq!(crit.y, state.critical_height);
    }

    #[test]
    fn visible_highway_fits_between_clip_planes() {
        let state = TransformState::compute(&HighwayParams::default(), &ViewSettings::default());
        let near_corner = state.world.transform_point3(Vec3::new(1.0, 0.0, LENGTH_ADD));
        let far_corner = state.world.transform_point3(Vec3::new(-1.0, 0.0, -LENGTH_BASE));

        let camera = state.camera;
        assert!(camera.depth_of(near_corner) >= camera.near - 1e-4);
        assert!(camera.depth_of(far_corner) <= camera.far + 1e-4);
        assert!(state.horizon_height < state.critical_height);
    }

    #[test]
    fn reference_ignores_roll_and_offset() {
        let view = ViewSettings::default();
        let plain = TransformState::compute(&HighwayParams::default(), &view);
        let rolled = TransformState::compute(
            &HighwayParams {
                base_roll: 0.1,
                laser_roll: 8.0,
                offset: 0.3,
                ..Default::default()
            },
            &view,
        );
        assert_eq!(plain.reference, rolled.reference);
        assert_ne!(plain.world, rolled.world);
    }

    #[test]
    fn critical_line_shifts_with_the_lane_offset() {
        let view = ViewSettings::default();
        let centered = TransformState::compute(&HighwayParams::default(), &view);
        let state = TransformState::compute(
            &HighwayParams {
                offset: 0.5,
                effect_offset: 0.1,
                ..Default::default()
            },
            &view,
        );
        assert_ne!(centered.critical_line, state.critical_line);

        let line = state.camera.project(&state.critical_line, Vec3::ZERO);
        let highway = state.camera.project(&state.world, Vec3::ZERO);
        assert!((line - highway).length() < 1e-2, "{line:?} {highway:?}");
        assert!(line.x > view.viewport_width / 2.0);
    }

    #[test]
    fn zoom_moves_along_the_view_ray() {
        let base = highway_at_roll(0.0, 0.0, 0.0);
        let zoomed = apply_zoom(base, 0.5);
        let a = base.w_axis.truncate();
        let b = zoomed.w_axis.truncate();
        assert!((b.length() - a.length() * 1.5).abs() < 1e-4);
        assert!(a.normalize().dot(b.normalize()) > 0.9999);

        let degenerate = apply_zoom(Mat4::IDENTITY, 2.0);
        assert_eq!(degenerate, Mat4::IDENTITY);
    }
}
