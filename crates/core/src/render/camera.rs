use glam::{Mat4, Quat, Vec2, Vec3};
use serde::Serialize;

/// Smallest `|w|` accepted when dividing clip coordinates.
const MIN_CLIP_W: f32 = 1e-6;

/// Perspective camera looking down its local -Z axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(field_of_view: f32, viewport_width: f32, viewport_height: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            field_of_view,
            viewport_width,
            viewport_height,
            near: 0.01,
            far: 1000.0,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.viewport_width.max(1.0) / self.viewport_height.max(1.0)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(
            self.field_of_view.to_radians(),
            self.aspect(),
            self.near,
            self.far,
        )
    }

    /// Projects a local-space point through `transform` into viewport pixels
    /// with the origin at the top-left corner.
    pub fn project(&self, transform: &Mat4, point: Vec3) -> Vec2 {
        let clip = self.projection_matrix() * self.view_matrix() * *transform * point.extend(1.0);
        let w = if clip.w.abs() < MIN_CLIP_W {
            MIN_CLIP_W.copysign(clip.w)
        } else {
            clip.w
        };
        let ndc = clip.truncate() / w;
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.viewport_width,
            (1.0 - ndc.y) * 0.5 * self.viewport_height,
        )
    }

    /// Signed distance of a world-space point along the view direction.
    pub fn depth_of(&self, world_point: Vec3) -> f32 {
        (world_point - self.position).dot(self.forward())
    }
}
