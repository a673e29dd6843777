//! Orbit camera controller driven by [`InputState`]

use super::{InputState, KeyCode, MouseButtons};
use crate::foundation::math::{constants, Vec3};
use crate::scene::Camera;

/// Orbits a camera around a target point
///
/// Dragging with the left mouse button rotates, scrolling zooms, and the arrow
/// keys rotate at a fixed rate.
#[derive(Debug, Clone)]
pub struct CameraController {
    /// Point orbited around
    pub target: Vec3,
    /// Distance from target
    pub distance: f32,
    /// Rotation around the world Y axis, radians
    pub yaw: f32,
    /// Elevation above the XZ plane, radians
    pub pitch: f32,
    /// Radians per pixel of mouse drag
    pub rotate_sensitivity: f32,
    /// Fraction of distance per scroll step
    pub zoom_sensitivity: f32,
    /// Radians per second for keyboard rotation
    pub key_rotate_speed: f32,
    min_distance: f32,
    max_distance: f32,
}

impl CameraController {
    /// Create a controller orbiting `target` at `distance`
    pub fn new(target: Vec3, distance: f32) -> Self {
        Self {
            target,
            distance,
            yaw: 0.0,
            pitch: 0.0,
            rotate_sensitivity: 0.005,
            zoom_sensitivity: 0.1,
            key_rotate_speed: 1.5,
            min_distance: 0.1,
            max_distance: 1000.0,
        }
    }

    /// Position a controller so that it frames a bounding sphere
    pub fn framing(center: Vec3, radius: f32) -> Self {
        let mut controller = Self::new(center, (radius * 2.5).max(0.5));
        controller.pitch = 0.3;
        controller
    }

    /// Apply one frame of input
    pub fn update(&mut self, input: &InputState, delta_time: f32) {
        if input.mouse_buttons().contains(MouseButtons::LEFT) {
            let delta = input.cursor_delta();
            self.yaw -= delta.x * self.rotate_sensitivity;
            self.pitch += delta.y * self.rotate_sensitivity;
        }

        let key_step = self.key_rotate_speed * delta_time;
        if input.is_key_down(KeyCode::Left) {
            self.yaw -= key_step;
        }
        if input.is_key_down(KeyCode::Right) {
            self.yaw += key_step;
        }
        if input.is_key_down(KeyCode::Up) {
            self.pitch += key_step;
        }
        if input.is_key_down(KeyCode::Down) {
            self.pitch -= key_step;
        }

        let scroll = input.scroll_delta();
        if scroll != 0.0 {
            self.distance *= 1.0 - scroll * self.zoom_sensitivity;
        }

        let pitch_limit = constants::HALF_PI - 0.01;
        self.pitch = self.pitch.clamp(-pitch_limit, pitch_limit);
        self.distance = self.distance.clamp(self.min_distance, self.max_distance);
    }

    /// Eye position implied by the current orbit parameters
    pub fn eye_position(&self) -> Vec3 {
        let offset = Vec3::new(
            self.distance * self.pitch.cos() * self.yaw.sin(),
            self.distance * self.pitch.sin(),
            self.distance * self.pitch.cos() * self.yaw.cos(),
        );
        self.target + offset
    }

    /// Write the orbit into a camera
    pub fn apply(&self, camera: &mut Camera) {
        camera.position = self.eye_position();
        camera.look_at(self.target, Vec3::new(0.0, 1.0, 0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_orbit_looks_down_negative_z() {
        let controller = CameraController::new(Vec3::zeros(), 5.0);
        assert_relative_eq!(controller.eye_position(), Vec3::new(0.0, 0.0, 5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_drag_rotates_only_while_button_held() {
        let mut controller = CameraController::new(Vec3::zeros(), 5.0);
        let mut input = InputState::new();
        input.set_cursor_position(0.0, 0.0);
        input.set_cursor_position(100.0, 0.0);
        controller.update(&input, 0.016);
        assert_relative_eq!(controller.yaw, 0.0);

        input.begin_frame();
        input.set_mouse_button(MouseButtons::LEFT, true);
        input.set_cursor_position(200.0, 0.0);
        controller.update(&input, 0.016);
        assert!(controller.yaw < 0.0);
    }

    #[test]
    fn test_pitch_and_distance_are_clamped() {
        let mut controller = CameraController::new(Vec3::zeros(), 5.0);
        let mut input = InputState::new();
        input.set_key(KeyCode::Up, true);
        controller.update(&input, 100.0);
        assert!(controller.pitch < constants::HALF_PI);

        input.set_key(KeyCode::Up, false);
        input.add_scroll(50.0);
        controller.update(&input, 0.016);
        assert!(controller.distance >= 0.1);
    }

    #[test]
    fn test_apply_moves_camera() {
        let controller = CameraController::framing(Vec3::new(1.0, 0.0, 0.0), 2.0);
        let mut camera = Camera::default();
        controller.apply(&mut camera);
        assert_eq!(camera.target, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!((camera.position - camera.target).norm(), 5.0, epsilon = 1e-4);
    }
}
