//! Input state tracking
//!
//! [`InputState`] is an explicit object owned by the application loop. The window
//! feeds it translated events; gameplay and camera code read it. Nothing here knows
//! about GLFW, so input sequences can be replayed in tests.

use std::collections::HashSet;

use bitflags::bitflags;

use crate::foundation::math::Vec2;

mod camera_controller;

pub use camera_controller::CameraController;

/// Key codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A key
    A,
    /// D key
    D,
    /// E key
    E,
    /// Q key
    Q,
    /// R key
    R,
    /// S key
    S,
    /// W key
    W,
    /// Space key
    Space,
    /// Enter key
    Enter,
    /// Escape key
    Escape,
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Left shift
    LeftShift,
}

bitflags! {
    /// Set of mouse buttons currently held
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u8 {
        /// Left mouse button
        const LEFT = 0b001;
        /// Right mouse button
        const RIGHT = 0b010;
        /// Middle mouse button
        const MIDDLE = 0b100;
    }
}

/// Snapshot of keyboard and mouse state for the current frame
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
    mouse_buttons: MouseButtons,
    cursor_position: Option<Vec2>,
    cursor_delta: Vec2,
    scroll_delta: f32,
}

impl InputState {
    /// Create an empty input state
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame deltas. Call once at the start of every frame before polling events.
    pub fn begin_frame(&mut self) {
        self.just_pressed.clear();
        self.cursor_delta = Vec2::zeros();
        self.scroll_delta = 0.0;
    }

    /// Record a key press or release
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            if self.pressed_keys.insert(key) {
                self.just_pressed.insert(key);
            }
        } else {
            self.pressed_keys.remove(&key);
        }
    }

    /// Record a mouse button press or release
    pub fn set_mouse_button(&mut self, button: MouseButtons, pressed: bool) {
        self.mouse_buttons.set(button, pressed);
    }

    /// Record a cursor move to an absolute window position
    ///
    /// The first observed position produces no delta.
    pub fn set_cursor_position(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(previous) = self.cursor_position {
            self.cursor_delta += position - previous;
        }
        self.cursor_position = Some(position);
    }

    /// Accumulate vertical scroll
    pub fn add_scroll(&mut self, delta: f32) {
        self.scroll_delta += delta;
    }

    /// Whether a key is held
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Whether a key went down during the current frame
    pub fn was_key_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }

    /// Currently held mouse buttons
    pub fn mouse_buttons(&self) -> MouseButtons {
        self.mouse_buttons
    }

    /// Last known cursor position in window coordinates
    pub fn cursor_position(&self) -> Option<Vec2> {
        self.cursor_position
    }

    /// Cursor movement accumulated this frame
    pub fn cursor_delta(&self) -> Vec2 {
        self.cursor_delta
    }

    /// Scroll accumulated this frame
    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press_and_release() {
        let mut input = InputState::new();
        input.set_key(KeyCode::W, true);
        assert!(input.is_key_down(KeyCode::W));
        assert!(input.was_key_pressed(KeyCode::W));

        input.begin_frame();
        assert!(input.is_key_down(KeyCode::W));
        assert!(!input.was_key_pressed(KeyCode::W));

        input.set_key(KeyCode::W, false);
        assert!(!input.is_key_down(KeyCode::W));
    }

    #[test]
    fn test_key_repeat_is_not_a_new_press() {
        let mut input = InputState::new();
        input.set_key(KeyCode::Space, true);
        input.begin_frame();
        input.set_key(KeyCode::Space, true);
        assert!(!input.was_key_pressed(KeyCode::Space));
    }

    #[test]
    fn test_cursor_delta_accumulates_and_resets() {
        let mut input = InputState::new();
        input.set_cursor_position(10.0, 10.0);
        assert_eq!(input.cursor_delta(), Vec2::zeros());

        input.set_cursor_position(15.0, 12.0);
        input.set_cursor_position(20.0, 11.0);
        assert_eq!(input.cursor_delta(), Vec2::new(10.0, 1.0));

        input.begin_frame();
        assert_eq!(input.cursor_delta(), Vec2::zeros());
        assert_eq!(input.cursor_position(), Some(Vec2::new(20.0, 11.0)));
    }

    #[test]
    fn test_mouse_buttons_are_independent() {
        let mut input = InputState::new();
        input.set_mouse_button(MouseButtons::LEFT, true);
        input.set_mouse_button(MouseButtons::RIGHT, true);
        input.set_mouse_button(MouseButtons::LEFT, false);
        assert_eq!(input.mouse_buttons(), MouseButtons::RIGHT);
    }

    #[test]
    fn test_scroll_accumulates() {
        let mut input = InputState::new();
        input.add_scroll(1.0);
        input.add_scroll(0.5);
        assert!((input.scroll_delta() - 1.5).abs() < f32::EPSILON);
        input.begin_frame();
        assert!(input.scroll_delta().abs() < f32::EPSILON);
    }
}
