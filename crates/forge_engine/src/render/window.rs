//! Window management using GLFW
//!
//! Provides window creation, Vulkan surface creation and event translation into
//! [`InputState`] updates.

use ash::vk;
use thiserror::Error;

use crate::config::WindowConfig;
use crate::input::{InputState, KeyCode, MouseButtons};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialised
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// GLFW reported no Vulkan support
    #[error("Vulkan is not supported by GLFW on this system")]
    VulkanUnsupported,

    /// Surface creation returned an error code
    #[error("Failed to create Vulkan surface: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Window events the application loop cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// Framebuffer size changed (pixels)
    Resized {
        /// New width
        width: u32,
        /// New height
        height: u32,
    },
    /// User asked to close the window
    CloseRequested,
}

/// GLFW error callback
///
/// Failures still surface through the `Result` of the call that caused them.
fn log_glfw_error(error: glfw::Error, description: String) {
    log::error!("GLFW error {:?}: {}", error, description);
}

/// GLFW window wrapper
pub struct Window {
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    glfw: glfw::Glfw,
}

impl Window {
    /// Create a window without an OpenGL context
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(log_glfw_error)
            .map_err(|e| WindowError::InitializationFailed(format!("{e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_mouse_button_polling(true);
        window.set_cursor_pos_polling(true);
        window.set_scroll_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Created window '{}' ({}x{})", config.title, config.width, config.height);

        Ok(Self { window, events, glfw })
    }

    /// Whether the user or the application requested close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request that the window close after this frame
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0).unsigned_abs(), height.max(0).unsigned_abs())
    }

    /// Block until an event arrives (used while minimised)
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Poll GLFW, feed input events into `input`, and return window-level events
    pub fn poll_events(&mut self, input: &mut InputState) -> Vec<WindowEvent> {
        self.glfw.poll_events();

        let mut window_events = Vec::new();
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::Key(key, _, action, _) => {
                    if let Some(code) = translate_key(key) {
                        input.set_key(code, action != glfw::Action::Release);
                    }
                }
                glfw::WindowEvent::MouseButton(button, action, _) => {
                    if let Some(buttons) = translate_mouse_button(button) {
                        input.set_mouse_button(buttons, action == glfw::Action::Press);
                    }
                }
                #[allow(clippy::cast_possible_truncation)]
                glfw::WindowEvent::CursorPos(x, y) => input.set_cursor_position(x as f32, y as f32),
                #[allow(clippy::cast_possible_truncation)]
                glfw::WindowEvent::Scroll(_, y) => input.add_scroll(y as f32),
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    window_events.push(WindowEvent::Resized {
                        width: width.max(0).unsigned_abs(),
                        height: height.max(0).unsigned_abs(),
                    });
                }
                glfw::WindowEvent::Close => window_events.push(WindowEvent::CloseRequested),
                _ => {}
            }
        }
        window_events
    }

    /// Instance extensions GLFW needs to create a surface
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::VulkanUnsupported)
    }

    /// Create a Vulkan surface for this window
    pub fn create_surface(&self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }
}

fn translate_key(key: glfw::Key) -> Option<KeyCode> {
    use glfw::Key;

    Some(match key {
        Key::A => KeyCode::A,
        Key::D => KeyCode::D,
        Key::E => KeyCode::E,
        Key::Q => KeyCode::Q,
        Key::R => KeyCode::R,
        Key::S => KeyCode::S,
        Key::W => KeyCode::W,
        Key::Space => KeyCode::Space,
        Key::Enter => KeyCode::Enter,
        Key::Escape => KeyCode::Escape,
        Key::Up => KeyCode::Up,
        Key::Down => KeyCode::Down,
        Key::Left => KeyCode::Left,
        Key::Right => KeyCode::Right,
        Key::LeftShift => KeyCode::LeftShift,
        _ => return None,
    })
}

fn translate_mouse_button(button: glfw::MouseButton) -> Option<MouseButtons> {
    match button {
        glfw::MouseButton::Button1 => Some(MouseButtons::LEFT),
        glfw::MouseButton::Button2 => Some(MouseButtons::RIGHT),
        glfw::MouseButton::Button3 => Some(MouseButtons::MIDDLE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_translation() {
        assert_eq!(translate_key(glfw::Key::W), Some(KeyCode::W));
        assert_eq!(translate_key(glfw::Key::Escape), Some(KeyCode::Escape));
        assert_eq!(translate_key(glfw::Key::F12), None);
    }

    #[test]
    fn test_mouse_translation() {
        assert_eq!(translate_mouse_button(glfw::MouseButton::Button1), Some(MouseButtons::LEFT));
        assert_eq!(translate_mouse_button(glfw::MouseButton::Button2), Some(MouseButtons::RIGHT));
        assert_eq!(translate_mouse_button(glfw::MouseButton::Button8), None);
    }

    #[test]
    fn test_glfw_errors_are_logged_not_fatal() {
        log_glfw_error(glfw::Error::PlatformError, "no display available".to_string());
        let error = crate::EngineError::from(WindowError::CreationFailed);
        assert_eq!(error.to_string(), "Window error: Window creation failed");
    }
}
