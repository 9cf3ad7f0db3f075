//! Fly camera driven by window events

use ash::vk;
use glfw::{Action, Key, MouseButton, WindowEvent};
use render_engine::foundation::math::{constants::HALF_PI, Mat3, Point3, Vec3};
use render_engine::scene::CameraData;

use crate::config::CameraSettings;

const MIN_PITCH: f32 = -HALF_PI + 0.01;
const MAX_PITCH: f32 = HALF_PI - 0.01;
const MIN_FOV: f32 = 0.1;
const MAX_FOV: f32 = HALF_PI;
const FOV_INCREMENT: f32 = 0.1;
/// Multiplied by the frame time to get the velocity interpolation factor
const ACCELERATION_FACTOR: f32 = 10.0;
const DEFAULT_YAW: f32 = -HALF_PI;

/// Movement keys currently held
#[derive(Debug, Default, Clone, Copy)]
struct HeldKeys {
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
}

impl HeldKeys {
    fn set(&mut self, key: Key, held: bool) {
        match key {
            Key::W => self.forward = held,
            Key::S => self.back = held,
            Key::A => self.left = held,
            Key::D => self.right = held,
            Key::E => self.up = held,
            Key::Q => self.down = held,
            _ => {}
        }
    }

    /// Camera-space direction: x right, y up, z forward
    fn input_vector(self) -> Vec3 {
        let axis = |positive: bool, negative: bool| match (positive, negative) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        };
        Vec3::new(
            axis(self.right, self.left),
            axis(self.up, self.down),
            axis(self.forward, self.back),
        )
    }
}

/// Right-drag to look, WASD/QE to move, scroll to zoom
#[derive(Debug, Clone)]
pub struct CameraController {
    position: Vec3,
    velocity: Vec3,
    pitch: f32,
    yaw: f32,
    sensitivity: f32,
    speed: f32,
    fov: f32,
    aspect_ratio: f32,
    last_cursor: Option<(f64, f64)>,
    looking: bool,
    keys: HeldKeys,
}

impl CameraController {
    /// Camera at the origin looking down -Z
    pub fn new(settings: &CameraSettings, extent: vk::Extent2D) -> Self {
        let mut controller = Self {
            position: Vec3::zeros(),
            velocity: Vec3::zeros(),
            pitch: 0.0,
            yaw: DEFAULT_YAW,
            sensitivity: settings.sensitivity,
            speed: settings.speed,
            fov: settings.fov.clamp(MIN_FOV, MAX_FOV),
            aspect_ratio: 1.0,
            last_cursor: None,
            looking: false,
            keys: HeldKeys::default(),
        };
        controller.on_resize(extent);
        controller
    }

    /// Feed one window event
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match *event {
            WindowEvent::FramebufferSize(width, height) => {
                self.on_resize(vk::Extent2D {
                    width: u32::try_from(width).unwrap_or(0),
                    height: u32::try_from(height).unwrap_or(0),
                });
            }
            WindowEvent::CursorPos(x, y) => self.on_cursor_move(x, y),
            WindowEvent::Scroll(_, y) => self.on_scroll(y),
            WindowEvent::MouseButton(MouseButton::Button2, action, _) => self.looking = action != Action::Release,
            WindowEvent::Key(key, _, action, _) => self.keys.set(key, action != Action::Release),
            _ => {}
        }
    }

    /// Track the framebuffer aspect ratio; minimized sizes are ignored
    pub fn on_resize(&mut self, extent: vk::Extent2D) {
        if extent.width > 0 && extent.height > 0 {
            self.aspect_ratio = extent.width as f32 / extent.height as f32;
        }
    }

    /// Rotate while the right button is held
    pub fn on_cursor_move(&mut self, x: f64, y: f64) {
        if let Some((last_x, last_y)) = self.last_cursor.replace((x, y)) {
            if self.looking {
                self.yaw += (x - last_x) as f32 * self.sensitivity;
                self.pitch = (self.pitch - (y - last_y) as f32 * self.sensitivity).clamp(MIN_PITCH, MAX_PITCH);
            }
        }
    }

    /// Scrolling up narrows the field of view
    pub fn on_scroll(&mut self, y_offset: f64) {
        self.fov = (self.fov - y_offset as f32 * FOV_INCREMENT).clamp(MIN_FOV, MAX_FOV);
    }

    /// Advance movement by `delta_seconds`
    pub fn update(&mut self, delta_seconds: f32) {
        let lerp = (delta_seconds * ACCELERATION_FACTOR).min(1.0);
        let input = self.keys.input_vector();
        if input.norm() > 0.0 {
            self.velocity = self.velocity.lerp(&(input.normalize() * self.speed), lerp);
        }

        self.position += self.basis() * self.velocity;
        self.velocity = self.velocity.lerp(&Vec3::zeros(), lerp);
    }

    /// Unit view direction
    pub fn direction(&self) -> Vec3 {
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        Vec3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize()
    }

    fn basis(&self) -> Mat3 {
        let forward = self.direction();
        let up = Vec3::y();
        let right = forward.cross(&up).normalize();
        Mat3::from_columns(&[right, up, forward])
    }

    /// World position
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Vertical field of view in radians
    pub const fn fov(&self) -> f32 {
        self.fov
    }

    /// Matrices for the camera uniform
    pub fn camera_data(&self) -> CameraData {
        let eye = Point3::from(self.position);
        CameraData::look_at(&eye, &(eye + self.direction()), self.fov, self.aspect_ratio)
    }
}
