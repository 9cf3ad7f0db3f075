//! Foundation utilities shared by the renderer and the scene

pub mod logging;
pub mod math;
