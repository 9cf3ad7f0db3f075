//! Rendering: Vulkan backend, submission tracking, uploads and the deferred frame

pub mod deferred;
pub mod pacing;
pub mod submit;
pub mod transfer;
pub mod vulkan;

#[cfg(test)]
pub(crate) mod testing;
