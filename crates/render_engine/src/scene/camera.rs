//! Camera uniform data

use ash::vk;
use bytemuck::{Pod, Zeroable};

use super::uniform::Uniform;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::render::vulkan::{DescriptorSetAllocator, GpuDevice, MemoryAllocator, VulkanResult};

/// Camera matrices as laid out in the shaders' camera block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraData {
    /// World to view, column major
    pub view: [[f32; 4]; 4],
    /// View to clip, column major
    pub proj: [[f32; 4]; 4],
    /// World position, w = 1
    pub position: [f32; 4],
}

impl CameraData {
    /// Near clip plane
    pub const ZNEAR: f32 = 0.01;
    /// Far clip plane
    pub const ZFAR: f32 = 1024.0;

    /// Right-handed camera at `position` looking at `target`, +Y up
    pub fn look_at(position: &Point3, target: &Point3, fov_y: f32, aspect: f32) -> Self {
        let view = Mat4::look_at_rh(position, target, &Vec3::y());
        let proj = Mat4::new_perspective(aspect, fov_y, Self::ZNEAR, Self::ZFAR);
        Self {
            view: view.into(),
            proj: proj.into(),
            position: [position.x, position.y, position.z, 1.0],
        }
    }

    /// View matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from(self.view)
    }

    /// Projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::from(self.proj)
    }
}

/// Camera uniform buffer and the descriptor set that binds it at slot 0
pub struct CameraUniform {
    uniform: Uniform<CameraData>,
    descriptor_set: vk::DescriptorSet,
}

impl CameraUniform {
    /// Allocate the buffer and a set from `sets`, binding the buffer at binding 0
    pub fn new<D: GpuDevice>(
        device: &D,
        allocator: &dyn MemoryAllocator,
        sets: &DescriptorSetAllocator,
        data: &CameraData,
    ) -> VulkanResult<Self> {
        let uniform = Uniform::new(allocator, data)?;
        let descriptor_set = sets.allocate(device)?;
        device.write_descriptor_sets(&[uniform.descriptor_write(descriptor_set, 0)]);
        Ok(Self { uniform, descriptor_set })
    }

    /// Replace the camera matrices
    pub fn set(&self, data: &CameraData) -> VulkanResult<()> {
        self.uniform.set(data)
    }

    /// Current camera matrices
    pub fn get(&self) -> VulkanResult<CameraData> {
        self.uniform.get()
    }

    /// Set bound at slot 0 of the geometry and lighting pipelines
    pub const fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}
