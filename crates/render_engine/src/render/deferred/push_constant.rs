//! Per-draw model matrices

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{normal_matrix, Mat4, Transform};

/// Model and normal matrices pushed before every mesh draw
///
/// The normal matrix is stored as three padded columns to match GLSL `mat3x4` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelPushConstant {
    /// Object to world, column major
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model's upper 3x3, one column per row
    pub normal_model: [[f32; 4]; 3],
}

impl ModelPushConstant {
    /// Size in bytes of the push constant block
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Build from a composed model matrix
    pub fn from_matrix(model: &Mat4) -> Self {
        let normal = normal_matrix(model);
        let column = |c: usize| [normal[(0, c)], normal[(1, c)], normal[(2, c)], 0.0];
        Self {
            model: (*model).into(),
            normal_model: [column(0), column(1), column(2)],
        }
    }

    /// Build from a decomposed node transform
    pub fn from_transform(transform: &Transform) -> Self {
        Self::from_matrix(&transform.to_matrix())
    }

    /// Vertex-stage range of the geometry pipeline layout
    pub const fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: Self::SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Quat, Vec3};
    use approx::assert_relative_eq;

    #[test]
    fn test_layout_is_112_bytes() {
        assert_eq!(ModelPushConstant::SIZE, 112);
        assert_eq!(bytemuck::bytes_of(&ModelPushConstant::from_matrix(&Mat4::identity())).len(), 112);
    }

    #[test]
    fn test_identity_has_identity_normals() {
        let constant = ModelPushConstant::from_transform(&Transform::identity());
        assert_eq!(constant.model[3], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(constant.normal_model[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(constant.normal_model[2], [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_translation_lands_in_last_column() {
        let constant = ModelPushConstant::from_transform(&Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(constant.model[3], [1.0, 2.0, 3.0, 1.0]);
        // translation never reaches the normal matrix
        assert_eq!(constant.normal_model[0], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_scaled_normals_are_inverse_scaled() {
        let transform = Transform {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(4.0, 1.0, 2.0),
        };
        let constant = ModelPushConstant::from_transform(&transform);
        assert_relative_eq!(constant.normal_model[0][0], 0.25);
        assert_relative_eq!(constant.normal_model[1][1], 1.0);
        assert_relative_eq!(constant.normal_model[2][2], 0.5);
    }
}
