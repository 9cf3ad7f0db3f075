//! Math types used by the scene and the renderer

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, UnitQuaternion, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Unit quaternion used for rotations
pub type Quat = UnitQuaternion<f32>;

/// Position, rotation and scale of a scene node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Transform with only a translation
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Build from the decomposed `[x, y, z]`, `[x, y, z, w]`, `[x, y, z]` arrays used by asset formats
    pub fn from_decomposed(position: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        let [x, y, z, w] = rotation;
        Self {
            position: Vec3::from(position),
            rotation: Quat::from_quaternion(Quaternion::new(w, x, y, z)),
            scale: Vec3::from(scale),
        }
    }

    /// Compose as translate * rotate * scale
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Inverse-transpose of the upper 3x3 block, used to transform normals
///
/// Falls back to the plain upper block when `model` is singular.
pub fn normal_matrix(model: &Mat4) -> Mat3 {
    let upper: Mat3 = model.fixed_view::<3, 3>(0, 0).into_owned();
    upper.try_inverse().map_or(upper, |inverse| inverse.transpose())
}

/// Math constants
pub mod constants {
    /// Pi / 2
    pub const HALF_PI: f32 = std::f32::consts::FRAC_PI_2;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_identity_transform_is_identity_matrix() {
        assert_relative_eq!(Transform::identity().to_matrix(), Mat4::identity(), epsilon = EPSILON);
    }

    #[test]
    fn test_transform_composes_translate_rotate_scale() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_axis_angle(&Vec3::z_axis(), constants::HALF_PI),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };
        // x axis is scaled to 2, rotated onto +y, then translated
        let point = transform.to_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(point, Point3::new(1.0, 4.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_from_decomposed_reorders_quaternion() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let transform = Transform::from_decomposed([0.0; 3], [0.0, half, 0.0, half], [1.0; 3]);
        let expected = Quat::from_axis_angle(&Vec3::y_axis(), constants::HALF_PI);
        assert_relative_eq!(transform.rotation.angle_to(&expected), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0));
        let normal = normal_matrix(&model);
        assert_relative_eq!(normal[(0, 0)], 0.5, epsilon = EPSILON);
        assert_relative_eq!(normal[(1, 1)], 1.0, epsilon = EPSILON);
    }
}
