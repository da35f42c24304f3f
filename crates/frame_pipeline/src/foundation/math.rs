//! Math utilities and types
//!
//! Provides the matrix and vector aliases used for constant buffer contents,
//! plus the small alignment helpers the frame allocators depend on.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Size in bytes of a `Mat4` once written into a constant buffer
pub const MAT4_SIZE: usize = std::mem::size_of::<[f32; 16]>();

/// Common math utilities
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * std::f32::consts::PI / 180.0
    }

    /// Round `value` up to the next multiple of `alignment`
    ///
    /// `alignment` must be a power of two; zero and one leave the value unchanged.
    pub const fn align_up(value: u64, alignment: u64) -> u64 {
        if alignment <= 1 {
            return value;
        }
        (value + alignment - 1) & !(alignment - 1)
    }
}

/// View a matrix as the bytes a shader reads
///
/// nalgebra stores matrices column-major, which is the layout the constant
/// buffer fields are declared with.
pub fn matrix_bytes(matrix: &Mat4) -> &[u8] {
    bytemuck::cast_slice(matrix.as_slice())
}

/// Extension trait for Mat4 with camera matrix constructors
pub trait Mat4Ext {
    /// Create a perspective projection matrix mapping depth to [0, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed view matrix looking at `target`
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Create a right-handed view matrix looking along `direction`
    fn look_to(eye: Vec3, direction: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // Right-handed view space (camera looks down -Z), depth mapped to [0, 1]
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = (near * far) / (near - far);
        result[(3, 2)] = -1.0;

        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Self::look_to(eye, target - eye, up)
    }

    fn look_to(eye: Vec3, direction: Vec3, up: Vec3) -> Mat4 {
        let forward = direction.normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_align_up() {
        assert_eq!(utils::align_up(0, 256), 0);
        assert_eq!(utils::align_up(1, 256), 256);
        assert_eq!(utils::align_up(64, 256), 256);
        assert_eq!(utils::align_up(256, 256), 256);
        assert_eq!(utils::align_up(257, 256), 512);
        assert_eq!(utils::align_up(13, 1), 13);
    }

    #[test]
    fn test_matrix_bytes_are_column_major() {
        let mut m = Mat4::identity();
        m[(0, 3)] = 5.0; // translation x lives in the fourth column
        let bytes = matrix_bytes(&m);
        assert_eq!(bytes.len(), MAT4_SIZE);

        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_relative_eq!(floats[12], 5.0);
        assert_relative_eq!(floats[0], 1.0);
    }

    #[test]
    fn test_look_to_moves_eye_to_origin() {
        let eye = Vec3::new(0.0, 0.0, 1.7);
        let view = Mat4::look_to(eye, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0));
        let p = view * nalgebra::Vector4::new(eye.x, eye.y, eye.z, 1.0);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_depth_range() {
        let proj = Mat4::perspective(utils::deg_to_rad(45.0), 16.0 / 9.0, 0.25, 512.0);
        let near = proj * nalgebra::Vector4::new(0.0, 0.0, -0.25, 1.0);
        let far = proj * nalgebra::Vector4::new(0.0, 0.0, -512.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }
}
