//! Draw content of a render queue
//!
//! A content block owns its draw calls and object batches and lists, in draw
//! order, which of them to record.

use std::sync::Arc;

use crate::foundation::math::Mat4;
use crate::render::material::Material;
use crate::render::mesh::Mesh;
use crate::render::{RenderError, RenderResult};

/// Kind of a standalone draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawCallKind {
    /// Three vertices generated in the vertex shader
    FullScreenTriangle,
    /// A mesh drawn outside any batch
    Mesh,
}

/// A draw that is not part of an object batch
#[derive(Debug, Clone)]
pub struct DrawCall {
    /// What is drawn
    pub kind: DrawCallKind,
    /// Material drawn with
    pub material: Arc<Material>,
}

impl DrawCall {
    /// Full-screen triangle drawn with `material`
    pub fn full_screen_triangle(material: Arc<Material>) -> Self {
        Self {
            kind: DrawCallKind::FullScreenTriangle,
            material,
        }
    }
}

/// A mesh and the materials of its submeshes
#[derive(Debug, Clone)]
pub struct MeshRenderer {
    /// Mesh drawn
    pub mesh: Arc<Mesh>,
    /// Material per submesh; extra materials are ignored
    pub materials: Vec<Arc<Material>>,
}

/// Objects flattened into parallel arrays
///
/// Entry `i` of every array describes the same object.
#[derive(Debug, Clone, Default)]
pub struct FlattenedObjects {
    /// Renderers
    pub mesh_renderers: Vec<MeshRenderer>,
    /// Object to world transforms
    pub world_transforms: Vec<Mat4>,
    /// Inverse-transposed world transforms
    pub world_transform_invs: Vec<Mat4>,
}

impl FlattenedObjects {
    /// Add one object
    pub fn push(&mut self, renderer: MeshRenderer, world: Mat4) {
        let inverse = world.try_inverse().unwrap_or_else(Mat4::identity).transpose();
        self.mesh_renderers.push(renderer);
        self.world_transforms.push(world);
        self.world_transform_invs.push(inverse);
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.mesh_renderers.len()
    }

    /// Whether the batch has no objects
    pub fn is_empty(&self) -> bool {
        self.mesh_renderers.is_empty()
    }

    /// Check the arrays are parallel
    pub fn validate(&self) -> RenderResult<()> {
        let renderers = self.mesh_renderers.len();
        if self.world_transforms.len() != renderers || self.world_transform_invs.len() != renderers {
            return Err(RenderError::MismatchedBatch {
                renderers,
                transforms: self.world_transforms.len(),
                inverses: self.world_transform_invs.len(),
            });
        }
        Ok(())
    }
}

/// Which item of a content block to draw next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawItem {
    /// Index into [`RenderQueueContent::draw_calls`]
    DrawCall(usize),
    /// Index into [`RenderQueueContent::flattened_objects`]
    ObjectBatch(usize),
}

/// Draw calls and batches of one queue content block
#[derive(Debug, Clone, Default)]
pub struct RenderQueueContent {
    /// Standalone draw calls
    pub draw_calls: Vec<DrawCall>,
    /// Object batches
    pub flattened_objects: Vec<FlattenedObjects>,
    /// Draw order
    pub items: Vec<DrawItem>,
}

impl RenderQueueContent {
    /// Append a draw call to the draw order
    pub fn push_draw_call(&mut self, draw_call: DrawCall) {
        self.items.push(DrawItem::DrawCall(self.draw_calls.len()));
        self.draw_calls.push(draw_call);
    }

    /// Append an object batch to the draw order
    pub fn push_batch(&mut self, batch: FlattenedObjects) {
        self.items.push(DrawItem::ObjectBatch(self.flattened_objects.len()));
        self.flattened_objects.push(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::shader::Shader;

    fn renderer() -> MeshRenderer {
        MeshRenderer {
            mesh: Arc::new(Mesh::new("quad", 0, Vec::new())),
            materials: vec![Arc::new(Material::new("m", Arc::new(Shader::new("s"))))],
        }
    }

    #[test]
    fn test_push_keeps_arrays_parallel() {
        let mut batch = FlattenedObjects::default();
        let world = Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0));
        batch.push(renderer(), world);

        assert!(batch.validate().is_ok());
        assert_eq!(batch.len(), 1);
        approx::assert_relative_eq!(
            batch.world_transform_invs[0],
            world.try_inverse().unwrap().transpose()
        );
    }

    #[test]
    fn test_mismatched_batch_is_rejected() {
        let mut batch = FlattenedObjects::default();
        batch.push(renderer(), Mat4::identity());
        batch.world_transform_invs.clear();

        assert!(matches!(
            batch.validate(),
            Err(RenderError::MismatchedBatch { renderers: 1, transforms: 1, inverses: 0 })
        ));
    }

    #[test]
    fn test_items_follow_push_order() {
        let mut content = RenderQueueContent::default();
        content.push_batch(FlattenedObjects::default());
        content.push_draw_call(DrawCall::full_screen_triangle(renderer().materials[0].clone()));
        content.push_batch(FlattenedObjects::default());

        assert_eq!(
            content.items,
            vec![DrawItem::ObjectBatch(0), DrawItem::DrawCall(0), DrawItem::ObjectBatch(1)]
        );
    }
}
