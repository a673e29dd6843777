//! Arena-backed scene graph
//!
//! World transforms are not cached; [`SceneGraph::world_transform`] folds the local
//! transforms from the root down to the node each time it is asked.

use slotmap::{new_key_type, SlotMap};

use super::{Camera, SceneError};
use crate::foundation::math::{Mat4, Transform};
use crate::render::MeshHandle;

new_key_type! {
    /// Handle to a node in a [`SceneGraph`]
    pub struct NodeId;
}

/// A node in the scene
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Human readable name (not required to be unique)
    pub name: String,
    /// Stable numeric id, unique within the graph for its lifetime
    pub id: u64,
    /// Transform relative to the parent
    pub local_transform: Transform,
    /// Mesh drawn at this node
    pub mesh: Option<MeshHandle>,
    /// Camera attached to this node
    pub camera: Option<Camera>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    fn new(name: impl Into<String>, id: u64, local_transform: Transform) -> Self {
        Self {
            name: name.into(),
            id,
            local_transform,
            mesh: None,
            camera: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Parent node, `None` for roots
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Direct children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Scene graph storing nodes in a generational arena
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, SceneNode>,
    roots: Vec<NodeId>,
    next_id: u64,
}

impl SceneGraph {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the scene has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root nodes in insertion order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Borrow a node
    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Mutably borrow a node
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    fn get(&self, id: NodeId) -> Result<&SceneNode, SceneError> {
        self.nodes.get(id).ok_or(SceneError::NodeNotFound(id))
    }

    fn allocate(&mut self, name: impl Into<String>, transform: Transform) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(SceneNode::new(name, id, transform))
    }

    /// Add a node without a parent
    pub fn add_root(&mut self, name: impl Into<String>, transform: Transform) -> NodeId {
        let node = self.allocate(name, transform);
        self.roots.push(node);
        node
    }

    /// Add a node under `parent`
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        transform: Transform,
    ) -> Result<NodeId, SceneError> {
        self.get(parent)?;
        let node = self.allocate(name, transform);
        self.link(parent, node);
        Ok(node)
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
    }

    fn unlink(&mut self, child: NodeId) {
        let parent = self.nodes.get_mut(child).and_then(|node| node.parent.take());
        match parent {
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(parent) {
                    node.children.retain(|&c| c != child);
                }
            }
            None => self.roots.retain(|&r| r != child),
        }
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(SceneNode::parent);
        }
        false
    }

    /// Move `child` under `new_parent`, or make it a root when `new_parent` is `None`
    pub fn reparent(&mut self, child: NodeId, new_parent: Option<NodeId>) -> Result<(), SceneError> {
        self.get(child)?;
        if let Some(parent) = new_parent {
            self.get(parent)?;
            if self.is_ancestor(child, parent) {
                return Err(SceneError::CycleDetected { child, parent });
            }
        }

        self.unlink(child);
        match new_parent {
            Some(parent) => self.link(parent, child),
            None => self.roots.push(child),
        }
        Ok(())
    }

    /// Remove a node and all of its descendants, returning how many nodes were removed
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<usize, SceneError> {
        self.get(id)?;
        self.unlink(id);

        let mut stack = vec![id];
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// World matrix of a node: product of local matrices from its root down to itself
    pub fn world_transform(&self, id: NodeId) -> Result<Mat4, SceneError> {
        let mut node = self.get(id)?;
        let mut world = node.local_transform.to_matrix();
        while let Some(parent) = node.parent {
            node = self.get(parent)?;
            world = node.local_transform.to_matrix() * world;
        }
        Ok(world)
    }

    /// Visit every node depth first, parents before children, roots in insertion order
    pub fn traverse_depth_first(&self, mut visit: impl FnMut(NodeId, &SceneNode)) {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                visit(id, node);
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }

    /// First node with the given name in depth-first order
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        let mut found = None;
        self.traverse_depth_first(|id, node| {
            if found.is_none() && node.name == name {
                found = Some(id);
            }
        });
        found
    }

    /// Attach a mesh to a node
    pub fn set_mesh(&mut self, id: NodeId, mesh: MeshHandle) -> Result<(), SceneError> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        node.mesh = Some(mesh);
        Ok(())
    }

    /// Rewrite every mesh handle in the scene
    pub fn remap_meshes(&mut self, mut map: impl FnMut(MeshHandle) -> Option<MeshHandle>) {
        for node in self.nodes.values_mut() {
            node.mesh = node.mesh.and_then(&mut map);
        }
    }

    /// Every node carrying a mesh, paired with its world matrix
    pub fn mesh_nodes(&self) -> Vec<(MeshHandle, Mat4)> {
        let mut result = Vec::new();
        let mut stack: Vec<(NodeId, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|&id| (id, Mat4::identity()))
            .collect();

        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else { continue };
            let world = parent_world * node.local_transform.to_matrix();
            if let Some(mesh) = node.mesh {
                result.push((mesh, world));
            }
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
        result
    }

    /// First node carrying a camera
    pub fn active_camera(&self) -> Option<NodeId> {
        let mut found = None;
        self.traverse_depth_first(|id, node| {
            if found.is_none() && node.camera.is_some() {
                found = Some(id);
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Point3, Vec3};
    use approx::assert_relative_eq;

    fn translated(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_position(Vec3::new(x, y, z))
    }

    #[test]
    fn test_world_transform_composes_ancestors() {
        let mut scene = SceneGraph::new();
        let root = scene.add_root("root", translated(1.0, 0.0, 0.0));
        let child = scene.add_child(root, "child", translated(0.0, 2.0, 0.0)).unwrap();
        let grandchild = scene.add_child(child, "grandchild", translated(0.0, 0.0, 3.0)).unwrap();

        let p = scene
            .world_transform(grandchild)
            .unwrap()
            .transform_point(&Point3::origin());
        assert_relative_eq!(p, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_world_transform_tracks_local_changes() {
        let mut scene = SceneGraph::new();
        let root = scene.add_root("root", Transform::identity());
        let child = scene.add_child(root, "child", translated(1.0, 0.0, 0.0)).unwrap();

        scene.node_mut(root).unwrap().local_transform = translated(0.0, 5.0, 0.0);
        let p = scene.world_transform(child).unwrap().transform_point(&Point3::origin());
        assert_relative_eq!(p, Point3::new(1.0, 5.0, 0.0));
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let mut scene = SceneGraph::new();
        let a = scene.add_root("a", Transform::identity());
        let b = scene.add_child(a, "b", Transform::identity()).unwrap();
        let c = scene.add_child(b, "c", Transform::identity()).unwrap();

        assert_eq!(
            scene.reparent(a, Some(c)),
            Err(SceneError::CycleDetected { child: a, parent: c })
        );
        assert!(scene.reparent(a, Some(a)).is_err());

        scene.reparent(c, None).unwrap();
        assert_eq!(scene.roots(), &[a, c]);
        assert!(scene.node(b).unwrap().children().is_empty());
        assert_eq!(scene.node(c).unwrap().parent(), None);
    }

    #[test]
    fn test_remove_subtree_invalidates_ids() {
        let mut scene = SceneGraph::new();
        let a = scene.add_root("a", Transform::identity());
        let b = scene.add_child(a, "b", Transform::identity()).unwrap();
        let c = scene.add_child(b, "c", Transform::identity()).unwrap();
        let d = scene.add_child(a, "d", Transform::identity()).unwrap();

        assert_eq!(scene.remove_subtree(b).unwrap(), 2);
        assert_eq!(scene.len(), 2);
        assert!(scene.node(c).is_none());
        assert_eq!(scene.node(a).unwrap().children(), &[d]);
        assert_eq!(scene.world_transform(c), Err(SceneError::NodeNotFound(c)));
    }

    #[test]
    fn test_traversal_order_and_lookup() {
        let mut scene = SceneGraph::new();
        let a = scene.add_root("a", Transform::identity());
        let b = scene.add_child(a, "b", Transform::identity()).unwrap();
        scene.add_child(b, "c", Transform::identity()).unwrap();
        scene.add_child(a, "d", Transform::identity()).unwrap();
        scene.add_root("e", Transform::identity());

        let mut names = Vec::new();
        scene.traverse_depth_first(|_, node| names.push(node.name.clone()));
        assert_eq!(names, ["a", "b", "c", "d", "e"]);

        assert_eq!(scene.find_by_name("b"), Some(b));
        assert_eq!(scene.find_by_name("zzz"), None);
    }

    #[test]
    fn test_unique_ids_are_not_reused() {
        let mut scene = SceneGraph::new();
        let a = scene.add_root("a", Transform::identity());
        let first = scene.node(a).unwrap().id;
        scene.remove_subtree(a).unwrap();
        let b = scene.add_root("b", Transform::identity());
        assert_ne!(scene.node(b).unwrap().id, first);
    }

    #[test]
    fn test_mesh_nodes_carry_world_matrices() {
        let mut scene = SceneGraph::new();
        let root = scene.add_root("root", translated(0.0, 1.0, 0.0));
        let child = scene.add_child(root, "mesh", translated(2.0, 0.0, 0.0)).unwrap();
        scene.set_mesh(child, MeshHandle(7)).unwrap();

        let meshes = scene.mesh_nodes();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].0, MeshHandle(7));
        let p = meshes[0].1.transform_point(&Point3::origin());
        assert_relative_eq!(p, Point3::new(2.0, 1.0, 0.0));

        scene.remap_meshes(|MeshHandle(i)| Some(MeshHandle(i + 1)));
        assert_eq!(scene.mesh_nodes()[0].0, MeshHandle(8));
    }
}
