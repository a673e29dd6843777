//! Scene model
//!
//! Nodes live in an arena ([`SceneGraph`]) and refer to each other by [`NodeId`].
//! Parent links are plain indices, so there are no reference cycles to manage.

mod camera;
mod scene_graph;

pub use camera::Camera;
pub use scene_graph::{NodeId, SceneGraph, SceneNode};

use thiserror::Error;

/// Scene graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The id does not refer to a live node
    #[error("Node {0:?} does not exist")]
    NodeNotFound(NodeId),

    /// Reparenting would make a node its own ancestor
    #[error("Reparenting {child:?} under {parent:?} would create a cycle")]
    CycleDetected {
        /// Node being moved
        child: NodeId,
        /// Requested new parent
        parent: NodeId,
    },
}
