//! Parsimony scoring and tree search.
//!
//! The tree lives in a flat node arena; parent and child links are arena
//! indices, so pruning and regrafting are plain index assignments. Every
//! internal node keeps a shadow copy of its down-pass state so candidate
//! moves can be scored and rolled back along the changed ancestor path
//! only.

mod dayhoff;
mod tree;
mod wagner;

pub use tree::{Node, NodeId, Tree};
