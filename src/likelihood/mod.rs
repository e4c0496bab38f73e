//! Likelihood scoring of phylogenetic trees.
//!
//! Characters evolve under a Markov substitution model; conditional
//! likelihoods are propagated to the root by Felsenstein pruning, and
//! branch lengths and free model rates are refined by a geometric
//! step-halving search.

mod matrix;
mod model;
mod tree;

pub use matrix::Matrix;
pub use model::{jukes_cantor, Model, Poisson};
pub use tree::{Node, Tree};
