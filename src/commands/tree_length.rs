use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::commands::{read_matrix, read_tree_text};
use crate::parsimony::Tree;

/// The `p.len` command: read a matrix and a tree, print the tree's
/// parsimony length.
pub fn run(dataset: PathBuf, tree: Option<PathBuf>) -> Result<()> {
    let m = read_matrix(&dataset)?;
    let text = read_tree_text(tree.as_deref())?;
    let tr = Tree::read(&text, &m).context("when parsing tree")?;
    println!("# Tree Length:\n{}", tr.cost());
    Ok(())
}
