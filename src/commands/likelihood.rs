use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::commands::{read_matrix, read_tree_text};
use crate::likelihood::{Matrix, Tree};
use crate::progress::spinner;

/// The `l.like` command: read a matrix and a tree and print the tree's
/// negative log likelihood, optionally refining branch lengths and model
/// rates first.
pub fn run(dataset: PathBuf, tree: Option<PathBuf>, optimize: bool) -> Result<()> {
    let mut m = Matrix::from_matrix(read_matrix(&dataset)?);
    let text = read_tree_text(tree.as_deref())?;
    let mut tr = Tree::read(&text, &m).context("when parsing tree")?;

    if optimize {
        // the misspelling is part of the expected output
        println!("# Origina tree -log Likelihood: {:.6}", -tr.log_like(&m));
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
            .unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(seed);
        let pb = spinner("Refining branch lengths...")?;
        tr.refine(&mut m, &mut rng);
        pb.finish_and_clear();
    }
    println!("# Tree -log Likelihood:\n{:.6}", -tr.log_like(&m));
    Ok(())
}
