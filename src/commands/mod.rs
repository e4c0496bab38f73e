pub mod likelihood;
pub mod tree_length;
pub mod wagner_dayhoff;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

use crate::matrix::Matrix;

/// Reads and merges the data matrix from a file.
pub(crate) fn read_matrix(path: &Path) -> Result<Matrix> {
    let f = File::open(path).with_context(|| format!("while opening {}", path.display()))?;
    Matrix::read(BufReader::new(f)).context("when parsing matrix")
}

/// Reads the tree text from a file, or from standard input when no file
/// was given.
pub(crate) fn read_tree_text(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => {
            std::fs::read_to_string(p).with_context(|| format!("while opening {}", p.display()))
        }
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("while reading standard input")?;
            Ok(text)
        }
    }
}
