use thiserror::Error;

/// Errors produced while reading matrices and trees or binding models.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A malformed matrix, without a specific taxon to blame.
    #[error("matrix: {0}")]
    Matrix(String),

    /// A malformed matrix entry, located by block and taxon.
    #[error("matrix: on block {block}: taxon {taxon}: {message}")]
    MatrixTaxon {
        block: usize,
        taxon: String,
        message: String,
    },

    /// A malformed parenthetical tree.
    #[error("readtree: {0}")]
    Tree(String),

    /// A substitution model that cannot serve the column it was assigned to.
    #[error("likelihood: matrix: {0}")]
    Model(String),
}

impl Error {
    pub(crate) fn tree(message: impl Into<String>) -> Self {
        Error::Tree(message.into())
    }
}
