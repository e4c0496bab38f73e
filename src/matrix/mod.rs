//! Phylogenetic data matrices.
//!
//! A matrix is read from one or more typed blocks and merged into a single
//! per-taxon state vector with per-column type metadata. The first taxon
//! encountered becomes the outgroup.

mod scanner;

pub use scanner::{BlockTaxon, Scanner};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::BufRead;

use crate::error::Error;

/// Index of a terminal taxon inside a [`Matrix`].
pub type TermId = usize;

/// The kind of character data in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Discrete morphological states 0-7, one bit per state.
    Morphology,
    /// Nucleotides A=1, C=2, G=4, T=8 with IUPAC ambiguity unions.
    Dna,
}

impl DataType {
    /// The all-states sentinel used for missing data of this type.
    pub fn unknown(self) -> u8 {
        match self {
            DataType::Morphology => 255,
            DataType::Dna => 15,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Morphology => write!(f, "morphology"),
            DataType::Dna => write!(f, "dna"),
        }
    }
}

/// A terminal taxon with its merged character states.
#[derive(Debug, Clone)]
pub struct Terminal {
    pub name: String,
    pub chars: Vec<u8>,
}

/// A merged character matrix over a set of terminal taxa.
#[derive(Debug, Clone)]
pub struct Matrix {
    kinds: Vec<DataType>,
    terms: Vec<Terminal>,
    index: HashMap<String, TermId>,
}

impl Matrix {
    /// Reads a matrix from a reader, merging all of its blocks.
    ///
    /// Taxa missing from a block are padded with the block's unknown code;
    /// taxa first seen after the opening block are left-padded the same way.
    pub fn read(reader: impl BufRead) -> Result<Matrix, Error> {
        let mut sc = Scanner::new(reader);

        let mut m = Matrix {
            kinds: Vec::new(),
            terms: Vec::new(),
            index: HashMap::new(),
        };

        let mut block = 0; // current block number
        let mut cblock = 0; // character count of the current block
        let mut empty: Vec<u8> = Vec::new(); // left pad for late taxa
        let mut emp_block: Vec<u8> = Vec::new(); // pad for the current block
        let mut bmap: HashSet<String> = HashSet::new(); // taxa seen in the current block

        while let Some(tx) = sc.scan()? {
            if tx.block != block {
                // close the finished block: pad any taxon it did not list
                for t in &mut m.terms {
                    if !bmap.contains(&t.name) {
                        t.chars.extend_from_slice(&emp_block);
                    }
                }
                empty.extend_from_slice(&emp_block);
                bmap.clear();

                block = tx.block;
                cblock = tx.chars.len();
                emp_block = vec![tx.kind.unknown(); cblock];
                m.kinds.extend(std::iter::repeat(tx.kind).take(cblock));
            }
            if tx.chars.len() != cblock {
                return Err(Error::MatrixTaxon {
                    block,
                    taxon: tx.name,
                    message: format!(
                        "wrong number of chars: {}, want {}",
                        tx.chars.len(),
                        cblock
                    ),
                });
            }
            if !bmap.insert(tx.name.clone()) {
                return Err(Error::MatrixTaxon {
                    block,
                    taxon: tx.name,
                    message: "repeated".to_string(),
                });
            }
            let id = match m.index.get(&tx.name) {
                Some(&id) => id,
                None => {
                    let id = m.terms.len();
                    m.terms.push(Terminal {
                        name: tx.name.clone(),
                        chars: empty.clone(),
                    });
                    m.index.insert(tx.name, id);
                    id
                }
            };
            m.terms[id].chars.extend_from_slice(&tx.chars);
        }

        // taxa missing from the last block
        for t in &mut m.terms {
            if !bmap.contains(&t.name) {
                t.chars.extend_from_slice(&emp_block);
            }
        }

        if !m.is_valid() {
            return Err(Error::Matrix("bad formatted matrix".to_string()));
        }
        Ok(m)
    }

    /// True if every terminal has the same number of characters.
    pub fn is_valid(&self) -> bool {
        let n = self.kinds.len();
        self.terms.iter().all(|t| t.chars.len() == n)
    }

    /// The outgroup terminal, i.e. the first taxon read.
    pub fn outgroup(&self) -> TermId {
        0
    }

    pub fn terminal(&self, id: TermId) -> &Terminal {
        &self.terms[id]
    }

    /// Looks a terminal up by name.
    pub fn term_id(&self, name: &str) -> Option<TermId> {
        self.index.get(name).copied()
    }

    pub fn terminals(&self) -> &[Terminal] {
        &self.terms
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn n_chars(&self) -> usize {
        self.kinds.len()
    }

    /// Per-column data types.
    pub fn kinds(&self) -> &[DataType] {
        &self.kinds
    }
}
