use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the parsimony length of a tree
    #[command(name = "p.len")]
    TreeLength {
        /// The phylogenetic data matrix
        dataset: PathBuf,

        /// Read the tree from this file instead of standard input
        #[arg(short = 't', long = "tree")]
        tree: Option<PathBuf>,
    },

    /// Build a Wagner tree and improve it by SPR branch swapping
    #[command(name = "p.wagday")]
    WagnerDayhoff {
        /// The phylogenetic data matrix; standard input if omitted
        dataset: Option<PathBuf>,

        /// Separate sister groups with commas instead of spaces
        #[arg(short = 'c', long = "comma")]
        comma: bool,

        /// Seed for the random addition sequence; wall clock if omitted
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the negative log likelihood of a tree
    #[command(name = "l.like")]
    Likelihood {
        /// The phylogenetic data matrix
        dataset: PathBuf,

        /// Read the tree from this file instead of standard input
        #[arg(short = 't', long = "tree")]
        tree: Option<PathBuf>,

        /// Refine branch lengths and model rates before reporting
        #[arg(short = 'o', long = "optimize")]
        optimize: bool,
    },
}
