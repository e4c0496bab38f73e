use clap::Parser;

use cladus::cli::{Args, Commands};
use cladus::commands;

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("cladus: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Commands::TreeLength { dataset, tree } => commands::tree_length::run(dataset, tree),
        Commands::WagnerDayhoff {
            dataset,
            comma,
            seed,
        } => commands::wagner_dayhoff::run(dataset, comma, seed),
        Commands::Likelihood {
            dataset,
            tree,
            optimize,
        } => commands::likelihood::run(dataset, tree, optimize),
    }
}
