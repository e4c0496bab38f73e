use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::matrix::Matrix;
use crate::progress::spinner;

/// The `p.wagday` command: build a Wagner tree with a random addition
/// sequence, improve it by SPR branch swapping, ladderize, and print it.
pub fn run(dataset: Option<PathBuf>, comma: bool, seed: Option<u64>) -> Result<()> {
    let m = match dataset {
        Some(path) => {
            let f =
                File::open(&path).with_context(|| format!("while opening {}", path.display()))?;
            Matrix::read(BufReader::new(f)).context("when parsing matrix")?
        }
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("while reading standard input")?;
            Matrix::read(text.as_bytes()).context("when parsing matrix")?
        }
    };

    let seed = seed.unwrap_or_else(clock_seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let pb = spinner("Building Wagner tree...")?;
    let mut tr = m.wagner(&mut rng)?;
    println!("# Wagner Length: {}", tr.cost());
    pb.set_message("Branch swapping...");
    tr.dayhoff(&mut rng);
    pb.finish_and_clear();

    tr.ladderize(false);
    println!("# Final Length: {}", tr.cost());
    println!("{}", tr.write(&m, comma));
    Ok(())
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
        .unwrap_or(0)
}
