use std::io::BufRead;

use crate::error::Error;
use crate::matrix::DataType;

/// A taxon record read from one block of a matrix file.
#[derive(Debug, Clone)]
pub struct BlockTaxon {
    pub block: usize,
    pub kind: DataType,
    pub name: String,
    pub chars: Vec<u8>,
}

/// Scanner reads taxon records from the line oriented matrix format.
///
/// Blocks open with a `>dna` or `>morphology` header; lines starting with
/// `#` are comments and blank lines are skipped. Every other line is a
/// taxon name followed by its character states.
pub struct Scanner<R> {
    reader: R,
    line: String,
    kind: Option<DataType>,
    block: usize,
}

impl<R: BufRead> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Scanner {
            reader,
            line: String::new(),
            kind: None,
            block: 0,
        }
    }

    /// Reads the next taxon record, crossing block headers as needed.
    /// Returns `None` at end of input.
    pub fn scan(&mut self) -> Result<Option<BlockTaxon>, Error> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let line = self.line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(header) = line.strip_prefix('>') {
                self.kind = Some(read_data_type(header)?);
                self.block += 1;
                continue;
            }

            let Some(kind) = self.kind else {
                return Err(Error::Matrix(format!(
                    "data line outside of a data block: {line}"
                )));
            };
            let mut fields = line.split_whitespace();
            let name = match fields.next() {
                Some(nm) => nm.to_string(),
                None => continue,
            };
            let states: String = fields.collect();
            if states.is_empty() {
                return Err(Error::MatrixTaxon {
                    block: self.block,
                    taxon: name,
                    message: "no characters".to_string(),
                });
            }
            let chars = match read_states(&states, kind) {
                Ok(chars) => chars,
                Err(message) => {
                    return Err(Error::MatrixTaxon {
                        block: self.block,
                        taxon: name,
                        message,
                    })
                }
            };
            return Ok(Some(BlockTaxon {
                block: self.block,
                kind,
                name,
                chars,
            }));
        }
    }
}

fn read_data_type(header: &str) -> Result<DataType, Error> {
    let word = header
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if word == "dna" {
        return Ok(DataType::Dna);
    }
    if word.starts_with("morpho") {
        return Ok(DataType::Morphology);
    }
    Err(Error::Matrix(format!("unknown data type: {word}")))
}

fn read_states(states: &str, kind: DataType) -> Result<Vec<u8>, String> {
    match kind {
        DataType::Dna => states.chars().map(dna_state).collect(),
        DataType::Morphology => morphology_states(states),
    }
}

/// IUPAC nucleotide codes as unions over {A=1, C=2, G=4, T=8}.
fn dna_state(c: char) -> Result<u8, String> {
    let v = match c.to_ascii_uppercase() {
        'A' => 1,
        'C' => 2,
        'G' => 4,
        'T' | 'U' => 8,
        'Y' => 2 | 8,
        'R' => 1 | 4,
        'W' => 1 | 8,
        'S' => 2 | 4,
        'K' => 4 | 8,
        'M' => 1 | 2,
        'B' => 2 | 4 | 8,
        'D' => 1 | 4 | 8,
        'H' => 1 | 2 | 8,
        'V' => 1 | 2 | 4,
        'X' | 'N' | '?' | '-' | 'O' => 15,
        _ => return Err(format!("unknown symbol {c:?}")),
    };
    Ok(v)
}

fn morphology_states(states: &str) -> Result<Vec<u8>, String> {
    let mut chars = Vec::new();
    let mut it = states.chars();
    while let Some(c) = it.next() {
        match c {
            '?' | '-' => chars.push(DataType::Morphology.unknown()),
            '0'..='7' => chars.push(1 << (c as u8 - b'0')),
            '(' | '[' => {
                let mut cell = 0u8;
                loop {
                    match it.next() {
                        Some(')') | Some(']') => break,
                        Some(d @ '0'..='7') => cell |= 1 << (d as u8 - b'0'),
                        Some(d) => {
                            return Err(format!(
                                "while reading polymorph: unknown symbol {d:?}"
                            ))
                        }
                        None => return Err("while reading polymorph: unexpected end".to_string()),
                    }
                }
                chars.push(cell);
            }
            _ => return Err(format!("unknown symbol {c:?}")),
        }
    }
    Ok(chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(text: &str) -> Result<Vec<BlockTaxon>, Error> {
        let mut sc = Scanner::new(text.as_bytes());
        let mut out = Vec::new();
        while let Some(tx) = sc.scan()? {
            out.push(tx);
        }
        Ok(out)
    }

    #[test]
    fn dna_block() {
        let recs = scan_all("# a comment\n> dna\nOut AcgT\nAlpha RYN-\n").unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].name, "Out");
        assert_eq!(recs[0].block, 1);
        assert_eq!(recs[0].kind, DataType::Dna);
        assert_eq!(recs[0].chars, vec![1, 2, 4, 8]);
        assert_eq!(recs[1].chars, vec![1 | 4, 2 | 8, 15, 15]);
    }

    #[test]
    fn morphology_block() {
        let recs = scan_all(">morphology\nTx 01(23)[45]?-7\n").unwrap();
        assert_eq!(recs[0].kind, DataType::Morphology);
        assert_eq!(
            recs[0].chars,
            vec![1, 2, 4 | 8, 16 | 32, 255, 255, 128]
        );
    }

    #[test]
    fn morpho_prefix_header() {
        let recs = scan_all(">Morpho\nTx 0\n").unwrap();
        assert_eq!(recs[0].kind, DataType::Morphology);
    }

    #[test]
    fn blocks_are_counted() {
        let recs = scan_all(">dna\nA AA\n>morpho\nA 00\n").unwrap();
        assert_eq!(recs[0].block, 1);
        assert_eq!(recs[1].block, 2);
    }

    #[test]
    fn unknown_data_type() {
        let err = scan_all(">protein\nA AA\n").unwrap_err();
        assert!(err.to_string().contains("unknown data type"));
    }

    #[test]
    fn unknown_dna_symbol() {
        let err = scan_all(">dna\nA AZ\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("on block 1"), "{msg}");
        assert!(msg.contains("taxon A"), "{msg}");
        assert!(msg.contains("unknown symbol"), "{msg}");
    }

    #[test]
    fn unknown_morphology_symbol() {
        let err = scan_all(">morpho\nA 08\n").unwrap_err();
        assert!(err.to_string().contains("unknown symbol"));
    }

    #[test]
    fn data_before_header() {
        let err = scan_all("A ACGT\n").unwrap_err();
        assert!(err.to_string().contains("outside of a data block"));
    }

    #[test]
    fn taxon_without_characters() {
        let err = scan_all(">dna\nA\n").unwrap_err();
        assert!(err.to_string().contains("no characters"));
    }
}
