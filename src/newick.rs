//! Parenthetical (Newick style) tree text parsing.
//!
//! The parser produces a small syntax tree; the parsimony and likelihood
//! tree builders turn it into their own node arenas and enforce binarity.
//! Anything before the first `(` is skipped, so leading comment lines are
//! tolerated. Children are separated by commas or whitespace, and any node
//! may carry a `:length` suffix. A trailing `;` is consumed when present.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::Error;

/// One node of a parsed parenthetical tree.
///
/// Terminals have a label and no children; clades have children and no
/// label. Branch lengths are kept when the text carries them.
#[derive(Debug, Clone, PartialEq)]
pub struct NewickNode {
    pub label: Option<String>,
    pub length: Option<f64>,
    pub children: Vec<NewickNode>,
}

impl NewickNode {
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}

/// Parses the outermost tree found in `text`.
pub fn parse(text: &str) -> Result<NewickNode, Error> {
    let mut it = text.chars().peekable();
    loop {
        match it.next() {
            Some('(') => break,
            Some(_) => continue,
            None => return Err(Error::tree("unable to read tree")),
        }
    }
    let mut root = parse_clade(&mut it)?;
    skip_spaces(&mut it);
    if it.peek() == Some(&':') {
        it.next();
        root.length = Some(parse_length(&mut it)?);
        skip_spaces(&mut it);
    }
    if it.peek() == Some(&';') {
        it.next();
    }
    Ok(root)
}

/// Parses a clade body; the opening `(` has already been consumed.
fn parse_clade(it: &mut Peekable<Chars>) -> Result<NewickNode, Error> {
    let mut children = Vec::new();
    loop {
        let c = match it.peek() {
            Some(&c) => c,
            None => return Err(Error::tree("unexpected end of tree")),
        };
        if c.is_whitespace() || c == ',' {
            it.next();
            continue;
        }
        if c == ')' {
            it.next();
            break;
        }
        if c == ';' {
            return Err(Error::tree("unexpected ';' inside tree"));
        }
        if c == '(' {
            it.next();
            let mut child = parse_clade(it)?;
            skip_spaces(it);
            if it.peek() == Some(&':') {
                it.next();
                child.length = Some(parse_length(it)?);
            }
            children.push(child);
            continue;
        }
        children.push(parse_terminal(it)?);
    }
    Ok(NewickNode {
        label: None,
        length: None,
        children,
    })
}

fn parse_terminal(it: &mut Peekable<Chars>) -> Result<NewickNode, Error> {
    let mut name = String::new();
    let mut length = None;
    while let Some(&c) = it.peek() {
        if c.is_whitespace() {
            it.next();
            break;
        }
        if c == ':' {
            it.next();
            length = Some(parse_length(it)?);
            break;
        }
        if c == ',' || c == '(' || c == ')' || c == ';' {
            break;
        }
        name.push(c);
        it.next();
    }
    Ok(NewickNode {
        label: Some(name),
        length,
        children: Vec::new(),
    })
}

fn parse_length(it: &mut Peekable<Chars>) -> Result<f64, Error> {
    let mut text = String::new();
    while let Some(&c) = it.peek() {
        if c.is_whitespace() || c == ',' || c == '(' || c == ')' || c == ';' {
            break;
        }
        text.push(c);
        it.next();
    }
    text.parse()
        .map_err(|_| Error::Tree(format!("bad branch length: {text:?}")))
}

fn skip_spaces(it: &mut Peekable<Chars>) {
    while it.peek().is_some_and(|c| c.is_whitespace()) {
        it.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_clades() {
        let t = parse("(Out (Alpha Beta));").unwrap();
        assert_eq!(t.children.len(), 2);
        assert_eq!(t.children[0].label.as_deref(), Some("Out"));
        let inner = &t.children[1];
        assert_eq!(inner.children.len(), 2);
        assert_eq!(inner.children[1].label.as_deref(), Some("Beta"));
    }

    #[test]
    fn comma_and_space_separators_are_equivalent() {
        let a = parse("(A,(B,C));").unwrap();
        let b = parse("(A (B C));").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn keeps_branch_lengths() {
        let t = parse("(A:0.5,(B:0.25,C:1):0.125);").unwrap();
        assert_eq!(t.children[0].length, Some(0.5));
        let inner = &t.children[1];
        assert_eq!(inner.length, Some(0.125));
        assert_eq!(inner.children[0].length, Some(0.25));
        assert_eq!(inner.children[1].length, Some(1.0));
    }

    #[test]
    fn skips_leading_junk_and_newlines() {
        let t = parse("# a comment line\n\n(A,\n B);\n").unwrap();
        assert_eq!(t.children.len(), 2);
    }

    #[test]
    fn semicolon_is_optional() {
        assert!(parse("(A,B)").is_ok());
    }

    #[test]
    fn polytomies_survive_parsing() {
        // arity is checked by the tree builders, not the parser
        let t = parse("(A,B,C);").unwrap();
        assert_eq!(t.children.len(), 3);
    }

    #[test]
    fn missing_open_paren() {
        let err = parse("just text").unwrap_err();
        assert!(err.to_string().contains("unable to read tree"));
    }

    #[test]
    fn bad_branch_length() {
        let err = parse("(A:x,B);").unwrap_err();
        assert!(err.to_string().contains("bad branch length"));
    }

    #[test]
    fn truncated_tree() {
        assert!(parse("(A,(B,C)").is_err());
    }
}
