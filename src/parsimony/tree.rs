use std::collections::HashSet;
use std::mem;

use crate::error::Error;
use crate::matrix::{Matrix, TermId};
use crate::newick::{self, NewickNode};

/// Index of a node inside a [`Tree`] arena.
pub type NodeId = usize;

/// A node of a parsimony tree.
///
/// Terminal nodes carry a copy of their taxon's state vector and never
/// change it; internal nodes own a down-pass assignment, its cost, and a
/// shadow copy of both for rollback during search.
#[derive(Debug, Clone)]
pub struct Node {
    pub anc: Option<NodeId>,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub term: Option<TermId>,
    pub chars: Vec<u8>,
    pub cost: u32,
    pub(crate) chars_bak: Vec<u8>,
    pub(crate) cost_bak: u32,
}

impl Node {
    pub(crate) fn internal(n_chars: usize) -> Node {
        Node {
            anc: None,
            left: None,
            right: None,
            term: None,
            chars: vec![0; n_chars],
            cost: 0,
            chars_bak: vec![0; n_chars],
            cost_bak: 0,
        }
    }

    pub(crate) fn terminal(term: TermId, chars: Vec<u8>, anc: Option<NodeId>) -> Node {
        Node {
            anc,
            left: None,
            right: None,
            term: Some(term),
            chars,
            cost: 0,
            chars_bak: Vec::new(),
            cost_bak: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.term.is_some()
    }
}

/// A rooted binary phylogenetic tree scored under parsimony.
#[derive(Debug, Clone)]
pub struct Tree {
    pub root: NodeId,
    pub(crate) nodes: Vec<Node>,
}

impl Tree {
    /// The current cost of the tree.
    pub fn cost(&self) -> u32 {
        self.nodes[self.root].cost
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Fitch down-pass at a single internal node: intersect the children's
    /// state sets per column, falling back to the union at one extra step.
    pub(crate) fn optimize(&mut self, n: NodeId) {
        let (Some(left), Some(right)) = (self.nodes[n].left, self.nodes[n].right) else {
            return;
        };
        let mut chars = mem::take(&mut self.nodes[n].chars);
        let mut cost = self.nodes[left].cost + self.nodes[right].cost;
        {
            let lc = &self.nodes[left].chars;
            let rc = &self.nodes[right].chars;
            for (i, slot) in chars.iter_mut().enumerate() {
                let v = lc[i] & rc[i];
                *slot = if v == 0 {
                    cost += 1;
                    lc[i] | rc[i]
                } else {
                    v
                };
            }
        }
        let node = &mut self.nodes[n];
        node.chars = chars;
        node.cost = cost;
    }

    /// Rescores `n` and every ancestor up to the root; returns the root cost.
    pub(crate) fn incre_down(&mut self, n: NodeId) -> u32 {
        let mut cur = Some(n);
        while let Some(i) = cur {
            if !self.nodes[i].is_terminal() {
                self.optimize(i);
            }
            cur = self.nodes[i].anc;
        }
        self.cost()
    }

    /// Bounded incremental rescore: ascends from `n`, stopping as soon as a
    /// rescored node's cost exceeds `bound`. Returns the last cost seen and
    /// the node where the ascent stopped; nodes above it were not touched.
    pub(crate) fn incre_bound(&mut self, n: NodeId, bound: u32) -> (u32, NodeId) {
        let mut cur = n;
        loop {
            if !self.nodes[cur].is_terminal() {
                self.optimize(cur);
                if self.nodes[cur].cost > bound {
                    return (self.nodes[cur].cost, cur);
                }
            }
            match self.nodes[cur].anc {
                Some(a) => cur = a,
                None => return (self.nodes[cur].cost, cur),
            }
        }
    }

    /// Copies the current state of every internal node from `n` to the root
    /// into its shadow.
    pub(crate) fn commit(&mut self, n: NodeId) {
        let mut cur = Some(n);
        while let Some(i) = cur {
            let node = &mut self.nodes[i];
            if !node.is_terminal() {
                node.chars_bak.clear();
                node.chars_bak.extend_from_slice(&node.chars);
                node.cost_bak = node.cost;
            }
            cur = self.nodes[i].anc;
        }
    }

    /// Restores every internal node from `n` up to and including `stop`
    /// from its shadow. Ancestors above `stop` were never rescored and are
    /// left alone.
    pub(crate) fn restore(&mut self, n: NodeId, stop: NodeId) {
        let mut cur = Some(n);
        while let Some(i) = cur {
            let node = &mut self.nodes[i];
            if !node.is_terminal() {
                node.chars.clear();
                node.chars.extend_from_slice(&node.chars_bak);
                node.cost = node.cost_bak;
            }
            if i == stop {
                break;
            }
            cur = self.nodes[i].anc;
        }
    }

    /// Splices `ins` between `d` and its ancestor `a`, hanging `d` from
    /// `ins`'s free child slot.
    pub(crate) fn splice(&mut self, ins: NodeId, d: NodeId, a: NodeId) {
        self.nodes[ins].anc = Some(a);
        if self.nodes[ins].left.is_none() {
            self.nodes[ins].left = Some(d);
        } else {
            self.nodes[ins].right = Some(d);
        }
        self.nodes[d].anc = Some(ins);
        if self.nodes[a].left == Some(d) {
            self.nodes[a].left = Some(ins);
        } else {
            self.nodes[a].right = Some(ins);
        }
    }

    /// Reverts a [`splice`](Self::splice), reconnecting `d` to `a` and
    /// emptying the child slot of `ins` that held `d`.
    pub(crate) fn unsplice(&mut self, ins: NodeId, d: NodeId, a: NodeId) {
        if self.nodes[ins].left == Some(d) {
            self.nodes[ins].left = None;
        } else {
            self.nodes[ins].right = None;
        }
        self.nodes[ins].anc = None;
        self.nodes[d].anc = Some(a);
        if self.nodes[a].left == Some(ins) {
            self.nodes[a].left = Some(d);
        } else {
            self.nodes[a].right = Some(d);
        }
    }

    /// Reorders siblings so the smaller subtree is the left descendant, or
    /// the right one when `right` is set. Purely cosmetic.
    pub fn ladderize(&mut self, right: bool) {
        let mut counts = vec![0u32; self.nodes.len()];
        let mut stack = vec![(self.root, false)];
        while let Some((n, visited)) = stack.pop() {
            if self.nodes[n].is_terminal() {
                counts[n] = 1;
                continue;
            }
            let (Some(l), Some(r)) = (self.nodes[n].left, self.nodes[n].right) else {
                continue;
            };
            if !visited {
                stack.push((n, true));
                stack.push((l, false));
                stack.push((r, false));
                continue;
            }
            counts[n] = counts[l] + counts[r];
            let swap = if right {
                counts[r] > counts[l]
            } else {
                counts[l] > counts[r]
            };
            if swap {
                self.nodes[n].left = Some(r);
                self.nodes[n].right = Some(l);
            }
        }
    }

    /// Reads a strictly binary tree in parenthetical format; branch lengths
    /// in the text are skipped. Every terminal must name a matrix taxon and
    /// appear at most once.
    pub fn read(text: &str, m: &Matrix) -> Result<Tree, Error> {
        let ast = newick::parse(text)?;
        let mut tree = Tree {
            root: 0,
            nodes: Vec::new(),
        };
        let mut seen = HashSet::new();
        let root = tree.build(&ast, None, m, &mut seen)?;
        tree.root = root;
        Ok(tree)
    }

    fn build(
        &mut self,
        ast: &NewickNode,
        anc: Option<NodeId>,
        m: &Matrix,
        seen: &mut HashSet<String>,
    ) -> Result<NodeId, Error> {
        if ast.is_terminal() {
            let name = ast.label.as_deref().unwrap_or_default();
            let Some(tid) = m.term_id(name) else {
                return Err(Error::Tree(format!("terminal {name} not in matrix")));
            };
            if !seen.insert(name.to_string()) {
                return Err(Error::Tree(format!("terminal {name} repeated")));
            }
            let chars = m.terminal(tid).chars.clone();
            return Ok(self.push(Node::terminal(tid, chars, anc)));
        }
        match ast.children.len() {
            2 => {}
            0 | 1 => return Err(Error::tree("node without two descendants")),
            _ => return Err(Error::tree("polytomic tree")),
        }
        let n = self.push(Node::internal(m.n_chars()));
        self.nodes[n].anc = anc;
        let left = self.build(&ast.children[0], Some(n), m, seen)?;
        let right = self.build(&ast.children[1], Some(n), m, seen)?;
        self.nodes[n].left = Some(left);
        self.nodes[n].right = Some(right);
        self.optimize(n);
        let node = &mut self.nodes[n];
        node.chars_bak.clear();
        node.chars_bak.extend_from_slice(&node.chars);
        node.cost_bak = node.cost;
        Ok(n)
    }

    /// Writes the tree in parenthetical format, with sister groups joined
    /// by a comma or a space.
    pub fn write(&self, m: &Matrix, comma: bool) -> String {
        let mut out = String::new();
        self.write_node(self.root, m, comma, &mut out);
        out.push(';');
        out
    }

    fn write_node(&self, n: NodeId, m: &Matrix, comma: bool, out: &mut String) {
        if let Some(tid) = self.nodes[n].term {
            out.push_str(&m.terminal(tid).name);
            return;
        }
        out.push('(');
        if let Some(l) = self.nodes[n].left {
            self.write_node(l, m, comma, out);
        }
        out.push(if comma { ',' } else { ' ' });
        if let Some(r) = self.nodes[n].right {
            self.write_node(r, m, comma, out);
        }
        out.push(')');
    }

    /// Terminal ids in the tree, in node order.
    pub fn terminals(&self) -> Vec<TermId> {
        self.nodes.iter().filter_map(|n| n.term).collect()
    }
}
