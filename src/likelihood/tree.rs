use std::collections::HashSet;
use std::fmt::Write as _;
use std::mem;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::Error;
use crate::likelihood::matrix::Matrix;
use crate::likelihood::model::Model;
use crate::matrix::TermId;
use crate::newick::{self, NewickNode};

/// Index of a node inside a [`Tree`] arena.
pub type NodeId = usize;

/// Default length for branches the tree text does not specify.
const DEFAULT_LEN: f64 = 0.01;

/// Shortest branch the refiner will accept.
const MIN_LEN: f64 = 0.0001;

/// Longest branch the refiner will accept.
const MAX_LEN: f64 = 100.0;

/// Convergence threshold for the refinement loops, in log units.
const EPSILON: f64 = 0.001;

/// A node of a likelihood tree.
///
/// Each node stores one conditional likelihood vector per character, sized
/// to that character's state count, and the length of the branch to its
/// ancestor. Terminal conditionals are the indicator of the observed state
/// set and never change.
#[derive(Debug, Clone)]
pub struct Node {
    pub anc: Option<NodeId>,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub term: Option<TermId>,
    pub cond: Vec<Vec<f64>>,
    pub len: f64,
}

impl Node {
    fn is_terminal(&self) -> bool {
        self.term.is_some()
    }
}

/// A rooted binary phylogenetic tree scored under likelihood.
#[derive(Debug)]
pub struct Tree {
    pub root: NodeId,
    nodes: Vec<Node>,
}

impl Tree {
    /// The log likelihood of the tree under the matrix models.
    pub fn log_like(&self, m: &Matrix) -> f64 {
        let mut log_like = 0.0;
        for (i, cond) in self.nodes[self.root].cond.iter().enumerate() {
            let md = m.model(i);
            let like: f64 = cond
                .iter()
                .enumerate()
                .map(|(s, p)| p * md.freq(s))
                .sum();
            log_like += like.ln();
        }
        log_like
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

    /// Conditional contribution of `child` to ancestral state `s` at one
    /// column: the child's conditionals folded through the transition
    /// probabilities of its branch.
    fn cond_state(&self, child: NodeId, md: &dyn Model, col: usize, s: usize) -> f64 {
        let c = &self.nodes[child];
        c.cond[col]
            .iter()
            .enumerate()
            .map(|(x, l)| md.prob(s, x, c.len) * l)
            .sum()
    }

    /// Felsenstein pruning step at a single internal node.
    fn optimize(&mut self, n: NodeId, m: &Matrix) {
        let (Some(l), Some(r)) = (self.nodes[n].left, self.nodes[n].right) else {
            return;
        };
        let mut cond = mem::take(&mut self.nodes[n].cond);
        for (i, slot) in cond.iter_mut().enumerate() {
            let md = m.model(i);
            for s in 0..slot.len() {
                slot[s] = self.cond_state(l, md, i, s) * self.cond_state(r, md, i, s);
            }
        }
        self.nodes[n].cond = cond;
    }

    /// Rescores `n` and every ancestor up to the root.
    fn incre_down(&mut self, n: NodeId, m: &Matrix) {
        let mut cur = Some(n);
        while let Some(i) = cur {
            if !self.nodes[i].is_terminal() {
                self.optimize(i, m);
            }
            cur = self.nodes[i].anc;
        }
    }

    /// Re-optimizes the whole subtree below `n`, restricted to the columns
    /// bound to the model `id`.
    fn full_opt(&mut self, n: NodeId, m: &Matrix, id: &str) {
        let (Some(l), Some(r)) = (self.nodes[n].left, self.nodes[n].right) else {
            return;
        };
        self.full_opt(l, m, id);
        self.full_opt(r, m, id);

        let mut cond = mem::take(&mut self.nodes[n].cond);
        for (i, slot) in cond.iter_mut().enumerate() {
            if m.model_id(i) != id {
                continue;
            }
            let md = m.model(i);
            for s in 0..slot.len() {
                slot[s] = self.cond_state(l, md, i, s) * self.cond_state(r, md, i, s);
            }
        }
        self.nodes[n].cond = cond;
    }

    /// Refines branch lengths and free model rates until the log
    /// likelihood stops improving. Branches are visited in random order.
    pub fn refine(&mut self, m: &mut Matrix, rng: &mut StdRng) {
        let mut order: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&n| n != self.root)
            .collect();
        order.shuffle(rng);

        let mut like = self.log_like(m);
        loop {
            for &n in &order {
                self.refine_branch(n, m, 0.1);
            }
            self.estimate(m);
            let l = self.log_like(m);
            if (like - l).abs() < EPSILON {
                break;
            }
            like = l;
        }
    }

    /// Hill-climbs one branch length with a geometric step: ascend while
    /// the likelihood improves, otherwise descend, then recurse with a ten
    /// times smaller step.
    fn refine_branch(&mut self, n: NodeId, m: &Matrix, step: f64) {
        if step < 0.001 {
            return;
        }
        let Some(anc) = self.nodes[n].anc else {
            return;
        };
        let mut like = self.log_like(m);
        let mut best = self.nodes[n].len;
        let mut up = false;

        loop {
            let b = best + step;
            if b > MAX_LEN {
                break;
            }
            self.nodes[n].len = b;
            self.incre_down(anc, m);
            let l = self.log_like(m);
            if l <= like {
                break;
            }
            like = l;
            best = b;
            up = true;
        }
        self.nodes[n].len = best;
        self.incre_down(anc, m);
        if up {
            return self.refine_branch(n, m, step / 10.0);
        }

        loop {
            let b = best - step;
            if b < MIN_LEN {
                break;
            }
            self.nodes[n].len = b;
            self.incre_down(anc, m);
            let l = self.log_like(m);
            if l <= like {
                break;
            }
            like = l;
            best = b;
        }
        self.nodes[n].len = best;
        self.incre_down(anc, m);
        self.refine_branch(n, m, step / 10.0);
    }

    /// Estimates free change rates for every model bound to the matrix,
    /// iterating until the likelihood settles.
    pub fn estimate(&mut self, m: &mut Matrix) {
        let ids = m.model_ids();
        let mut like = self.log_like(m);
        loop {
            for id in &ids {
                self.estimate_model(m, id, 0.1);
            }
            let l = self.log_like(m);
            if (like - l).abs() < EPSILON {
                break;
            }
            like = l;
        }
    }

    /// Same geometric search as branch refinement, over the free change
    /// rates of one model inside (0, 1). Every trial rescores the columns
    /// bound to the model.
    fn estimate_model(&mut self, m: &mut Matrix, id: &str, step: f64) {
        if step < 0.001 {
            return;
        }
        let root = self.root;
        for tp in 0..m.changes(id) {
            let mut like = self.log_like(m);
            let mut best = m.change_rate(id, tp);
            let mut up = false;

            loop {
                let b = best + step;
                if b >= 1.0 {
                    break;
                }
                m.set_change_rate(id, tp, b);
                self.full_opt(root, m, id);
                let l = self.log_like(m);
                if l <= like {
                    break;
                }
                like = l;
                best = b;
                up = true;
            }
            m.set_change_rate(id, tp, best);
            self.full_opt(root, m, id);
            if up {
                self.estimate_model(m, id, step / 10.0);
                continue;
            }

            loop {
                let b = best - step;
                if b <= 0.0 {
                    break;
                }
                m.set_change_rate(id, tp, b);
                self.full_opt(root, m, id);
                let l = self.log_like(m);
                if l <= like {
                    break;
                }
                like = l;
                best = b;
            }
            m.set_change_rate(id, tp, best);
            self.full_opt(root, m, id);
            self.estimate_model(m, id, step / 10.0);
        }
    }

    /// Reads a strictly binary tree in parenthetical format, keeping any
    /// branch lengths; branches without one default to 0.01. The root
    /// branch length is always zero.
    pub fn read(text: &str, m: &Matrix) -> Result<Tree, Error> {
        let ast = newick::parse(text)?;
        let mut tree = Tree {
            root: 0,
            nodes: Vec::new(),
        };
        let mut seen = HashSet::new();
        let root = tree.build(&ast, None, m, &mut seen)?;
        tree.root = root;
        tree.nodes[root].len = 0.0;
        Ok(tree)
    }

    fn build(
        &mut self,
        ast: &NewickNode,
        anc: Option<NodeId>,
        m: &Matrix,
        seen: &mut HashSet<String>,
    ) -> Result<NodeId, Error> {
        let len = ast.length.unwrap_or(DEFAULT_LEN);
        if ast.is_terminal() {
            let name = ast.label.as_deref().unwrap_or_default();
            let Some(tid) = m.base().term_id(name) else {
                return Err(Error::Tree(format!("terminal {name} not in matrix")));
            };
            if !seen.insert(name.to_string()) {
                return Err(Error::Tree(format!("terminal {name} repeated")));
            }
            let cond = terminal_conditionals(m, tid);
            return Ok(self.push(Node {
                anc,
                left: None,
                right: None,
                term: Some(tid),
                cond,
                len,
            }));
        }
        match ast.children.len() {
            2 => {}
            0 | 1 => return Err(Error::tree("node without two descendants")),
            _ => return Err(Error::tree("polytomic tree")),
        }
        let cond = (0..m.n_chars()).map(|i| vec![0.0; m.states(i)]).collect();
        let n = self.push(Node {
            anc,
            left: None,
            right: None,
            term: None,
            cond,
            len,
        });
        let left = self.build(&ast.children[0], Some(n), m, seen)?;
        let right = self.build(&ast.children[1], Some(n), m, seen)?;
        self.nodes[n].left = Some(left);
        self.nodes[n].right = Some(right);
        self.optimize(n, m);
        Ok(n)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Writes the tree in parenthetical format with six-decimal branch
    /// lengths on every non-root node.
    pub fn write(&self, m: &Matrix, comma: bool) -> String {
        let mut out = String::new();
        self.write_node(self.root, m, comma, &mut out);
        out.push(';');
        out
    }

    fn write_node(&self, n: NodeId, m: &Matrix, comma: bool, out: &mut String) {
        let node = &self.nodes[n];
        if let Some(tid) = node.term {
            let _ = write!(out, "{}:{:.6}", m.base().terminal(tid).name, node.len);
            return;
        }
        out.push('(');
        if let Some(l) = node.left {
            self.write_node(l, m, comma, out);
        }
        out.push(if comma { ',' } else { ' ' });
        if let Some(r) = node.right {
            self.write_node(r, m, comma, out);
        }
        out.push(')');
        if node.anc.is_some() {
            let _ = write!(out, ":{:.6}", node.len);
        }
    }

    /// Terminal ids in the tree, in node order.
    pub fn terminals(&self) -> Vec<TermId> {
        self.nodes.iter().filter_map(|n| n.term).collect()
    }
}

/// Indicator conditionals for an observed terminal: mass on every state
/// present in the taxon's bitset, so polymorphic and unknown observations
/// spread over all of their states.
fn terminal_conditionals(m: &Matrix, tid: TermId) -> Vec<Vec<f64>> {
    let chars = &m.base().terminal(tid).chars;
    (0..m.n_chars())
        .map(|i| {
            let k = m.states(i);
            (0..k)
                .map(|b| {
                    if chars[i] & (1 << b) != 0 {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    const PAIR: &str = "\
> dna
A  ACGTACGTAC
B  ACGTACGAAG
";

    fn pair_matrix() -> Matrix {
        Matrix::read(PAIR.as_bytes()).unwrap()
    }

    /// Closed form likelihood of a two-taxon Jukes-Cantor tree with both
    /// branches of length `t`: the classic pairwise identity.
    fn pair_log_like(n_match: f64, n_mismatch: f64, t: f64) -> f64 {
        let e = (-2.0 * t).exp();
        let total = n_match + n_mismatch;
        total * 0.25f64.ln()
            + n_match * (0.25 + 0.75 * e).ln()
            + n_mismatch * (0.25 - 0.25 * e).ln()
    }

    #[test]
    fn matches_the_pairwise_jukes_cantor_identity() {
        let m = pair_matrix();
        for &t in &[0.05, 0.1, 0.5, 1.0] {
            let text = format!("(A:{t},B:{t});");
            let tr = Tree::read(&text, &m).unwrap();
            // 8 matching and 2 mismatching sites
            assert_relative_eq!(
                tr.log_like(&m),
                pair_log_like(8.0, 2.0, t),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn terminal_conditionals_are_indicators() {
        let m = Matrix::read("> dna\nA AN\nB CY\n".as_bytes()).unwrap();
        let tr = Tree::read("(A,B);", &m).unwrap();
        let a = tr
            .nodes
            .iter()
            .find(|n| n.term == Some(0))
            .unwrap();
        assert_eq!(a.cond[0], vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(a.cond[1], vec![1.0, 1.0, 1.0, 1.0]);
        let b = tr.nodes.iter().find(|n| n.term == Some(1)).unwrap();
        assert_eq!(b.cond[0], vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(b.cond[1], vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn missing_branch_lengths_default() {
        let m = pair_matrix();
        let tr = Tree::read("(A,B:0.2);", &m).unwrap();
        let a = tr.nodes.iter().find(|n| n.term == Some(0)).unwrap();
        let b = tr.nodes.iter().find(|n| n.term == Some(1)).unwrap();
        assert_relative_eq!(a.len, 0.01);
        assert_relative_eq!(b.len, 0.2);
        assert_relative_eq!(tr.nodes[tr.root].len, 0.0);
    }

    #[test]
    fn write_round_trips_lengths() {
        let m = Matrix::read(
            "> dna\nA ACGT\nB ACGA\nC TCGA\nD TCGT\n".as_bytes(),
        )
        .unwrap();
        let tr = Tree::read("(A:0.034103,((B:0.1,C:0.25):0.125,D:1):0.5);", &m).unwrap();
        assert_eq!(tr.terminals().len(), 4);
        let text = tr.write(&m, true);
        assert_eq!(
            text,
            "(A:0.034103,((B:0.100000,C:0.250000):0.125000,D:1.000000):0.500000);"
        );
        let again = Tree::read(&text, &m).unwrap();
        assert_relative_eq!(again.log_like(&m), tr.log_like(&m), epsilon = 1e-12);
    }

    #[test]
    fn read_rejects_polytomies() {
        let m = Matrix::read("> dna\nA A\nB C\nC G\n".as_bytes()).unwrap();
        let err = Tree::read("(A,B,C);", &m).unwrap_err();
        assert!(err.to_string().contains("polytomic tree"));
    }

    #[test]
    fn refinement_improves_and_respects_bounds() {
        let mut m = Matrix::read(
            "> dna\nA ACGTACGTAC\nB ACGTACGAAG\nC TCGTACGAAG\nD TCTTACGAAG\n".as_bytes(),
        )
        .unwrap();
        let mut tr = Tree::read("(A:3,((B:3,C:3):3,D:3):3);", &m).unwrap();
        let before = tr.log_like(&m);
        let mut rng = StdRng::seed_from_u64(19);
        tr.refine(&mut m, &mut rng);
        let after = tr.log_like(&m);
        assert!(after >= before);
        for (i, n) in tr.nodes.iter().enumerate() {
            if i == tr.root {
                continue;
            }
            assert!(n.len >= MIN_LEN, "node {i} length {}", n.len);
            assert!(n.len <= MAX_LEN, "node {i} length {}", n.len);
        }

        // a second refinement run is already converged
        let mut rng = StdRng::seed_from_u64(23);
        tr.refine(&mut m, &mut rng);
        assert_relative_eq!(tr.log_like(&m), after, epsilon = 0.01);
    }

    /// Two-state model with one free change rate `r`: a change along a
    /// branch happens with probability r·(1 - e^-t), so each row of the
    /// transition matrix sums to one.
    struct TwoState {
        rate: f64,
    }

    impl Model for TwoState {
        fn prob(&self, from: usize, to: usize, blen: f64) -> f64 {
            let change = self.rate * (1.0 - (-blen).exp());
            if from == to {
                1.0 - change
            } else {
                change
            }
        }

        fn freq(&self, _s: usize) -> f64 {
            0.5
        }

        fn states(&self) -> usize {
            2
        }

        fn changes(&self) -> usize {
            1
        }

        fn change_rate(&self, _tp: usize) -> f64 {
            self.rate
        }

        fn set_change_rate(&mut self, _tp: usize, r: f64) {
            self.rate = r;
        }
    }

    #[test]
    fn estimate_tunes_a_free_change_rate() {
        let mut m = Matrix::read(
            "> morpho\nA 0000011111\nB 0101011111\nC 1010100000\nD 1111100000\n".as_bytes(),
        )
        .unwrap();
        for col in 0..m.n_chars() {
            m.set_model(col, "bin", Box::new(TwoState { rate: 0.05 }))
                .unwrap();
        }
        assert_eq!(m.model_ids(), vec!["bin".to_string()]);

        let mut tr = Tree::read("(A,((B,C),D));", &m).unwrap();
        let before = tr.log_like(&m);
        tr.estimate(&mut m);
        let after = tr.log_like(&m);
        assert!(after >= before);
        let rate = m.change_rate("bin", 0);
        assert!(rate > 0.0 && rate < 1.0, "rate {rate}");
    }

    #[test]
    fn branch_refinement_finds_the_analytic_optimum() {
        // with 8 matching sites out of 10, the maximum likelihood total
        // distance between the two taxa solves e^-T = (4*0.8 - 1)/3
        let mut m = pair_matrix();
        let mut tr = Tree::read("(A:0.05,B:0.05);", &m).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        tr.refine(&mut m, &mut rng);
        let total: f64 = tr
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != tr.root)
            .map(|(_, n)| n.len)
            .sum();
        let want = -((4.0 * 0.8 - 1.0) / 3.0f64).ln();
        assert_relative_eq!(total, want, epsilon = 0.05);
    }
}
