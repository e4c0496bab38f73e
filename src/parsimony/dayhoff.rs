use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::parsimony::tree::{NodeId, Tree};

impl Tree {
    /// Improves the tree by subtree pruning and regrafting until a full
    /// sweep finds no better position for any subtree. Nodes are visited in
    /// a fresh random order on every sweep; the first improving regraft of
    /// each pruned subtree is committed.
    pub fn dayhoff(&mut self, rng: &mut StdRng) {
        let mut order: Vec<NodeId> = (0..self.nodes.len()).collect();
        loop {
            order.shuffle(rng);
            let mut improved = false;
            for &n in &order {
                if self.try_move(n) {
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }
    }

    /// Prunes the subtree hanging from `n`'s parent edge and tries every
    /// legal regraft position. Returns true if a strictly better position
    /// was found and committed; otherwise the original attachment is
    /// restored.
    fn try_move(&mut self, n: NodeId) -> bool {
        // the root and both of its children stay where they are; the
        // outgroup convention depends on it
        let Some(a) = self.nodes[n].anc else {
            return false;
        };
        let Some(gf) = self.nodes[a].anc else {
            return false;
        };
        let sis = if self.nodes[a].left == Some(n) {
            self.nodes[a].right
        } else {
            self.nodes[a].left
        };
        let Some(sis) = sis else {
            return false;
        };
        let best_cost = self.cost();

        // detach: bypass `a`, leaving it dangling with `n` and a free slot
        if self.nodes[a].left == Some(sis) {
            self.nodes[a].left = None;
        } else {
            self.nodes[a].right = None;
        }
        if self.nodes[gf].left == Some(a) {
            self.nodes[gf].left = Some(sis);
        } else {
            self.nodes[gf].right = Some(sis);
        }
        self.nodes[sis].anc = Some(gf);
        self.nodes[a].anc = None;
        self.incre_down(gf);
        self.commit(gf);

        for p in 0..self.nodes.len() {
            if p == sis || self.in_fragment(p, a) {
                continue;
            }
            let Some(pa) = self.nodes[p].anc else {
                continue;
            };
            if self.nodes[pa].anc.is_none() {
                // regrafting above a child of the root is forbidden
                continue;
            }
            self.splice(a, p, pa);
            let (cost, stop) = self.incre_bound(a, best_cost);
            if cost < best_cost {
                self.commit(a);
                return true;
            }
            self.unsplice(a, p, pa);
            if stop != a {
                self.restore(pa, stop);
            }
        }

        // nothing better: put the subtree back where it was
        self.splice(a, sis, gf);
        self.incre_down(a);
        self.commit(a);
        false
    }

    /// True if `p` lies inside the detached fragment rooted at `a`.
    fn in_fragment(&self, p: NodeId, a: NodeId) -> bool {
        let mut cur = Some(p);
        while let Some(i) = cur {
            if i == a {
                return true;
            }
            cur = self.nodes[i].anc;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use rand::SeedableRng;

    const DNA: &str = "\
> dna
Out    AACCTTGGAA
Alpha  AACCGTGGAA
Beta   AAGCGTCGAA
Gamma  TTGCATCGTT
Delta  TTGAATCCTT
Eps    TTGAGTCCTT
Zeta   AACCTTGCAA
Theta  AAGCGTCCAA
";

    fn matrix() -> Matrix {
        Matrix::read(DNA.as_bytes()).unwrap()
    }

    #[test]
    fn never_increases_cost() {
        let m = matrix();
        for seed in [1u64, 2, 3, 4, 5] {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut tr = m.wagner(&mut rng).unwrap();
            let before = tr.cost();
            tr.dayhoff(&mut rng);
            assert!(tr.cost() <= before, "seed {seed}");
        }
    }

    #[test]
    fn improves_a_deliberately_bad_tree() {
        let m = matrix();
        // interleave the two clearly separated clusters
        let bad = "(Out (((((Alpha Gamma) Beta) Delta) Zeta) (Eps Theta)));";
        let mut tr = Tree::read(bad, &m).unwrap();
        let before = tr.cost();
        let mut rng = StdRng::seed_from_u64(9);
        tr.dayhoff(&mut rng);
        assert!(tr.cost() < before);
    }

    #[test]
    fn converged_sweep_leaves_tree_unchanged() {
        let m = matrix();
        let mut rng = StdRng::seed_from_u64(17);
        let mut tr = m.wagner(&mut rng).unwrap();
        tr.dayhoff(&mut rng);

        let shape: Vec<_> = (0..tr.len())
            .map(|i| {
                let n = tr.node(i);
                (n.anc, n.left, n.right, n.term, n.cost)
            })
            .collect();

        // dayhoff already converged, so another run must be a no-op
        tr.dayhoff(&mut rng);
        let after: Vec<_> = (0..tr.len())
            .map(|i| {
                let n = tr.node(i);
                (n.anc, n.left, n.right, n.term, n.cost)
            })
            .collect();
        assert_eq!(shape, after);
    }

    #[test]
    fn tree_stays_well_formed() {
        let m = matrix();
        let mut rng = StdRng::seed_from_u64(23);
        let mut tr = m.wagner(&mut rng).unwrap();
        tr.dayhoff(&mut rng);

        assert_eq!(tr.len(), 2 * m.n_terms() - 1);
        // outgroup still roots the tree
        assert_eq!(tr.node(tr.root).left, Some(1));
        let mut terms = tr.terminals();
        terms.sort_unstable();
        let want: Vec<_> = (0..m.n_terms()).collect();
        assert_eq!(terms, want);

        for i in 0..tr.len() {
            let n = tr.node(i);
            if i == tr.root {
                assert!(n.anc.is_none());
                continue;
            }
            let a = n.anc.unwrap();
            let pa = tr.node(a);
            assert!(pa.left == Some(i) || pa.right == Some(i));
        }
    }

    #[test]
    fn cost_matches_full_rescore_after_swapping() {
        let m = matrix();
        let mut rng = StdRng::seed_from_u64(31);
        let mut tr = m.wagner(&mut rng).unwrap();
        tr.dayhoff(&mut rng);
        let cost = tr.cost();

        fn rescore(tr: &mut Tree, n: NodeId) {
            let (left, right) = (tr.node(n).left, tr.node(n).right);
            if let (Some(l), Some(r)) = (left, right) {
                rescore(tr, l);
                rescore(tr, r);
                tr.optimize(n);
            }
        }
        let root = tr.root;
        rescore(&mut tr, root);
        assert_eq!(tr.cost(), cost);
    }
}
