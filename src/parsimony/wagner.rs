use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::Error;
use crate::matrix::{Matrix, TermId};
use crate::parsimony::tree::{Node, NodeId, Tree};

impl Matrix {
    /// Builds a tree by Wagner stepwise addition with a random addition
    /// sequence: each remaining terminal is tried on every edge of the
    /// growing tree and committed at its best position.
    ///
    /// Needs at least three terminals (the outgroup and two others).
    pub fn wagner(&self, rng: &mut StdRng) -> Result<Tree, Error> {
        if self.n_terms() < 3 {
            return Err(Error::Matrix(
                "wagner: at least three terminals required".to_string(),
            ));
        }
        let n_chars = self.n_chars();

        let mut order: Vec<TermId> = (0..self.n_terms())
            .filter(|&t| t != self.outgroup())
            .collect();
        order.shuffle(rng);

        // seed the tree with the outgroup and the first two terminals:
        // node 0 is the root, node 1 the outgroup; additions never test
        // either of those positions
        let mut tr = Tree {
            root: 0,
            nodes: Vec::new(),
        };
        let root = tr.push(Node::internal(n_chars));
        let out = tr.push(Node::terminal(
            self.outgroup(),
            self.terminal(self.outgroup()).chars.clone(),
            Some(root),
        ));
        let n0 = tr.push(Node::internal(n_chars));
        tr.nodes[n0].anc = Some(root);
        tr.nodes[root].left = Some(out);
        tr.nodes[root].right = Some(n0);

        let t0 = tr.push(Node::terminal(
            order[0],
            self.terminal(order[0]).chars.clone(),
            Some(n0),
        ));
        let t1 = tr.push(Node::terminal(
            order[1],
            self.terminal(order[1]).chars.clone(),
            Some(n0),
        ));
        tr.nodes[n0].left = Some(t0);
        tr.nodes[n0].right = Some(t1);
        tr.incre_down(n0);

        // shadows of every seeded internal node must be in place before
        // the first addition reads them back
        tr.commit(n0);

        for &t in &order[2..] {
            tr.add_term(self, t);
        }
        Ok(tr)
    }
}

impl Tree {
    /// Adds one terminal at its best insertion edge.
    fn add_term(&mut self, m: &Matrix, tm: TermId) {
        let n_chars = m.n_chars();
        let na = self.push(Node::internal(n_chars));
        let nt = self.push(Node::terminal(
            tm,
            m.terminal(tm).chars.clone(),
            Some(na),
        ));
        self.nodes[na].left = Some(nt);

        // an upper bound no insertion can reach
        let mut best_cost = self.cost() + 2 * n_chars as u32;
        let mut best_pos: Option<(NodeId, NodeId)> = None;

        for d in 2..na {
            let Some(a) = self.nodes[d].anc else {
                continue;
            };
            self.splice(na, d, a);
            let (cost, stop) = self.incre_bound(na, best_cost);
            if cost < best_cost {
                best_cost = cost;
                best_pos = Some((d, a));
            }
            self.unsplice(na, d, a);
            if stop != na {
                self.restore(a, stop);
            }
        }

        if let Some((d, a)) = best_pos {
            self.splice(na, d, a);
            self.incre_down(na);
            self.commit(na);
        }
    }
}
