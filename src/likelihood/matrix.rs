use std::collections::HashMap;
use std::io::BufRead;

use crate::error::Error;
use crate::likelihood::model::{jukes_cantor, Model, Poisson};
use crate::matrix::{self, DataType};

/// A character matrix bound to substitution models.
///
/// Every DNA column shares the Jukes-Cantor model; each morphology column
/// gets a Poisson model sized to the highest state observed in it.
pub struct Matrix {
    base: matrix::Matrix,
    model_ids: Vec<String>,
    models: HashMap<String, Box<dyn Model>>,
    states: Vec<usize>,
}

impl Matrix {
    /// Binds default models to an already merged matrix.
    pub fn from_matrix(base: matrix::Matrix) -> Matrix {
        let n = base.n_chars();
        let mut m = Matrix {
            base,
            model_ids: Vec::with_capacity(n),
            models: HashMap::new(),
            states: Vec::with_capacity(n),
        };

        for i in 0..n {
            if m.base.kinds()[i] == DataType::Dna {
                m.models
                    .entry("jc".to_string())
                    .or_insert_with(|| Box::new(jukes_cantor()));
                m.model_ids.push("jc".to_string());
                m.states.push(4);
                continue;
            }
            // highest observed morphology state; the 255 unknown sentinel
            // is reader-made and does not count as an observation
            let mut observed = 0u8;
            for t in m.base.terminals() {
                if t.chars[i] == DataType::Morphology.unknown() {
                    continue;
                }
                observed |= t.chars[i];
            }
            let mut max = 1;
            for b in (1..8).rev() {
                if observed & (1 << b) != 0 {
                    max = b + 1;
                    break;
                }
            }
            let id = format!("mk{max}");
            m.models
                .entry(id.clone())
                .or_insert_with(|| Box::new(Poisson::new(max)));
            m.model_ids.push(id);
            m.states.push(max);
        }
        m
    }

    /// Reads and merges a matrix, then binds the default models.
    pub fn read(reader: impl BufRead) -> Result<Matrix, Error> {
        Ok(Matrix::from_matrix(matrix::Matrix::read(reader)?))
    }

    pub fn base(&self) -> &matrix::Matrix {
        &self.base
    }

    /// The model scoring a column.
    pub fn model(&self, col: usize) -> &dyn Model {
        &*self.models[&self.model_ids[col]]
    }

    /// The id of the model bound to a column.
    pub fn model_id(&self, col: usize) -> &str {
        &self.model_ids[col]
    }

    /// Number of states of a column.
    pub fn states(&self, col: usize) -> usize {
        self.states[col]
    }

    pub fn n_chars(&self) -> usize {
        self.model_ids.len()
    }

    /// The distinct model ids in use by some column, in sorted order.
    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.model_ids.clone();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Binds a model to a column under the given id. Fails when the model
    /// has fewer states than the column requires.
    pub fn set_model(&mut self, col: usize, id: &str, md: Box<dyn Model>) -> Result<(), Error> {
        if md.states() < self.states[col] {
            return Err(Error::Model(format!(
                "model {id} for {} states, char {col} with {} states",
                md.states(),
                self.states[col]
            )));
        }
        self.models.entry(id.to_string()).or_insert(md);
        self.model_ids[col] = id.to_string();
        Ok(())
    }

    pub fn changes(&self, id: &str) -> usize {
        self.models.get(id).map_or(0, |m| m.changes())
    }

    pub fn change_rate(&self, id: &str, tp: usize) -> f64 {
        self.models.get(id).map_or(0.0, |m| m.change_rate(tp))
    }

    pub fn set_change_rate(&mut self, id: &str, tp: usize, r: f64) {
        if let Some(m) = self.models.get_mut(id) {
            m.set_change_rate(tp, r);
        }
    }
}
