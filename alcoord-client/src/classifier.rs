//! Classifier trainer
//!
//! Binary logistic regression over sparse count vectors, trained from
//! scratch by seeded mini-batch gradient descent with L2 regularisation.
//! Identical inputs and options always give an identical model.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::features::SparseVector;
use crate::metrics::{binary_scores, Scores};
use alcoord_common::protocol::{is_valid_label, Label};

/// Training options for the logistic regression model
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 20,
            learning_rate: 0.5,
            l2: 1e-4,
            batch_size: 16,
            seed: 42,
        }
    }
}

/// Trained weights; rebuilt, never mutated, on every label
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierState {
    weights: Vec<f64>,
    bias: f64,
}

impl ClassifierState {
    pub fn dim(&self) -> usize {
        self.weights.len()
    }

    /// Calibrated probability of the positive class
    pub fn predict_proba(&self, x: &SparseVector) -> f64 {
        sigmoid(self.logit(x))
    }

    pub fn predict(&self, x: &SparseVector) -> Label {
        if self.predict_proba(x) >= 0.5 {
            1
        } else {
            0
        }
    }

    /// Maximum class probability
    pub fn confidence(&self, x: &SparseVector) -> f64 {
        let p = self.predict_proba(x);
        p.max(1.0 - p)
    }

    fn logit(&self, x: &SparseVector) -> f64 {
        x.iter()
            .filter_map(|&(i, v)| self.weights.get(i).map(|w| w * v))
            .sum::<f64>()
            + self.bias
    }
}

/// Train on `seed ++ extra` (extra may be empty)
pub fn train(
    dim: usize,
    seed_x: &[SparseVector],
    seed_y: &[Label],
    extra_x: &[SparseVector],
    extra_y: &[Label],
    options: &TrainOptions,
) -> Result<ClassifierState> {
    if seed_x.len() != seed_y.len() || extra_x.len() != extra_y.len() {
        return Err(Error::Training("Mismatched training inputs/labels".to_string()));
    }
    let n = seed_x.len() + extra_x.len();
    if n == 0 {
        return Err(Error::Training("Empty training set".to_string()));
    }
    if let Some(bad) = seed_y.iter().chain(extra_y).find(|&&y| !is_valid_label(y)) {
        return Err(Error::Training(format!("Label {} is not 0 or 1", bad)));
    }

    let row = |i: usize| {
        if i < seed_x.len() {
            (&seed_x[i], seed_y[i] as f64)
        } else {
            let j = i - seed_x.len();
            (&extra_x[j], extra_y[j] as f64)
        }
    };

    let mut state = ClassifierState {
        weights: vec![0.0; dim],
        bias: 0.0,
    };
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut indices: Vec<usize> = (0..n).collect();
    let batch_size = options.batch_size.max(1);
    let lr = options.learning_rate;
    let decay = 1.0 - lr * options.l2.max(0.0);

    let mut grad = vec![0.0f64; dim];
    let mut touched: Vec<usize> = Vec::new();

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            let mut grad_b = 0.0;
            for &idx in chunk {
                let (x, y) = row(idx);
                let diff = state.predict_proba(x) - y;
                for &(i, v) in x {
                    if i >= dim {
                        continue;
                    }
                    if grad[i] == 0.0 {
                        touched.push(i);
                    }
                    grad[i] += diff * v;
                }
                grad_b += diff;
            }

            let inv = 1.0 / chunk.len() as f64;
            if decay != 1.0 {
                for w in &mut state.weights {
                    *w *= decay;
                }
            }
            for &i in &touched {
                state.weights[i] -= lr * grad[i] * inv;
                grad[i] = 0.0;
            }
            touched.clear();
            state.bias -= lr * grad_b * inv;
        }
    }

    Ok(state)
}

/// Precision/recall/F1 of `state` on a labeled split
pub fn score(state: &ClassifierState, x_test: &[SparseVector], y_test: &[Label]) -> Scores {
    let predicted: Vec<Label> = x_test.iter().map(|x| state.predict(x)).collect();
    binary_scores(y_test, &predicted)
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // feature 0 = "good", feature 1 = "bad", feature 2 = "film"
    fn toy() -> (Vec<SparseVector>, Vec<Label>) {
        let x = vec![
            vec![(0, 1.0), (2, 1.0)],
            vec![(0, 2.0)],
            vec![(1, 1.0), (2, 1.0)],
            vec![(1, 2.0)],
        ];
        (x, vec![1, 1, 0, 0])
    }

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = toy();
        let state = train(3, &x, &y, &[], &[], &TrainOptions::default()).unwrap();

        assert!(state.predict_proba(&vec![(0, 1.0)]) > 0.5);
        assert!(state.predict_proba(&vec![(1, 1.0)]) < 0.5);
        let scores = score(&state, &x, &y);
        assert_eq!(scores.f1, 1.0);
    }

    #[test]
    fn test_training_is_deterministic() {
        let (x, y) = toy();
        let extra_x = vec![vec![(0, 1.0), (1, 1.0)]];
        let extra_y = vec![1];
        let options = TrainOptions::default();

        let a = train(3, &x, &y, &extra_x, &extra_y, &options).unwrap();
        let b = train(3, &x, &y, &extra_x, &extra_y, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_extra_examples_shift_the_model() {
        let (x, y) = toy();
        let options = TrainOptions::default();
        let base = train(3, &x, &y, &[], &[], &options).unwrap();

        let extra_x = vec![vec![(2, 1.0)]; 6];
        let extra_y = vec![1; 6];
        let shifted = train(3, &x, &y, &extra_x, &extra_y, &options).unwrap();

        let film = vec![(2, 1.0)];
        assert!(shifted.predict_proba(&film) > base.predict_proba(&film));
    }

    #[test]
    fn test_confidence_is_max_class_probability() {
        let (x, y) = toy();
        let state = train(3, &x, &y, &[], &[], &TrainOptions::default()).unwrap();
        for v in &x {
            let p = state.predict_proba(v);
            assert_eq!(state.confidence(v), p.max(1.0 - p));
            assert!(state.confidence(v) >= 0.5);
        }
    }

    #[test]
    fn test_invalid_inputs_are_training_errors() {
        let options = TrainOptions::default();
        assert!(matches!(
            train(3, &[], &[], &[], &[], &options),
            Err(Error::Training(_))
        ));

        let (x, _) = toy();
        assert!(matches!(
            train(3, &x, &[1, 0, 2, 0], &[], &[], &options),
            Err(Error::Training(_))
        ));
        assert!(matches!(
            train(3, &x, &[1, 0], &[], &[], &options),
            Err(Error::Training(_))
        ));
    }
}
