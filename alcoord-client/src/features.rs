//! Feature space: unigram bag-of-words counts
//!
//! The vocabulary is fit once on train + pool text and frozen. It is built
//! as an explicit value and shared by reference (`Arc`) with the trainer and
//! the selection strategies.

use std::collections::{BTreeSet, HashMap};

/// Sparse count vector: `(feature index, count)` sorted by index
pub type SparseVector = Vec<(usize, f64)>;

/// Lowercased tokens of two or more word characters
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
}

/// Collects tokens until the vocabulary is frozen with [`build`](Self::build)
#[derive(Debug, Default)]
pub struct FeatureSpaceBuilder {
    tokens: BTreeSet<String>,
}

impl FeatureSpaceBuilder {
    pub fn add(&mut self, text: &str) {
        self.tokens.extend(tokenize(text));
    }

    /// Freeze: feature index = rank of the token in sorted order
    pub fn build(self) -> FeatureSpace {
        let vocabulary = self
            .tokens
            .into_iter()
            .enumerate()
            .map(|(i, token)| (token, i))
            .collect();
        FeatureSpace { vocabulary }
    }
}

#[derive(Debug, Clone)]
pub struct FeatureSpace {
    vocabulary: HashMap<String, usize>,
}

impl FeatureSpace {
    pub fn builder() -> FeatureSpaceBuilder {
        FeatureSpaceBuilder::default()
    }

    pub fn fit<'a, I>(documents: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut builder = Self::builder();
        for document in documents {
            builder.add(document);
        }
        builder.build()
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.vocabulary.get(token).copied()
    }

    /// Count vector of `text`; unknown tokens are dropped
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&idx) = self.vocabulary.get(&token) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut vector: SparseVector = counts.into_iter().collect();
        vector.sort_unstable_by_key(|&(idx, _)| idx);
        vector
    }

    pub fn transform_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<SparseVector> {
        texts.iter().map(|t| self.transform(t.as_ref())).collect()
    }
}
