//! # alcoord-client
//!
//! One active-learning model session: it selects pool utterances for
//! annotation, incorporates returned labels into a binary classifier and
//! reports held-out scores to the coordination server.
//!
//! **Modules:**
//! - `dataset`, `pool_index`, `features`: corpus loading and vectorisation
//! - `classifier`, `metrics`, `learner`: training, scoring and the labeled set
//! - `scan`, `strategy`: candidate selection
//! - `session`, `transport`, `runner`: protocol state machine and networking

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod learner;
pub mod metrics;
pub mod pool_index;
pub mod runner;
pub mod scan;
pub mod session;
pub mod strategy;
pub mod transport;

pub use error::{Error, Result};
pub use session::{Session, SessionState};
