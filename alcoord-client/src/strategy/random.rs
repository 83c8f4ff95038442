use super::{Selected, SelectionContext, SelectionStrategy};
use crate::error::{Error, Result};
use rand::Rng;

/// Uniformly random unconsumed pool line
///
/// Draws without replacement within one call, so a fully consumed pool is
/// detected after at most one pass instead of looping forever.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelection;

impl SelectionStrategy for RandomSelection {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Result<Selected> {
        let mut rng = rand::thread_rng();
        let mut untried: Vec<usize> = (0..ctx.pool.len()).collect();
        let mut reader = ctx.pool.reader()?;

        while !untried.is_empty() {
            let pick = rng.gen_range(0..untried.len());
            let index = untried.swap_remove(pick);
            let utterance = reader.read_line(index)?;
            if !ctx.consumed.contains(&utterance) {
                return Ok(Selected {
                    index,
                    utterance,
                    label: ctx.label_of(index),
                });
            }
        }
        Err(Error::PoolExhausted)
    }
}
