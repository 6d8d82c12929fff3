//! Request-size batching helpers.

use std::ops::Range;

use crate::error::{RaglineError, Result};

/// Split `0..len` into consecutive ranges of at most `batch_size` items.
///
/// Every index is covered exactly once, in order.
pub fn batch_ranges(len: usize, batch_size: usize) -> Result<Vec<Range<usize>>> {
    if batch_size == 0 {
        return Err(RaglineError::Validation("batch size must be at least 1".into()));
    }
    Ok((0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect())
}

/// Number of batches needed for `len` items.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    len.div_ceil(batch_size)
}
