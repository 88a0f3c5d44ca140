use thiserror::Error;

use crate::store::StoreError;

/// Errors from tracker operations.
///
/// Producer failures are deliberately not represented here: a producer that
/// panics aborts the pass before any state is written, and the next pass
/// starts clean. Store failures propagate; there is no retry logic.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

pub type SyncResult<T> = Result<T, SyncError>;
