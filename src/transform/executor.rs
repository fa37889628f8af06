use super::errors::TransformError;
use crate::batch::Batch;
use crate::store::KeyValueStore;

/// Result of a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub operations: usize,
}

/// Submit `batch` as a single atomic unit.
///
/// On failure nothing from the batch is visible in the store.
pub async fn exec<S>(store: &S, batch: &Batch) -> Result<BatchOutcome, TransformError>
where
    S: KeyValueStore + ?Sized,
{
    let ops = batch.len();
    if ops == 0 {
        return Ok(BatchOutcome { operations: 0 });
    }

    match store.submit_batch(batch).await {
        Ok(operations) => {
            tracing::debug!(operations, "Batch committed");
            Ok(BatchOutcome { operations })
        }
        Err(source) => {
            tracing::error!(ops, error = %source, "Batch submission failed");
            Err(TransformError::BatchSubmission { ops, source })
        }
    }
}
