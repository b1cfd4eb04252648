//! Transaction wrapper.

use snapledger_storage::SnapshotStore;

use crate::error::CoreResult;

/// Runs `f` inside one store transaction.
///
/// If `f` returns `Ok`, the transaction is committed and a failed commit is
/// returned as the error. If it returns `Err`, the transaction is aborted
/// and the original error is returned. If `f` panics, the transaction is
/// dropped uncommitted, which discards every staged write.
pub fn run_in_transaction<S, F, T>(store: &S, f: F) -> CoreResult<T>
where
    S: SnapshotStore + ?Sized,
    F: FnOnce(&mut S::Transaction) -> CoreResult<T>,
{
    let mut txn = store.begin()?;
    match f(&mut txn) {
        Ok(result) => {
            store.commit(txn)?;
            Ok(result)
        }
        Err(e) => {
            // Abort, but don't mask the original error
            if let Err(abort_err) = store.abort(txn) {
                tracing::warn!(error = %abort_err, "abort failed after error");
            }
            Err(e)
        }
    }
}
