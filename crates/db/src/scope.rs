//! Request scopes and the transaction registry.
//!
//! A [`Scope`] is threaded by reference through every database call. It
//! carries a cancellation token, an optional deadline and, inside
//! [`DbHelper::within_transaction`](crate::DbHelper::within_transaction),
//! the open transaction. The transaction slot can only be filled from within
//! this crate, so callers cannot forge one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{Postgres, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::DbError;

/// The driver transaction type carried by a [`TxHandle`].
pub type PgTransaction = Transaction<'static, Postgres>;

/// Shared reference to a transaction opened by the transaction runner.
///
/// The handle only grants statement execution. Commit and rollback stay with
/// the runner that opened the transaction; once it finishes, every clone of
/// the handle reports [`DbError::TransactionClosed`].
#[derive(Clone)]
pub struct TxHandle {
    inner: Arc<Mutex<Option<PgTransaction>>>,
}

impl TxHandle {
    pub(crate) fn new(tx: PgTransaction) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// A handle whose transaction has already finished.
    #[cfg(test)]
    pub(crate) fn closed() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Exclusive access for the duration of one statement.
    pub(crate) async fn lock(&self) -> OwnedMutexGuard<Option<PgTransaction>> {
        Arc::clone(&self.inner).lock_owned().await
    }

    /// Removes the transaction, leaving every clone of this handle closed.
    pub(crate) async fn take(&self) -> Option<PgTransaction> {
        self.inner.lock().await.take()
    }

    /// `true` if both handles refer to the same transaction.
    pub fn same_as(&self, other: &TxHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHandle")
            .field("id", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

/// Immutable call scope. Deriving a scope never changes the original.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    tx: Option<TxHandle>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    /// A root scope with no deadline and a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a scope whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a scope with the earlier of the current and the given deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Derives a scope with its own cancellation token. Cancelling this scope
    /// cancels the child too, but not the other way round.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    /// The token that cancels this scope and every scope derived from it.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Looks up the transaction attached to this scope chain.
    pub fn transaction(&self) -> Option<&TxHandle> {
        self.tx.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Derives a scope carrying `tx`.
    pub(crate) fn with_transaction(&self, tx: TxHandle) -> Self {
        Self {
            tx: Some(tx),
            ..self.clone()
        }
    }

    /// Runs `fut` until it completes, the scope is cancelled or the deadline
    /// passes, whichever comes first.
    pub(crate) async fn guard<T, F>(&self, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DbError::Cancelled),
            _ = sleep_until(self.deadline) => Err(DbError::DeadlineExceeded),
            res = fut => res,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_scope_carries_no_transaction() {
        let scope = Scope::new();
        assert!(scope.transaction().is_none());
        assert!(!scope.in_transaction());
    }

    #[test]
    fn attaching_leaves_original_untouched() {
        let root = Scope::new();
        let tx = TxHandle::closed();
        let derived = root.with_transaction(tx.clone());

        assert!(root.transaction().is_none());
        let attached = derived.transaction().expect("transaction attached");
        assert!(attached.same_as(&tx));
        assert!(!attached.same_as(&TxHandle::closed()));
    }

    #[test]
    fn derived_scopes_keep_the_transaction() {
        let tx = TxHandle::closed();
        let scope = Scope::new()
            .with_transaction(tx.clone())
            .with_timeout(Duration::from_secs(5))
            .child();
        assert!(scope.transaction().is_some_and(|t| t.same_as(&tx)));
    }

    #[test]
    fn deadline_only_moves_earlier() {
        let root = Scope::new().with_timeout(Duration::from_secs(1));
        let later = root.with_timeout(Duration::from_secs(60));
        assert_eq!(root.deadline(), later.deadline());
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let root = Scope::new();
        let child = root.child();
        root.cancellation_token().cancel();

        let res = child.guard(std::future::pending::<Result<(), DbError>>()).await;
        assert!(matches!(res, Err(DbError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_usable() {
        let root = Scope::new();
        let child = root.child();
        child.cancellation_token().cancel();

        let res = root.guard(async { Ok::<_, DbError>(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_aborts_pending_work() {
        let scope = Scope::new().with_timeout(Duration::from_millis(10));
        let res = scope
            .guard(std::future::pending::<Result<(), DbError>>())
            .await;
        assert!(matches!(res, Err(DbError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn taking_closes_every_clone() {
        let handle = TxHandle::closed();
        let clone = handle.clone();
        assert!(handle.take().await.is_none());
        assert!(clone.lock().await.is_none());
    }
}
