//! Per-customer async locks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use campus_eats_core::CustomerId;

type LockTable = HashMap<CustomerId, Arc<AsyncMutex<()>>>;

/// Serialises cart-mutating work per customer within this process.
///
/// Entries are created on demand and removed once no task holds or waits on
/// them, so the table only grows with concurrently active customers. The
/// table itself sits behind a plain mutex that is never held across an
/// `.await`.
#[derive(Clone, Default)]
pub struct CustomerLocks {
    locks: Arc<Mutex<LockTable>>,
}

impl CustomerLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the customer's lock.
    ///
    /// The entry is released when this future completes or is dropped,
    /// including while still waiting for the lock.
    pub async fn run<F, T>(&self, customer: CustomerId, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let entry = self.acquire(customer);
        let _guard = entry.lock.lock().await;
        work.await
    }

    /// Number of customers with a live lock entry.
    #[must_use]
    pub fn active(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, customer: CustomerId) -> LockEntry<'_> {
        let lock = self
            .table()
            .entry(customer)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        LockEntry {
            locks: self,
            customer,
            lock,
        }
    }
}

/// A task's claim on a customer's lock entry.
struct LockEntry<'a> {
    locks: &'a CustomerLocks,
    customer: CustomerId,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut table = self.locks.table();
        // Our reference must go while the table is locked, or two entries
        // dropping together could each see the other and both keep it
        let lock = std::mem::take(&mut self.lock);
        // One reference in the table plus ours: nobody else is waiting
        if Arc::strong_count(&lock) == 2
            && table
                .get(&self.customer)
                .is_some_and(|existing| Arc::ptr_eq(existing, &lock))
        {
            table.remove(&self.customer);
        }
        drop(lock);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_customer_is_serialised() {
        let locks = CustomerLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    locks
                        .run(CustomerId::new(1), async {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await;
                })
            })
            .collect();

        for task in tasks {
            task.await.ok();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_different_customers_do_not_block() {
        let locks = CustomerLocks::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let held = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .run(CustomerId::new(1), async {
                        rx.await.ok();
                    })
                    .await;
            })
        };

        // Would hang if customer 2 waited on customer 1's lock
        let value = tokio::time::timeout(
            Duration::from_secs(1),
            locks.run(CustomerId::new(2), async { 42 }),
        )
        .await;
        assert_eq!(value.ok(), Some(42));

        tx.send(()).ok();
        held.await.ok();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_work_releases_its_entry() {
        let locks = CustomerLocks::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            locks.run(CustomerId::new(1), std::future::pending::<()>()),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(locks.active(), 0);
        // The lock is free again
        let value = tokio::time::timeout(
            Duration::from_secs(1),
            locks.run(CustomerId::new(1), async { 7 }),
        )
        .await;
        assert_eq!(value.ok(), Some(7));
    }

    #[tokio::test]
    async fn test_abandoned_waiter_leaves_the_holder_in_charge() {
        let locks = CustomerLocks::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let held = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .run(CustomerId::new(1), async {
                        started_tx.send(()).ok();
                        rx.await.ok();
                    })
                    .await;
            })
        };
        started_rx.await.ok();

        // Gives up while the first task still holds the lock
        let waited = tokio::time::timeout(
            Duration::from_millis(20),
            locks.run(CustomerId::new(1), async {}),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(locks.active(), 1);

        tx.send(()).ok();
        held.await.ok();
        assert_eq!(locks.active(), 0);
    }
}
