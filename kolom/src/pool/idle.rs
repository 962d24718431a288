//! Bounded FIFO of idle items with expiry.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};

use super::PoolError;
use crate::common::verbose;

/// An item that can be held in [`IdlePool`].
pub trait Pooled {
    /// Creation instant, used for expiry.
    fn connected_at(&self) -> Instant;

    /// Returns `true` if the item must not be reused.
    fn is_bad(&self) -> bool;

    /// Release the item resources.
    fn close(self);
}

/// A bounded FIFO of idle items.
///
/// Items older than `max_lifetime` are closed on [`put`][IdlePool::put],
/// skipped and closed on [`get`][IdlePool::get], and swept by the drain task.
///
/// Items are closed outside of the lock.
#[derive(Debug)]
pub struct IdlePool<T> {
    inner: Mutex<Idle<T>>,
    capacity: usize,
    max_lifetime: Duration,
}

#[derive(Debug)]
struct Idle<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T: Pooled> IdlePool<T> {
    pub fn new(capacity: usize, max_lifetime: Duration) -> Self {
        Self {
            inner: Mutex::new(Idle { items: VecDeque::with_capacity(capacity), closed: false }),
            capacity,
            max_lifetime,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Idle<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, item: &T) -> bool {
        item.connected_at().elapsed() >= self.max_lifetime
    }

    /// Pop the oldest inserted item which is not expired.
    pub fn get(&self, deadline: Option<Instant>) -> Result<T, PoolError> {
        let mut expired = vec![];

        let result = {
            let mut idle = self.lock();
            if idle.closed {
                Err(PoolError::Closed)
            } else if deadline.is_some_and(|e| Instant::now() >= e) {
                Err(PoolError::AcquireTimeout)
            } else {
                loop {
                    match idle.items.pop_front() {
                        Some(item) if self.is_expired(&item) => expired.push(item),
                        Some(item) => break Ok(item),
                        None => break Err(PoolError::Empty),
                    }
                }
            }
        };

        close_all(expired);
        result
    }

    /// Return an item.
    ///
    /// Returns `false` if the item is closed instead, because it is bad,
    /// expired, or the pool is full or closed.
    pub fn put(&self, item: T) -> bool {
        if item.is_bad() || self.is_expired(&item) {
            item.close();
            return false;
        }

        let mut idle = self.lock();
        if idle.closed || idle.items.len() >= self.capacity {
            drop(idle);
            item.close();
            return false;
        }

        idle.items.push_back(item);
        true
    }

    /// Close every expired item, returns the number of closed items.
    pub fn drain_expired(&self) -> usize {
        let mut expired = vec![];
        {
            let mut idle = self.lock();
            for _ in 0..idle.items.len() {
                let Some(item) = idle.items.pop_front() else {
                    break;
                };
                match self.is_expired(&item) {
                    true => expired.push(item),
                    false => idle.items.push_back(item),
                }
            }
        }

        let len = expired.len();
        close_all(expired);
        len
    }

    /// Close every item, subsequent `get` returns [`PoolError::Closed`].
    pub fn close(&self) {
        let items = {
            let mut idle = self.lock();
            idle.closed = true;
            std::mem::take(&mut idle.items)
        };
        close_all(items);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of idle items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Pooled + Send + 'static> IdlePool<T> {
    /// Spawn a task which drains expired items every `max_lifetime`.
    ///
    /// The task only holds a weak reference, it ends when the pool is
    /// closed or dropped.
    pub fn spawn_drain(pool: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(pool);
        let period = pool.max_lifetime.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;

                let Some(pool) = weak.upgrade() else {
                    break;
                };
                if pool.is_closed() {
                    break;
                }

                let _drained = pool.drain_expired();
                verbose!(drained = _drained, idle = pool.len(), "pool drain");
            }
        })
    }
}

fn close_all<T: Pooled>(items: impl IntoIterator<Item = T>) {
    for item in items {
        item.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Item {
        id: usize,
        connected_at: Instant,
        bad: bool,
        closed: Arc<AtomicUsize>,
    }

    impl Pooled for Item {
        fn connected_at(&self) -> Instant {
            self.connected_at
        }

        fn is_bad(&self) -> bool {
            self.bad
        }

        fn close(self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Factory {
        closed: Arc<AtomicUsize>,
    }

    impl Factory {
        fn new() -> Self {
            Self { closed: Arc::new(AtomicUsize::new(0)) }
        }

        fn item(&self, id: usize) -> Item {
            Item { id, connected_at: Instant::now(), bad: false, closed: self.closed.clone() }
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn fifo() {
        let f = Factory::new();
        let pool = IdlePool::new(4, HOUR);
        for id in 0..3 {
            assert!(pool.put(f.item(id)));
        }

        assert_eq!(pool.get(None).unwrap().id, 0);
        assert_eq!(pool.get(None).unwrap().id, 1);
        assert!(pool.put(f.item(3)));
        assert_eq!(pool.get(None).unwrap().id, 2);
        assert_eq!(pool.get(None).unwrap().id, 3);
        assert_eq!(pool.get(None).unwrap_err(), PoolError::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_ignores_age() {
        let f = Factory::new();
        let pool = IdlePool::new(4, HOUR);
        let older = f.item(0);
        tokio::time::advance(Duration::from_secs(60)).await;
        let newer = f.item(1);
        assert!(older.connected_at < newer.connected_at);

        // newer goes in first, so it comes out first
        assert!(pool.put(newer));
        assert!(pool.put(older));
        assert_eq!(pool.get(None).unwrap().id, 1);
        assert_eq!(pool.get(None).unwrap().id, 0);
        assert_eq!(f.closed(), 0);
    }

    #[test]
    fn full_pool_closes_item() {
        let f = Factory::new();
        let pool = IdlePool::new(1, HOUR);
        assert!(pool.put(f.item(0)));
        assert!(!pool.put(f.item(1)));
        assert_eq!(f.closed(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn bad_item_is_closed() {
        let f = Factory::new();
        let pool = IdlePool::new(1, HOUR);
        let mut item = f.item(0);
        item.bad = true;
        assert!(!pool.put(item));
        assert_eq!(f.closed(), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn closed_pool() {
        let f = Factory::new();
        let pool = IdlePool::new(2, HOUR);
        pool.put(f.item(0));
        pool.put(f.item(1));
        pool.close();

        assert_eq!(f.closed(), 2);
        assert_eq!(pool.get(None).unwrap_err(), PoolError::Closed);
        assert!(!pool.put(f.item(2)));
        assert_eq!(f.closed(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_elapsed() {
        let pool = IdlePool::<Item>::new(1, HOUR);
        let deadline = Instant::now();
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(pool.get(Some(deadline)).unwrap_err(), PoolError::AcquireTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_on_put() {
        let f = Factory::new();
        let pool = IdlePool::new(2, Duration::from_secs(10));
        let item = f.item(0);
        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!pool.put(item));
        assert_eq!(f.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_on_get() {
        let f = Factory::new();
        let pool = IdlePool::new(2, Duration::from_secs(10));
        pool.put(f.item(0));
        tokio::time::advance(Duration::from_secs(5)).await;
        pool.put(f.item(1));
        tokio::time::advance(Duration::from_secs(6)).await;

        // the first is expired, the second is not
        assert_eq!(pool.get(None).unwrap().id, 1);
        assert_eq!(f.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_task() {
        let f = Factory::new();
        let pool = Arc::new(IdlePool::new(2, Duration::from_secs(10)));
        pool.put(f.item(0));
        let task = IdlePool::spawn_drain(&pool);

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(f.closed(), 1);
        assert!(pool.is_empty());

        drop(pool);
        tokio::time::sleep(Duration::from_secs(11)).await;
        task.await.unwrap();
    }
}
