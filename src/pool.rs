//! The session pool.
//!
//! A [`Pool`] multiplexes callers over a bounded set of [`Client`] sessions.
//! Slots are filled lazily (or eagerly at initialization), checkouts verify
//! the session is still usable, and callers that find the pool empty suspend
//! in FIFO order until a session is released.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::client::Client;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

/// What a borrower gets from [`DeferredStack::pop`].
enum Checkout<T> {
    /// A ready element.
    Ready(T),
    /// The borrower owns a never-filled slot and must construct the element.
    Vacant,
}

/// A bounded LIFO with lazy slot filling and FIFO hand-off to waiters.
///
/// Invariant: ready elements + outstanding borrows + vacant slots equal the
/// capacity at all times.
struct DeferredStack<T> {
    state: Mutex<StackState<T>>,
}

struct StackState<T> {
    elements: Vec<T>,
    vacant: usize,
    waiters: VecDeque<oneshot::Sender<Checkout<T>>>,
}

impl<T> DeferredStack<T> {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(StackState {
                elements: Vec::with_capacity(capacity),
                vacant: capacity,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Number of ready elements.
    fn available(&self) -> usize {
        self.state.lock().unwrap().elements.len()
    }

    /// Borrow an element or a vacant slot; suspends when neither is
    /// available. Suspended borrowers resume in arrival order.
    async fn pop(&self) -> Result<Checkout<T>> {
        let receiver = {
            let mut state = self.state.lock().unwrap();
            if let Some(element) = state.elements.pop() {
                return Ok(Checkout::Ready(element));
            }
            if state.vacant > 0 {
                state.vacant -= 1;
                return Ok(Checkout::Vacant);
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            receiver
        };
        receiver.await.map_err(|_| Error::PoolClosed)
    }

    /// Return a borrowed element. The oldest live waiter gets it directly;
    /// without waiters it lands back on the stack.
    fn push(&self, element: T) {
        let mut state = self.state.lock().unwrap();
        let mut checkout = Checkout::Ready(element);
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(checkout) {
                Ok(()) => return,
                // The waiter gave up (cancelled connect), try the next one
                Err(rejected) => checkout = rejected,
            }
        }
        if let Checkout::Ready(element) = checkout {
            state.elements.push(element);
        }
    }

    /// Claim every vacant slot at once (eager initialization).
    fn claim_vacant(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.vacant)
    }

    /// Give up a borrowed slot without an element (failed construction).
    /// A waiter, if any, inherits the vacancy and constructs itself.
    fn reclaim(&self) {
        let mut state = self.state.lock().unwrap();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(Checkout::Vacant).is_ok() {
                return;
            }
        }
        state.vacant += 1;
    }

    /// Take every ready element and mark its slot vacant again; pending
    /// waiters are dismissed.
    fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock().unwrap();
        state.vacant += state.elements.len();
        state.waiters.clear();
        std::mem::take(&mut state.elements)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolPhase {
    Uninitialized,
    Ready,
    Ended,
}

struct PoolInner {
    config: ConnectionConfig,
    size: usize,
    lazy: bool,
    stack: DeferredStack<Client>,
    phase: tokio::sync::Mutex<PoolPhase>,
}

/// A bounded pool of sessions sharing one configuration.
///
/// Cloning the pool is cheap and shares the same sessions.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool of `size` sessions. A lazy pool opens sessions on
    /// demand; otherwise all of them open on the first
    /// [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig, size: usize, lazy: bool) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                size,
                lazy,
                stack: DeferredStack::new(size),
                phase: tokio::sync::Mutex::new(PoolPhase::Uninitialized),
            }),
        }
    }

    /// Number of slots in the pool.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Number of sessions ready to be borrowed right now.
    pub fn available(&self) -> usize {
        self.inner.stack.available()
    }

    /// Borrow a session, opening or reviving one when needed. Suspends in
    /// FIFO order when every session is checked out.
    ///
    /// An ended pool reinitializes transparently.
    pub async fn connect(&self) -> Result<PoolClient> {
        self.ensure_ready().await?;

        match self.inner.stack.pop().await? {
            Checkout::Ready(client) => {
                if client.is_healthy().await {
                    return Ok(PoolClient::new(Arc::clone(&self.inner), client));
                }
                // Dead or poisoned: replace it within the borrowed slot
                debug!("Discarding unusable pooled session");
                let _ = client.end().await;
                self.construct().await
            }
            Checkout::Vacant => self.construct().await,
        }
    }

    /// End every available session. Outstanding borrows stay usable; their
    /// release returns them to the (re-armed) pool.
    pub async fn end(&self) -> Result<()> {
        let mut phase = self.inner.phase.lock().await;
        if *phase == PoolPhase::Ended {
            return Err(Error::PoolClosed);
        }
        *phase = PoolPhase::Ended;

        for client in self.inner.stack.drain() {
            if let Err(error) = client.end().await {
                warn!("Error while ending a pooled session: {}", error);
            }
        }
        Ok(())
    }

    /// Initialize the current generation exactly once. Concurrent callers
    /// wait here until the pool is ready.
    async fn ensure_ready(&self) -> Result<()> {
        let mut phase = self.inner.phase.lock().await;
        if *phase == PoolPhase::Ready {
            return Ok(());
        }

        if !self.inner.lazy {
            // Claim the slots up front: the stack would otherwise hand back
            // the sessions just opened instead of the remaining vacancies
            let vacant = self.inner.stack.claim_vacant();
            for opened in 0..vacant {
                match Client::connect(self.inner.config.clone()).await {
                    Ok(client) => self.inner.stack.push(client),
                    Err(error) => {
                        for _ in opened..vacant {
                            self.inner.stack.reclaim();
                        }
                        return Err(error);
                    }
                }
            }
        }
        *phase = PoolPhase::Ready;
        Ok(())
    }

    async fn construct(&self) -> Result<PoolClient> {
        match Client::connect(self.inner.config.clone()).await {
            Ok(client) => Ok(PoolClient::new(Arc::clone(&self.inner), client)),
            Err(error) => {
                self.inner.stack.reclaim();
                Err(error)
            }
        }
    }
}

/// A session borrowed from a [`Pool`].
///
/// Dereferences to [`Client`]. Dropping (or calling
/// [`release`](Self::release)) returns the session, handing it to the oldest
/// suspended borrower first.
pub struct PoolClient {
    pool: Arc<PoolInner>,
    client: Option<Client>,
}

impl PoolClient {
    fn new(pool: Arc<PoolInner>, client: Client) -> Self {
        Self {
            pool,
            client: Some(client),
        }
    }

    /// Return the session to the pool.
    pub fn release(self) {
        // Drop does the work
    }
}

impl Deref for PoolClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref().expect("session already released")
    }
}

impl Drop for PoolClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.stack.push(client);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_for_waiters(stack: &DeferredStack<u32>, count: usize) {
        for _ in 0..1000 {
            if stack.state.lock().unwrap().waiters.len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("waiters never registered");
    }

    #[tokio::test]
    async fn test_pop_hands_out_vacant_slots_up_to_capacity() {
        let stack = DeferredStack::<u32>::new(2);
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));
        assert_eq!(stack.available(), 0);
    }

    #[tokio::test]
    async fn test_push_then_pop_returns_element() {
        let stack = DeferredStack::<u32>::new(1);
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));
        stack.push(7);
        assert_eq!(stack.available(), 1);
        match stack.pop().await.unwrap() {
            Checkout::Ready(element) => assert_eq!(element, 7),
            Checkout::Vacant => panic!("expected the pushed element"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_stack_suspends_and_resumes_fifo() {
        let stack = Arc::new(DeferredStack::<u32>::new(1));
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));

        let first = {
            let stack = Arc::clone(&stack);
            tokio::spawn(async move { stack.pop().await })
        };
        wait_for_waiters(&stack, 1).await;

        let second = {
            let stack = Arc::clone(&stack);
            tokio::spawn(async move { stack.pop().await })
        };
        wait_for_waiters(&stack, 2).await;

        // The release goes to the oldest waiter, not onto the stack
        stack.push(1);
        match first.await.unwrap().unwrap() {
            Checkout::Ready(element) => assert_eq!(element, 1),
            Checkout::Vacant => panic!("expected hand-off"),
        }
        assert_eq!(stack.available(), 0);

        stack.push(2);
        match second.await.unwrap().unwrap() {
            Checkout::Ready(element) => assert_eq!(element, 2),
            Checkout::Vacant => panic!("expected hand-off"),
        }
    }

    #[tokio::test]
    async fn test_reclaim_wakes_waiter_with_vacancy() {
        let stack = Arc::new(DeferredStack::<u32>::new(1));
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));

        let waiter = {
            let stack = Arc::clone(&stack);
            tokio::spawn(async move { stack.pop().await })
        };
        wait_for_waiters(&stack, 1).await;

        // Construction failed: the waiter inherits the vacant slot
        stack.reclaim();
        assert!(matches!(waiter.await.unwrap().unwrap(), Checkout::Vacant));
    }

    #[tokio::test]
    async fn test_drain_dismisses_waiters() {
        let stack = Arc::new(DeferredStack::<u32>::new(1));
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));

        let blocked = {
            let stack = Arc::clone(&stack);
            tokio::spawn(async move { stack.pop().await })
        };
        wait_for_waiters(&stack, 1).await;

        let drained = stack.drain();
        assert!(drained.is_empty()); // the only slot is borrowed, not stacked
        assert!(matches!(blocked.await.unwrap(), Err(Error::PoolClosed)));

        // Returning the borrowed slot reopens its vacancy
        stack.reclaim();
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));
    }

    #[tokio::test]
    async fn test_drain_reopens_slots_of_stacked_elements() {
        let stack = DeferredStack::<u32>::new(2);
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));
        stack.push(9);

        assert_eq!(stack.drain(), vec![9]);
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));
        assert!(matches!(stack.pop().await.unwrap(), Checkout::Vacant));
    }
}
