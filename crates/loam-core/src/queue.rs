//! Bounded FIFO with a peekable front, used for the upload backlog
//!
//! embassy's `Channel` only hands out owned items, which would force the
//! upload task to take a record out before it knows whether the publish
//! succeeds. [`RetryQueue`] lets the consumer look at the front record and
//! commit its removal only after delivery, so a failed record keeps its
//! place at the front and FIFO order survives across upload cycles.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::waitqueue::WakerRegistration;
use heapless::Deque;

struct State<T, const N: usize> {
    items: Deque<T, N>,
    /// Producer parked on a full queue
    space: WakerRegistration,
}

/// Single-producer, single-consumer bounded queue.
pub struct RetryQueue<M: RawMutex, T, const N: usize> {
    state: Mutex<M, RefCell<State<T, N>>>,
}

impl<M: RawMutex, T, const N: usize> Default for RetryQueue<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, T, const N: usize> RetryQueue<M, T, N> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                items: Deque::new(),
                space: WakerRegistration::new(),
            })),
        }
    }

    /// Appends `item`, handing it back if the queue is full.
    pub fn try_send(&self, item: T) -> Result<(), T> {
        self.state
            .lock(|state| state.borrow_mut().items.push_back(item))
    }

    /// Appends `item`, waiting for space if the queue is full.
    ///
    /// Callers bound the wait with `embassy_time::with_timeout`; dropping
    /// the future drops the item.
    pub async fn send(&self, item: T) {
        let mut item = Some(item);
        poll_fn(|cx| {
            self.state.lock(|state| {
                let mut state = state.borrow_mut();
                if state.items.is_full() {
                    state.space.register(cx.waker());
                    return Poll::Pending;
                }
                if let Some(item) = item.take() {
                    // Cannot fail, fullness was checked under the same lock
                    let _ = state.items.push_back(item);
                }
                Poll::Ready(())
            })
        })
        .await
    }

    /// Removes and returns the front item.
    pub fn pop_front(&self) -> Option<T> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            let item = state.items.pop_front();
            if item.is_some() {
                state.space.wake();
            }
            item
        })
    }

    pub fn len(&self) -> usize {
        self.state.lock(|state| state.borrow().items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<M: RawMutex, T: Clone, const N: usize> RetryQueue<M, T, N> {
    /// Copy of the front item, left in place.
    pub fn front(&self) -> Option<T> {
        self.state.lock(|state| state.borrow().items.front().cloned())
    }
}
