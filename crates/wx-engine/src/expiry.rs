//! Timeout-driven eviction of decoded layer grids.
//!
//! One background thread per registry pops deadlines off a heap and asks
//! the layer to drop its decoded data. A layer touched again in the
//! meantime carries a later cache time, so a stale deadline fires without
//! effect; entries hold weak references and never keep a layer alive.

use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::layer::Layer;

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

struct Entry {
    deadline: i64,
    layer: Weak<Layer>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // min-heap on the deadline
        other.deadline.cmp(&self.deadline)
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Entry>,
    shutdown: bool,
}

/// Deadline queue shared between a registry's layers and its timer thread.
pub(crate) struct ExpiryQueue {
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

impl ExpiryQueue {
    /// Create the queue and spawn its timer thread.
    pub fn start() -> (Arc<Self>, JoinHandle<()>) {
        let queue = Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            wakeup: Condvar::new(),
        });
        let worker = queue.clone();
        let handle = std::thread::Builder::new()
            .name("wx-layer-expiry".into())
            .spawn(move || worker.run())
            .unwrap_or_else(|err| panic!("cannot spawn expiry thread: {err}"));
        (queue, handle)
    }

    /// Schedule `layer` for eviction at `deadline` (Unix seconds).
    pub fn schedule(&self, deadline: i64, layer: Weak<Layer>) {
        let mut state = lock(&self.state);
        state.heap.push(Entry { deadline, layer });
        self.wakeup.notify_one();
    }

    /// Ask the timer thread to exit.
    pub fn shutdown(&self) {
        lock(&self.state).shutdown = true;
        self.wakeup.notify_all();
    }

    fn run(&self) {
        let mut state = lock(&self.state);
        loop {
            if state.shutdown {
                return;
            }
            let deadline = match state.heap.peek() {
                Some(entry) => entry.deadline,
                None => {
                    state = self
                        .wakeup
                        .wait(state)
                        .unwrap_or_else(|err| err.into_inner());
                    continue;
                }
            };
            let now = unix_now();
            if deadline <= now {
                let entry = match state.heap.pop() {
                    Some(entry) => entry,
                    None => continue,
                };
                drop(state);
                if let Some(layer) = entry.layer.upgrade() {
                    layer.expire_if_due(now);
                }
                state = lock(&self.state);
            } else {
                let wait = Duration::from_secs((deadline - now).max(1) as u64);
                let (guard, _) = self
                    .wakeup
                    .wait_timeout(state, wait)
                    .unwrap_or_else(|err| err.into_inner());
                state = guard;
            }
        }
    }
}

/// Lock that survives a poisoned mutex; the protected state stays usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
