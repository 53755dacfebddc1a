//! ordered timer dispatch: a priority queue on deadline, with cancellable
//! handles that support delaying or resetting a still-pending timer.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// a cancellable timer identity. cancelling twice is idempotent: the second
/// cancel finds no entry and is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

struct Entry {
    deadline: Instant,
    callback: Box<dyn FnOnce() + Send>,
}

/// a min-heap key; `BinaryHeap` is a max-heap so ordering is reversed on
/// `deadline`, then on handle to keep ties deterministic.
struct HeapKey {
    deadline: Instant,
    handle: TimerHandle,
}

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.handle == other.handle
    }
}
impl Eq for HeapKey {}
impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}
impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// one timer dispatcher per cooperative group. timers are not shared across
/// groups; a handle from one dispatcher is meaningless to another.
pub struct TimerDispatcher {
    heap: BinaryHeap<HeapKey>,
    entries: HashMap<TimerHandle, Entry>,
    next_handle: u64,
}

impl Default for TimerDispatcher {
    fn default() -> Self {
        TimerDispatcher::new()
    }
}

impl TimerDispatcher {
    pub fn new() -> Self {
        TimerDispatcher {
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            next_handle: 0,
        }
    }

    /// schedules `callback` to run at `deadline`. a cancelled timer
    /// dequeues but never fires; scheduling still consumes one dequeue from
    /// the heap, per the core's cancellation contract.
    pub fn schedule<F>(&mut self, deadline: Instant, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.insert(
            handle,
            Entry {
                deadline,
                callback: Box::new(callback),
            },
        );
        self.heap.push(HeapKey { deadline, handle });
        handle
    }

    pub fn schedule_after<F>(&mut self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Instant::now() + delay, callback)
    }

    /// idempotent: cancelling an unknown or already-cancelled handle is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.entries.remove(&handle);
    }

    /// reschedules a pending timer by `delta` (positive delays it, negative
    /// pulls it earlier). a no-op if the handle is no longer pending.
    pub fn delay(&mut self, handle: TimerHandle, delta: Duration, earlier: bool) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            let new_deadline = if earlier {
                entry.deadline.checked_sub(delta).unwrap_or(entry.deadline)
            } else {
                entry.deadline + delta
            };
            entry.deadline = new_deadline;
            self.heap.push(HeapKey {
                deadline: new_deadline,
                handle,
            });
        }
    }

    /// resets a pending timer to fire `delta` from now.
    pub fn reset(&mut self, handle: TimerHandle, delta: Duration) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            let new_deadline = Instant::now() + delta;
            entry.deadline = new_deadline;
            self.heap.push(HeapKey {
                deadline: new_deadline,
                handle,
            });
        }
    }

    /// the deadline of the earliest still-pending timer, if any. used by
    /// the poll loop to bound its sleep.
    pub fn next_deadline(&self) -> Option<Instant> {
        // the heap may hold stale entries for cancelled/already-fired
        // timers; only a live entry whose heap deadline matches the
        // authoritative one in `entries` counts.
        self.heap
            .iter()
            .filter(|key| {
                self.entries
                    .get(&key.handle)
                    .map(|e| e.deadline == key.deadline)
                    .unwrap_or(false)
            })
            .map(|key| key.deadline)
            .min()
    }

    /// pops and runs every timer whose deadline has passed. a heap entry
    /// whose deadline no longer matches the live entry (rescheduled) or
    /// whose handle is no longer present (cancelled) is silently dropped.
    pub fn fire_due(&mut self, now: Instant) {
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let key = self.heap.pop().unwrap();
            let live = match self.entries.get(&key.handle) {
                Some(entry) if entry.deadline == key.deadline => true,
                _ => false,
            };
            if !live {
                continue;
            }
            if let Some(entry) = self.entries.remove(&key.handle) {
                (entry.callback)();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_in_deadline_order() {
        let mut dispatcher = TimerDispatcher::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let now = Instant::now();

        let o2 = order.clone();
        dispatcher.schedule(now + Duration::from_millis(20), move || o2.lock().unwrap().push(2));
        let o1 = order.clone();
        dispatcher.schedule(now + Duration::from_millis(10), move || o1.lock().unwrap().push(1));

        dispatcher.fire_due(now + Duration::from_millis(30));
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn cancel_twice_is_idempotent() {
        let mut dispatcher = TimerDispatcher::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f2 = fired.clone();
        let handle = dispatcher.schedule_after(Duration::from_millis(1), move || {
            f2.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.cancel(handle);
        dispatcher.cancel(handle);
        dispatcher.fire_due(Instant::now() + Duration::from_millis(5));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reset_pushes_deadline_out() {
        let mut dispatcher = TimerDispatcher::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f2 = fired.clone();
        let handle = dispatcher.schedule_after(Duration::from_millis(5), move || {
            f2.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.reset(handle, Duration::from_millis(50));
        dispatcher.fire_due(Instant::now() + Duration::from_millis(10));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
