//! Manually driven timer queue.
//!
//! The settings channel debounces its broadcasts behind a short timeout that
//! resets on every change. [`Scheduler`] provides that timeout primitive
//! without a wall clock: the embedder advances virtual time from its event
//! loop, and due callbacks fire in order. Tests advance time explicitly,
//! which keeps debounce behaviour deterministic.

use std::cell::{Cell, RefCell};

/// Handle to a scheduled callback, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Timer {
    id: TimerId,
    due: u64,
    callback: Box<dyn FnOnce()>,
}

/// Virtual-time timer queue.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use quilt_host::scheduler::Scheduler;
///
/// let scheduler = Scheduler::new();
/// let fired = Rc::new(Cell::new(false));
/// let flag = Rc::clone(&fired);
/// scheduler.schedule(100, Box::new(move || flag.set(true)));
///
/// scheduler.advance(99);
/// assert!(!fired.get());
/// scheduler.advance(1);
/// assert!(fired.get());
/// ```
#[derive(Default)]
pub struct Scheduler {
    now: Cell<u64>,
    next_id: Cell<u64>,
    timers: RefCell<Vec<Timer>>,
}

impl Scheduler {
    /// Creates a scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time in milliseconds.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    /// Schedules `callback` to fire `delay_ms` from now.
    pub fn schedule(&self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.timers.borrow_mut().push(Timer {
            id,
            due: self.now.get().saturating_add(delay_ms),
            callback,
        });
        id
    }

    /// Cancels a pending timer. Returns `false` if it already fired or was
    /// cancelled before.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut timers = self.timers.borrow_mut();
        let before = timers.len();
        timers.retain(|timer| timer.id != id);
        timers.len() != before
    }

    /// Returns how many timers are pending.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Advances virtual time by `ms`, firing every due callback in due
    /// order (scheduling order breaks ties).
    ///
    /// Time steps through each timer's due instant before its callback
    /// runs, so a callback that schedules a follow-up measures the delay
    /// from its own due time. Follow-ups fire within the same call if
    /// their due time falls inside the advanced window.
    pub fn advance(&self, ms: u64) {
        let target = self.now.get().saturating_add(ms);
        loop {
            let next = {
                let mut timers = self.timers.borrow_mut();
                let due_index = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.id.0))
                    .map(|(index, _)| index);
                due_index.map(|index| timers.remove(index))
            };
            match next {
                Some(timer) => {
                    self.now.set(self.now.get().max(timer.due));
                    (timer.callback)();
                }
                None => break,
            }
        }
        self.now.set(target);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    #[test]
    fn fires_in_due_order() {
        let scheduler = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (label, delay) in [("slow", 200_u64), ("fast", 50), ("mid", 100)] {
            let sink = Rc::clone(&order);
            scheduler.schedule(delay, Box::new(move || sink.borrow_mut().push(label)));
        }
        scheduler.advance(500);
        assert_eq!(order.borrow().as_slice(), ["fast", "mid", "slow"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancel_prevents_firing() {
        let scheduler = Scheduler::new();
        let fired = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&fired);
        let id = scheduler.schedule(10, Box::new(move || *flag.borrow_mut() = true));
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        scheduler.advance(100);
        assert!(!*fired.borrow());
    }

    #[test]
    fn callbacks_can_reschedule_within_window() {
        let scheduler = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&order);
        let inner_scheduler = Rc::new(scheduler);
        let outer = Rc::clone(&inner_scheduler);
        let chained = Rc::clone(&order);
        inner_scheduler.schedule(
            10,
            Box::new(move || {
                sink.borrow_mut().push("first");
                outer.schedule(10, Box::new(move || chained.borrow_mut().push("second")));
            }),
        );
        inner_scheduler.advance(20);
        assert_eq!(order.borrow().as_slice(), ["first", "second"]);
    }

    #[test]
    fn now_reports_the_due_time_inside_a_callback() {
        let scheduler = Rc::new(Scheduler::new());
        let observed = Rc::new(Cell::new(0_u64));
        let inner_scheduler = Rc::clone(&scheduler);
        let sink = Rc::clone(&observed);
        scheduler.schedule(30, Box::new(move || sink.set(inner_scheduler.now())));
        scheduler.advance(100);
        assert_eq!(observed.get(), 30);
        assert_eq!(scheduler.now(), 100);
    }

    #[test]
    fn not_due_timers_stay_pending() {
        let scheduler = Scheduler::new();
        scheduler.schedule(100, Box::new(|| {}));
        scheduler.advance(50);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.now(), 50);
    }
}
