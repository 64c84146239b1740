//! The run loop: one `poll` over a compacted fd array plus a min-heap
//! of monotonic timers.
//!
//! Blink, smooth scroll flushes, the synchronized update timeout,
//! visual bell and friends are all timers here.  Handlers run to
//! completion; the only suspension point in the whole engine is the
//! `poll` call itself.
#![cfg(unix)]

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// Stable handle to a registered fd slot; re-enable/disable is O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdSlot(usize);

/// Stable handle to a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(usize);

/// An fd became ready; `revents` is the raw poll bits.
pub type FdCallback<T> = Box<dyn FnMut(&mut T, i16)>;

/// A timer fired; returning true reschedules it `period` from now.
pub type TimerCallback<T> = Box<dyn FnMut(&mut T) -> bool>;

struct FdEntry<T> {
    fd: RawFd,
    events: i16,
    enabled: bool,
    callback: FdCallback<T>,
}

struct TimerEntry<T> {
    period: Duration,
    callback: TimerCallback<T>,
    /// Generation counter invalidates stale heap entries.
    generation: u64,
    armed: bool,
}

pub struct Poller<T> {
    fds: Vec<Option<FdEntry<T>>>,
    free_fds: Vec<usize>,
    timers: Vec<Option<TimerEntry<T>>>,
    free_timers: Vec<usize>,
    heap: BinaryHeap<Reverse<(Instant, usize, u64)>>,
    tick: Option<Box<dyn FnMut(&mut T)>>,
}

impl<T> Default for Poller<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Poller<T> {
    pub fn new() -> Self {
        Poller {
            fds: Vec::new(),
            free_fds: Vec::new(),
            timers: Vec::new(),
            free_timers: Vec::new(),
            heap: BinaryHeap::new(),
            tick: None,
        }
    }

    /// Callback run after every poll pass.
    pub fn set_tick(&mut self, tick: Box<dyn FnMut(&mut T)>) {
        self.tick = Some(tick);
    }

    pub fn add_fd(&mut self, fd: RawFd, events: i16, callback: FdCallback<T>) -> FdSlot {
        let entry = FdEntry {
            fd,
            events,
            enabled: true,
            callback,
        };
        match self.free_fds.pop() {
            Some(slot) => {
                self.fds[slot] = Some(entry);
                FdSlot(slot)
            }
            None => {
                self.fds.push(Some(entry));
                FdSlot(self.fds.len() - 1)
            }
        }
    }

    pub fn set_fd_enabled(&mut self, slot: FdSlot, enabled: bool) {
        if let Some(Some(entry)) = self.fds.get_mut(slot.0) {
            entry.enabled = enabled;
        }
    }

    pub fn remove_fd(&mut self, slot: FdSlot) {
        if let Some(entry) = self.fds.get_mut(slot.0) {
            if entry.take().is_some() {
                self.free_fds.push(slot.0);
            }
        }
    }

    /// Register a periodic timer, armed immediately.
    pub fn add_timer(&mut self, period: Duration, callback: TimerCallback<T>) -> TimerId {
        let entry = TimerEntry {
            period,
            callback,
            generation: 0,
            armed: true,
        };
        let slot = match self.free_timers.pop() {
            Some(slot) => {
                self.timers[slot] = Some(entry);
                slot
            }
            None => {
                self.timers.push(Some(entry));
                self.timers.len() - 1
            }
        };
        self.heap
            .push(Reverse((Instant::now() + period, slot, 0)));
        TimerId(slot)
    }

    pub fn remove_timer(&mut self, id: TimerId) {
        if let Some(entry) = self.timers.get_mut(id.0) {
            if entry.take().is_some() {
                self.free_timers.push(id.0);
            }
        }
    }

    /// Disarm or re-arm; re-arming schedules one period from now.
    pub fn set_timer_armed(&mut self, id: TimerId, armed: bool) {
        if let Some(Some(entry)) = self.timers.get_mut(id.0) {
            if armed && !entry.armed {
                entry.generation += 1;
                let deadline = Instant::now() + entry.period;
                self.heap.push(Reverse((deadline, id.0, entry.generation)));
            }
            if !armed {
                entry.generation += 1;
            }
            entry.armed = armed;
        }
    }

    /// Change the period; takes effect from the next (re)arm.
    pub fn set_timer_period(&mut self, id: TimerId, period: Duration) {
        if let Some(Some(entry)) = self.timers.get_mut(id.0) {
            entry.period = period;
        }
    }

    fn next_deadline(&mut self) -> Option<Instant> {
        // Drop stale heap entries first.
        while let Some(Reverse((deadline, slot, generation))) = self.heap.peek().copied() {
            match self.timers.get(slot).and_then(|t| t.as_ref()) {
                Some(entry) if entry.armed && entry.generation == generation => {
                    return Some(deadline);
                }
                _ => {
                    self.heap.pop();
                }
            }
        }
        None
    }

    fn run_due_timers(&mut self, ctx: &mut T) {
        let now = Instant::now();
        loop {
            let due = match self.heap.peek() {
                Some(&Reverse((deadline, _, _))) if deadline <= now => self.heap.pop(),
                _ => break,
            };
            let Reverse((_, slot, generation)) = match due {
                Some(d) => d,
                None => break,
            };
            let fire = matches!(
                self.timers.get(slot).and_then(|t| t.as_ref()),
                Some(entry) if entry.armed && entry.generation == generation
            );
            if !fire {
                continue;
            }
            // Run the handler with the entry temporarily detached so
            // it may add or remove timers itself.
            let mut entry = match self.timers[slot].take() {
                Some(entry) => entry,
                None => continue,
            };
            let again = (entry.callback)(ctx);
            if again {
                // Reschedule at `period` from now, not from the
                // missed deadline.
                entry.generation += 1;
                self.heap
                    .push(Reverse((Instant::now() + entry.period, slot, entry.generation)));
            } else {
                entry.armed = false;
            }
            if self.timers[slot].is_none() {
                self.timers[slot] = Some(entry);
            }
        }
    }

    /// One pass: wait for fds or the next timer, dispatch, then tick.
    pub fn run_once(&mut self, ctx: &mut T) -> io::Result<()> {
        let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(self.fds.len());
        let mut slots: Vec<usize> = Vec::with_capacity(self.fds.len());
        for (slot, entry) in self.fds.iter().enumerate() {
            if let Some(entry) = entry {
                if entry.enabled {
                    pollfds.push(libc::pollfd {
                        fd: entry.fd,
                        events: entry.events,
                        revents: 0,
                    });
                    slots.push(slot);
                }
            }
        }

        let timeout = match self.next_deadline() {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    0
                } else {
                    deadline
                        .duration_since(now)
                        .as_millis()
                        .min(i32::MAX as u128) as i32
                }
            }
            None => -1,
        };
        // Nothing to wait on: don't block forever.
        let timeout = if pollfds.is_empty() && timeout < 0 {
            0
        } else {
            timeout
        };

        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        if rc > 0 {
            for (pfd, &slot) in pollfds.iter().zip(&slots) {
                if pfd.revents == 0 {
                    continue;
                }
                // Detach the callback so it can mutate the poller.
                if let Some(mut entry) = self.fds.get_mut(slot).and_then(|e| e.take()) {
                    (entry.callback)(ctx, pfd.revents);
                    if let Some(holder) = self.fds.get_mut(slot) {
                        if holder.is_none() {
                            *holder = Some(entry);
                        }
                    }
                }
            }
        }

        self.run_due_timers(ctx);

        if let Some(mut tick) = self.tick.take() {
            tick(ctx);
            if self.tick.is_none() {
                self.tick = Some(tick);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timer_fires_and_reschedules() {
        let mut poller: Poller<Vec<u32>> = Poller::new();
        poller.add_timer(
            Duration::from_millis(1),
            Box::new(|fired: &mut Vec<u32>| {
                fired.push(1);
                fired.len() < 3
            }),
        );
        let mut fired = Vec::new();
        for _ in 0..20 {
            poller.run_once(&mut fired).unwrap();
            if fired.len() >= 3 {
                break;
            }
        }
        assert_eq!(fired.len(), 3);
    }

    #[test]
    fn disarmed_timer_does_not_fire() {
        let mut poller: Poller<Vec<u32>> = Poller::new();
        let id = poller.add_timer(
            Duration::from_millis(1),
            Box::new(|fired: &mut Vec<u32>| {
                fired.push(1);
                true
            }),
        );
        poller.set_timer_armed(id, false);
        let mut fired = Vec::new();
        std::thread::sleep(Duration::from_millis(3));
        poller.run_once(&mut fired).unwrap();
        assert!(fired.is_empty());
    }

    #[test]
    fn fd_readiness_dispatches() {
        use std::io::Write as _;
        use std::os::unix::io::AsRawFd;
        use std::os::unix::net::UnixStream;

        let (mut a, b) = UnixStream::pair().unwrap();
        let mut poller: Poller<Vec<i16>> = Poller::new();
        poller.add_fd(
            b.as_raw_fd(),
            libc::POLLIN,
            Box::new(|seen: &mut Vec<i16>, revents| {
                seen.push(revents);
            }),
        );
        a.write_all(b"x").unwrap();
        let mut seen = Vec::new();
        poller.run_once(&mut seen).unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0] & libc::POLLIN != 0);
    }

    #[test]
    fn fd_slots_are_reused() {
        let mut poller: Poller<()> = Poller::new();
        let a = poller.add_fd(0, libc::POLLIN, Box::new(|_, _| {}));
        poller.remove_fd(a);
        let b = poller.add_fd(1, libc::POLLIN, Box::new(|_, _| {}));
        assert_eq!(a, b);
    }
}
