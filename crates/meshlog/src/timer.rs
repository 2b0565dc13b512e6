// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timer scheduling
//!
//! Engines never hold callbacks. They schedule a [`Timer`] tag through a
//! [`Scheduler`], and the application hands expired tags back through the
//! engine's `on_timer()`.
//!
//! [`VirtualScheduler`] is a deterministic implementation driven by an
//! explicit clock, used by tests and the simulator.

use crate::error::{Error, Result};

/// Timer identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Server: take one sample
    Sample,
    /// Server: send the log
    Report,
    /// Server: transmission stalled
    SendTimeout,
    /// Server: release the next counter-mode segment
    SegmentPacing,
    /// Client: reception stalled
    ReceiveTimeout,
    /// Client: send queued status responses
    Response,
}

/// Timer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Fires once
    OneShot,
    /// Fires every interval until cancelled
    Periodic,
}

/// Handle to a scheduled timer
///
/// Handles are invalidated by cancel and by one-shot expiry; operations on
/// a stale handle never touch a newer timer reusing the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    slot: u16,
    generation: u32,
}

/// Timer service
pub trait Scheduler {
    /// Start a timer
    fn schedule(&mut self, timer: Timer, interval_ms: u32, mode: TimerMode) -> Result<TimerHandle>;

    /// Stop a timer (no-op on stale handles)
    fn cancel(&mut self, handle: TimerHandle) -> Result<()>;

    /// Change the interval; the next expiry is `interval_ms` from now
    fn reschedule(&mut self, handle: TimerHandle, interval_ms: u32) -> Result<()>;

    /// Check whether the timer is still pending
    fn is_running(&self, handle: TimerHandle) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    timer: Timer,
    mode: TimerMode,
    interval_ms: u32,
    deadline: u64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    pending: Option<Pending>,
}

/// Virtual-clock scheduler with `SLOTS` concurrent timers
#[derive(Debug)]
pub struct VirtualScheduler<const SLOTS: usize> {
    slots: [Slot; SLOTS],
    now: u64,
}

impl<const SLOTS: usize> VirtualScheduler<SLOTS> {
    /// Create a scheduler at time 0
    pub const fn new() -> Self {
        Self {
            slots: [Slot {
                generation: 0,
                pending: None,
            }; SLOTS],
            now: 0,
        }
    }

    /// Current virtual time (ms)
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Move the clock forward (never backward)
    pub fn advance_to(&mut self, now: u64) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Move the clock forward by `ms`
    pub fn advance(&mut self, ms: u64) {
        self.now = self.now.saturating_add(ms);
    }

    /// Pop the earliest due timer
    ///
    /// Periodic timers are re-armed one interval after their previous
    /// deadline, so their phase is kept even when polled late.
    pub fn poll(&mut self) -> Option<Timer> {
        let index = self.earliest()?;
        let slot = &mut self.slots[index];
        let pending = slot.pending?;

        if pending.deadline > self.now {
            return None;
        }

        match pending.mode {
            TimerMode::Periodic => {
                slot.pending = Some(Pending {
                    deadline: pending.deadline + u64::from(pending.interval_ms),
                    ..pending
                });
            }
            TimerMode::OneShot => {
                slot.pending = None;
                slot.generation = slot.generation.wrapping_add(1);
            }
        }

        Some(pending.timer)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.earliest()
            .and_then(|i| self.slots[i].pending)
            .map(|p| p.deadline)
    }

    /// Deadline of a pending timer
    pub fn deadline(&self, handle: TimerHandle) -> Option<u64> {
        self.live(handle).map(|p| p.deadline)
    }

    /// Number of pending timers
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.pending.is_some()).count()
    }

    fn earliest(&self) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(p) = slot.pending {
                match best {
                    Some((_, deadline)) if deadline <= p.deadline => {}
                    _ => best = Some((i, p.deadline)),
                }
            }
        }
        best.map(|(i, _)| i)
    }

    fn live(&self, handle: TimerHandle) -> Option<Pending> {
        let slot = self.slots.get(usize::from(handle.slot))?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.pending
    }
}

impl<const SLOTS: usize> Default for VirtualScheduler<SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SLOTS: usize> Scheduler for VirtualScheduler<SLOTS> {
    fn schedule(&mut self, timer: Timer, interval_ms: u32, mode: TimerMode) -> Result<TimerHandle> {
        if mode == TimerMode::Periodic && interval_ms == 0 {
            return Err(Error::InvalidParameter);
        }

        let index = self
            .slots
            .iter()
            .position(|s| s.pending.is_none())
            .ok_or(Error::Timer)?;
        let slot_id = u16::try_from(index).map_err(|_| Error::Timer)?;

        let slot = &mut self.slots[index];
        slot.pending = Some(Pending {
            timer,
            mode,
            interval_ms,
            deadline: self.now + u64::from(interval_ms),
        });

        Ok(TimerHandle {
            slot: slot_id,
            generation: slot.generation,
        })
    }

    fn cancel(&mut self, handle: TimerHandle) -> Result<()> {
        if self.live(handle).is_some() {
            let slot = &mut self.slots[usize::from(handle.slot)];
            slot.pending = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
        Ok(())
    }

    fn reschedule(&mut self, handle: TimerHandle, interval_ms: u32) -> Result<()> {
        let pending = self.live(handle).ok_or(Error::Timer)?;
        if pending.mode == TimerMode::Periodic && interval_ms == 0 {
            return Err(Error::InvalidParameter);
        }

        self.slots[usize::from(handle.slot)].pending = Some(Pending {
            interval_ms,
            deadline: self.now + u64::from(interval_ms),
            ..pending
        });
        Ok(())
    }

    fn is_running(&self, handle: TimerHandle) -> bool {
        self.live(handle).is_some()
    }
}
