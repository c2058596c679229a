//! Tick-time primitives for the cooperative node loop.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     outer loop (runtime)                     │
//! │                                                              │
//! │   clock.now() ──▶ Instant ──▶ NodeService::tick(now)         │
//! │                                 │                            │
//! │         ┌───────────────────────┼────────────────────┐       │
//! │         ▼                       ▼                    ▼       │
//! │   allocation deadline    firmware retry      PeriodicTimer   │
//! │   (Millis, jittered)     (Millis, 750 ms)    (1 Hz group)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every deadline is a wrapping 32-bit millisecond counter. Comparisons go
//! through [`Millis::elapsed_since`] and [`Millis::is_before`], which stay
//! correct across the ~49.7 day wrap as long as the two instants are less
//! than 2³¹ ms apart.

use log::trace;

// ═══════════════════════════════════════════════════════════════
//  Wrapping milliseconds
// ═══════════════════════════════════════════════════════════════

/// A point on the wrapping millisecond counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Millis(pub u32);

impl Millis {
    /// Milliseconds from `earlier` to `self`, modulo 2³².
    pub const fn elapsed_since(self, earlier: Millis) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// `true` while `self` has not yet reached `deadline`.
    pub const fn is_before(self, deadline: Millis) -> bool {
        (self.0.wrapping_sub(deadline.0) as i32) < 0
    }

    #[must_use]
    pub const fn add(self, ms: u32) -> Millis {
        Millis(self.0.wrapping_add(ms))
    }

    #[must_use]
    pub const fn sub(self, ms: u32) -> Millis {
        Millis(self.0.wrapping_sub(ms))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Monotonic instant
// ═══════════════════════════════════════════════════════════════

/// Monotonic time since boot, as read from the platform clock once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Instant {
    micros: u64,
}

impl Instant {
    pub const fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self {
            micros: ms.saturating_mul(1_000),
        }
    }

    pub const fn as_micros(self) -> u64 {
        self.micros
    }

    /// The wrapping millisecond view used for deadlines.
    pub const fn millis(self) -> Millis {
        Millis((self.micros / 1_000) as u32)
    }

    /// Whole seconds since boot, saturating at `u32::MAX`.
    pub fn uptime_secs(self) -> u32 {
        u32::try_from(self.micros / 1_000_000).unwrap_or(u32::MAX)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Periodic timer
// ═══════════════════════════════════════════════════════════════

/// Fires at most once per `period_ms`.
///
/// The first [`poll`](Self::poll) only arms the reference point, so the
/// first firing happens one full period after the loop starts.
#[derive(Debug, Clone)]
pub struct PeriodicTimer {
    period_ms: u32,
    last_fired: Option<Millis>,
}

impl PeriodicTimer {
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_ms,
            last_fired: None,
        }
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    /// Returns `true` when the period has elapsed, moving the reference
    /// point to `now`.
    pub fn poll(&mut self, now: Millis) -> bool {
        let Some(last) = self.last_fired else {
            self.last_fired = Some(now);
            return false;
        };
        if now.elapsed_since(last) < self.period_ms {
            return false;
        }
        trace!("PeriodicTimer: fired after {} ms", now.elapsed_since(last));
        self.last_fired = Some(now);
        true
    }
}
