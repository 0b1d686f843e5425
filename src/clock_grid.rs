/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! Quantises wall-clock instants onto the packet-period grid and keeps
//! ticks strictly monotonic (spec.md §4.2).

use crate::wire::WireTime;

/// Quantises instants to a fixed period, applying a constant correction
/// offset and enforcing strict monotonicity between successive ticks.
#[derive(Debug, Clone)]
pub struct ClockGrid {
    period_ns: i64,
    /// Nanosecond correction subtracted before quantising, added back
    /// after: used by the receiver to align the grid to the point where
    /// decoded audio must reach the device, `delay2` in spec.md §4.2.
    correction_ns: i64,
    last_tick: Option<WireTime>,
}

impl ClockGrid {
    pub fn new(period_ns: i64, correction_ns: i64) -> ClockGrid {
        ClockGrid {
            period_ns,
            correction_ns,
            last_tick: None,
        }
    }

    /// Rounds `t` down to the nearest grid line, then applies the
    /// correction. Used by the sender, which truncates down rather than
    /// advancing (spec.md §4.5 step 4).
    pub fn quantise_down(&self, t: WireTime) -> WireTime {
        let nsec = (t.tv_nsec as i64 / self.period_ns) * self.period_ns;
        WireTime {
            tv_sec: t.tv_sec,
            tv_nsec: nsec as u32,
        }
    }

    /// Produces the next grid-aligned instant strictly after `t`,
    /// shifted by `correction_ns` (spec.md §4.2). Used by the receiver.
    pub fn next_tick_after(&mut self, t: WireTime) -> WireTime {
        let shifted = t.add_nanos(-self.correction_ns);
        let floor_nsec = (shifted.tv_nsec as i64 / self.period_ns) * self.period_ns;
        let mut candidate = WireTime {
            tv_sec: shifted.tv_sec,
            tv_nsec: floor_nsec as u32,
        }
        .add_nanos(self.period_ns);

        if let Some(last) = self.last_tick {
            let last_shifted = last; // stored already in shifted (pre-correction) space
            while candidate <= last_shifted {
                candidate = candidate.add_nanos(self.period_ns);
            }
        }
        self.last_tick = Some(candidate);
        candidate.add_nanos(self.correction_ns)
    }

    pub fn period_ns(&self) -> i64 {
        self.period_ns
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quantise_down_truncates_to_period() {
        let grid = ClockGrid::new(20_000_000, 0);
        let t = WireTime {
            tv_sec: 5,
            tv_nsec: 45_000_000,
        };
        let q = grid.quantise_down(t);
        assert_eq!(q.tv_nsec, 40_000_000);
    }

    #[test]
    fn next_tick_is_strictly_monotonic() {
        let mut grid = ClockGrid::new(20_000_000, 0);
        let base = WireTime {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let first = grid.next_tick_after(base);
        let second = grid.next_tick_after(base);
        assert!(second > first);
        assert_eq!((second.as_nanos_i128() - first.as_nanos_i128()) % 20_000_000, 0);
    }

    #[test]
    fn next_tick_applies_correction_to_output_not_grid_comparison() {
        let mut grid = ClockGrid::new(20_000_000, 5_000_000);
        let base = WireTime {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let tick = grid.next_tick_after(base);
        // shifted-space tick (tick - correction) must land on the grid.
        let unshifted = tick.add_nanos(-5_000_000);
        assert_eq!(unshifted.tv_nsec % 20_000_000, 0);
    }
}
