/// Simulation time in picoseconds.
///
/// Backends report time as a 64-bit count split into two 32-bit halves
/// so that it can cross a plain-data boundary regardless of the native
/// engine's precision. `SimTime` is the host-side view of that count.

/// A point in simulation time, counted in picoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(u64);

impl SimTime {
    /// The start of simulation.
    pub const ZERO: SimTime = SimTime(0);

    /// Create a `SimTime` from a picosecond count.
    #[inline]
    pub fn from_ps(ps: u64) -> Self {
        SimTime(ps)
    }

    /// Return the picosecond count.
    #[inline]
    pub fn as_ps(self) -> u64 {
        self.0
    }

    /// Rebuild a time from the `(high, low)` halves reported by a backend.
    #[inline]
    pub fn from_parts(high: u32, low: u32) -> Self {
        SimTime(((high as u64) << 32) | low as u64)
    }

    /// Split into `(high, low)` 32-bit halves.
    #[inline]
    pub fn split(self) -> (u32, u32) {
        ((self.0 >> 32) as u32, self.0 as u32)
    }

    /// The time `delay_ps` after `self`, or `None` on overflow.
    #[inline]
    pub fn plus(self, delay_ps: u64) -> Option<SimTime> {
        self.0.checked_add(delay_ps).map(SimTime)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ps", self.0)
    }
}
