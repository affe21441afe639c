#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timestamp overflow")]
pub struct TimestampOverflow;

/// A timestamp representing the presentation time of a video frame in microseconds.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
	/// The maximum representable timestamp.
	pub const MAX: Self = Self(u64::MAX);

	pub const fn from_micros(micros: u64) -> Self {
		Self(micros)
	}

	/// Convert a value expressed in `timescale` units per second, rounding down.
	pub fn from_scale(value: u64, timescale: u64) -> Result<Self, TimestampOverflow> {
		if timescale == 0 {
			return Err(TimestampOverflow);
		}

		let micros = value as u128 * 1_000_000 / timescale as u128;
		u64::try_from(micros).map(Self).map_err(|_| TimestampOverflow)
	}

	/// Get the timestamp as microseconds.
	pub const fn as_micros(self) -> u64 {
		self.0
	}

	/// Get the timestamp as fractional seconds.
	pub fn as_secs_f64(self) -> f64 {
		self.0 as f64 / 1_000_000.0
	}

	pub fn checked_add(self, rhs: Self) -> Option<Self> {
		self.0.checked_add(rhs.0).map(Self)
	}
}

impl std::fmt::Debug for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}µs", self.0)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}µs", self.0)
	}
}
