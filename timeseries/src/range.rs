//! Map timestamps onto fixed-width, aligned pages of the timeline.
//!
//! Every page covers the half-open range `[from, to)` where `to - from` is exactly one
//! `alignment`. Page boundaries sit on multiples of `alignment`, shifted by `bias`:
//!
//! ```text
//!   bias      bias + a    bias + 2a   bias + 3a
//!    |-----------|-----------|-----------|
//!    [  page 0   )[  page 1  )[  page 2  )
//! ```
//!
//! The end of a page is always derived as `page_from(t) + alignment` and never as the ceiling
//! of `t`. A timestamp sitting exactly on a boundary has equal floor and ceiling, so a ceiling
//! would collapse its page to zero width.
//!
//! Timestamp arithmetic saturates at the ends of the `i64` range, so the first and last page of
//! the timeline are clipped to [i64::MIN] and [i64::MAX] rather than overflowing.

use crate::Error;
use std::{
    fmt,
    ops::{Add, Sub},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Default page width (5 minutes).
pub const DEFAULT_ALIGNMENT: Duration = Duration::from_secs(5 * 60);

/// Convert a [Duration] to milliseconds, saturating at [i64::MAX].
fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// An instant on the timeline, measured in milliseconds since the Unix epoch.
///
/// Signed so that instants before the epoch align the same way as those after it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a [Timestamp] from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Signed distance, in milliseconds, from `earlier` to `self`.
    pub const fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(duration_millis(after)),
            Err(before) => Self(-duration_millis(before.duration())),
        }
    }
}

impl From<Timestamp> for SystemTime {
    fn from(timestamp: Timestamp) -> Self {
        let magnitude = Duration::from_millis(timestamp.0.unsigned_abs());
        if timestamp.0 >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH - magnitude
        }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(duration_millis(rhs)))
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_sub(duration_millis(rhs)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A half-open range of the timeline, `[from, to)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    pub from: Timestamp,
    pub to: Timestamp,
}

impl Range {
    /// Returns true if `timestamp` lies within `[from, to)`.
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.from <= timestamp && timestamp < self.to
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Computes the page that encloses any [Timestamp].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aligner {
    alignment: i64,
    bias: i64,
}

impl Aligner {
    /// Create a new [Aligner].
    ///
    /// Both `alignment` and `bias` are truncated to whole milliseconds. Returns an error if
    /// `alignment` is shorter than a millisecond or if `bias` is not less than `alignment`.
    pub fn new(alignment: Duration, bias: Duration) -> Result<Self, Error> {
        let alignment_ms = duration_millis(alignment);
        if alignment_ms == 0 {
            return Err(Error::InvalidAlignment(alignment));
        }
        let bias_ms = duration_millis(bias);
        if bias_ms >= alignment_ms {
            return Err(Error::InvalidBias { bias, alignment });
        }
        Ok(Self {
            alignment: alignment_ms,
            bias: bias_ms,
        })
    }

    /// Width of every page, in milliseconds.
    pub const fn alignment(&self) -> i64 {
        self.alignment
    }

    /// Offset of page boundaries from multiples of the alignment, in milliseconds.
    pub const fn bias(&self) -> i64 {
        self.bias
    }

    /// Start (inclusive) of the page containing `timestamp`.
    pub fn page_from(&self, timestamp: Timestamp) -> Timestamp {
        self.page_range(timestamp).from
    }

    /// End (exclusive) of the page containing `timestamp`.
    pub fn page_to(&self, timestamp: Timestamp) -> Timestamp {
        self.page_range(timestamp).to
    }

    /// The page containing `timestamp`.
    pub fn page_range(&self, timestamp: Timestamp) -> Range {
        let alignment = i128::from(self.alignment);
        let bias = i128::from(self.bias);
        let from = (i128::from(timestamp.0) - bias).div_euclid(alignment) * alignment + bias;
        Range {
            from: clamp(from),
            to: clamp(from + alignment),
        }
    }
}

/// Clamp an instant computed with headroom back onto the timeline.
fn clamp(millis: i128) -> Timestamp {
    Timestamp(millis.clamp(i64::MIN.into(), i64::MAX.into()) as i64)
}

impl Default for Aligner {
    fn default() -> Self {
        Self {
            alignment: duration_millis(DEFAULT_ALIGNMENT),
            bias: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use test_case::test_case;

    const MINUTE: i64 = 60 * 1000;

    #[test]
    fn test_aligner_default() {
        let aligner = Aligner::default();
        assert_eq!(aligner.alignment(), 5 * MINUTE);
        assert_eq!(aligner.bias(), 0);
        assert_eq!(
            aligner,
            Aligner::new(DEFAULT_ALIGNMENT, Duration::ZERO).unwrap()
        );
    }

    #[test]
    fn test_aligner_rejects_invalid_config() {
        assert!(matches!(
            Aligner::new(Duration::ZERO, Duration::ZERO),
            Err(Error::InvalidAlignment(_))
        ));
        assert!(matches!(
            Aligner::new(Duration::from_micros(999), Duration::ZERO),
            Err(Error::InvalidAlignment(_))
        ));
        assert!(matches!(
            Aligner::new(Duration::from_secs(60), Duration::from_secs(60)),
            Err(Error::InvalidBias { .. })
        ));
        assert!(Aligner::new(Duration::from_secs(60), Duration::from_millis(59_999)).is_ok());
    }

    #[test_case(0, 0, 0; "epoch")]
    #[test_case(1, 0, 0; "just after epoch")]
    #[test_case(5 * MINUTE - 1, 0, 0; "last millisecond of page")]
    #[test_case(5 * MINUTE, 0, 5 * MINUTE; "boundary")]
    #[test_case(-1, 0, -5 * MINUTE; "just before epoch")]
    #[test_case(-5 * MINUTE, 0, -5 * MINUTE; "boundary before epoch")]
    #[test_case(36_999, 37_000, 37_000 - 5 * MINUTE; "before bias")]
    #[test_case(37_000, 37_000, 37_000; "on bias")]
    #[test_case(5 * MINUTE + 37_000, 37_000, 5 * MINUTE + 37_000; "boundary with bias")]
    fn test_page_from(timestamp: i64, bias: i64, expected: i64) {
        let aligner = Aligner::new(
            Duration::from_millis(5 * MINUTE as u64),
            Duration::from_millis(bias as u64),
        )
        .unwrap();
        let timestamp = Timestamp::from_millis(timestamp);
        assert_eq!(aligner.page_from(timestamp), Timestamp::from_millis(expected));
        assert_eq!(
            aligner.page_to(timestamp),
            Timestamp::from_millis(expected + 5 * MINUTE)
        );
    }

    #[test]
    fn test_boundary_range_is_full_width() {
        let aligner = Aligner::new(Duration::from_secs(300), Duration::from_secs(37)).unwrap();
        for page in -3i64..3 {
            let boundary = Timestamp::from_millis(page * 5 * MINUTE + 37_000);
            let range = aligner.page_range(boundary);
            assert_eq!(range.from, boundary);
            assert_eq!(range.to.millis_since(range.from), aligner.alignment());
            assert!(range.contains(boundary));
            assert!(!range.contains(range.to));
        }
    }

    #[test]
    fn test_range_contains_timestamp() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..1_000 {
            let alignment = rng.gen_range(1..=10 * MINUTE);
            let bias = rng.gen_range(0..alignment);
            let aligner = Aligner::new(
                Duration::from_millis(alignment as u64),
                Duration::from_millis(bias as u64),
            )
            .unwrap();
            let timestamp =
                Timestamp::from_millis(rng.gen_range(-1_000_000 * MINUTE..1_000_000 * MINUTE));
            let range = aligner.page_range(timestamp);
            assert!(range.from <= timestamp && timestamp < range.to);
            assert_eq!(range.to.millis_since(range.from), alignment);
            assert_eq!(range.from, aligner.page_from(timestamp));
            assert_eq!(range.to, aligner.page_to(timestamp));

            // Every timestamp in a page maps back to the same page.
            assert_eq!(aligner.page_range(range.from), range);
            let last = Timestamp::from_millis(range.to.as_millis() - 1);
            assert_eq!(aligner.page_range(last), range);
        }
    }

    #[test]
    fn test_aligner_saturates_at_extremes() {
        let aligner = Aligner::new(Duration::from_secs(300), Duration::from_secs(37)).unwrap();

        // Last page ends at the end of the timeline.
        let last = Timestamp::from_millis(i64::MAX - 1);
        let range = aligner.page_range(last);
        assert!(range.contains(last));
        assert_eq!(range.to, Timestamp::from_millis(i64::MAX));
        assert!(range.to.millis_since(range.from) <= aligner.alignment());
        assert_eq!(aligner.page_range(Timestamp::from_millis(i64::MAX)), range);

        // First page starts at the beginning of the timeline.
        let first = Timestamp::from_millis(i64::MIN);
        let range = aligner.page_range(first);
        assert_eq!(range.from, first);
        assert!(range.contains(first));
        assert_eq!(aligner.page_range(range.to - Duration::from_millis(1)), range);

        // Arithmetic clamps instead of wrapping.
        assert_eq!(
            Timestamp::from_millis(i64::MAX) + Duration::from_secs(1),
            Timestamp::from_millis(i64::MAX)
        );
        assert_eq!(
            Timestamp::from_millis(i64::MIN) - Duration::from_secs(1),
            Timestamp::from_millis(i64::MIN)
        );
        assert_eq!(
            Timestamp::from_millis(i64::MAX).millis_since(Timestamp::from_millis(i64::MIN)),
            i64::MAX
        );
    }

    #[test]
    fn test_timestamp_system_time_conversion() {
        let before = UNIX_EPOCH - Duration::from_millis(1_500);
        let after = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(Timestamp::from(before), Timestamp::from_millis(-1_500));
        assert_eq!(Timestamp::from(after), Timestamp::from_millis(1_500));
        assert_eq!(SystemTime::from(Timestamp::from_millis(-1_500)), before);
        assert_eq!(SystemTime::from(Timestamp::from_millis(1_500)), after);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let timestamp = Timestamp::from_millis(10);
        assert_eq!(timestamp + Duration::from_secs(1), Timestamp::from_millis(1_010));
        assert_eq!(timestamp - Duration::from_secs(1), Timestamp::from_millis(-990));
        assert_eq!(Timestamp::from_millis(1_010).millis_since(timestamp), 1_000);
        assert_eq!(timestamp.to_string(), "10ms");
    }
}
