use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Point in time in nanoseconds since the Unix epoch, the unit of MCAP log
/// and publish times.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub timestamp: u64,
}

impl Timestamp {
    #[inline]
    pub const fn new(timestamp: u64) -> Self {
        Self { timestamp }
    }

    /// Wall-clock time, truncated to the nanosecond.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::new(elapsed.as_nanos().min(u64::MAX as u128) as u64)
    }

    /// Parses decimal seconds since the epoch such as `1700000000.25`.
    ///
    /// Digits are read exactly, never through `f64`. Up to nine fractional
    /// digits are accepted; anything longer, signed or out of range is `None`.
    pub fn from_decimal_secs(s: &str) -> Option<Self> {
        let (sec, frac) = s.split_once('.').unwrap_or((s, ""));
        if (sec.is_empty() && frac.is_empty()) || frac.len() > 9 {
            return None;
        }
        if !sec.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let sec: u64 = if sec.is_empty() { 0 } else { sec.parse().ok()? };
        let nsec: u64 = format!("{:0<9}", frac).parse().ok()?;
        sec.checked_mul(NANOS_PER_SEC)?
            .checked_add(nsec)
            .map(Self::new)
    }

    /// Is self before other
    #[inline]
    pub fn is_before(&self, other: &Self) -> bool {
        self.timestamp < other.timestamp
    }

    /// Splits into whole seconds and the nanosecond remainder.
    #[inline]
    pub fn get_sec_nsec(&self) -> (u64, u32) {
        let sec = self.timestamp / NANOS_PER_SEC;
        let nsec = self.timestamp - sec * NANOS_PER_SEC;
        (sec, nsec as u32)
    }

    /// Shifts by `offset`, or `None` when the result leaves the `u64` range.
    #[inline]
    pub fn checked_shift(&self, offset: TimeOffset) -> Option<Self> {
        let shifted = self.timestamp as i128 + offset.nanoseconds as i128;
        u64::try_from(shifted).ok().map(Self::new)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sec, nsec) = self.get_sec_nsec();
        write!(f, "{}.{:09}", sec, nsec)
    }
}

/// Signed distance between two [`Timestamp`]s, in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOffset {
    pub nanoseconds: i64,
}

impl TimeOffset {
    #[inline]
    pub const fn new(nanoseconds: i64) -> Self {
        Self { nanoseconds }
    }

    /// `target - start + jitter`: the shift that moves `start` onto `target`,
    /// nudged forward by `jitter`.
    pub fn rebase(target: Timestamp, start: Timestamp, jitter: Duration) -> Option<Self> {
        let nanoseconds =
            target.timestamp as i128 - start.timestamp as i128 + jitter.as_nanos() as i128;
        i64::try_from(nanoseconds).ok().map(Self::new)
    }
}

impl fmt::Display for TimeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.nanoseconds < 0 { "-" } else { "+" };
        let abs = self.nanoseconds.unsigned_abs();
        write!(
            f,
            "{}{}.{:09}",
            sign,
            abs / NANOS_PER_SEC,
            abs % NANOS_PER_SEC
        )
    }
}

#[test]
fn sec_nsec_split() {
    let t = Timestamp::new(1748443589084976896);
    assert_eq!(t.get_sec_nsec(), (1748443589, 84976896));
    assert_eq!(t.to_string(), "1748443589.084976896");
}

#[test]
fn decimal_secs_are_exact() {
    assert_eq!(
        Timestamp::from_decimal_secs("1700000000.25"),
        Some(Timestamp::new(1_700_000_000_250_000_000))
    );
    assert_eq!(
        Timestamp::from_decimal_secs("1748443589.084976896"),
        Some(Timestamp::new(1748443589084976896))
    );
    assert_eq!(Timestamp::from_decimal_secs("42"), Some(Timestamp::new(42 * NANOS_PER_SEC)));
    assert_eq!(Timestamp::from_decimal_secs(".5"), Some(Timestamp::new(500_000_000)));
    assert_eq!(Timestamp::from_decimal_secs("1.0000000001"), None);
    assert_eq!(Timestamp::from_decimal_secs("-1"), None);
    assert_eq!(Timestamp::from_decimal_secs("1e9"), None);
    assert_eq!(Timestamp::from_decimal_secs("."), None);
    assert_eq!(Timestamp::from_decimal_secs(""), None);
    assert_eq!(Timestamp::from_decimal_secs("18446744074"), None);
}

#[test]
fn rebase_offset_moves_start_onto_target() {
    let start = Timestamp::new(1_000);
    let target = Timestamp::new(100);
    let offset = TimeOffset::rebase(target, start, Duration::ZERO).unwrap();
    assert_eq!(offset, TimeOffset::new(-900));
    assert_eq!(start.checked_shift(offset), Some(target));

    let jittered = TimeOffset::rebase(target, start, Duration::from_nanos(7)).unwrap();
    assert_eq!(start.checked_shift(jittered), Some(Timestamp::new(107)));
    assert_eq!(jittered.to_string(), "-0.000000893");
}

#[test]
fn shift_out_of_range_is_none() {
    assert_eq!(Timestamp::new(5).checked_shift(TimeOffset::new(-6)), None);
    assert_eq!(
        Timestamp::new(u64::MAX).checked_shift(TimeOffset::new(1)),
        None
    );
}
