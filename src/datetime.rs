//! Module containing functionality related to BSON datetimes.

use std::{
    fmt::{self, Display},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use time::format_description::well_known::Rfc3339;

/// Struct representing a BSON datetime: a signed 64-bit count of milliseconds
/// since the Unix epoch. Note: BSON datetimes have millisecond precision.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone)]
pub struct DateTime(i64);

impl DateTime {
    /// The latest possible date that can be represented in BSON.
    pub const MAX: Self = Self::from_millis(i64::MAX);

    /// The earliest possible date that can be represented in BSON.
    pub const MIN: Self = Self::from_millis(i64::MIN);

    /// Makes a new [`DateTime`] from the number of non-leap milliseconds since
    /// January 1, 1970 0:00:00 UTC (aka "UNIX timestamp").
    pub const fn from_millis(date: i64) -> Self {
        Self(date)
    }

    /// Returns a [`DateTime`] which corresponds to the current date and time.
    pub fn now() -> DateTime {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert the given [`std::time::SystemTime`] to a [`DateTime`].
    ///
    /// If the provided time is too far in the future or too far in the past to
    /// be represented by a BSON datetime, either [`DateTime::MAX`] or
    /// [`DateTime::MIN`] will be returned, whichever is closer.
    pub fn from_system_time(st: SystemTime) -> Self {
        match st.duration_since(UNIX_EPOCH) {
            Ok(d) => {
                if d.as_millis() <= i64::MAX as u128 {
                    Self::from_millis(d.as_millis() as i64)
                } else {
                    Self::MAX
                }
            }
            // handle SystemTime from before the Unix epoch
            Err(e) => {
                let millis = e.duration().as_millis();
                if millis > i64::MAX as u128 {
                    Self::MIN
                } else {
                    Self::from_millis(-(millis as i64))
                }
            }
        }
    }

    /// Convert this [`DateTime`] to a [`std::time::SystemTime`].
    pub fn to_system_time(self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_millis(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(self.0.unsigned_abs())
        }
    }

    /// Returns the number of non-leap milliseconds since January 1, 1970 UTC
    /// that this [`DateTime`] represents.
    pub const fn timestamp_millis(self) -> i64 {
        self.0
    }

    /// Convert this [`DateTime`] to an RFC 3339 formatted string.
    pub fn try_to_rfc3339_string(self) -> Option<String> {
        self.to_time_0_3()
            .and_then(|odt| odt.format(&Rfc3339).ok())
    }

    /// Convert the given RFC 3339 formatted string to a [`DateTime`],
    /// truncating it to millisecond precision.
    pub fn parse_rfc3339_str(s: impl AsRef<str>) -> Option<Self> {
        let odt = time::OffsetDateTime::parse(s.as_ref(), &Rfc3339).ok()?;
        Some(Self::from_time_0_3(odt))
    }

    fn to_time_0_3(self) -> Option<time::OffsetDateTime> {
        time::OffsetDateTime::from_unix_timestamp_nanos(self.0 as i128 * 1_000_000).ok()
    }

    fn from_time_0_3(odt: time::OffsetDateTime) -> Self {
        Self::from_millis((odt.unix_timestamp_nanos() / 1_000_000) as i64)
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut tup = f.debug_tuple("DateTime");
        match self.try_to_rfc3339_string() {
            Some(s) => tup.field(&s),
            None => tup.field(&self.0),
        };
        tup.finish()
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_to_rfc3339_string() {
            Some(s) => f.write_str(&s),
            None => write!(f, "{} ms", self.0),
        }
    }
}

impl From<SystemTime> for DateTime {
    fn from(st: SystemTime) -> Self {
        Self::from_system_time(st)
    }
}

impl From<DateTime> for SystemTime {
    fn from(dt: DateTime) -> Self {
        dt.to_system_time()
    }
}
