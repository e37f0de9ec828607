//! Compact date/time value used by every record.
//!
//! A [`Moment`] keeps the seven calendar components separately and packs them
//! into the low 58 bits of a `u64` for the event file. Components are masked to
//! their bit width on construction, so a value always survives
//! [`Moment::pack`] / [`Moment::unpack`] unchanged. No calendar validation is
//! performed: a month of 13 is stored as 13.
use std::fmt;

use time::{Date, Month, PrimitiveDateTime, Time};

use crate::error::{Error, Result};

const YEAR_BITS: u32 = 12;
const MONTH_BITS: u32 = 4;
const DAY_BITS: u32 = 5;
const HOUR_BITS: u32 = 5;
const MINUTE_BITS: u32 = 6;
const SECOND_BITS: u32 = 6;
const MICROSECOND_BITS: u32 = 20;

const MONTH_SHIFT: u32 = YEAR_BITS;
const DAY_SHIFT: u32 = MONTH_SHIFT + MONTH_BITS;
const HOUR_SHIFT: u32 = DAY_SHIFT + DAY_BITS;
const MINUTE_SHIFT: u32 = HOUR_SHIFT + HOUR_BITS;
const SECOND_SHIFT: u32 = MINUTE_SHIFT + MINUTE_BITS;
const MICROSECOND_SHIFT: u32 = SECOND_SHIFT + SECOND_BITS;

const fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Moment {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    microsecond: u32,
}

impl Moment {
    pub const fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        microsecond: u32,
    ) -> Self {
        Self {
            year: (year as u64 & mask(YEAR_BITS)) as u16,
            month: (month as u64 & mask(MONTH_BITS)) as u8,
            day: (day as u64 & mask(DAY_BITS)) as u8,
            hour: (hour as u64 & mask(HOUR_BITS)) as u8,
            minute: (minute as u64 & mask(MINUTE_BITS)) as u8,
            second: (second as u64 & mask(SECOND_BITS)) as u8,
            microsecond: (microsecond as u64 & mask(MICROSECOND_BITS)) as u32,
        }
    }

    /// A date-only moment (midnight).
    pub const fn date(year: u16, month: u8, day: u8) -> Self {
        Self::new(year, month, day, 0, 0, 0, 0)
    }

    /// Date components of `self` with the time-of-day components of `time`.
    pub const fn with_time(self, time: Moment) -> Self {
        Self {
            hour: time.hour,
            minute: time.minute,
            second: time.second,
            microsecond: time.microsecond,
            ..self
        }
    }

    /// Date components only, time reset to midnight.
    pub const fn date_only(self) -> Self {
        Self::date(self.year, self.month, self.day)
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    pub fn microsecond(&self) -> u32 {
        self.microsecond
    }

    /// Same-day ordering key: (hour, minute, second, microsecond).
    pub fn time_key(&self) -> (u8, u8, u8, u32) {
        (self.hour, self.minute, self.second, self.microsecond)
    }

    pub fn pack(&self) -> u64 {
        self.year as u64
            | (self.month as u64) << MONTH_SHIFT
            | (self.day as u64) << DAY_SHIFT
            | (self.hour as u64) << HOUR_SHIFT
            | (self.minute as u64) << MINUTE_SHIFT
            | (self.second as u64) << SECOND_SHIFT
            | (self.microsecond as u64) << MICROSECOND_SHIFT
    }

    /// Bits above the 58 used ones are ignored.
    pub fn unpack(bits: u64) -> Self {
        Self {
            year: (bits & mask(YEAR_BITS)) as u16,
            month: (bits >> MONTH_SHIFT & mask(MONTH_BITS)) as u8,
            day: (bits >> DAY_SHIFT & mask(DAY_BITS)) as u8,
            hour: (bits >> HOUR_SHIFT & mask(HOUR_BITS)) as u8,
            minute: (bits >> MINUTE_SHIFT & mask(MINUTE_BITS)) as u8,
            second: (bits >> SECOND_SHIFT & mask(SECOND_BITS)) as u8,
            microsecond: (bits >> MICROSECOND_SHIFT & mask(MICROSECOND_BITS)) as u32,
        }
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.microsecond
        )
    }
}

impl TryFrom<Moment> for PrimitiveDateTime {
    type Error = time::error::ComponentRange;

    fn try_from(m: Moment) -> std::result::Result<Self, Self::Error> {
        let date = Date::from_calendar_date(m.year as i32, Month::try_from(m.month)?, m.day)?;
        let time = Time::from_hms_micro(m.hour, m.minute, m.second, m.microsecond)?;
        Ok(PrimitiveDateTime::new(date, time))
    }
}

fn component<T>(text: &str, range: std::ops::Range<usize>, field: &'static str) -> Result<T>
where
    T: std::str::FromStr,
{
    text.get(range)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::format(field, text))
}

/// Parses `YYYY-MM-DD` into a date-only moment.
pub fn parse_date(text: &str) -> Result<Moment> {
    let text = text.trim();
    Ok(Moment::date(
        component(text, 0..4, "date")?,
        component(text, 5..7, "date")?,
        component(text, 8..10, "date")?,
    ))
}

/// Parses `HH:MM:SS`, `HH:MM:SS.fff` or `HH:MM:SS.ffffff` into a moment with
/// zeroed date components. A six digit fraction is taken as microseconds, any
/// other fraction as milliseconds.
pub fn parse_time(text: &str) -> Result<Moment> {
    let text = text.trim();
    let hour = component(text, 0..2, "time")?;
    let minute = component(text, 3..5, "time")?;
    let second = component(text, 6..8, "time")?;
    let microsecond = if text.len() > 8 {
        let fraction = text.get(9..).unwrap_or_default();
        let value: u32 = fraction.parse().map_err(|_| Error::format("time", text))?;
        if fraction.len() == 6 {
            value
        } else {
            value.checked_mul(1_000).ok_or_else(|| Error::format("time", text))?
        }
    } else {
        0
    };
    Ok(Moment::new(0, 0, 0, hour, minute, second, microsecond))
}

/// Parses `YYYY-MM-DD HH:MM:SS[.fraction]`.
pub fn parse_datetime(text: &str) -> Result<Moment> {
    let text = text.trim();
    let date = parse_date(text.get(..10).ok_or_else(|| Error::format("datetime", text))?)?;
    let time = parse_time(text.get(11..).ok_or_else(|| Error::format("datetime", text))?)?;
    Ok(date.with_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("10:30:00.123456", 123_456)]
    #[case("10:30:00.123", 123_000)]
    #[case("10:30:00", 0)]
    #[case(" 10:30:00.000001 ", 1)]
    fn fraction_scaling(#[case] text: &str, #[case] microsecond: u32) {
        let m = parse_time(text).unwrap();
        assert_eq!(m.time_key(), (10, 30, 0, microsecond));
    }

    #[rstest]
    #[case("1x:30:00")]
    #[case("10:30")]
    #[case("10:30:00.12a")]
    fn malformed_time(#[case] text: &str) {
        assert!(matches!(parse_time(text), Err(Error::Format { field: "time", .. })));
    }

    #[test]
    fn datetime_combines_date_and_time() {
        let m = parse_datetime("2017-05-17 09:01:02").unwrap();
        assert_eq!((m.year(), m.month(), m.day()), (2017, 5, 17));
        assert_eq!(m.time_key(), (9, 1, 2, 0));
        assert_eq!(m.to_string(), "2017-05-17 09:01:02.000000");
    }

    #[test]
    fn pack_layout_is_lsb_first() {
        let m = Moment::new(2017, 5, 17, 10, 30, 59, 999_999);
        let bits = m.pack();
        assert_eq!(bits & 0xfff, 2017);
        assert_eq!(bits >> 12 & 0xf, 5);
        assert_eq!(bits >> 38, 999_999);
        assert_eq!(Moment::unpack(bits), m);
    }

    #[test]
    fn out_of_range_values_are_masked_not_validated() {
        let m = Moment::new(2017, 13, 31, 31, 63, 63, 0);
        assert_eq!(m.month(), 13);
        assert_eq!(Moment::unpack(m.pack()), m);
        assert!(PrimitiveDateTime::try_from(m).is_err());
        assert_eq!(Moment::date(2017, 17, 1).month(), 1);
    }

    #[test]
    fn with_time_keeps_date() {
        let session = parse_date("2017-05-17").unwrap();
        let m = session.with_time(parse_time("10:00:00.5").unwrap());
        assert_eq!(m.day(), 17);
        assert_eq!(m.microsecond(), 5_000);
        assert_eq!(m.date_only(), session);
    }
}
