use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use utoipa::ToSchema;

use super::{canonical_timestamp, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl IntervalUnit {
    pub const ALL: [IntervalUnit; 5] = [
        IntervalUnit::Minute,
        IntervalUnit::Hour,
        IntervalUnit::Day,
        IntervalUnit::Month,
        IntervalUnit::Year,
    ];

    /// Suffix used by the request token, e.g. the `h` in `6h`
    pub fn suffix(&self) -> &'static str {
        match self {
            IntervalUnit::Minute => "min",
            IntervalUnit::Hour => "h",
            IntervalUnit::Day => "day",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }

    /// Strides the dashboard offers for this unit
    pub fn supported_strides(&self) -> &'static [u32] {
        match self {
            IntervalUnit::Minute => &[1, 5, 15],
            IntervalUnit::Hour => &[1, 2, 3, 4, 6, 12],
            IntervalUnit::Day => &[1, 7],
            IntervalUnit::Month => &[1, 6],
            IntervalUnit::Year => &[1],
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|unit| unit.suffix() == suffix)
    }
}

/// A sampling interval as requested, e.g. `15min` or `6h`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub unit: IntervalUnit,
    pub stride: u32,
}

impl Interval {
    pub fn new(unit: IntervalUnit, stride: u32) -> Result<Self, Error> {
        if stride == 0 {
            return Err(Error::InvalidInterval(String::from(
                "no interval selected (stride is 0)",
            )));
        }
        if !unit.supported_strides().contains(&stride) {
            return Err(Error::InvalidInterval(format!(
                "unsupported stride {} for unit {}",
                stride,
                unit.suffix()
            )));
        }
        Ok(Self { unit, stride })
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let digits_end = token
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(token.len());
        let (digits, suffix) = token.split_at(digits_end);

        if digits.is_empty() {
            return Err(Error::InvalidInterval(format!(
                "interval '{}' has no stride",
                token
            )));
        }
        // "0", "0h", "05min": the dashboard sends a zero-prefixed value when nothing is selected
        if digits.starts_with('0') {
            return Err(Error::InvalidInterval(format!(
                "no interval selected ('{}')",
                token
            )));
        }
        let stride: u32 = digits
            .parse()
            .map_err(|_| Error::InvalidInterval(format!("invalid stride in '{}'", token)))?;
        let unit = IntervalUnit::from_suffix(suffix)
            .ok_or_else(|| Error::InvalidInterval(format!("unknown interval unit in '{}'", token)))?;

        Interval::new(unit, stride)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stride, self.unit.suffix())
    }
}

/// An interval anchored at the start of the requested range.
///
/// A timestamp is on the grid when every field finer than the unit matches the
/// anchor exactly and the distance from the anchor, counted in the unit, is a
/// multiple of the stride. The anchor itself is always on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSpec {
    pub interval: Interval,
    pub anchor: PrimitiveDateTime,
}

impl IntervalSpec {
    pub fn new(interval: Interval, anchor: PrimitiveDateTime) -> Self {
        Self { interval, anchor }
    }

    pub fn unit(&self) -> IntervalUnit {
        self.interval.unit
    }

    pub fn stride(&self) -> u32 {
        self.interval.stride
    }

    pub fn contains(&self, timestamp: PrimitiveDateTime) -> bool {
        let anchor = self.anchor;
        if timestamp == anchor {
            return true;
        }

        let same_second = timestamp.second() == anchor.second();
        let same_minute = same_second && timestamp.minute() == anchor.minute();
        let same_time = same_minute && timestamp.hour() == anchor.hour();
        let same_day = same_time && timestamp.day() == anchor.day();
        let same_month = same_day && timestamp.month() == anchor.month();

        match self.unit() {
            IntervalUnit::Minute => {
                same_second
                    && self.on_stride(i64::from(timestamp.minute()) - i64::from(anchor.minute()))
            }
            IntervalUnit::Hour => {
                same_minute
                    && self.on_stride(i64::from(timestamp.hour()) - i64::from(anchor.hour()))
            }
            IntervalUnit::Day => {
                same_time && self.on_stride((timestamp.date() - anchor.date()).whole_days())
            }
            IntervalUnit::Month => {
                let months = (i64::from(timestamp.year()) - i64::from(anchor.year())) * 12
                    + (i64::from(u8::from(timestamp.month())) - i64::from(u8::from(anchor.month())));
                same_day && self.on_stride(months)
            }
            IntervalUnit::Year => {
                same_month
                    && self.on_stride(i64::from(timestamp.year()) - i64::from(anchor.year()))
            }
        }
    }

    fn on_stride(&self, distance: i64) -> bool {
        distance % i64::from(self.stride()) == 0
    }

    /// DuckDB boolean expression equivalent to [`IntervalSpec::contains`] over a
    /// `YYYY-MM-DD HH:MM:SS` text column.
    ///
    /// Only integers and the anchor's own canonical rendering are written into
    /// the text; the range bounds are bound separately.
    pub fn sql_predicate(&self, column: &str) -> String {
        let ts = format!("CAST({} AS TIMESTAMP)", column);
        let anchor = self.anchor;
        let stride = self.stride();

        let second = format!("second({}) = {}", ts, anchor.second());
        let minute = format!("minute({}) = {}", ts, anchor.minute());
        let hour = format!("hour({}) = {}", ts, anchor.hour());
        let day = format!("day({}) = {}", ts, anchor.day());
        let month = format!("month({}) = {}", ts, u8::from(anchor.month()));

        let mut conditions: Vec<String> = match self.unit() {
            IntervalUnit::Minute => vec![second],
            IntervalUnit::Hour => vec![minute, second],
            IntervalUnit::Day => vec![hour, minute, second],
            IntervalUnit::Month => vec![day, hour, minute, second],
            IntervalUnit::Year => vec![month, day, hour, minute, second],
        };

        let distance = match self.unit() {
            IntervalUnit::Minute => format!("(minute({}) - {})", ts, anchor.minute()),
            IntervalUnit::Hour => format!("(hour({}) - {})", ts, anchor.hour()),
            IntervalUnit::Day => format!(
                "date_diff('day', DATE '{}', CAST({} AS DATE))",
                anchor.date(),
                ts
            ),
            IntervalUnit::Month => format!(
                "((year({ts}) - {}) * 12 + (month({ts}) - {}))",
                anchor.year(),
                u8::from(anchor.month()),
                ts = ts
            ),
            IntervalUnit::Year => format!("(year({}) - {})", ts, anchor.year()),
        };
        conditions.push(format!("{} % {} = 0", distance, stride));

        format!(
            "(({}) OR {} = TIMESTAMP '{}')",
            conditions.join(" AND "),
            ts,
            canonical_timestamp(anchor)
        )
    }
}
