pub mod frames;
pub mod interval;
pub mod query;
pub mod shards;
pub mod weather_archive;

pub use frames::*;
pub use interval::*;
pub use query::*;
pub use shards::*;
pub use weather_archive::*;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use time::{macros::format_description, PrimitiveDateTime};
use utoipa::ToSchema;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
    #[error("Shard for {year} is unavailable: {reason}")]
    ShardUnavailable { year: i32, reason: String },
    #[error("Failed to query duckdb: {0}")]
    Query(#[from] duckdb::Error),
    #[error("Queries did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Query task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Unexpected result column: {0}")]
    Decode(String),
}

impl Error {
    /// Caller errors are never retried and map to a 400
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::InvalidRequest(_) | Error::InvalidInterval(_))
    }
}

/// Measurement tables present in every yearly shard.
///
/// Table names written into SQL only ever come from this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    WindSpeed,
    WindDirection,
    RelativeHumidity,
    Rainfall,
    AirTemperature,
    WindCombined,
}

impl Measurement {
    pub const ALL: [Measurement; 6] = [
        Measurement::WindSpeed,
        Measurement::WindDirection,
        Measurement::RelativeHumidity,
        Measurement::Rainfall,
        Measurement::AirTemperature,
        Measurement::WindCombined,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Measurement::WindSpeed => "wind_speed",
            Measurement::WindDirection => "wind_direction",
            Measurement::RelativeHumidity => "relative_humidity",
            Measurement::Rainfall => "rainfall",
            Measurement::AirTemperature => "air_temperature",
            Measurement::WindCombined => "wind_combined",
        }
    }

    /// `wind_combined` stores speed/direction/u/v instead of a single value
    pub fn has_wind_components(&self) -> bool {
        matches!(self, Measurement::WindCombined)
    }

    pub fn channel(&self) -> Option<Channel> {
        match self {
            Measurement::WindCombined => Some(Channel::Wind),
            Measurement::AirTemperature => Some(Channel::Temperature),
            Measurement::RelativeHumidity => Some(Channel::Humidity),
            Measurement::Rainfall => Some(Channel::Rainfall),
            Measurement::WindSpeed | Measurement::WindDirection => None,
        }
    }

    /// Parses the comma separated `param` list; `all` expands to every table
    pub fn parse_list(raw: Option<&str>) -> Result<Vec<Measurement>, Error> {
        let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(Self::ALL.to_vec());
        };

        let mut measurements: Vec<Measurement> = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            if name == "all" {
                return Ok(Self::ALL.to_vec());
            }
            let measurement: Measurement = name.parse()?;
            if !measurements.contains(&measurement) {
                measurements.push(measurement);
            }
        }
        if measurements.is_empty() {
            return Ok(Self::ALL.to_vec());
        }
        Ok(measurements)
    }
}

impl FromStr for Measurement {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|measurement| measurement.table_name() == name)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown measurement '{}'", name)))
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Logical layers the map animation draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Wind,
    Temperature,
    Humidity,
    Rainfall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HeatmapMode {
    #[default]
    Snapshot,
    Average,
}

impl FromStr for HeatmapMode {
    type Err = Error;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode.trim() {
            "" | "snapshot" => Ok(HeatmapMode::Snapshot),
            "average" => Ok(HeatmapMode::Average),
            other => Err(Error::InvalidRequest(format!(
                "unknown heatmap mode '{}'",
                other
            ))),
        }
    }
}

/// A validated historical query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub start: PrimitiveDateTime,
    pub end: PrimitiveDateTime,
    /// Absent only in average mode, which never consults the grid
    pub interval: Option<Interval>,
    pub parameters: Vec<Measurement>,
    pub mode: HeatmapMode,
}

impl QueryRequest {
    pub fn snapshot(
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
        interval: Interval,
        parameters: Vec<Measurement>,
    ) -> Result<Self, Error> {
        let request = Self {
            start,
            end,
            interval: Some(interval),
            parameters,
            mode: HeatmapMode::Snapshot,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn average(start: PrimitiveDateTime, end: PrimitiveDateTime) -> Result<Self, Error> {
        let request = Self {
            start,
            end,
            interval: None,
            parameters: vec![Measurement::Rainfall],
            mode: HeatmapMode::Average,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.start > self.end {
            return Err(Error::InvalidRequest(format!(
                "start {} is after end {}",
                canonical_timestamp(self.start),
                canonical_timestamp(self.end)
            )));
        }
        if self.mode == HeatmapMode::Snapshot && self.interval.is_none() {
            return Err(Error::InvalidInterval(String::from(
                "snapshot queries need an interval",
            )));
        }
        if self.parameters.is_empty() {
            return Err(Error::InvalidRequest(String::from(
                "at least one measurement is required",
            )));
        }
        Ok(())
    }

    pub fn interval_spec(&self) -> Option<IntervalSpec> {
        self.interval
            .map(|interval| IntervalSpec::new(interval, self.start))
    }
}

/// Wind vector stored alongside the speed in `wind_combined`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WindComponents {
    pub direction: f64,
    pub u: f64,
    pub v: f64,
}

/// One measurement as read from a shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub parameter: Measurement,
    pub station_id: String,
    /// `YYYY-MM-DD HH:MM:SS`, local civil time
    pub timestamp: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind: Option<WindComponents>,
    /// Shard the row came from, only echoed for multi-year queries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_year: Option<i32>,
}

/// Per-station mean produced by average mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StationAverage {
    pub station_id: String,
    pub value: f64,
}

pub fn parse_request_timestamp(raw: &str) -> Result<PrimitiveDateTime, Error> {
    let raw = raw.trim();
    let with_minutes = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let with_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, &with_minutes)
        .or_else(|_| PrimitiveDateTime::parse(raw, &with_seconds))
        .map_err(|e| {
            Error::InvalidRequest(format!(
                "'{}' is not a YYYY-MM-DD HH:MM timestamp: {}",
                raw, e
            ))
        })
}

/// Renders the storage format, `YYYY-MM-DD HH:MM:SS`
pub fn canonical_timestamp(ts: PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}
