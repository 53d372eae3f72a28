//! Turns per-parameter query results into what the dashboard plays back:
//! a flat list for tables and charts, or timestamp frames per map layer.

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use super::{Channel, Measurement, Reading, StationAverage, WindComponents};
use crate::StationCatalog;

/// A reading placed on the map.
///
/// Stations missing from the catalog keep their id but sit at (0, 0) with
/// `located` set to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnrichedReading {
    pub station_id: String,
    pub name: String,
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub located: bool,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind: Option<WindComponents>,
}

/// All readings of one layer sharing a timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp: String,
    pub readings: Vec<EnrichedReading>,
}

/// Frames per map layer; each frame serializes as an array of readings
pub type ChannelFrames = BTreeMap<Channel, Vec<Vec<EnrichedReading>>>;

/// Concatenates parameters in request order, keeping each one's ordering
pub fn flatten(results: Vec<(Measurement, Vec<Reading>)>) -> Vec<Reading> {
    results
        .into_iter()
        .flat_map(|(_, readings)| readings)
        .collect()
}

pub fn enrich(
    measurement: Measurement,
    reading: &Reading,
    catalog: &dyn StationCatalog,
) -> EnrichedReading {
    let station = catalog.lookup(measurement, &reading.station_id);
    if station.is_none() {
        debug!(
            "station {} not in catalog for {}",
            reading.station_id, measurement
        );
    }
    let (name, latitude, longitude) = station
        .as_ref()
        .map(|s| (s.name.clone(), s.location.latitude, s.location.longitude))
        .unwrap_or_else(|| (String::new(), 0.0, 0.0));

    EnrichedReading {
        station_id: reading.station_id.clone(),
        name,
        timestamp: reading.timestamp.clone(),
        latitude,
        longitude,
        located: station.is_some(),
        value: reading.value,
        wind: reading.wind,
    }
}

/// Groups readings by exact timestamp text; frames come out in ascending
/// timestamp order and readings keep their order within a frame.
pub fn group_frames(
    measurement: Measurement,
    readings: &[Reading],
    catalog: &dyn StationCatalog,
) -> Vec<Frame> {
    readings
        .iter()
        .sorted_by(|a, b| a.timestamp.cmp(&b.timestamp))
        .chunk_by(|reading| reading.timestamp.clone())
        .into_iter()
        .map(|(timestamp, group)| Frame {
            timestamp,
            readings: group
                .map(|reading| enrich(measurement, reading, catalog))
                .collect(),
        })
        .collect()
}

/// Frames keyed by map layer. Parameters without a layer are left out.
pub fn channel_frames(
    results: &[(Measurement, Vec<Reading>)],
    catalog: &dyn StationCatalog,
) -> ChannelFrames {
    let mut channels = ChannelFrames::new();
    for (measurement, readings) in results {
        let Some(channel) = measurement.channel() else {
            continue;
        };
        let frames = group_frames(*measurement, readings, catalog)
            .into_iter()
            .map(|frame| frame.readings);
        channels.entry(channel).or_default().extend(frames);
    }
    channels
}

/// Average mode as a single rainfall frame stamped with the range start
pub fn average_frames(
    averages: &[StationAverage],
    stamped: &str,
    catalog: &dyn StationCatalog,
) -> ChannelFrames {
    let frame: Vec<EnrichedReading> = averages
        .iter()
        .map(|average| {
            let reading = Reading {
                parameter: Measurement::Rainfall,
                station_id: average.station_id.clone(),
                timestamp: stamped.to_owned(),
                value: average.value,
                wind: None,
                source_year: None,
            };
            enrich(Measurement::Rainfall, &reading, catalog)
        })
        .collect();

    let mut channels = ChannelFrames::new();
    if !frame.is_empty() {
        channels.insert(Channel::Rainfall, vec![frame]);
    }
    channels
}
