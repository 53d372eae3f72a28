use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs};
use utoipa::ToSchema;

use crate::Measurement;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read station file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("Failed to parse station file {0}: {1}")]
    Parse(String, serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StationLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Station {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub location: StationLocation,
}

/// Station metadata used to place readings on the map
pub trait StationCatalog: Send + Sync {
    /// Looks up a station by id (surrounding whitespace ignored) for the
    /// network that reports `measurement`
    fn lookup(&self, measurement: Measurement, station_id: &str) -> Option<Station>;
    fn stations(&self) -> Vec<Station>;
}

/// Catalog backed by the `{id, name, location}` JSON lists the dashboard ships.
///
/// Rain gauges form their own network; when a rainfall list is loaded,
/// rainfall readings are resolved against it instead of the general list.
#[derive(Default)]
pub struct JsonStationCatalog {
    general: HashMap<String, Station>,
    rainfall: Option<HashMap<String, Station>>,
}

impl JsonStationCatalog {
    pub fn new(general: Vec<Station>, rainfall: Option<Vec<Station>>) -> Self {
        Self {
            general: index(general),
            rainfall: rainfall.map(index),
        }
    }

    pub fn from_files(
        general_path: Option<&str>,
        rainfall_path: Option<&str>,
    ) -> Result<Self, CatalogError> {
        let general = match general_path {
            Some(path) => read_stations(path)?,
            None => {
                warn!("no station file configured, readings will not be located");
                vec![]
            }
        };
        let rainfall = rainfall_path.map(read_stations).transpose()?;
        Ok(Self::new(general, rainfall))
    }
}

fn read_stations(path: &str) -> Result<Vec<Station>, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|e| CatalogError::Io(path.to_owned(), e))?;
    let stations: Vec<Station> =
        serde_json::from_str(&raw).map_err(|e| CatalogError::Parse(path.to_owned(), e))?;
    info!("loaded {} stations from {}", stations.len(), path);
    Ok(stations)
}

fn index(stations: Vec<Station>) -> HashMap<String, Station> {
    stations
        .into_iter()
        .map(|mut station| {
            station.id = station.id.trim().to_owned();
            (station.id.clone(), station)
        })
        .collect()
}

impl StationCatalog for JsonStationCatalog {
    fn lookup(&self, measurement: Measurement, station_id: &str) -> Option<Station> {
        let stations = match (&self.rainfall, measurement) {
            (Some(rainfall), Measurement::Rainfall) => rainfall,
            _ => &self.general,
        };
        stations.get(station_id.trim()).cloned()
    }

    fn stations(&self) -> Vec<Station> {
        let mut stations: Vec<Station> = self.general.values().cloned().collect();
        if let Some(rainfall) = &self.rainfall {
            stations.extend(
                rainfall
                    .values()
                    .filter(|station| !self.general.contains_key(&station.id))
                    .cloned(),
            );
        }
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        stations
    }
}
