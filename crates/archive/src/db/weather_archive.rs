use async_trait::async_trait;
use duckdb::{
    arrow::array::{Array, Float64Array, Int64Array, RecordBatch, StringArray},
    params_from_iter,
};
use futures::future::try_join_all;
use log::{debug, warn};
use std::{sync::Arc, time::Duration};

use super::{
    synthesize, Error, HeatmapMode, Measurement, QueryPlan, QueryRequest, Reading, ShardArena,
    ShardLease, StationAverage, SynthesizedQuery, WindComponents, EFFECTIVE_TIMESTAMP,
};

/// Readings for each requested parameter, in request order
pub type ParameterReadings = Vec<(Measurement, Vec<Reading>)>;

#[async_trait]
pub trait WeatherArchive: Send + Sync {
    /// Grid-aligned readings for every requested parameter
    async fn snapshot(&self, req: &QueryRequest) -> Result<ParameterReadings, Error>;
    /// Per-station rainfall mean over the whole range
    async fn averages(&self, req: &QueryRequest) -> Result<Vec<StationAverage>, Error>;
}

pub struct ArchiveAccess {
    arena: Arc<ShardArena>,
    timeout: Duration,
}

impl ArchiveAccess {
    pub fn new(arena: Arc<ShardArena>, timeout: Duration) -> Self {
        Self { arena, timeout }
    }

    /// Leases the plan's shards, runs every query on its own connection at once
    /// and waits for all of them. The first failure fails the whole plan.
    pub async fn execute(
        &self,
        plan: QueryPlan,
    ) -> Result<Vec<(Measurement, Vec<RecordBatch>)>, Error> {
        let arena = Arc::clone(&self.arena);
        let years = plan.years.clone();
        let lease = Arc::new(tokio::task::spawn_blocking(move || arena.lease(&years)).await??);

        let tasks = plan.queries.into_iter().map(|query| {
            // each task keeps the shards attached until it finishes, even past a timeout
            let lease = Arc::clone(&lease);
            tokio::task::spawn_blocking(move || run_query(&lease, query))
        });

        let finished = tokio::time::timeout(self.timeout, try_join_all(tasks)).await;
        release(lease).await;

        finished
            .map_err(|_| Error::Timeout(self.timeout))??
            .into_iter()
            .collect()
    }
}

/// Drops our hold on the shards off the async workers, since the last holder
/// runs DETACH under the arena lock
async fn release(lease: Arc<ShardLease>) {
    if let Err(e) = tokio::task::spawn_blocking(move || drop(lease)).await {
        warn!("failed to release shard lease: {}", e);
    }
}

fn run_query(
    lease: &ShardLease,
    query: SynthesizedQuery,
) -> Result<(Measurement, Vec<RecordBatch>), Error> {
    debug!(
        "querying {} over shards {:?}: {}",
        query.parameter,
        lease.years(),
        query.sql
    );
    let conn = lease.connect()?;
    let mut stmt = conn.prepare(&query.sql)?;
    let params = query.params();
    let records: Vec<RecordBatch> = stmt.query_arrow(params_from_iter(params.iter()))?.collect();
    Ok((query.parameter, records))
}

#[async_trait]
impl WeatherArchive for ArchiveAccess {
    async fn snapshot(&self, req: &QueryRequest) -> Result<ParameterReadings, Error> {
        if req.mode != HeatmapMode::Snapshot {
            return Err(Error::InvalidRequest(String::from(
                "snapshot called with an average request",
            )));
        }
        let plan = synthesize(req)?;
        let multi_shard = plan.is_multi_shard();
        let results = self.execute(plan).await?;

        results
            .into_iter()
            .map(|(parameter, records)| {
                let readings = records
                    .iter()
                    .map(|record| Readings::try_from_batch(parameter, record, multi_shard))
                    .try_fold(Readings::new(), |mut acc, batch| {
                        acc.merge(batch?);
                        Ok::<_, Error>(acc)
                    })?;
                if readings.values.is_empty() {
                    warn!(
                        "partial data: {} has no readings between {} and {}",
                        parameter, req.start, req.end
                    );
                }
                Ok((parameter, readings.values))
            })
            .collect()
    }

    async fn averages(&self, req: &QueryRequest) -> Result<Vec<StationAverage>, Error> {
        if req.mode != HeatmapMode::Average {
            return Err(Error::InvalidRequest(String::from(
                "averages called with a snapshot request",
            )));
        }
        let plan = synthesize(req)?;
        let mut averages = Vec::new();
        for (_, records) in self.execute(plan).await? {
            for record in &records {
                averages.extend(station_averages(record)?);
            }
        }
        if averages.is_empty() {
            warn!(
                "partial data: no rainfall between {} and {}",
                req.start, req.end
            );
        }
        Ok(averages)
    }
}

struct Readings {
    values: Vec<Reading>,
}

impl Readings {
    fn new() -> Self {
        Readings { values: Vec::new() }
    }

    fn merge(&mut self, readings: Readings) -> &Readings {
        self.values.extend(readings.values);
        self
    }

    fn try_from_batch(
        parameter: Measurement,
        record_batch: &RecordBatch,
        multi_shard: bool,
    ) -> Result<Self, Error> {
        let timestamp_arr = string_column(record_batch, EFFECTIVE_TIMESTAMP)?;
        let station_id_arr = string_column(record_batch, "station_id")?;
        let value_arr = float_column(record_batch, "value")?;
        let wind_arrs = if parameter.has_wind_components() {
            Some((
                float_column(record_batch, "direction")?,
                float_column(record_batch, "u")?,
                float_column(record_batch, "v")?,
            ))
        } else {
            None
        };
        let year_arr = if multi_shard {
            Some(int_column(record_batch, "source_year")?)
        } else {
            None
        };

        let mut readings = Vec::with_capacity(record_batch.num_rows());
        for row_index in 0..record_batch.num_rows() {
            if value_arr.is_null(row_index)
                || station_id_arr.is_null(row_index)
                || timestamp_arr.is_null(row_index)
            {
                continue;
            }

            let wind = wind_arrs.and_then(|(direction, u, v)| {
                if direction.is_null(row_index) || u.is_null(row_index) || v.is_null(row_index) {
                    None
                } else {
                    Some(WindComponents {
                        direction: direction.value(row_index),
                        u: u.value(row_index),
                        v: v.value(row_index),
                    })
                }
            });
            let source_year = year_arr
                .filter(|years| !years.is_null(row_index))
                .and_then(|years| i32::try_from(years.value(row_index)).ok());

            readings.push(Reading {
                parameter,
                station_id: station_id_arr.value(row_index).to_owned(),
                timestamp: timestamp_arr.value(row_index).to_owned(),
                value: value_arr.value(row_index),
                wind,
                source_year,
            });
        }

        Ok(Self { values: readings })
    }
}

fn station_averages(record_batch: &RecordBatch) -> Result<Vec<StationAverage>, Error> {
    let station_id_arr = string_column(record_batch, "station_id")?;
    let value_arr = float_column(record_batch, "value")?;

    Ok((0..record_batch.num_rows())
        .filter(|row| !station_id_arr.is_null(*row) && !value_arr.is_null(*row))
        .map(|row| StationAverage {
            station_id: station_id_arr.value(row).to_owned(),
            value: value_arr.value(row),
        })
        .collect())
}

fn string_column<'a>(record_batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, Error> {
    record_batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Decode(format!("expected text column {}", name)))
}

fn float_column<'a>(record_batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array, Error> {
    record_batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| Error::Decode(format!("expected double column {}", name)))
}

fn int_column<'a>(record_batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, Error> {
    record_batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| Error::Decode(format!("expected bigint column {}", name)))
}
