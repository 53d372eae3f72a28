use regex::Regex;
use scooby::postgres::{select, Parameters};
use std::sync::OnceLock;
use weathersg_core::shard_alias;

use super::{
    canonical_timestamp, shard_years, Error, HeatmapMode, IntervalSpec, Measurement, QueryRequest,
};

/// Source column holding `YYYY-MM-DD HH:MM:SS` text
const TIMESTAMP_COLUMN: &str = "\"timestamp\"";

/// Output column the merged result is ordered and grouped by
pub const EFFECTIVE_TIMESTAMP: &str = "effective_timestamp";

/// One executable statement plus the values for its `?` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedQuery {
    pub parameter: Measurement,
    pub sql: String,
    /// `(start, end)` per unioned shard, in placeholder order
    pub bounds: Vec<(String, String)>,
}

impl SynthesizedQuery {
    pub fn params(&self) -> Vec<String> {
        self.bounds
            .iter()
            .flat_map(|(start, end)| [start.clone(), end.clone()])
            .collect()
    }
}

/// Everything needed to answer one request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub years: Vec<i32>,
    pub mode: HeatmapMode,
    /// One entry per requested parameter, in request order
    pub queries: Vec<SynthesizedQuery>,
}

impl QueryPlan {
    pub fn is_multi_shard(&self) -> bool {
        self.years.len() > 1
    }

    pub fn query_for(&self, parameter: Measurement) -> Option<&SynthesizedQuery> {
        self.queries.iter().find(|q| q.parameter == parameter)
    }
}

/// Plans a request without touching storage, so a bad interval never opens a shard
pub fn synthesize(request: &QueryRequest) -> Result<QueryPlan, Error> {
    request.validate()?;
    let years = shard_years(request.start, request.end)?;
    let bounds: Vec<(String, String)> = years
        .iter()
        .map(|_| {
            (
                canonical_timestamp(request.start),
                canonical_timestamp(request.end),
            )
        })
        .collect();

    let queries = match request.mode {
        HeatmapMode::Snapshot => {
            let spec = request.interval_spec().ok_or_else(|| {
                Error::InvalidInterval(String::from("snapshot queries need an interval"))
            })?;
            request
                .parameters
                .iter()
                .map(|parameter| SynthesizedQuery {
                    parameter: *parameter,
                    sql: snapshot_sql(&years, *parameter, &spec),
                    bounds: bounds.clone(),
                })
                .collect()
        }
        HeatmapMode::Average => vec![SynthesizedQuery {
            parameter: Measurement::Rainfall,
            sql: average_sql(&years),
            bounds,
        }],
    };

    Ok(QueryPlan {
        years,
        mode: request.mode,
        queries,
    })
}

fn table_ref(year: i32, parameter: Measurement) -> String {
    format!("{}.{}", shard_alias(year), parameter.table_name())
}

fn between(placeholders: &mut Parameters) -> String {
    format!(
        "CAST({col} AS TIMESTAMP) BETWEEN CAST({} AS TIMESTAMP) AND CAST({} AS TIMESTAMP)",
        placeholders.next(),
        placeholders.next(),
        col = TIMESTAMP_COLUMN
    )
}

fn snapshot_sql(years: &[i32], parameter: Measurement, spec: &IntervalSpec) -> String {
    let multi_shard = years.len() > 1;
    let predicate = spec.sql_predicate(TIMESTAMP_COLUMN);
    let mut placeholders = Parameters::new();

    let selects: Vec<String> = years
        .iter()
        .map(|year| {
            let mut columns = vec![
                format!(
                    "strftime(CAST({} AS TIMESTAMP), '%Y-%m-%d %H:%M:%S') AS {}",
                    TIMESTAMP_COLUMN, EFFECTIVE_TIMESTAMP
                ),
                String::from("station_id"),
            ];
            if parameter.has_wind_components() {
                columns.extend([
                    String::from("CAST(speed AS DOUBLE) AS value"),
                    String::from("CAST(direction AS DOUBLE) AS direction"),
                    String::from("CAST(u AS DOUBLE) AS u"),
                    String::from("CAST(v AS DOUBLE) AS v"),
                ]);
            } else {
                columns.push(String::from("CAST(value AS DOUBLE) AS value"));
            }
            if multi_shard {
                columns.push(format!("CAST({} AS BIGINT) AS source_year", year));
            }

            select(columns.join(", "))
                .from(table_ref(*year, parameter))
                .where_(between(&mut placeholders))
                .where_(predicate.clone())
                .to_string()
        })
        .collect();

    positional(&format!(
        "{}\nORDER BY {}, station_id",
        selects.join("\nUNION ALL\n"),
        EFFECTIVE_TIMESTAMP
    ))
}

/// Per-station rainfall mean. Across shards this is the mean of per-shard
/// means, which only equals the global mean when shards hold similar counts.
fn average_sql(years: &[i32]) -> String {
    let mut placeholders = Parameters::new();

    if let [year] = years {
        let query = select("station_id, AVG(CAST(value AS DOUBLE)) AS value")
            .from(table_ref(*year, Measurement::Rainfall))
            .where_(between(&mut placeholders))
            .group_by("station_id");
        return positional(&format!("{}\nORDER BY station_id", query));
    }

    let shard_means: Vec<String> = years
        .iter()
        .map(|year| {
            select("station_id, AVG(CAST(value AS DOUBLE)) AS shard_mean")
                .from(table_ref(*year, Measurement::Rainfall))
                .where_(between(&mut placeholders))
                .group_by("station_id")
                .to_string()
        })
        .collect();

    let query = select("station_id, AVG(shard_mean) AS value")
        .from(format!("({}) AS shard_means", shard_means.join("\nUNION ALL\n")))
        .group_by("station_id");
    positional(&format!("{}\nORDER BY station_id", query))
}

/// scooby numbers placeholders `$1..$n`; duckdb is given them positionally
fn positional(sql: &str) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let re = PLACEHOLDER.get_or_init(|| Regex::new(r"\$(\d+)").expect("valid placeholder regex"));
    re.replace_all(sql, "?").into_owned()
}
