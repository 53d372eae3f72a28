use crate::helpers::ShardDir;
use archive::{
    parse_request_timestamp, ArchiveAccess, Error, Measurement, QueryRequest, Reading,
    WeatherArchive,
};
use std::{sync::Arc, time::Duration};

fn snapshot(start: &str, end: &str, interval: &str, parameters: Vec<Measurement>) -> QueryRequest {
    QueryRequest::snapshot(
        parse_request_timestamp(start).unwrap(),
        parse_request_timestamp(end).unwrap(),
        interval.parse().unwrap(),
        parameters,
    )
    .unwrap()
}

fn average(start: &str, end: &str) -> QueryRequest {
    QueryRequest::average(
        parse_request_timestamp(start).unwrap(),
        parse_request_timestamp(end).unwrap(),
    )
    .unwrap()
}

fn timestamps(readings: &[Reading]) -> Vec<&str> {
    readings.iter().map(|r| r.timestamp.as_str()).collect()
}

#[tokio::test]
async fn six_hourly_grid_includes_both_ends() {
    let shards = ShardDir::new();
    let hourly: Vec<String> = (0..24)
        .map(|hour| format!("2023-01-01 {:02}:00:00", hour))
        .chain(std::iter::once(String::from("2023-01-02 00:00:00")))
        .collect();
    shards.seed(2023, |shard| {
        let rows: Vec<(&str, &str, f32)> = hourly.iter().map(|ts| (ts.as_str(), "S24", 27.0)).collect();
        shard.insert("air_temperature", &rows);
    });

    let request = snapshot(
        "2023-01-01 00:00",
        "2023-01-02 00:00",
        "6h",
        vec![Measurement::AirTemperature],
    );
    let results = shards.access().snapshot(&request).await.unwrap();

    assert_eq!(results.len(), 1);
    let (parameter, readings) = &results[0];
    assert_eq!(*parameter, Measurement::AirTemperature);
    assert_eq!(
        timestamps(readings),
        vec![
            "2023-01-01 00:00:00",
            "2023-01-01 06:00:00",
            "2023-01-01 12:00:00",
            "2023-01-01 18:00:00",
            "2023-01-02 00:00:00",
        ]
    );
    assert!(readings.iter().all(|r| r.source_year.is_none()));
}

#[tokio::test]
async fn grid_follows_an_unaligned_anchor() {
    let shards = ShardDir::new();
    let half_hourly: Vec<String> = (2..=20)
        .map(|half| format!("2023-05-10 {:02}:{:02}:00", half / 2, (half % 2) * 30))
        .collect();
    shards.seed(2023, |shard| {
        let rows: Vec<(&str, &str, f32)> =
            half_hourly.iter().map(|ts| (ts.as_str(), "S24", 80.0)).collect();
        shard.insert("relative_humidity", &rows);
    });

    let request = snapshot(
        "2023-05-10 01:00",
        "2023-05-10 10:00",
        "3h",
        vec![Measurement::RelativeHumidity],
    );
    let results = shards.access().snapshot(&request).await.unwrap();
    let readings = &results[0].1;

    assert_eq!(
        timestamps(readings),
        vec![
            "2023-05-10 01:00:00",
            "2023-05-10 04:00:00",
            "2023-05-10 07:00:00",
            "2023-05-10 10:00:00",
        ]
    );

    let spec = request.interval_spec().unwrap();
    for ts in &half_hourly {
        let expected = spec.contains(parse_request_timestamp(ts).unwrap());
        assert_eq!(readings.iter().any(|r| &r.timestamp == ts), expected, "{}", ts);
    }
}

#[tokio::test]
async fn rows_outside_the_range_are_excluded() {
    let shards = ShardDir::new();
    shards.seed(2023, |shard| {
        shard.insert(
            "rainfall",
            &[
                ("2023-03-01 09:00:00", "S24", 0.0),
                ("2023-03-01 10:00:00", "S24", 0.5),
                ("2023-03-01 11:00:00", "S24", 1.0),
                ("2023-03-01 12:00:00", "S24", 1.5),
                ("2023-03-01 13:00:00", "S24", 2.0),
            ],
        );
    });

    let request = snapshot(
        "2023-03-01 10:00",
        "2023-03-01 12:00",
        "1h",
        vec![Measurement::Rainfall],
    );
    let results = shards.access().snapshot(&request).await.unwrap();
    let readings = &results[0].1;

    assert_eq!(
        timestamps(readings),
        vec![
            "2023-03-01 10:00:00",
            "2023-03-01 11:00:00",
            "2023-03-01 12:00:00",
        ]
    );
    assert_eq!(readings[0].value, 0.5);
}

#[tokio::test]
async fn range_spanning_years_reads_every_shard() {
    let shards = ShardDir::new();
    shards.seed(2022, |shard| {
        shard.insert("rainfall", &[("2022-12-31 00:00:00", "S24", 1.0)]);
    });
    shards.seed(2023, |shard| {
        shard.insert(
            "rainfall",
            &[
                ("2023-06-15 00:00:00", "S24", 2.0),
                ("2023-06-15 12:00:00", "S24", 9.0),
            ],
        );
    });
    shards.seed(2024, |shard| {
        shard.insert("rainfall", &[("2024-01-01 00:00:00", "S24", 3.0)]);
    });

    let request = snapshot(
        "2022-12-31 00:00",
        "2024-01-01 00:00",
        "1day",
        vec![Measurement::Rainfall],
    );
    let results = shards.access().snapshot(&request).await.unwrap();
    let readings = &results[0].1;

    assert_eq!(
        timestamps(readings),
        vec![
            "2022-12-31 00:00:00",
            "2023-06-15 00:00:00",
            "2024-01-01 00:00:00",
        ]
    );
    let years: Vec<Option<i32>> = readings.iter().map(|r| r.source_year).collect();
    assert_eq!(years, vec![Some(2022), Some(2023), Some(2024)]);
}

#[tokio::test]
async fn stations_sharing_a_timestamp_are_ordered_by_id() {
    let shards = ShardDir::new();
    shards.seed(2023, |shard| {
        shard.insert(
            "air_temperature",
            &[
                ("2023-01-01 06:00:00", "S43", 28.0),
                ("2023-01-01 00:00:00", "S43", 26.0),
                ("2023-01-01 00:00:00", "S106", 25.0),
                ("2023-01-01 06:00:00", "S106", 27.0),
            ],
        );
    });
    let access = shards.access();
    let request = snapshot(
        "2023-01-01 00:00",
        "2023-01-01 06:00",
        "6h",
        vec![Measurement::AirTemperature],
    );

    let first = access.snapshot(&request).await.unwrap();
    let stations: Vec<(&str, &str)> = first[0]
        .1
        .iter()
        .map(|r| (r.timestamp.as_str(), r.station_id.as_str()))
        .collect();
    assert_eq!(
        stations,
        vec![
            ("2023-01-01 00:00:00", "S106"),
            ("2023-01-01 00:00:00", "S43"),
            ("2023-01-01 06:00:00", "S106"),
            ("2023-01-01 06:00:00", "S43"),
        ]
    );

    let second = access.snapshot(&request).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn parameters_come_back_in_request_order() {
    let shards = ShardDir::new();
    shards.seed(2023, |shard| {
        shard.insert("rainfall", &[("2023-01-01 00:00:00", "S24", 0.5)]);
        shard.insert("air_temperature", &[("2023-01-01 00:00:00", "S24", 26.5)]);
        shard.insert_wind(&[("2023-01-01 00:00:00", "S24", 4.0, 180.0, 0.0, 4.0)]);
    });

    let request = snapshot(
        "2023-01-01 00:00",
        "2023-01-01 00:00",
        "1h",
        vec![
            Measurement::WindCombined,
            Measurement::Rainfall,
            Measurement::AirTemperature,
        ],
    );
    let results = shards.access().snapshot(&request).await.unwrap();

    let order: Vec<Measurement> = results.iter().map(|(p, _)| *p).collect();
    assert_eq!(
        order,
        vec![
            Measurement::WindCombined,
            Measurement::Rainfall,
            Measurement::AirTemperature,
        ]
    );

    let wind = &results[0].1[0];
    assert_eq!(wind.value, 4.0);
    let components = wind.wind.unwrap();
    assert_eq!(components.direction, 180.0);
    assert_eq!(components.v, 4.0);
    assert!(results[1].1[0].wind.is_none());
}

#[tokio::test]
async fn empty_tables_are_not_an_error() {
    let shards = ShardDir::new();
    shards.seed(2023, |_| {});

    let request = snapshot(
        "2023-01-01 00:00",
        "2023-01-02 00:00",
        "1h",
        vec![Measurement::WindSpeed, Measurement::WindDirection],
    );
    let results = shards.access().snapshot(&request).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, readings)| readings.is_empty()));
}

#[tokio::test]
async fn missing_shard_fails_the_request() {
    let shards = ShardDir::new();
    shards.seed(2023, |shard| {
        shard.insert("rainfall", &[("2023-01-01 00:00:00", "S24", 0.5)]);
    });

    let request = snapshot(
        "2022-12-31 00:00",
        "2023-01-01 00:00",
        "1day",
        vec![Measurement::Rainfall],
    );
    let err = shards.access().snapshot(&request).await.unwrap_err();

    assert!(matches!(err, Error::ShardUnavailable { year: 2022, .. }));
    assert!(!err.is_caller_error());
}

#[tokio::test]
async fn average_within_one_year_is_the_plain_mean() {
    let shards = ShardDir::new();
    shards.seed(2023, |shard| {
        shard.insert(
            "rainfall",
            &[
                ("2023-01-01 00:00:00", "S24", 1.0),
                ("2023-01-01 00:05:00", "S24", 2.0),
                ("2023-01-01 00:10:00", "S24", 3.0),
                ("2023-01-01 00:00:00", "S109", 0.5),
                ("2023-02-01 00:00:00", "S109", 100.0),
            ],
        );
    });

    let request = average("2023-01-01 00:00", "2023-01-31 23:59");
    let averages = shards.access().averages(&request).await.unwrap();

    let means: Vec<(&str, f64)> = averages
        .iter()
        .map(|a| (a.station_id.as_str(), a.value))
        .collect();
    assert_eq!(means, vec![("S109", 0.5), ("S24", 2.0)]);
}

#[tokio::test]
async fn average_across_years_is_the_mean_of_yearly_means() {
    let shards = ShardDir::new();
    shards.seed(2022, |shard| {
        shard.insert(
            "rainfall",
            &[
                ("2022-12-31 00:00:00", "S24", 1.0),
                ("2022-12-31 01:00:00", "S24", 1.0),
                ("2022-12-31 02:00:00", "S24", 1.0),
            ],
        );
    });
    shards.seed(2023, |shard| {
        shard.insert("rainfall", &[("2023-01-01 00:00:00", "S24", 4.0)]);
    });

    let request = average("2022-12-30 00:00", "2023-01-02 00:00");
    let averages = shards.access().averages(&request).await.unwrap();

    assert_eq!(averages.len(), 1);
    assert_eq!(averages[0].station_id, "S24");
    assert_eq!(averages[0].value, 2.5);
}

#[tokio::test]
async fn snapshot_rejects_average_requests() {
    let shards = ShardDir::new();
    let request = average("2023-01-01 00:00", "2023-01-02 00:00");

    let err = shards.access().snapshot(&request).await.unwrap_err();
    assert!(err.is_caller_error());
}

#[tokio::test]
async fn weekly_grid_counts_calendar_days_across_months() {
    let shards = ShardDir::new();
    let daily: Vec<String> = (0..40)
        .map(|offset| {
            let day = parse_request_timestamp("2024-01-25 08:00").unwrap() + time::Duration::days(offset);
            archive::canonical_timestamp(day)
        })
        .collect();
    shards.seed(2024, |shard| {
        let rows: Vec<(&str, &str, f32)> = daily.iter().map(|ts| (ts.as_str(), "S24", 30.0)).collect();
        shard.insert("air_temperature", &rows);
    });

    let request = snapshot(
        "2024-01-25 08:00",
        "2024-03-04 08:00",
        "7day",
        vec![Measurement::AirTemperature],
    );
    let results = shards.access().snapshot(&request).await.unwrap();
    let readings = &results[0].1;

    assert_eq!(
        timestamps(readings),
        vec![
            "2024-01-25 08:00:00",
            "2024-02-01 08:00:00",
            "2024-02-08 08:00:00",
            "2024-02-15 08:00:00",
            "2024-02-22 08:00:00",
            "2024-02-29 08:00:00",
        ]
    );

    let spec = request.interval_spec().unwrap();
    for ts in &daily {
        let expected = spec.contains(parse_request_timestamp(ts).unwrap());
        assert_eq!(readings.iter().any(|r| &r.timestamp == ts), expected, "{}", ts);
    }
}

#[tokio::test]
async fn shards_are_released_after_a_query_succeeds() {
    let shards = ShardDir::new();
    shards.seed(2023, |shard| {
        shard.insert("rainfall", &[("2023-12-31 00:00:00", "S24", 0.5)]);
    });
    shards.seed(2024, |shard| {
        shard.insert("rainfall", &[("2024-01-01 00:00:00", "S24", 1.0)]);
    });
    let arena = shards.arena();
    let access = ArchiveAccess::new(Arc::clone(&arena), Duration::from_secs(30));

    let request = snapshot(
        "2023-12-31 00:00",
        "2024-01-01 00:00",
        "1day",
        vec![Measurement::Rainfall],
    );
    let results = access.snapshot(&request).await.unwrap();

    assert_eq!(results[0].1.len(), 2);
    assert!(arena.attached_years().is_empty());
    assert_eq!(arena.lease_count(2023), 0);
}

#[tokio::test]
async fn shards_are_released_when_a_query_fails() {
    let shards = ShardDir::new();
    shards.seed(2023, |shard| {
        shard.insert("rainfall", &[("2023-12-31 00:00:00", "S24", 0.5)]);
    });
    shards.seed(2024, |shard| {
        shard.insert("rainfall", &[("2024-01-01 00:00:00", "S24", 1.0)]);
        shard.drop_table("wind_combined");
    });
    let arena = shards.arena();
    let access = ArchiveAccess::new(Arc::clone(&arena), Duration::from_secs(30));

    let request = snapshot(
        "2023-12-31 00:00",
        "2024-01-01 00:00",
        "1day",
        vec![Measurement::Rainfall, Measurement::WindCombined],
    );
    let err = access.snapshot(&request).await.unwrap_err();

    assert!(matches!(err, Error::Query(_)));
    assert!(!err.is_caller_error());
    assert!(arena.attached_years().is_empty());
}

#[tokio::test]
async fn slow_queries_time_out() {
    let shards = ShardDir::new();
    let hourly: Vec<String> = (0..24)
        .map(|hour| format!("2023-01-01 {:02}:00:00", hour))
        .collect();
    shards.seed(2023, |shard| {
        let rows: Vec<(&str, &str, f32)> = hourly.iter().map(|ts| (ts.as_str(), "S24", 27.0)).collect();
        shard.insert("air_temperature", &rows);
        shard.insert("relative_humidity", &rows);
    });
    let access = ArchiveAccess::new(shards.arena(), Duration::from_nanos(1));

    let request = snapshot(
        "2023-01-01 00:00",
        "2023-01-01 23:00",
        "1h",
        vec![Measurement::AirTemperature, Measurement::RelativeHumidity],
    );
    let err = access.snapshot(&request).await.unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert!(!err.is_caller_error());
}
