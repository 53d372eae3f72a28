use clap::Parser;
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};
use log::LevelFilter;
use std::{env, time::Duration};
use time::{format_description::well_known::Iso8601, OffsetDateTime};
use weathersg_core::{
    find_config_file, load_config, ConfigSource, DEFAULT_ARCHIVE_PORT, DEFAULT_QUERY_TIMEOUT_SECS,
};

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "WeatherSG archive - interval-aligned historical weather readings"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $WEATHERSG_ARCHIVE_CONFIG, ./archive.toml,
    /// $XDG_CONFIG_HOME/weathersg/archive.toml, /etc/weathersg/archive.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "WEATHERSG_ARCHIVE_LEVEL")]
    pub level: Option<String>,

    /// Host to listen on (use 0.0.0.0 for all interfaces)
    #[arg(short, long, env = "WEATHERSG_ARCHIVE_HOST")]
    #[serde(alias = "host")]
    pub domain: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "WEATHERSG_ARCHIVE_PORT")]
    pub port: Option<String>,

    /// Directory holding the yearly weather_{year}.duckdb shards
    #[arg(short, long, env = "WEATHERSG_ARCHIVE_DIR")]
    pub archive_dir: Option<String>,

    /// JSON list of stations ({id, name, location}) used to place readings
    #[arg(short, long, env = "WEATHERSG_ARCHIVE_STATIONS")]
    pub stations_file: Option<String>,

    /// Separate JSON list for the rain gauge network
    #[arg(short, long, env = "WEATHERSG_ARCHIVE_RAINFALL_STATIONS")]
    pub rainfall_stations_file: Option<String>,

    /// Upper bound on one request's queries, in seconds
    #[arg(short, long, env = "WEATHERSG_ARCHIVE_QUERY_TIMEOUT")]
    pub query_timeout_secs: Option<u64>,
}

impl Cli {
    pub fn host(&self) -> String {
        self.domain
            .clone()
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn port(&self) -> String {
        self.port
            .clone()
            .unwrap_or_else(|| DEFAULT_ARCHIVE_PORT.to_string())
    }

    pub fn archive_dir(&self) -> String {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| "./weather_archive".to_string())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(
            self.query_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
        )
    }

    /// CLI values win; anything unset falls back to the file
    pub fn merge(self, file_config: Cli) -> Cli {
        Cli {
            config: self.config,
            level: self.level.or(file_config.level),
            domain: self.domain.or(file_config.domain),
            port: self.port.or(file_config.port),
            archive_dir: self.archive_dir.or(file_config.archive_dir),
            stations_file: self.stations_file.or(file_config.stations_file),
            rainfall_stations_file: self
                .rainfall_stations_file
                .or(file_config.rainfall_stations_file),
            query_timeout_secs: self.query_timeout_secs.or(file_config.query_timeout_secs),
        }
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("WEATHERSG_ARCHIVE_CONFIG", "archive.toml")
    };

    // the logger is not up yet, so this goes straight to stderr
    if let Some(path) = source.path() {
        eprintln!("Loading config from: {}", path.display());
    }

    let file_config: Cli = load_config(&source).unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config {}: {}", source, e);
        Cli::default()
    });

    cli_args.merge(file_config)
}

pub fn get_log_level(cli: &Cli) -> LevelFilter {
    let level_str = cli
        .level
        .clone()
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    match level_str.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

pub fn setup_logger() -> Dispatch {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                now,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .chain(std::io::stdout())
}
