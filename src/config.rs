use std::path::PathBuf;
use std::time::Duration;

/// Distribution used to fake one reading stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Distribution {
    Normal { mean: f64, std_dev: f64 },
    Uniform { low: f64, high: f64 },
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Timer period between two ticks.
    pub tick_interval: Duration,
    /// Samples older than `latest - horizon_secs` are evicted.
    pub horizon_secs: f64,
    /// Optional hard cap on the number of retained samples, independent of
    /// the age horizon. `None` keeps retention purely age based.
    pub max_samples: Option<usize>,
    /// Visible columns in the table (3 rows x `table_columns`).
    pub table_columns: usize,
    /// Most recent samples written per export.
    pub export_batch_len: usize,
    /// Markers further than this from the newest marker are dropped.
    pub marker_horizon: f64,
    pub sheet_name: String,
    pub export_dir: PathBuf,
    /// chrono format string for the file name chosen on first export.
    pub file_name_format: String,
    pub stream_a: Distribution,
    pub stream_b: Distribution,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            horizon_secs: 10.0,
            max_samples: None,
            table_columns: 15,
            export_batch_len: 5,
            marker_horizon: 10.0,
            sheet_name: "Sheet1".to_owned(),
            export_dir: PathBuf::from("."),
            file_name_format: "%m%d%H%M.xlsx".to_owned(),
            stream_a: Distribution::Normal { mean: 10.0, std_dev: 2.0 },
            stream_b: Distribution::Uniform { low: 20.0, high: 30.0 },
        }
    }
}
