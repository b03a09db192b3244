// src/engine.rs
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use log::{info, warn};
use crate::config::MonitorConfig;
use crate::drivers::{
    ChartSink, DisplayAdapter, MonitorError, RollingWindow, SampleSource, SimulatedSource,
    SnapshotExporter, TableSink,
};
use crate::types::*;

/// Everything the handlers touch, in one place.
pub struct MonitorState {
    pub config: MonitorConfig,
    pub window: RollingWindow,
    pub display: DisplayAdapter,
    pub exporter: SnapshotExporter,
    source: Box<dyn SampleSource>,
}

impl MonitorState {
    pub fn new(config: MonitorConfig) -> Self {
        let source = SimulatedSource::new(config.stream_a, config.stream_b);
        Self::with_source(config, Box::new(source))
    }

    pub fn with_source(config: MonitorConfig, source: Box<dyn SampleSource>) -> Self {
        let window = RollingWindow::new(config.horizon_secs).with_max_samples(config.max_samples);
        let display = DisplayAdapter::new(config.table_columns, config.marker_horizon);
        let exporter = SnapshotExporter::new(
            config.export_dir.clone(),
            config.file_name_format.clone(),
            config.sheet_name.clone(),
            config.export_batch_len,
        );
        Self {
            config,
            window,
            display,
            exporter,
            source,
        }
    }
}

/// Turns wall-clock progress into whole timer periods.
#[derive(Clone, Debug)]
pub struct Ticker {
    interval: Duration,
    fired: u64,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            fired: 0,
        }
    }

    /// At most one tick per call, stamped with `elapsed` (seconds).
    ///
    /// Periods missed during a stall are merged into that single tick rather
    /// than replayed.
    pub fn due(&mut self, elapsed: Duration) -> Option<f64> {
        let total = (elapsed.as_nanos() / self.interval.as_nanos()) as u64;
        if total <= self.fired {
            return None;
        }
        self.fired = total;
        Some(elapsed.as_secs_f64())
    }

    /// Time left until the next tick, for scheduling a repaint.
    pub fn until_next(&self, elapsed: Duration) -> Duration {
        let next_nanos = self.interval.as_nanos() * (u128::from(self.fired) + 1);
        let next = Duration::from_nanos(u64::try_from(next_nanos).unwrap_or(u64::MAX));
        next.saturating_sub(elapsed)
    }
}

/// Handles one event. The only place state changes.
pub fn dispatch<C: ChartSink, T: TableSink>(
    state: &mut MonitorState,
    event: MonitorEvent,
    chart: &mut C,
    table: &mut T,
) -> Outcome {
    match event {
        MonitorEvent::Tick { elapsed } => on_tick(state, elapsed, chart, table),
        MonitorEvent::Click => on_click(state),
        MonitorEvent::OpenExport => on_open_export(state),
    }
}

/// Drains `queue` in order, returning the outcomes worth reporting.
pub fn run_queue<C: ChartSink, T: TableSink>(
    state: &mut MonitorState,
    queue: &mut VecDeque<MonitorEvent>,
    chart: &mut C,
    table: &mut T,
) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    while let Some(event) = queue.pop_front() {
        match dispatch(state, event, chart, table) {
            Outcome::Rendered => {}
            other => outcomes.push(other),
        }
    }
    outcomes
}

fn on_tick<C: ChartSink, T: TableSink>(
    state: &mut MonitorState,
    elapsed: f64,
    chart: &mut C,
    table: &mut T,
) -> Outcome {
    // 1. 采样
    let (value_a, value_b) = state.source.next_pair();
    // 2. 入窗口 (过期数据自动淘汰)
    state.window.append(Sample::new(elapsed, value_a, value_b));
    // 3. 刷新图表与表格
    state.display.render(&state.window, chart, table);
    Outcome::Rendered
}

fn on_click(state: &mut MonitorState) -> Outcome {
    // 导出失败不影响窗口和标记
    let outcome = match state.exporter.export(&state.window) {
        Ok(report) => Outcome::Exported {
            path: report.path,
            session: state.exporter.session(),
            rows_written: report.rows_written,
            created: report.created,
        },
        Err(err) => {
            warn!("export #{} failed: {err}", state.exporter.session());
            Outcome::ExportFailed(err.to_string())
        }
    };
    state.display.mark_latest(&state.window);
    outcome
}

fn on_open_export(state: &mut MonitorState) -> Outcome {
    let result = exported_file(state).and_then(|path| {
        open_with_default_app(&path)?;
        Ok(path)
    });
    match result {
        Ok(path) => {
            info!("opened {}", path.display());
            Outcome::Opened(path)
        }
        Err(err) => {
            warn!("open export: {err}");
            Outcome::OpenFailed(err.to_string())
        }
    }
}

/// The exported workbook, provided it still exists on disk.
pub fn exported_file(state: &MonitorState) -> Result<PathBuf, MonitorError> {
    let path = state
        .exporter
        .destination()
        .ok_or(MonitorError::NothingExported)?;
    if !path.exists() {
        return Err(MonitorError::ExportMissing(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

fn open_with_default_app(path: &std::path::Path) -> Result<(), MonitorError> {
    use std::process::Command;
    let path = path.canonicalize()?;
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(&path);
        c
    };
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut c = Command::new("open");
        c.arg(&path);
        c
    };
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut command = {
        let mut c = Command::new("xdg-open");
        c.arg(&path);
        c
    };
    command.spawn()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{ChartFrame, ManualSource, TableGrid};
    use tempfile::tempdir;

    fn state_in(dir: &std::path::Path) -> MonitorState {
        let config = MonitorConfig {
            export_dir: dir.to_path_buf(),
            file_name_format: "test.xlsx".to_owned(),
            ..MonitorConfig::default()
        };
        let pairs = (0..100).map(|i| (i as f64, 100.0 + i as f64));
        MonitorState::with_source(config, Box::new(ManualSource::new(pairs)))
    }

    fn tick(state: &mut MonitorState, elapsed: f64) {
        let mut chart = ChartFrame::default();
        let mut table = TableGrid::new(15);
        let event = MonitorEvent::Tick { elapsed };
        assert_eq!(dispatch(state, event, &mut chart, &mut table), Outcome::Rendered);
    }

    fn click(state: &mut MonitorState) -> Outcome {
        let mut chart = ChartFrame::default();
        let mut table = TableGrid::new(15);
        dispatch(state, MonitorEvent::Click, &mut chart, &mut table)
    }

    #[test]
    fn ticker_counts_whole_periods() {
        let mut ticker = Ticker::new(Duration::from_millis(200));
        assert_eq!(ticker.due(Duration::from_millis(150)), None);
        assert_eq!(ticker.due(Duration::from_millis(200)), Some(0.2));
        assert_eq!(ticker.due(Duration::from_millis(399)), None);
        assert_eq!(ticker.until_next(Duration::from_millis(399)), Duration::from_millis(1));
        assert_eq!(ticker.due(Duration::from_millis(400)), Some(0.4));
    }

    #[test]
    fn ticker_skips_missed_periods() {
        let mut ticker = Ticker::new(Duration::from_millis(200));
        assert_eq!(ticker.due(Duration::from_millis(200)), Some(0.2));
        // Eight hours without a frame: one tick, stamped now.
        let stall = Duration::from_secs(8 * 3600);
        assert_eq!(ticker.due(stall), Some(stall.as_secs_f64()));
        assert_eq!(ticker.due(stall), None);
        assert_eq!(
            ticker.until_next(stall + Duration::from_millis(50)),
            Duration::from_millis(150)
        );
        assert_eq!(
            ticker.due(stall + Duration::from_millis(200)),
            Some((stall + Duration::from_millis(200)).as_secs_f64())
        );
    }

    #[test]
    fn ticks_fill_window_and_render() {
        let dir = tempdir().unwrap();
        let mut state = state_in(dir.path());
        let mut queue: VecDeque<MonitorEvent> = (0..=12)
            .map(|t| MonitorEvent::Tick { elapsed: t as f64 })
            .collect();
        let mut chart = ChartFrame::default();
        let mut table = TableGrid::new(15);
        let outcomes = run_queue(&mut state, &mut queue, &mut chart, &mut table);
        assert!(outcomes.is_empty());
        assert!(queue.is_empty());
        assert_eq!(state.window.oldest().map(|s| s.timestamp), Some(2.0));
        assert_eq!(chart.series_a.len(), state.window.len());
        assert_eq!(table.cell(0, 0), "12.00");
        assert_eq!(table.cell(1, 0), "12.00");
        assert_eq!(table.cell(2, 0), "112.00");
    }

    #[test]
    fn clicks_export_and_mark() {
        let dir = tempdir().unwrap();
        let mut state = state_in(dir.path());
        for t in 0..=5 {
            tick(&mut state, t as f64);
        }
        let first = click(&mut state);
        assert!(matches!(
            first,
            Outcome::Exported { session: 1, rows_written: 3, created: true, .. }
        ));
        assert_eq!(state.display.markers().positions(), vec![5.0]);

        for t in 6..=16 {
            tick(&mut state, t as f64);
        }
        let second = click(&mut state);
        assert!(matches!(
            second,
            Outcome::Exported { session: 2, rows_written: 2, created: false, .. }
        ));
        // 16 - 5 = 11 > 10
        assert_eq!(state.display.markers().positions(), vec![16.0]);
        assert_eq!(exported_file(&state).unwrap(), dir.path().join("test.xlsx"));
    }

    #[test]
    fn click_on_empty_window_exports_without_marker() {
        let dir = tempdir().unwrap();
        let mut state = state_in(dir.path());
        assert!(matches!(click(&mut state), Outcome::Exported { .. }));
        assert!(state.display.markers().is_empty());
    }

    #[test]
    fn failed_export_keeps_data_and_still_marks() {
        let dir = tempdir().unwrap();
        let mut state = state_in(&dir.path().join("missing"));
        tick(&mut state, 1.0);
        tick(&mut state, 2.0);
        assert!(matches!(click(&mut state), Outcome::ExportFailed(_)));
        assert_eq!(state.window.len(), 2);
        assert_eq!(state.display.markers().positions(), vec![2.0]);
        // The tick loop carries on.
        tick(&mut state, 3.0);
        assert_eq!(state.window.len(), 3);
    }

    #[test]
    fn open_before_export_is_reported() {
        let dir = tempdir().unwrap();
        let mut state = state_in(dir.path());
        let mut chart = ChartFrame::default();
        let mut table = TableGrid::new(15);
        let outcome = dispatch(&mut state, MonitorEvent::OpenExport, &mut chart, &mut table);
        assert!(matches!(outcome, Outcome::OpenFailed(_)));
        assert!(matches!(exported_file(&state), Err(MonitorError::NothingExported)));
    }

    #[test]
    fn deleted_export_is_reported_missing() {
        let dir = tempdir().unwrap();
        let mut state = state_in(dir.path());
        tick(&mut state, 1.0);
        click(&mut state);
        std::fs::remove_file(dir.path().join("test.xlsx")).unwrap();
        assert!(matches!(exported_file(&state), Err(MonitorError::ExportMissing(_))));
    }
}
