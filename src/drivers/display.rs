use log::debug;
use crate::drivers::buffer::RollingWindow;
use crate::types::Marker;
/// Rows of the table sink.
pub const TABLE_ROWS: usize = 3;
const ROW_TIME: usize = 0;
const ROW_VALUE_A: usize = 1;
const ROW_VALUE_B: usize = 2;
/// Receives the whole chart each tick.
pub trait ChartSink {
    fn draw(
        &mut self,
        series_a: &[[f64; 2]],
        series_b: &[[f64; 2]],
        markers: &[f64],
        x_range: Option<(f64, f64)>,
    );
}
/// Fixed grid of text cells, written cell by cell.
pub trait TableSink {
    fn set_cell(&mut self, row: usize, column: usize, text: String);
}
/// Retained copy of the last chart push, drawn by the GUI.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChartFrame {
    pub series_a: Vec<[f64; 2]>,
    pub series_b: Vec<[f64; 2]>,
    pub markers: Vec<f64>,
    pub x_range: Option<(f64, f64)>,
}
impl ChartSink for ChartFrame {
    fn draw(
        &mut self,
        series_a: &[[f64; 2]],
        series_b: &[[f64; 2]],
        markers: &[f64],
        x_range: Option<(f64, f64)>,
    ) {
        self.series_a.clear();
        self.series_a.extend_from_slice(series_a);
        self.series_b.clear();
        self.series_b.extend_from_slice(series_b);
        self.markers.clear();
        self.markers.extend_from_slice(markers);
        self.x_range = x_range;
    }
}
/// 3 x N text grid. Cells keep their last value until overwritten.
#[derive(Clone, Debug, PartialEq)]
pub struct TableGrid {
    cells: Vec<Vec<String>>,
}
impl TableGrid {
    pub fn new(columns: usize) -> Self {
        Self {
            cells: vec![vec![String::new(); columns]; TABLE_ROWS],
        }
    }
    pub fn columns(&self) -> usize {
        self.cells.first().map(|r| r.len()).unwrap_or(0)
    }
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.cells
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
    pub fn row(&self, row: usize) -> &[String] {
        self.cells.get(row).map(Vec::as_slice).unwrap_or(&[])
    }
}
impl TableSink for TableGrid {
    fn set_cell(&mut self, row: usize, column: usize, text: String) {
        if let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = text;
        }
    }
}
/// Chart annotations. A new marker expires every marker further than
/// `horizon` from it; nothing else removes markers.
#[derive(Clone, Debug)]
pub struct MarkerSet {
    markers: Vec<Marker>,
    horizon: f64,
}
impl MarkerSet {
    pub fn new(horizon: f64) -> Self {
        Self {
            markers: Vec::new(),
            horizon,
        }
    }
    /// Adds a marker at `position` and returns the ones it expired.
    pub fn add(&mut self, position: f64) -> Vec<Marker> {
        let horizon = self.horizon;
        let (expired, active): (Vec<Marker>, Vec<Marker>) = self
            .markers
            .drain(..)
            .partition(|m| (m.position - position).abs() > horizon);
        self.markers = active;
        self.markers.push(Marker { position });
        expired
    }
    pub fn positions(&self) -> Vec<f64> {
        self.markers.iter().map(|m| m.position).collect()
    }
    pub fn len(&self) -> usize {
        self.markers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
/// Pushes the window to the chart and table sinks and owns the markers.
#[derive(Clone, Debug)]
pub struct DisplayAdapter {
    table_columns: usize,
    markers: MarkerSet,
}
impl DisplayAdapter {
    pub fn new(table_columns: usize, marker_horizon: f64) -> Self {
        Self {
            table_columns,
            markers: MarkerSet::new(marker_horizon),
        }
    }
    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }
    /// Marks the newest sample of `window`. No-op on an empty window.
    pub fn mark_latest(&mut self, window: &RollingWindow) -> Option<Marker> {
        let position = window.newest()?.timestamp;
        let expired = self.markers.add(position);
        debug!("marker at {position:.2}, expired {}", expired.len());
        Some(Marker { position })
    }
    /// Chart gets the whole window in time order; the table gets the newest
    /// `table_columns` samples, newest in column 0.
    pub fn render<C: ChartSink, T: TableSink>(
        &self,
        window: &RollingWindow,
        chart: &mut C,
        table: &mut T,
    ) {
        let series_a: Vec<[f64; 2]> = window.iter().map(|s| [s.timestamp, s.value_a]).collect();
        let series_b: Vec<[f64; 2]> = window.iter().map(|s| [s.timestamp, s.value_b]).collect();
        chart.draw(
            &series_a,
            &series_b,
            &self.markers.positions(),
            window.time_span(),
        );
        for (column, sample) in window.iter().rev().take(self.table_columns).enumerate() {
            table.set_cell(ROW_TIME, column, format!("{:.2}", sample.timestamp));
            table.set_cell(ROW_VALUE_A, column, format!("{:.2}", sample.value_a));
            table.set_cell(ROW_VALUE_B, column, format!("{:.2}", sample.value_b));
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;
    #[test]
    fn marker_eleven_units_back_expires() {
        let mut markers = MarkerSet::new(10.0);
        assert!(markers.add(5.0).is_empty());
        let expired = markers.add(16.0);
        assert_eq!(expired, vec![Marker { position: 5.0 }]);
        assert_eq!(markers.positions(), vec![16.0]);
    }
    #[test]
    fn marker_exactly_at_horizon_stays() {
        let mut markers = MarkerSet::new(10.0);
        markers.add(5.0);
        markers.add(9.0);
        assert!(markers.add(15.0).is_empty());
        assert_eq!(markers.positions(), vec![5.0, 9.0, 15.0]);
    }
    #[test]
    fn mark_latest_uses_newest_sample() {
        let mut display = DisplayAdapter::new(15, 10.0);
        let mut window = RollingWindow::new(10.0);
        assert_eq!(display.mark_latest(&window), None);
        window.append(Sample::new(1.0, 0.0, 0.0));
        window.append(Sample::new(2.5, 0.0, 0.0));
        assert_eq!(display.mark_latest(&window), Some(Marker { position: 2.5 }));
        assert_eq!(display.markers().len(), 1);
    }
    #[test]
    fn render_orders_chart_forward_and_table_backward() {
        let display = DisplayAdapter::new(15, 10.0);
        let mut window = RollingWindow::new(10.0);
        for i in 0..20 {
            let t = i as f64 * 0.25;
            window.append(Sample::new(t, 10.0 + t, 20.0 + t));
        }
        let mut chart = ChartFrame::default();
        let mut table = TableGrid::new(15);
        display.render(&window, &mut chart, &mut table);

        assert_eq!(chart.series_a.len(), 20);
        assert_eq!(chart.series_a[0], [0.0, 10.0]);
        assert_eq!(chart.series_b[19], [4.75, 24.75]);
        assert_eq!(chart.x_range, Some((0.0, 4.75)));

        assert_eq!(table.cell(0, 0), "4.75");
        assert_eq!(table.cell(1, 0), "14.75");
        assert_eq!(table.cell(2, 0), "24.75");
        assert_eq!(table.cell(0, 14), "1.25");
    }
    #[test]
    fn short_window_only_overwrites_leading_cells() {
        let display = DisplayAdapter::new(15, 10.0);
        let mut table = TableGrid::new(15);
        table.set_cell(0, 5, "stale".into());
        let mut window = RollingWindow::new(10.0);
        window.append(Sample::new(1.0, 2.0, 3.0));
        window.append(Sample::new(2.0, 4.0, 6.0));
        display.render(&window, &mut ChartFrame::default(), &mut table);
        assert_eq!(table.row(0)[..2], ["2.00".to_owned(), "1.00".to_owned()]);
        assert_eq!(table.cell(0, 5), "stale");
        assert_eq!(table.cell(0, 2), "");
    }
    #[test]
    fn markers_reach_the_chart() {
        let mut display = DisplayAdapter::new(15, 10.0);
        let mut window = RollingWindow::new(10.0);
        window.append(Sample::new(3.0, 0.0, 0.0));
        display.mark_latest(&window);
        let mut chart = ChartFrame::default();
        display.render(&window, &mut chart, &mut TableGrid::new(15));
        assert_eq!(chart.markers, vec![3.0]);
    }
}
