// src/gui.rs
use std::collections::VecDeque;
use std::time::Instant;
use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints, VLine};
use pressure_scope::config::MonitorConfig;
use pressure_scope::drivers::{ChartFrame, TableGrid, TABLE_ROWS};
use pressure_scope::engine::{self, MonitorState, Ticker};
use pressure_scope::types::*;

const ROW_LABELS: [&str; TABLE_ROWS] = ["Time (s)", "Pressure A", "Pressure B"];
const LOG_LINES: usize = 8;

pub struct PressureScopeApp {
    state: MonitorState,
    // 定时器与事件队列
    started_at: Instant,
    ticker: Ticker,
    queue: VecDeque<MonitorEvent>,
    // 渲染目标
    chart: ChartFrame,
    table: TableGrid,
    // 界面日志
    log_messages: Vec<String>,
}

impl Default for PressureScopeApp {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl PressureScopeApp {
    pub fn new(config: MonitorConfig) -> Self {
        let ticker = Ticker::new(config.tick_interval);
        let table = TableGrid::new(config.table_columns);
        Self {
            state: MonitorState::new(config),
            started_at: Instant::now(),
            ticker,
            queue: VecDeque::new(),
            chart: ChartFrame::default(),
            table,
            log_messages: vec!["Pressure Scope ready. Click the chart to export.".to_owned()],
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > LOG_LINES {
            self.log_messages.remove(0);
        }
    }

    fn drain_queue(&mut self) {
        let outcomes = engine::run_queue(
            &mut self.state,
            &mut self.queue,
            &mut self.chart,
            &mut self.table,
        );
        for outcome in outcomes {
            match outcome {
                Outcome::Exported {
                    path,
                    session,
                    rows_written,
                    created,
                } => {
                    let verb = if created { "created" } else { "appended to" };
                    self.log(&format!(
                        "#{session}: {verb} {} ({rows_written} rows)",
                        path.display()
                    ));
                }
                Outcome::ExportFailed(err) => self.log(&format!("Export failed: {err}")),
                Outcome::Opened(path) => self.log(&format!("Opened {}", path.display())),
                Outcome::OpenFailed(err) => self.log(&format!("Cannot open export: {err}")),
                Outcome::Rendered => {}
            }
        }
    }

    fn draw_table(&self, ui: &mut egui::Ui) {
        egui::Grid::new("recent_samples")
            .striped(true)
            .min_col_width(48.0)
            .show(ui, |ui| {
                for (row, label) in ROW_LABELS.iter().enumerate() {
                    ui.strong(*label);
                    for column in 0..self.table.columns() {
                        ui.monospace(self.table.cell(row, column));
                    }
                    ui.end_row();
                }
            });
    }
}

impl eframe::App for PressureScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. 定时器: 把到期的 tick 放入队列
        let elapsed = self.started_at.elapsed();
        if let Some(t) = self.ticker.due(elapsed) {
            self.queue.push_back(MonitorEvent::Tick { elapsed: t });
        }
        self.drain_queue();

        // 2. UI 绘制, 用户操作只入队
        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            ui.add_space(6.0);
            self.draw_table(ui);
            ui.separator();
            ui.horizontal(|ui| {
                if ui.button("📌 EXPORT SNAPSHOT").clicked() {
                    self.queue.push_back(MonitorEvent::Click);
                }
                if ui.button("📂 OPEN EXPORT").clicked() {
                    self.queue.push_back(MonitorEvent::OpenExport);
                }
                if let Some(path) = self.state.exporter.destination() {
                    let target = format!("{} [{}]", path.display(), self.state.exporter.sheet_name());
                    ui.label(egui::RichText::new(target).small());
                }
            });
            egui::ScrollArea::vertical().max_height(100.0).show(ui, |ui| {
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Live pressure");
            let mut plot = Plot::new("pressure_plot")
                .legend(Legend::default())
                .include_y(0.0)
                .auto_bounds_x()
                .x_axis_label("Time (s)")
                .y_axis_label("Pressure");
            if let Some((lo, hi)) = self.chart.x_range {
                plot = plot.include_x(lo).include_x(hi);
            }
            let response = plot.show(ui, |plot_ui| {
                plot_ui.line(
                    Line::new(PlotPoints::new(self.chart.series_a.clone()))
                        .name("Pressure A")
                        .color(Color32::RED),
                );
                plot_ui.line(
                    Line::new(PlotPoints::new(self.chart.series_b.clone()))
                        .name("Pressure B")
                        .color(Color32::GREEN),
                );
                for &x in &self.chart.markers {
                    plot_ui.vline(VLine::new(x).color(Color32::from_rgb(80, 140, 255)));
                }
            });
            if response.response.clicked() {
                self.queue.push_back(MonitorEvent::Click);
            }
        });

        // 3. 处理本帧的点击
        self.drain_queue();

        ctx.request_repaint_after(self.ticker.until_next(self.started_at.elapsed()));
    }
}
