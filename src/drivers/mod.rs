// src/drivers/mod.rs
// 无界面核心: 窗口缓冲, 数据源, 导出, 显示适配
pub mod buffer;
pub mod display;
pub mod error;
pub mod export;
pub mod source;
pub mod workbook;
// 公开导出常用类型, 方便外部调用
pub use buffer::RollingWindow;
pub use display::{ChartFrame, ChartSink, DisplayAdapter, MarkerSet, TableGrid, TableSink, TABLE_ROWS};
pub use error::MonitorError;
pub use export::{ExportBatch, ExportReport, SnapshotExporter};
pub use source::{ManualSource, SampleSource, SimulatedSource};
pub use workbook::{Cell, Workbook};
