// src/types.rs
use std::path::PathBuf;

/// One reading pair taken at `timestamp` seconds since start.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value_a: f64,
    pub value_b: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value_a: f64, value_b: f64) -> Self {
        Self { timestamp, value_a, value_b }
    }
}

/// Vertical annotation on the chart, placed at a sample timestamp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Marker {
    pub position: f64,
}

// GUI 推入事件队列的事件
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MonitorEvent {
    // 定时器触发, 携带启动后经过的秒数
    Tick { elapsed: f64 },
    // 鼠标点击: 导出 + 标记
    Click,
    // 打开已导出的文件
    OpenExport,
}

// 事件处理结果, GUI 据此写日志
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Rendered,
    Exported {
        path: PathBuf,
        session: u32,
        rows_written: usize,
        created: bool,
    },
    ExportFailed(String),
    Opened(PathBuf),
    OpenFailed(String),
}
