use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use log::info;
use crate::drivers::buffer::RollingWindow;
use crate::drivers::workbook::{Cell, Workbook};
use crate::drivers::MonitorError;
use crate::types::Sample;
/// Most recent samples of the window, laid out sideways for a spreadsheet:
/// one row per value stream, one column per sample.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportBatch {
    /// Session counter written in front of the value-A row.
    pub session: u32,
    /// Configured batch length; the header always labels this many columns,
    /// even when the window held fewer samples.
    pub columns: usize,
    pub samples: Vec<Sample>,
}
impl ExportBatch {
    pub fn from_window(window: &RollingWindow, len: usize, session: u32) -> Self {
        Self {
            session,
            columns: len,
            samples: window.latest(len),
        }
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    /// Header written once, when the sheet is still empty: a caption cell
    /// followed by the column indices.
    pub fn header_row(&self) -> Vec<Cell> {
        std::iter::once(Cell::Text("Session".to_owned()))
            .chain((0..self.columns.max(self.samples.len())).map(|i| Cell::Number(i as f64)))
            .collect()
    }
    /// `[session, a0, a1, ...]` and `[blank, b0, b1, ...]`.
    pub fn value_rows(&self) -> [Vec<Cell>; 2] {
        let stream_a = std::iter::once(Cell::Number(self.session as f64))
            .chain(self.samples.iter().map(|s| Cell::Number(s.value_a)))
            .collect();
        let stream_b = std::iter::once(Cell::Empty)
            .chain(self.samples.iter().map(|s| Cell::Number(s.value_b)))
            .collect();
        [stream_a, stream_b]
    }
}
/// Result of one successful append.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    /// The file did not exist before this export.
    pub created: bool,
    pub header_written: bool,
    pub first_row: u32,
    pub rows_written: usize,
}
/// Appends `batch` to `sheet_name` of the workbook at `path`.
///
/// The file and sheet are created when missing. Rows go directly below the
/// last populated row; the header is only written into an empty sheet.
/// On any error the file on disk is left as it was.
pub fn append(
    batch: &ExportBatch,
    path: impl AsRef<Path>,
    sheet_name: &str,
) -> Result<ExportReport, MonitorError> {
    let mut book = Workbook::open_or_create(path)?;
    let created = book.is_new();
    let header_written = book.last_row(sheet_name)?.unwrap_or(0) == 0;
    let mut rows = Vec::with_capacity(3);
    if header_written {
        rows.push(batch.header_row());
    }
    rows.extend(batch.value_rows());
    let summary = book.append_rows(sheet_name, &rows)?;
    let path = book.save()?;
    info!(
        "export #{} -> {} [{}] rows {}..={}{}",
        batch.session,
        path.display(),
        sheet_name,
        summary.first_row,
        summary.last_row,
        if created { " (new file)" } else { "" }
    );
    Ok(ExportReport {
        path,
        created,
        header_written,
        first_row: summary.first_row,
        rows_written: rows.len(),
    })
}
/// Holds the export destination and the session counter across clicks.
#[derive(Debug)]
pub struct SnapshotExporter {
    export_dir: PathBuf,
    file_name_format: String,
    sheet_name: String,
    batch_len: usize,
    destination: Option<PathBuf>,
    session: u32,
}
impl SnapshotExporter {
    pub fn new(
        export_dir: impl Into<PathBuf>,
        file_name_format: impl Into<String>,
        sheet_name: impl Into<String>,
        batch_len: usize,
    ) -> Self {
        Self {
            export_dir: export_dir.into(),
            file_name_format: file_name_format.into(),
            sheet_name: sheet_name.into(),
            batch_len,
            destination: None,
            session: 0,
        }
    }
    /// File chosen on the first export, if any.
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }
    pub fn session(&self) -> u32 {
        self.session
    }
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }
    /// Bumps the session counter and appends the latest samples. The
    /// destination name is fixed from local time on the first call.
    pub fn export(&mut self, window: &RollingWindow) -> Result<ExportReport, MonitorError> {
        self.session += 1;
        let destination = match &self.destination {
            Some(path) => path.clone(),
            None => {
                let mut name = String::new();
                write!(name, "{}", chrono::Local::now().format(&self.file_name_format))
                    .map_err(|_| MonitorError::FileNameFormat(self.file_name_format.clone()))?;
                let path = self.export_dir.join(name);
                self.destination = Some(path.clone());
                path
            }
        };
        let batch = ExportBatch::from_window(window, self.batch_len, self.session);
        append(&batch, destination, &self.sheet_name)
    }
}
