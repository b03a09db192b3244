use std::path::PathBuf;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("invalid workbook: {0}")]
    InvalidWorkbook(String),
    #[error("invalid export file name format: {0:?}")]
    FileNameFormat(String),
    #[error("nothing has been exported yet")]
    NothingExported,
    #[error("exported file not found: {}", .0.display())]
    ExportMissing(PathBuf),
}
impl From<quick_xml::events::attributes::AttrError> for MonitorError {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        MonitorError::Xml(quick_xml::Error::from(value))
    }
}
impl From<quick_xml::escape::EscapeError> for MonitorError {
    fn from(value: quick_xml::escape::EscapeError) -> Self {
        MonitorError::Xml(quick_xml::Error::from(value))
    }
}
impl From<tempfile::PersistError> for MonitorError {
    fn from(value: tempfile::PersistError) -> Self {
        MonitorError::Io(value.error)
    }
}
