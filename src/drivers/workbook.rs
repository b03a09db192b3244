//! Minimal Office Open XML (`.xlsx`) package editing.
//!
//! A workbook is a ZIP archive of XML parts. Only the parts an append has to
//! touch are parsed and rewritten; every other entry is copied raw, so
//! unrelated worksheets keep their exact bytes. Saving goes through a
//! temporary file in the target directory that replaces the original only
//! once the new archive is complete.
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::drivers::MonitorError;

const CONTENT_TYPES: &str = "[Content_Types].xml";
const PACKAGE_RELS: &str = "_rels/.rels";
const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

const EMPTY_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#;

const EMPTY_PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const EMPTY_WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets></sheets></workbook>"#;

const EMPTY_WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

const EMPTY_WORKSHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1"/><sheetData/></worksheet>"#;

/// Value of one spreadsheet cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

/// A row as read back from a sheet: 1-based row index and `(column, value)`
/// pairs with 0-based columns.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetRow {
    pub index: u32,
    pub cells: Vec<(u32, Cell)>,
}

impl SheetRow {
    /// Cell at 0-based `column`, `Cell::Empty` when absent.
    pub fn cell(&self, column: u32) -> Cell {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.clone())
            .unwrap_or(Cell::Empty)
    }
}

/// Where an append landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppendSummary {
    pub first_row: u32,
    pub last_row: u32,
    pub sheet_created: bool,
}

#[derive(Clone, Debug)]
struct SheetEntry {
    name: String,
    sheet_id: u32,
    part: String,
}

pub struct Workbook {
    path: PathBuf,
    archive: Option<ZipArchive<BufReader<File>>>,
    // Parts replaced or added since opening, keyed by archive path.
    edits: BTreeMap<String, Vec<u8>>,
}

impl Workbook {
    /// Opens the package at `path`, or starts an empty one that will be
    /// written there on `save`.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Ok(Self::create(path))
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let archive = ZipArchive::new(BufReader::new(file))?;
        let workbook = Self {
            path,
            archive: Some(archive),
            edits: BTreeMap::new(),
        };
        if !workbook.has_part(WORKBOOK) {
            return Err(MonitorError::InvalidWorkbook(format!(
                "{} has no {WORKBOOK}",
                workbook.path.display()
            )));
        }
        Ok(workbook)
    }

    fn create(path: &Path) -> Self {
        let edits = [
            (CONTENT_TYPES, EMPTY_CONTENT_TYPES),
            (PACKAGE_RELS, EMPTY_PACKAGE_RELS),
            (WORKBOOK, EMPTY_WORKBOOK),
            (WORKBOOK_RELS, EMPTY_WORKBOOK_RELS),
        ]
        .into_iter()
        .map(|(name, xml)| (name.to_owned(), xml.as_bytes().to_vec()))
        .collect();
        Self {
            path: path.to_path_buf(),
            archive: None,
            edits,
        }
    }

    /// True until the package has been written to disk for the first time.
    pub fn is_new(&self) -> bool {
        self.archive.is_none()
    }

    pub fn sheet_names(&mut self) -> Result<Vec<String>, MonitorError> {
        Ok(self.sheets()?.into_iter().map(|s| s.name).collect())
    }

    /// Highest populated row of `sheet` (1-based), `Some(0)` for an empty
    /// sheet and `None` when no such sheet exists.
    pub fn last_row(&mut self, sheet: &str) -> Result<Option<u32>, MonitorError> {
        let Some(entry) = self.find_sheet(sheet)? else {
            return Ok(None);
        };
        let xml = self.require_part(&entry.part)?;
        Ok(Some(scan_extent(&xml)?.last_row))
    }

    /// All rows of `sheet`, or `None` when the sheet does not exist.
    pub fn read_sheet(&mut self, sheet: &str) -> Result<Option<Vec<SheetRow>>, MonitorError> {
        let Some(entry) = self.find_sheet(sheet)? else {
            return Ok(None);
        };
        let xml = self.require_part(&entry.part)?;
        let shared = match self.part(SHARED_STRINGS)? {
            Some(sst) => parse_shared_strings(&sst)?,
            None => Vec::new(),
        };
        parse_rows(&xml, &shared).map(Some)
    }

    /// Appends `rows` directly below the last populated row of `sheet`,
    /// creating the sheet when it is missing.
    pub fn append_rows(
        &mut self,
        sheet: &str,
        rows: &[Vec<Cell>],
    ) -> Result<AppendSummary, MonitorError> {
        let (entry, sheet_created) = match self.find_sheet(sheet)? {
            Some(entry) => (entry, false),
            None => (self.add_sheet(sheet)?, true),
        };
        let xml = self.require_part(&entry.part)?;
        let extent = scan_extent(&xml)?;
        let first_row = extent.last_row + 1;
        let rows_width = rows.iter().map(|r| r.len() as u32).max().unwrap_or(0);
        let last_row = extent.last_row + rows.len() as u32;
        let width = extent.columns.max(rows_width).max(1);
        let dimension = format!("A1:{}{}", column_name(width - 1), last_row.max(1));
        let updated = splice_rows(&xml, first_row, rows, &dimension)?;
        self.edits.insert(entry.part, updated);
        Ok(AppendSummary {
            first_row,
            last_row,
            sheet_created,
        })
    }

    /// Writes the package to its path. Parts that were not edited are copied
    /// without recompression.
    pub fn save(mut self) -> Result<PathBuf, MonitorError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = NamedTempFile::new_in(&dir)?;
        if self.path.exists() {
            let permissions = std::fs::metadata(&self.path)?.permissions();
            temp.as_file().set_permissions(permissions)?;
        }
        let mut zip = ZipWriter::new(temp);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut pending = std::mem::take(&mut self.edits);
        if let Some(archive) = self.archive.as_mut() {
            for i in 0..archive.len() {
                let entry = archive.by_index_raw(i)?;
                match pending.remove(entry.name()) {
                    Some(bytes) => {
                        zip.start_file(entry.name().to_owned(), options)?;
                        zip.write_all(&bytes)?;
                    }
                    None => zip.raw_copy_file(entry)?,
                }
            }
        }
        // Fresh packages conventionally lead with the content types part.
        if let Some(bytes) = pending.remove(CONTENT_TYPES) {
            zip.start_file(CONTENT_TYPES, options)?;
            zip.write_all(&bytes)?;
        }
        for (name, bytes) in pending {
            zip.start_file(name, options)?;
            zip.write_all(&bytes)?;
        }
        let temp = zip.finish()?;
        // Release our handle before replacing the file.
        self.archive = None;
        temp.persist(&self.path)?;
        Ok(self.path)
    }

    fn has_part(&self, name: &str) -> bool {
        self.edits.contains_key(name)
            || self
                .archive
                .as_ref()
                .map(|a| a.file_names().any(|n| n == name))
                .unwrap_or(false)
    }

    fn part(&mut self, name: &str) -> Result<Option<Vec<u8>>, MonitorError> {
        if let Some(bytes) = self.edits.get(name) {
            return Ok(Some(bytes.clone()));
        }
        let Some(archive) = self.archive.as_mut() else {
            return Ok(None);
        };
        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    fn require_part(&mut self, name: &str) -> Result<Vec<u8>, MonitorError> {
        self.part(name)?
            .ok_or_else(|| MonitorError::InvalidWorkbook(format!("missing part {name}")))
    }

    fn find_sheet(&mut self, name: &str) -> Result<Option<SheetEntry>, MonitorError> {
        Ok(self.sheets()?.into_iter().find(|s| s.name == name))
    }

    fn sheets(&mut self) -> Result<Vec<SheetEntry>, MonitorError> {
        let workbook = self.require_part(WORKBOOK)?;
        let rels = match self.part(WORKBOOK_RELS)? {
            Some(bytes) => parse_relationships(&bytes)?,
            None => Vec::new(),
        };
        let mut sheets = Vec::new();
        for (name, sheet_id, rel_id) in parse_sheet_list(&workbook)? {
            let target = rels
                .iter()
                .find(|r| r.id == rel_id)
                .map(|r| resolve_target(&r.target))
                .ok_or_else(|| {
                    MonitorError::InvalidWorkbook(format!("sheet {name} has no relationship {rel_id}"))
                })?;
            sheets.push(SheetEntry {
                name,
                sheet_id,
                part: target,
            });
        }
        Ok(sheets)
    }

    fn add_sheet(&mut self, name: &str) -> Result<SheetEntry, MonitorError> {
        let existing = self.sheets()?;
        let sheet_id = existing.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1;
        let part_number = (1..)
            .find(|n| !self.has_part(&format!("xl/worksheets/sheet{n}.xml")))
            .unwrap_or(1);
        let part = format!("xl/worksheets/sheet{part_number}.xml");

        let rels_xml = self.require_part(WORKBOOK_RELS)?;
        let used_ids: HashSet<String> = parse_relationships(&rels_xml)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let rel_id = (1..)
            .map(|n| format!("rId{n}"))
            .find(|id| !used_ids.contains(id))
            .unwrap_or_else(|| "rId1".to_owned());

        let mut relationship = BytesStart::new("Relationship");
        relationship.push_attribute(("Id", rel_id.as_str()));
        relationship.push_attribute(("Type", REL_WORKSHEET));
        let target = format!("worksheets/sheet{part_number}.xml");
        relationship.push_attribute(("Target", target.as_str()));
        let rels_xml = insert_before_close(&rels_xml, "Relationships", relationship)?;

        let workbook_xml = self.require_part(WORKBOOK)?;
        let mut sheet = BytesStart::new("sheet");
        sheet.push_attribute(("name", name));
        let sheet_id_text = sheet_id.to_string();
        sheet.push_attribute(("sheetId", sheet_id_text.as_str()));
        sheet.push_attribute(("r:id", rel_id.as_str()));
        let workbook_xml = insert_before_close(&workbook_xml, "sheets", sheet)?;

        let types_xml = self.require_part(CONTENT_TYPES)?;
        let mut override_part = BytesStart::new("Override");
        let part_name = format!("/{part}");
        override_part.push_attribute(("PartName", part_name.as_str()));
        override_part.push_attribute(("ContentType", CT_WORKSHEET));
        let types_xml = insert_before_close(&types_xml, "Types", override_part)?;

        self.edits.insert(WORKBOOK_RELS.to_owned(), rels_xml);
        self.edits.insert(WORKBOOK.to_owned(), workbook_xml);
        self.edits.insert(CONTENT_TYPES.to_owned(), types_xml);
        self.edits
            .insert(part.clone(), EMPTY_WORKSHEET.as_bytes().to_vec());
        Ok(SheetEntry {
            name: name.to_owned(),
            sheet_id,
            part,
        })
    }
}

/// `0 -> "A"`, `25 -> "Z"`, `26 -> "AA"`.
pub fn column_name(mut index: u32) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Splits `"AB12"` into (0-based column, 1-based row).
fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut column: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        column = column
            .checked_mul(26)?
            .checked_add(c as u32 - 'A' as u32 + 1)?;
    }
    let row = digits.parse().ok()?;
    Some((column - 1, row))
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, MonitorError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// The `r:id` attribute, whatever prefix the relationships namespace uses.
fn relationship_id(e: &BytesStart<'_>) -> Result<Option<String>, MonitorError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

struct Relationship {
    id: String,
    target: String,
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, MonitorError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attribute(e, "Id")?, attribute(e, "Target")?) {
                    out.push(Relationship { id, target });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn parse_sheet_list(xml: &[u8]) -> Result<Vec<(String, u32, String)>, MonitorError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(e, "name")?
                    .ok_or_else(|| MonitorError::InvalidWorkbook("sheet without name".into()))?;
                let sheet_id = attribute(e, "sheetId")?
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let rel_id = relationship_id(e)?.ok_or_else(|| {
                    MonitorError::InvalidWorkbook(format!("sheet {name} has no r:id"))
                })?;
                out.push((name, sheet_id, rel_id));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_owned(),
        None => format!("xl/{target}"),
    }
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, MonitorError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Text(ref t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape()?);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => out.extend(current.take()),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

struct Extent {
    last_row: u32,
    columns: u32,
}

/// Highest row number and column count present in a worksheet part.
fn scan_extent(xml: &[u8]) -> Result<Extent, MonitorError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut extent = Extent {
        last_row: 0,
        columns: 0,
    };
    let mut current_row = 0;
    let mut next_column = 0;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = attribute(e, "r")?
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(current_row + 1);
                    extent.last_row = extent.last_row.max(current_row);
                    next_column = 0;
                }
                b"c" => {
                    let column = attribute(e, "r")?
                        .and_then(|r| parse_cell_ref(&r))
                        .map(|(c, _)| c)
                        .unwrap_or(next_column);
                    next_column = column + 1;
                    extent.columns = extent.columns.max(next_column);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(extent)
}

fn parse_rows(xml: &[u8], shared: &[String]) -> Result<Vec<SheetRow>, MonitorError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<SheetRow> = Vec::new();
    let mut next_column = 0;
    let mut cell_type = String::new();
    let mut cell_column = 0;
    let mut text = String::new();
    let mut capture = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"row" => {
                let previous = rows.last().map(|r| r.index).unwrap_or(0);
                let index = attribute(e, "r")?
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(previous + 1);
                rows.push(SheetRow {
                    index,
                    cells: Vec::new(),
                });
                next_column = 0;
            }
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"c" => {
                    cell_column = attribute(e, "r")?
                        .and_then(|r| parse_cell_ref(&r))
                        .map(|(c, _)| c)
                        .unwrap_or(next_column);
                    next_column = cell_column + 1;
                    cell_type = attribute(e, "t")?.unwrap_or_default();
                    text.clear();
                }
                b"v" | b"t" => capture = true,
                _ => {}
            },
            Event::Text(ref t) if capture => text.push_str(&t.unescape()?),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    let value = match cell_type.as_str() {
                        "s" => text
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i))
                            .map(|s| Cell::Text(s.clone()))
                            .unwrap_or(Cell::Empty),
                        "inlineStr" | "str" => Cell::Text(text.clone()),
                        _ if text.is_empty() => Cell::Empty,
                        _ => text
                            .trim()
                            .parse()
                            .map(Cell::Number)
                            .unwrap_or_else(|_| Cell::Text(text.clone())),
                    };
                    if let Some(row) = rows.last_mut() {
                        row.cells.push((cell_column, value));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn qualified(prefix: &Option<String>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_owned(),
    }
}

fn write_rows(
    writer: &mut Writer<Vec<u8>>,
    prefix: &Option<String>,
    first_row: u32,
    rows: &[Vec<Cell>],
) -> Result<(), MonitorError> {
    let row_tag = qualified(prefix, "row");
    let cell_tag = qualified(prefix, "c");
    let value_tag = qualified(prefix, "v");
    let inline_tag = qualified(prefix, "is");
    let text_tag = qualified(prefix, "t");
    for (offset, cells) in rows.iter().enumerate() {
        let row_number = first_row + offset as u32;
        let row_text = row_number.to_string();
        let mut row = BytesStart::new(row_tag.as_str());
        row.push_attribute(("r", row_text.as_str()));
        let populated: Vec<(usize, &Cell)> = cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| match cell {
                Cell::Empty => false,
                Cell::Number(v) => v.is_finite(),
                Cell::Text(_) => true,
            })
            .collect();
        if populated.is_empty() {
            writer.write_event(Event::Empty(row))?;
            continue;
        }
        writer.write_event(Event::Start(row))?;
        for (column, cell) in populated {
            let reference = format!("{}{}", column_name(column as u32), row_number);
            let mut c = BytesStart::new(cell_tag.as_str());
            c.push_attribute(("r", reference.as_str()));
            match cell {
                Cell::Number(v) => {
                    writer.write_event(Event::Start(c))?;
                    writer.write_event(Event::Start(BytesStart::new(value_tag.as_str())))?;
                    writer.write_event(Event::Text(BytesText::new(&v.to_string())))?;
                    writer.write_event(Event::End(BytesEnd::new(value_tag.as_str())))?;
                }
                Cell::Text(s) => {
                    c.push_attribute(("t", "inlineStr"));
                    writer.write_event(Event::Start(c))?;
                    writer.write_event(Event::Start(BytesStart::new(inline_tag.as_str())))?;
                    writer.write_event(Event::Start(BytesStart::new(text_tag.as_str())))?;
                    writer.write_event(Event::Text(BytesText::new(s)))?;
                    writer.write_event(Event::End(BytesEnd::new(text_tag.as_str())))?;
                    writer.write_event(Event::End(BytesEnd::new(inline_tag.as_str())))?;
                }
                Cell::Empty => continue,
            }
            writer.write_event(Event::End(BytesEnd::new(cell_tag.as_str())))?;
        }
        writer.write_event(Event::End(BytesEnd::new(row_tag.as_str())))?;
    }
    Ok(())
}

fn prefix_of(e: &BytesStart<'_>) -> Option<String> {
    e.name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

/// Streams a worksheet part, inserting `rows` at the end of `<sheetData>` and
/// rewriting `<dimension>`. Everything else passes through untouched.
fn splice_rows(
    xml: &[u8],
    first_row: u32,
    rows: &[Vec<Cell>],
    dimension: &str,
) -> Result<Vec<u8>, MonitorError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + rows.len() * 256));
    let mut buf = Vec::new();
    let mut spliced = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                let prefix = prefix_of(&e);
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e))?;
                write_rows(&mut writer, &prefix, first_row, rows)?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
                spliced = true;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                let prefix = e
                    .name()
                    .prefix()
                    .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
                write_rows(&mut writer, &prefix, first_row, rows)?;
                writer.write_event(Event::End(e))?;
                spliced = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"dimension" => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut updated = BytesStart::new(name);
                updated.push_attribute(("ref", dimension));
                writer.write_event(Event::Empty(updated))?;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    if !spliced {
        return Err(MonitorError::InvalidWorkbook(
            "worksheet has no sheetData".into(),
        ));
    }
    Ok(writer.into_inner())
}

/// Streams `xml`, writing `element` as the last child of the first
/// `container` element.
fn insert_before_close(
    xml: &[u8],
    container: &str,
    element: BytesStart<'_>,
) -> Result<Vec<u8>, MonitorError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));
    let mut buf = Vec::new();
    let mut element = Some(element);
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.local_name().as_ref() == container.as_bytes() && element.is_some() => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e))?;
                if let Some(child) = element.take() {
                    writer.write_event(Event::Empty(child))?;
                }
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Event::End(e) if e.local_name().as_ref() == container.as_bytes() && element.is_some() => {
                if let Some(child) = element.take() {
                    writer.write_event(Event::Empty(child))?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    if element.is_some() {
        return Err(MonitorError::InvalidWorkbook(format!(
            "no <{container}> element to extend"
        )));
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn numbers(values: &[f64]) -> Vec<Cell> {
        values.iter().map(|&v| Cell::Number(v)).collect()
    }

    #[test]
    fn column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
        assert_eq!(parse_cell_ref("AB12"), Some((27, 12)));
        assert_eq!(parse_cell_ref("A1"), Some((0, 1)));
        assert_eq!(parse_cell_ref("12"), None);
        assert_eq!(parse_cell_ref("XFD1048576"), Some((16383, 1_048_576)));
        // Column letters past u32 range are rejected, not wrapped.
        assert_eq!(parse_cell_ref("AAAAAAAA1"), None);
    }

    #[test]
    fn new_workbook_round_trips_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fresh.xlsx");
        let mut book = Workbook::open_or_create(&path).unwrap();
        assert!(book.is_new());
        let summary = book
            .append_rows(
                "Sheet1",
                &[
                    vec![Cell::Text("label".into()), Cell::Number(0.0)],
                    numbers(&[1.5, 2.25]),
                ],
            )
            .unwrap();
        assert_eq!(
            summary,
            AppendSummary {
                first_row: 1,
                last_row: 2,
                sheet_created: true
            }
        );
        book.save().unwrap();

        let mut book = Workbook::open(&path).unwrap();
        assert_eq!(book.sheet_names().unwrap(), vec!["Sheet1".to_owned()]);
        let rows = book.read_sheet("Sheet1").unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cell(0), Cell::Text("label".into()));
        assert_eq!(rows[1].index, 2);
        assert_eq!(rows[1].cell(1), Cell::Number(2.25));
        assert_eq!(book.last_row("Sheet1").unwrap(), Some(2));
        assert_eq!(book.last_row("Nope").unwrap(), None);
    }

    #[test]
    fn text_is_escaped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("escape.xlsx");
        let mut book = Workbook::open_or_create(&path).unwrap();
        book.append_rows("Sheet1", &[vec![Cell::Text("a<b & \"c\"".into())]])
            .unwrap();
        book.save().unwrap();
        let mut book = Workbook::open(&path).unwrap();
        let rows = book.read_sheet("Sheet1").unwrap().unwrap();
        assert_eq!(rows[0].cell(0), Cell::Text("a<b & \"c\"".into()));
    }

    #[test]
    fn adding_a_sheet_keeps_other_parts_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("two.xlsx");
        let mut book = Workbook::open_or_create(&path).unwrap();
        book.append_rows("Sheet1", &[numbers(&[1.0, 2.0])]).unwrap();
        book.save().unwrap();
        let before = raw_entry(&path, "xl/worksheets/sheet1.xml");

        let mut book = Workbook::open(&path).unwrap();
        let summary = book.append_rows("Other", &[numbers(&[9.0])]).unwrap();
        assert!(summary.sheet_created);
        book.save().unwrap();

        let mut book = Workbook::open(&path).unwrap();
        assert_eq!(
            book.sheet_names().unwrap(),
            vec!["Sheet1".to_owned(), "Other".to_owned()]
        );
        assert_eq!(raw_entry(&path, "xl/worksheets/sheet1.xml"), before);
        let other = book.read_sheet("Other").unwrap().unwrap();
        assert_eq!(other[0].cell(0), Cell::Number(9.0));
    }

    #[test]
    fn reads_shared_strings_and_unprefixed_refs() {
        let sheet = br#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row><c t="s"><v>1</v></c><c><v>4</v></c></row><row r="5"><c r="C5"><v>7.5</v></c></row></sheetData></worksheet>"#;
        let sst = br#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><si><t>zero</t></si><si><r><t>o</t></r><r><t>ne</t></r></si></sst>"#;
        let shared = parse_shared_strings(sst).unwrap();
        assert_eq!(shared, vec!["zero".to_owned(), "one".to_owned()]);
        let rows = parse_rows(sheet, &shared).unwrap();
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[0].cell(0), Cell::Text("one".into()));
        assert_eq!(rows[0].cell(1), Cell::Number(4.0));
        assert_eq!(rows[1].cell(2), Cell::Number(7.5));
        let extent = scan_extent(sheet).unwrap();
        assert_eq!(extent.last_row, 5);
        assert_eq!(extent.columns, 3);
    }

    #[test]
    fn splice_handles_prefixed_sheet_data() {
        let sheet = br#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:dimension ref="A1"/><x:sheetData></x:sheetData></x:worksheet>"#;
        let out = splice_rows(sheet, 1, &[numbers(&[3.0])], "A1:A1").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(r#"<x:row r="1"><x:c r="A1"><x:v>3</x:v></x:c></x:row></x:sheetData>"#));
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(Workbook::open(&path), Err(MonitorError::Zip(_))));
        // The original file is left as it was.
        assert_eq!(std::fs::read(&path).unwrap(), b"not a zip");
    }

    fn raw_entry(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        bytes
    }
}
