//! Trip file readers.
//!
//! Recordings are comma-delimited text with a header row. Quotes are
//! stripped, header names are case-insensitive, and the first row whose
//! column count disagrees with the first data row is treated as a truncated
//! tail (the recorder may have been killed mid-write). A `.gz` sibling is
//! read transparently when the plain file is absent.

use crate::config::GZIP_EXTENSION;
use crate::error::{CalResult, CalibrationError};
use crate::types::{AccelData, Millis, SpeedSample, TimeSeries};
use flate2::read::GzDecoder;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const OBD_SPEED_SUFFIX: &str = "km/h";
const NETWORK_PROVIDER: &str = "network";

// Accelerometer columns are positional: older recordings carry headers
// that do not match their content.
const ACC_TIME_COLUMN: usize = 1;
const ACC_AXIS_COLUMNS: [usize; 3] = [3, 4, 5];
const GPS_TIME_COLUMN: usize = 1;
const GPS_SPEED_COLUMN: usize = 4;
const OBD_TIME_COLUMN: &str = "timestamp";
const OBD_SPEED_COLUMN: &str = "speed";

/// Column selector, by position or by case-insensitive header name
#[derive(Clone, Copy, Debug)]
pub enum Column<'a> {
    Index(usize),
    Name(&'a str),
}

/// One complete data row with its 1-based line number in the file
#[derive(Clone, Debug)]
pub struct Row {
    pub line: usize,
    pub cells: Vec<String>,
}

/// Parsed delimited file
#[derive(Clone, Debug)]
pub struct DelimitedTable {
    path: PathBuf,
    header: Vec<String>,
    rows: Vec<Row>,
    truncated: bool,
}

impl DelimitedTable {
    pub fn parse(text: &str, path: &Path) -> Self {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.replace('"', "")))
            .filter(|(_, line)| !line.trim().is_empty());

        let header = lines
            .next()
            .map(|(_, line)| {
                line.trim()
                    .split(',')
                    .map(|name| name.trim().to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        let mut rows = Vec::new();
        let mut width = None;
        let mut truncated = false;
        for (line, content) in lines {
            let cells: Vec<String> = content
                .trim()
                .split(',')
                .map(|c| c.trim().to_string())
                .collect();
            match width {
                None => width = Some(cells.len()),
                Some(w) if w != cells.len() => {
                    truncated = true;
                    break;
                }
                Some(_) => {}
            }
            rows.push(Row { line, cells });
        }

        DelimitedTable {
            path: path.to_path_buf(),
            header,
            rows,
            truncated,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Resolve a selector to a cell index
    pub fn column_index(&self, column: Column<'_>) -> CalResult<usize> {
        match column {
            Column::Index(index) => Ok(index),
            Column::Name(name) => {
                let wanted = name.to_lowercase();
                self.header
                    .iter()
                    .position(|h| *h == wanted)
                    .ok_or_else(|| {
                        CalibrationError::malformed(&self.path, 1, format!("no column named '{}'", name))
                    })
            }
        }
    }

    /// Cell at `index` of `row`, or a `MalformedInput` naming the line
    pub fn cell<'r>(&self, row: &'r Row, index: usize) -> CalResult<&'r str> {
        row.cells.get(index).map(String::as_str).ok_or_else(|| {
            CalibrationError::malformed(
                &self.path,
                row.line,
                format!("expected at least {} columns, found {}", index + 1, row.cells.len()),
            )
        })
    }

    /// Convert each row with `convert`, which skips a row by returning
    /// `Ok(None)`. When no row was cut by width, a last row that fails to
    /// parse is the recorder's truncated final write and is dropped; a bad
    /// row anywhere else is an error.
    pub fn collect<T, F>(&self, mut convert: F) -> CalResult<Vec<T>>
    where
        F: FnMut(&Row) -> CalResult<Option<T>>,
    {
        let last = self.rows.len().saturating_sub(1);
        let mut values = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            match convert(row) {
                Ok(Some(value)) => values.push(value),
                Ok(None) => {}
                Err(CalibrationError::MalformedInput { .. }) if i == last && !self.truncated => {
                    log::debug!(
                        "{}: dropping unparsable last line {}",
                        self.path.display(),
                        row.line
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(values)
    }

    fn number(&self, row: &Row, index: usize) -> CalResult<f64> {
        let cell = self.cell(row, index)?;
        cell.parse::<f64>()
            .map_err(|_| CalibrationError::malformed(&self.path, row.line, format!("'{}' is not a number", cell)))
    }

    fn millis(&self, row: &Row, index: usize) -> CalResult<Millis> {
        let cell = self.cell(row, index)?;
        parse_millis(cell).ok_or_else(|| {
            CalibrationError::malformed(&self.path, row.line, format!("'{}' is not a timestamp", cell))
        })
    }
}

/// Integer milliseconds; an integral decimal such as `"1521590000000.0"` is accepted.
pub fn parse_millis(cell: &str) -> Option<Millis> {
    if let Ok(value) = cell.parse::<Millis>() {
        return Some(value);
    }
    let value = cell.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as Millis)
    } else {
        None
    }
}

/// Strip the OBD unit suffix: `"42km/h"` -> `Some(42.0)`. Empty cells yield `None`.
pub fn parse_obd_speed(cell: &str) -> Option<Result<f64, String>> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    let number = trimmed
        .strip_suffix(OBD_SPEED_SUFFIX)
        .unwrap_or(trimmed)
        .trim();
    Some(
        number
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a speed", cell)),
    )
}

/// The file itself, or its `.gz` sibling, whichever exists first
pub fn resolve(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let mut gz: OsString = path.as_os_str().to_owned();
    gz.push(".");
    gz.push(GZIP_EXTENSION);
    let gz = PathBuf::from(gz);
    gz.is_file().then_some(gz)
}

/// Read a whole file as text, decompressing `.gz` files
pub fn read_text(path: &Path) -> CalResult<String> {
    let file = File::open(path).map_err(CalibrationError::io(path))?;
    let mut text = String::new();
    if path.extension().map(|e| e == GZIP_EXTENSION).unwrap_or(false) {
        BufReader::new(GzDecoder::new(file))
            .read_to_string(&mut text)
            .map_err(CalibrationError::io(path))?;
    } else {
        BufReader::new(file)
            .read_to_string(&mut text)
            .map_err(CalibrationError::io(path))?;
    }
    Ok(text)
}

fn load_table(path: &Path) -> CalResult<Option<DelimitedTable>> {
    match resolve(path) {
        Some(actual) => {
            let text = read_text(&actual)?;
            let table = DelimitedTable::parse(&text, &actual);
            if table.is_truncated() {
                log::debug!("{}: ignoring truncated tail", actual.display());
            }
            Ok(Some(table))
        }
        None => Ok(None),
    }
}

/// Read `sys_time, raw_x, raw_y, raw_z` from an accelerometer recording
pub fn read_accelerometer(path: &Path) -> CalResult<TimeSeries<AccelData>> {
    let table = load_table(path)?
        .ok_or_else(|| CalibrationError::MissingAccelerometerFile(path.to_path_buf()))?;

    let [xi, yi, zi] = ACC_AXIS_COLUMNS;
    let samples = table.collect(|row| {
        Ok(Some(AccelData::new(
            table.millis(row, ACC_TIME_COLUMN)?,
            table.number(row, xi)?,
            table.number(row, yi)?,
            table.number(row, zi)?,
        )))
    })?;
    TimeSeries::new(samples)
}

/// Read `(sys_time, speed m/s)` from a GPS recording, skipping network fixes.
/// Returns `Ok(None)` when the file does not exist.
pub fn read_gps(path: &Path) -> CalResult<Option<TimeSeries<SpeedSample>>> {
    let table = match load_table(path)? {
        Some(table) => table,
        None => return Ok(None),
    };

    let samples = table.collect(|row| {
        if row.cells.last().map(|c| c == NETWORK_PROVIDER).unwrap_or(false) {
            return Ok(None);
        }
        Ok(Some(SpeedSample::new(
            table.millis(row, GPS_TIME_COLUMN)?,
            table.number(row, GPS_SPEED_COLUMN)?,
        )))
    })?;
    TimeSeries::new(samples).map(Some)
}

/// Read `(timestamp, speed km/h)` from an OBD recording.
/// Rows with an empty speed cell are skipped.
pub fn read_obd(path: &Path) -> CalResult<TimeSeries<SpeedSample>> {
    let table = load_table(path)?
        .ok_or_else(|| CalibrationError::MissingRequiredObd(path.to_path_buf()))?;
    let time_col = table.column_index(Column::Name(OBD_TIME_COLUMN))?;
    let speed_col = table.column_index(Column::Name(OBD_SPEED_COLUMN))?;

    let samples = table.collect(|row| {
        let speed = match parse_obd_speed(table.cell(row, speed_col)?) {
            Some(Ok(speed)) => speed,
            Some(Err(reason)) => return Err(CalibrationError::malformed(path, row.line, reason)),
            None => return Ok(None),
        };
        Ok(Some(SpeedSample::new(table.millis(row, time_col)?, speed)))
    })?;
    TimeSeries::new(samples)
}

/// Structural OBD check: a header line exists, the first data row's first
/// column parses as a number and its speed cell is not blank. Absent or
/// unreadable files are invalid.
pub fn obd_is_valid(path: &Path) -> bool {
    let table = match load_table(path) {
        Ok(Some(table)) => table,
        Ok(None) => return false,
        Err(e) => {
            log::debug!("OBD file unreadable: {}", e);
            return false;
        }
    };
    if table.header().is_empty() {
        return false;
    }
    let first = match table.rows().first() {
        Some(row) => row,
        None => return false,
    };
    let numeric_time = first
        .cells
        .first()
        .map(|cell| cell.parse::<f64>().is_ok())
        .unwrap_or(false);
    let has_speed = table
        .column_index(Column::Name(OBD_SPEED_COLUMN))
        .ok()
        .and_then(|index| first.cells.get(index))
        .map(|cell| !cell.is_empty())
        .unwrap_or(false);
    numeric_time && has_speed
}
