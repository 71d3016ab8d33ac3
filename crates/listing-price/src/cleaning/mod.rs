//! Turns a raw InsideAirbnb `listings.csv` export into the compact feature
//! table the training job consumes.

mod parse;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::info;

pub use parse::{simple_bath, to_euro};

/// Column holding the nightly price.
pub const TARGET_COLUMN: &str = "price";

/// Output columns in the order they are written, when present in the input.
pub const FEATURE_CANDIDATES: [&str; 9] = [
    "room_type",
    "neighbourhood",
    "accommodates",
    "bedrooms",
    "bathrooms_num",
    "minimum_nights",
    "number_of_reviews",
    "reviews_per_month",
    "availability_365",
];

const NUMERIC_COLUMNS: [&str; 6] = [
    "accommodates",
    "bedrooms",
    "minimum_nights",
    "number_of_reviews",
    "reviews_per_month",
    "availability_365",
];

#[derive(Debug)]
pub enum CleaningError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingPrice,
    NoRowsLeft { rows_read: usize },
}

impl std::fmt::Display for CleaningError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleaningError::Io(err) => write!(f, "failed to access listings file: {}", err),
            CleaningError::Csv(err) => write!(f, "invalid listings CSV data: {}", err),
            CleaningError::MissingPrice => {
                write!(f, "column '{}' not found in input data", TARGET_COLUMN)
            }
            CleaningError::NoRowsLeft { rows_read } => write!(
                f,
                "no rows left after dropping incomplete listings ({} read); check input columns",
                rows_read
            ),
        }
    }
}

impl std::error::Error for CleaningError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CleaningError::Io(err) => Some(err),
            CleaningError::Csv(err) => Some(err),
            CleaningError::MissingPrice | CleaningError::NoRowsLeft { .. } => None,
        }
    }
}

impl From<std::io::Error> for CleaningError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CleaningError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Outcome of a cleaning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleaningSummary {
    pub rows_read: usize,
    pub rows_written: usize,
    pub columns: Vec<String>,
}

/// Where a derived output column is read from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Text(usize),
    Numeric(usize),
    Euro(usize),
    BathroomText(usize),
    Absent,
}

impl Source {
    fn extract(self, record: &csv::StringRecord) -> Option<String> {
        let raw = match self {
            Source::Absent => return None,
            Source::Text(index)
            | Source::Numeric(index)
            | Source::Euro(index)
            | Source::BathroomText(index) => record.get(index)?.trim(),
        };
        if raw.is_empty() {
            return None;
        }

        let value = match self {
            Source::Text(_) => return Some(raw.to_string()),
            Source::Numeric(_) => raw.parse::<f64>().ok().filter(|v| v.is_finite())?,
            Source::Euro(_) => to_euro(raw)?,
            Source::BathroomText(_) => simple_bath(raw)?,
            Source::Absent => return None,
        };
        Some(value.to_string())
    }
}

pub struct ListingCleaner;

impl ListingCleaner {
    pub fn from_path<P: AsRef<Path>, Q: AsRef<Path>>(
        input: P,
        output: Q,
    ) -> Result<CleaningSummary, CleaningError> {
        let reader = File::open(input)?;
        let mut cleaned = Vec::new();
        let summary = Self::from_reader(reader, &mut cleaned)?;

        // Nothing touches `output` until the table is known to be complete.
        if let Some(parent) = output.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(output, cleaned)?;
        Ok(summary)
    }

    /// Reads raw listings from `reader` and writes the cleaned table to
    /// `writer`. Rows missing any output value are dropped.
    pub fn from_reader<R: Read, W: Write>(
        reader: R,
        writer: W,
    ) -> Result<CleaningSummary, CleaningError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers: HashMap<String, usize> = csv_reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(index, name)| (name.to_string(), index))
            .collect();

        let price = *headers
            .get(TARGET_COLUMN)
            .ok_or(CleaningError::MissingPrice)?;
        let columns = output_columns(&headers);
        let sources: Vec<Source> = columns
            .iter()
            .map(|column| source_for(column, &headers))
            .chain(std::iter::once(Source::Euro(price)))
            .collect();

        let mut rows_read = 0;
        let mut kept = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows_read += 1;

            let values: Option<Vec<String>> =
                sources.iter().map(|source| source.extract(&record)).collect();
            kept.extend(values);
        }

        if kept.is_empty() {
            return Err(CleaningError::NoRowsLeft { rows_read });
        }

        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut header_row: Vec<&str> = columns.iter().map(String::as_str).collect();
        header_row.push(TARGET_COLUMN);
        csv_writer.write_record(&header_row)?;
        for values in &kept {
            csv_writer.write_record(values)?;
        }
        csv_writer.flush()?;

        let rows_written = kept.len();

        info!(rows_read, rows_written, "listings cleaned");

        let mut columns = columns;
        columns.push(TARGET_COLUMN.to_string());
        Ok(CleaningSummary {
            rows_read,
            rows_written,
            columns,
        })
    }
}

/// `neighbourhood` and `bathrooms_num` are always derived; the rest are kept
/// only when the export carries them.
fn output_columns(headers: &HashMap<String, usize>) -> Vec<String> {
    FEATURE_CANDIDATES
        .iter()
        .filter(|column| {
            matches!(**column, "neighbourhood" | "bathrooms_num") || headers.contains_key(**column)
        })
        .map(|column| column.to_string())
        .collect()
}

fn source_for(column: &str, headers: &HashMap<String, usize>) -> Source {
    match column {
        "neighbourhood" => headers
            .get("neighbourhood_cleansed")
            .or_else(|| headers.get("neighbourhood"))
            .map_or(Source::Absent, |index| Source::Text(*index)),
        "bathrooms_num" => match (headers.get("bathrooms"), headers.get("bathrooms_text")) {
            (Some(index), _) => Source::Numeric(*index),
            (None, Some(index)) => Source::BathroomText(*index),
            (None, None) => Source::Absent,
        },
        numeric if NUMERIC_COLUMNS.contains(&numeric) => headers
            .get(numeric)
            .map_or(Source::Absent, |index| Source::Numeric(*index)),
        other => headers
            .get(other)
            .map_or(Source::Absent, |index| Source::Text(*index)),
    }
}
