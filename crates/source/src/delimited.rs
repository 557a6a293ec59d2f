//! Delimited text (CSV) file source.
//!
//! The first row of every file names the columns; each following row becomes
//! one item whose attributes are the row's cells under those names. Cells are
//! `Text` when they are valid UTF-8 and `Bytes` otherwise. Rows shorter than
//! the header simply lack the trailing attributes, and cells past the last
//! named column are dropped.
//!
//! Like [`JsonLinesSource`](crate::JsonLinesSource), a source can point at a
//! single file or at a directory of `*.csv` files read in name order.

use crate::error::{ErrorKind, Result};
use crate::files::listing;
use crate::{ItemStream, Source};
use async_stream::stream;
use async_trait::async_trait;
use csv::{ByteRecord, ReaderBuilder};
use exn::ResultExt;
use recon_model::{SourceItem, Value, normalize_name};
use std::path::{Path, PathBuf};
use tokio::fs;

const EXTENSION: &str = "csv";

#[derive(Debug, Clone)]
pub struct CsvSource {
    key: String,
    path: PathBuf,
    normalize: bool,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            normalize: false,
            delimiter: b',',
        }
    }

    /// Normalize column names (and the key) with
    /// [`normalize_name`](recon_model::normalize_name) as items are read.
    pub fn normalized(mut self, normalize: bool) -> Self {
        if normalize {
            self.key = normalize_name(&self.key);
        }
        self.normalize = normalize;
        self
    }

    /// Separate cells with `delimiter` instead of a comma.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn item(&self, columns: &[String], record: &ByteRecord) -> Result<SourceItem> {
        let attributes = columns.iter().zip(record.iter()).map(|(name, cell)| (name, cell_value(cell)));
        let item = match self.normalize {
            true => SourceItem::normalized(&self.key, attributes),
            false => SourceItem::new(self.key.clone(), attributes),
        };
        item.validate().or_raise(|| ErrorKind::InvalidItem)?;
        Ok(item)
    }
}

fn cell_value(cell: &[u8]) -> Value {
    match std::str::from_utf8(cell) {
        Ok(text) => Value::from(text),
        Err(_) => Value::Bytes(cell.to_vec()),
    }
}

#[async_trait]
impl Source for CsvSource {
    fn key(&self) -> &str {
        &self.key
    }

    fn items(&self) -> ItemStream<'_> {
        Box::pin(stream! {
            let files = match listing(&self.path, EXTENSION).await {
                Ok(files) => files,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            for file in files {
                let contents = match fs::read(&file).await.or_raise(|| ErrorKind::Io(file.clone())) {
                    Ok(contents) => contents,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                let mut reader = ReaderBuilder::new()
                    .delimiter(self.delimiter)
                    .flexible(true)
                    .from_reader(contents.as_slice());
                let columns: Vec<String> = match reader.byte_headers().or_raise(|| ErrorKind::InvalidHeader(file.clone())) {
                    Ok(headers) => headers.iter().map(|name| String::from_utf8_lossy(name).into_owned()).collect(),
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                for row in reader.byte_records() {
                    let parsed = row.map(|record| (record.position().map_or(0, |position| position.line()), record));
                    let (line, record) = match parsed {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            let line = e.position().map_or(0, |position| position.line());
                            tracing::debug!(path = %file.display(), line, error = %e, "Skipping source entry");
                            continue;
                        },
                    };
                    match self.item(&columns, &record) {
                        Ok(item) => yield Ok(item),
                        Err(e) => {
                            tracing::debug!(path = %file.display(), line, error = ?e, "Skipping source entry");
                        },
                    }
                }
            }
        })
    }
}
