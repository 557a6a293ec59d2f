//! JSON Lines file source.
//!
//! Each non-blank line holds one JSON object whose members become the item's
//! attributes. A source can point at a single file or at a directory, in
//! which case every `*.jsonl` file inside it is read in name order.

use crate::error::{ErrorKind, Result};
use crate::files::listing;
use crate::{ItemStream, Source};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use recon_model::{SourceItem, Value, normalize_name};
use serde_json::{Map, Value as Json};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

const EXTENSION: &str = "jsonl";

#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    key: String,
    path: PathBuf,
    normalize: bool,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            normalize: false,
        }
    }

    /// Normalize attribute names (and the key) with
    /// [`normalize_name`](recon_model::normalize_name) as items are read.
    pub fn normalized(mut self, normalize: bool) -> Self {
        if normalize {
            self.key = normalize_name(&self.key);
        }
        self.normalize = normalize;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, line: &str, number: usize) -> Result<SourceItem> {
        let object: Map<String, Json> = serde_json::from_str(line).or_raise(|| ErrorKind::InvalidLine(number))?;
        let attributes = object.into_iter().map(|(name, value)| (name, Value::from_json(value)));
        let item = match self.normalize {
            true => SourceItem::normalized(&self.key, attributes),
            false => SourceItem::new(self.key.clone(), attributes),
        };
        item.validate().or_raise(|| ErrorKind::InvalidItem)?;
        Ok(item)
    }
}

#[async_trait]
impl Source for JsonLinesSource {
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
                let opened = File::open(&file).await.or_raise(|| ErrorKind::Io(file.clone()));
                let mut lines = match opened {
                    Ok(handle) => BufReader::new(handle).lines(),
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                let mut number = 0;
                loop {
                    let line = match lines.next_line().await.or_raise(|| ErrorKind::Io(file.clone())) {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            yield Err(e);
                            return;
                        },
                    };
                    number += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match self.parse(&line, number) {
                        Ok(item) => yield Ok(item),
                        Err(e) => {
                            tracing::debug!(path = %file.display(), line = number, error = ?e, "Skipping source entry");
                        },
                    }
                }
            }
        })
    }
}
