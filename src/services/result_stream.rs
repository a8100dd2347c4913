// Result streaming
//
// The remote protocol always answers with a complete row batch. These
// adapters turn a batch into a lazily produced sequence: either chunks of one
// JSON array (bounded by PAGE_SIZE), a single JSON value, or one parsed
// object per row.

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::mem;

use crate::error::Result;
use crate::services::dialect::JSON_COLUMN;
use crate::services::remote::{Row, RowBatch};

/// A chunk is yielded once the buffer grows past this many bytes.
pub const PAGE_SIZE: usize = 1 << 16;

/// Rows of a streamed result.
pub enum RowStream {
    /// JSON text; concatenating every chunk gives the full document.
    Json(BoxStream<'static, String>),
    /// One parsed value per row.
    Objects(BoxStream<'static, Result<Value>>),
}

impl fmt::Debug for RowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowStream::Json(_) => f.write_str("RowStream::Json(..)"),
            RowStream::Objects(_) => f.write_str("RowStream::Objects(..)"),
        }
    }
}

impl RowStream {
    /// Build a stream over `rows`.
    ///
    /// `one` yields only the first row's JSON. `object_mode` takes precedence
    /// and yields each row as a parsed value.
    pub fn from_rows(rows: RowBatch, one: bool, object_mode: bool) -> Self {
        if object_mode {
            return RowStream::Objects(stream::iter(rows.into_iter().map(decode_row)).boxed());
        }

        if one {
            // Remaining rows are dropped here, not held until the stream ends
            let first = rows.into_iter().next().map(fragment);
            return RowStream::Json(stream::iter(first).boxed());
        }

        RowStream::Json(stream::iter(JsonArrayChunks::new(rows, PAGE_SIZE)).boxed())
    }

    /// Concatenate a JSON stream, or render an object stream as an array.
    pub async fn into_json(self) -> Result<String> {
        match self {
            RowStream::Json(chunks) => Ok(chunks.collect::<Vec<_>>().await.concat()),
            RowStream::Objects(mut objects) => {
                let mut values = Vec::new();
                while let Some(value) = objects.next().await {
                    values.push(value?);
                }
                Ok(Value::Array(values).to_string())
            }
        }
    }
}

/// The JSON text for one row: the generated JSON column when that is all
/// the row holds, the whole row otherwise.
fn fragment(row: Row) -> String {
    if row.len() == 1 {
        if let Some(Value::String(json)) = row.get(JSON_COLUMN) {
            return json.clone();
        }
    }
    Value::Object(row).to_string()
}

/// A row as a JSON value, with the generated JSON column parsed.
pub fn decode_row(row: Row) -> Result<Value> {
    if row.len() == 1 {
        if let Some(Value::String(json)) = row.get(JSON_COLUMN) {
            return Ok(serde_json::from_str(json)?);
        }
    }
    Ok(Value::Object(row))
}

enum ChunkState {
    Start,
    Rows,
    Done,
}

/// Writes `[`, the rows separated by commas, then `]`, handing out the
/// buffer every time it passes `page_size`.
struct JsonArrayChunks {
    rows: std::vec::IntoIter<Row>,
    buffer: String,
    page_size: usize,
    state: ChunkState,
}

impl JsonArrayChunks {
    fn new(rows: RowBatch, page_size: usize) -> Self {
        Self {
            rows: rows.into_iter(),
            buffer: String::new(),
            page_size,
            state: ChunkState::Start,
        }
    }
}

impl Iterator for JsonArrayChunks {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            match self.state {
                ChunkState::Start => {
                    self.buffer.push('[');
                    // First row without a leading comma
                    if let Some(row) = self.rows.next() {
                        self.buffer.push_str(&fragment(row));
                    }
                    self.state = ChunkState::Rows;
                }
                ChunkState::Rows => match self.rows.next() {
                    Some(row) => {
                        self.buffer.push(',');
                        self.buffer.push_str(&fragment(row));
                    }
                    None => {
                        self.buffer.push(']');
                        self.state = ChunkState::Done;
                        return Some(mem::take(&mut self.buffer));
                    }
                },
                ChunkState::Done => return None,
            }

            if self.buffer.len() > self.page_size {
                return Some(mem::take(&mut self.buffer));
            }
        }
    }
}
