//! Read-only access to upstream tables.
//!
//! [`TableSource`] is the async seam at which the engine touches storage.
//! [`LocalSource`] reads CSV (optionally gzip-compressed) files from a
//! directory tree, and [`Retrying`] wraps any source with bounded retries.

mod local;
mod retry;

pub use local::LocalSource;
pub use retry::Retrying;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use std::io::Read;

use crate::error::SourceReadError;

/// Fetches the raw bytes stored at a location (a relative path or key).
#[async_trait]
pub trait TableSource: Send + Sync {
    async fn read(&self, location: &str) -> std::io::Result<Vec<u8>>;
}

/// Decodes a CSV table, transparently gunzipping `.gz` locations.
pub fn decode_csv<T: DeserializeOwned>(
    location: &str,
    bytes: &[u8],
) -> Result<Vec<T>, SourceReadError> {
    let decode_err = |source: csv::Error| SourceReadError::Decode {
        location: location.to_string(),
        source,
    };

    let plain;
    let data: &[u8] = if location.ends_with(".gz") {
        let mut buf = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut buf)
            .map_err(|source| SourceReadError::Gunzip {
                location: location.to_string(),
                source,
            })?;
        plain = buf;
        &plain
    } else {
        bytes
    };

    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(data);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result.map_err(decode_err)?);
    }
    Ok(rows)
}

/// Reads one location through `source` and decodes it as a CSV table.
pub async fn read_table<T: DeserializeOwned, S: TableSource + ?Sized>(
    source: &S,
    location: &str,
) -> Result<Vec<T>, SourceReadError> {
    let bytes = source
        .read(location)
        .await
        .map_err(|source| SourceReadError::Unreadable {
            location: location.to_string(),
            source,
        })?;
    decode_csv(location, &bytes)
}

/// Reads and concatenates several locations of the same table.
pub async fn read_tables<T: DeserializeOwned, S: TableSource + ?Sized>(
    source: &S,
    locations: &[String],
) -> Result<Vec<T>, SourceReadError> {
    let mut rows = Vec::new();
    for location in locations {
        rows.extend(read_table(source, location).await?);
    }
    Ok(rows)
}
