//! Reading raw records out of source objects.

pub mod compression;

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use compression::{CompressionCodecExt, codec_for};

use crate::error::ReaderError;
use crate::model::{ParserKind, Source};

/// Decode a downloaded object into raw records.
///
/// Fails as a whole on the first undecodable value; nothing decoded before
/// the failure is returned.
pub fn read_records(object: &str, data: &Bytes, source: &Source) -> Result<Vec<Value>, ReaderError> {
    if let ParserKind::Unsupported(kind) = &source.parser {
        return Err(ReaderError::UnsupportedParser { kind: kind.clone() });
    }

    let codec = codec_for(&source.compress)?;
    let reader = codec
        .create_reader_from_bytes(data)
        .map_err(|e| ReaderError::Decompress {
            object: object.to_string(),
            codec: codec.name(),
            message: e.to_string(),
        })?;

    let mut records = Vec::new();
    for value in serde_json::Deserializer::from_reader(reader).into_iter::<Value>() {
        match value {
            Ok(v) => records.push(v),
            Err(e) if e.is_io() => {
                return Err(ReaderError::Decompress {
                    object: object.to_string(),
                    codec: codec.name(),
                    message: e.to_string(),
                });
            }
            Err(source) => {
                return Err(ReaderError::JsonDecode {
                    object: object.to_string(),
                    decoded: records.len(),
                    source,
                });
            }
        }
    }

    debug!(
        "Decoded {} raw records from {} ({} bytes, {})",
        records.len(),
        object,
        data.len(),
        codec.name()
    );
    Ok(records)
}
