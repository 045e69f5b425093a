//! Compression codecs for source objects.
//!
//! Each codec wraps the downloaded bytes in a streaming reader so the JSON
//! decoder never holds a second, decompressed copy of the object.

use std::io::{self, BufRead, BufReader, Cursor};

use bytes::Bytes;

use crate::error::ReaderError;
use crate::model::Compression;

/// A decompressor for one compression format.
pub trait CompressionCodec: Send + Sync {
    /// Create a reader yielding the decompressed bytes of `data`.
    fn create_reader<'a>(&self, data: &'a [u8]) -> io::Result<Box<dyn BufRead + Send + 'a>>;

    /// Name used in logs and errors.
    fn name(&self) -> &'static str;
}

/// Gzip codec using flate2.
///
/// Multi-member files (concatenated gzip streams) are read to the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl CompressionCodec for GzipCodec {
    fn create_reader<'a>(&self, data: &'a [u8]) -> io::Result<Box<dyn BufRead + Send + 'a>> {
        Ok(Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(
            data,
        ))))
    }

    fn name(&self) -> &'static str {
        "gzip"
    }
}

/// Zstandard codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCodec;

impl CompressionCodec for ZstdCodec {
    fn create_reader<'a>(&self, data: &'a [u8]) -> io::Result<Box<dyn BufRead + Send + 'a>> {
        let decoder = zstd::stream::Decoder::new(data)?;
        Ok(Box::new(BufReader::new(decoder)))
    }

    fn name(&self) -> &'static str {
        "zstd"
    }
}

/// Pass-through codec for uncompressed objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCodec;

impl CompressionCodec for NoopCodec {
    fn create_reader<'a>(&self, data: &'a [u8]) -> io::Result<Box<dyn BufRead + Send + 'a>> {
        Ok(Box::new(Cursor::new(data)))
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Convenience methods working on `Bytes`, the download type.
pub trait CompressionCodecExt: CompressionCodec {
    fn create_reader_from_bytes<'a>(
        &self,
        data: &'a Bytes,
    ) -> io::Result<Box<dyn BufRead + Send + 'a>> {
        self.create_reader(data.as_ref())
    }
}

impl<T: CompressionCodec + ?Sized> CompressionCodecExt for T {}

/// Pick the codec for a source's compression.
pub fn codec_for(compression: &Compression) -> Result<&'static dyn CompressionCodec, ReaderError> {
    match compression {
        Compression::None => Ok(&NoopCodec),
        Compression::Gzip => Ok(&GzipCodec),
        Compression::Zstd => Ok(&ZstdCodec),
        Compression::Unsupported(kind) => Err(ReaderError::UnsupportedCompression {
            kind: kind.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    const TEST_DATA: &[u8] = b"{\"a\":1}\n{\"a\":2}\n";

    fn make_gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn read_all(codec: &dyn CompressionCodec, data: &[u8]) -> Vec<u8> {
        let mut reader = codec.create_reader(data).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_gzip_codec() {
        assert_eq!(read_all(&GzipCodec, &make_gzip(TEST_DATA)), TEST_DATA);
    }

    #[test]
    fn test_gzip_multi_member() {
        let mut data = make_gzip(b"{\"a\":1}\n");
        data.extend(make_gzip(b"{\"a\":2}\n"));
        assert_eq!(read_all(&GzipCodec, &data), TEST_DATA);
    }

    #[test]
    fn test_zstd_codec() {
        let compressed = zstd::encode_all(TEST_DATA, 3).unwrap();
        assert_eq!(read_all(&ZstdCodec, &compressed), TEST_DATA);
    }

    #[test]
    fn test_noop_codec() {
        assert_eq!(read_all(&NoopCodec, TEST_DATA), TEST_DATA);
    }

    #[test]
    fn test_codec_for() {
        assert_eq!(codec_for(&Compression::Gzip).unwrap().name(), "gzip");
        assert_eq!(codec_for(&Compression::Zstd).unwrap().name(), "zstd");
        assert_eq!(codec_for(&Compression::None).unwrap().name(), "none");
        assert!(matches!(
            codec_for(&Compression::Unsupported("lz4".into())),
            Err(ReaderError::UnsupportedCompression { .. })
        ));
    }
}
