//! Transparent decompression of input objects

use std::io::{self, Read};

use dlp_core::Compression;
use flate2::read::MultiGzDecoder;

/// Wrap `inner` in the decoder `compression` resolves to for `filename`
pub fn decoder(
    compression: Compression,
    filename: &str,
    inner: Box<dyn Read + Send>,
) -> io::Result<Box<dyn Read + Send>> {
    match compression.resolve(filename) {
        Compression::Gzip => Ok(Box::new(MultiGzDecoder::new(inner))),
        Compression::Zstd => Ok(Box::new(zstd::stream::read::Decoder::new(inner)?)),
        Compression::None | Compression::Auto => Ok(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn read_all(compression: Compression, filename: &str, bytes: Vec<u8>) -> String {
        let mut out = String::new();
        decoder(compression, filename, Box::new(io::Cursor::new(bytes)))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_gzip_by_extension() {
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(b"SSN 123-45-6789 ok").unwrap();
        let bytes = encoder.finish().unwrap();

        assert_eq!(read_all(Compression::Auto, "a.txt.gz", bytes), "SSN 123-45-6789 ok");
    }

    #[test]
    fn test_zstd_by_extension() {
        let bytes = zstd::stream::encode_all(&b"hello zstd"[..], 0).unwrap();
        assert_eq!(read_all(Compression::Auto, "a.zst", bytes), "hello zstd");
    }

    #[test]
    fn test_plain_passthrough() {
        assert_eq!(read_all(Compression::Auto, "a.txt", b"plain".to_vec()), "plain");
    }
}
