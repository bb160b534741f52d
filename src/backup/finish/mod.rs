use liblzma::write::XzEncoder;
use std::io::{BufWriter, Error, IntoInnerError, Write};

/// Flushes trailing stream data and hands back the wrapped writer.
pub trait Finish<O> {
    fn finish(self) -> Result<O, Error>;
}

impl<W: Write> Finish<W> for XzEncoder<W> {
    fn finish(self) -> Result<W, Error> {
        self.finish()
    }
}

impl<W: Write> Finish<W> for BufWriter<W> {
    fn finish(self) -> Result<W, Error> {
        self.into_inner().map_err(IntoInnerError::into_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    struct FailingFinisher;

    impl Finish<Cursor<Vec<u8>>> for FailingFinisher {
        fn finish(self) -> Result<Cursor<Vec<u8>>, Error> {
            Err(Error::other("Test failure"))
        }
    }

    #[test]
    fn test_finish_trait_failure() {
        let error = FailingFinisher.finish().unwrap_err();
        assert_eq!(error.to_string(), "Test failure");
    }

    #[test]
    fn test_buf_writer_finish_flushes() {
        let mut writer = BufWriter::new(Vec::new());
        writer.write_all(b"buffered").unwrap();
        let inner = Finish::finish(writer).unwrap();
        assert_eq!(inner, b"buffered");
    }

    #[test]
    fn test_xz_encoder_finish_produces_decodable_stream() {
        let mut encoder = XzEncoder::new(Vec::new(), 1);
        encoder.write_all(b"payload").unwrap();
        let compressed = Finish::finish(encoder).unwrap();

        let mut decoded = String::new();
        liblzma::read::XzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "payload");
    }
}
