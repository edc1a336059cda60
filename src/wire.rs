//! Length-prefixed frame records over a byte stream.
//!
//! Each record is a 4-byte unsigned big-endian length followed by exactly that
//! many payload bytes. A zero length, or the stream closing before a full
//! record arrives, signals normal end of stream rather than an error. Genuine
//! I/O failures (anything other than end of stream) are surfaced as
//! `TransportError`.
//!
//! A single `read` may return fewer bytes than requested; both the length
//! prefix and the payload are accumulated until the declared size is reached.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Size of the record length prefix in bytes.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Upper bound on a single record payload. A length prefix above this is
/// treated as a malformed stream, not an allocation request.
pub const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// Failures on the image transport path.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("i/o failure on frame stream: {0}")]
    Io(#[from] io::Error),
    #[error("record length {0} exceeds maximum of {MAX_RECORD_BYTES} bytes")]
    OversizedRecord(usize),
    #[error("failed to decode frame payload: {0}")]
    Decode(#[from] image::ImageError),
}

impl TransportError {
    /// True when the underlying failure is a socket read timeout.
    ///
    /// Read timeouts exist to bound shutdown latency: a cooperative stop
    /// cannot interrupt a blocking read, so the owning loop re-checks its
    /// cancellation token when one fires.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransportError::Io(err)
                if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Write one framed record: 4-byte big-endian length, then the payload.
pub fn write_record(writer: &mut impl Write, payload: &[u8]) -> Result<(), TransportError> {
    if payload.len() > MAX_RECORD_BYTES {
        return Err(TransportError::OversizedRecord(payload.len()));
    }
    let prefix = (payload.len() as u32).to_be_bytes();
    writer.write_all(&prefix)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Write the zero-length record that marks clean end of stream.
pub fn write_end_of_stream(writer: &mut impl Write) -> Result<(), TransportError> {
    writer.write_all(&0u32.to_be_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read the next framed record.
///
/// Returns `Ok(None)` on end of stream: a zero-length record, the stream
/// closing before or inside the length prefix, or the stream closing
/// mid-payload. All three are normal termination.
pub fn read_record(reader: &mut impl Read) -> Result<Option<Vec<u8>>, TransportError> {
    let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
    if !read_exact_or_eof(reader, &mut prefix)? {
        return Ok(None);
    }

    let length = u32::from_be_bytes(prefix) as usize;
    if length == 0 {
        return Ok(None);
    }
    if length > MAX_RECORD_BYTES {
        return Err(TransportError::OversizedRecord(length));
    }

    let mut payload = vec![0u8; length];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    Ok(Some(payload))
}

/// Fill `buf` completely, accumulating partial reads.
///
/// Returns `Ok(false)` if the stream ends before the buffer is full.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `chunk` bytes per call, exercising the
    /// partial-read accumulation path.
    struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl ChunkedReader {
        fn new(data: Vec<u8>, chunk: usize) -> Self {
            Self { data, pos: 0, chunk }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let remaining = self.data.len() - self.pos;
            let n = remaining.min(self.chunk).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn round_trips_empty_payload_as_end_of_stream() {
        let mut encoded = Vec::new();
        write_record(&mut encoded, &[]).unwrap();
        let decoded = read_record(&mut Cursor::new(encoded)).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn round_trips_large_payload_across_partial_reads() {
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut encoded = Vec::new();
        write_record(&mut encoded, &payload).unwrap();

        let mut reader = ChunkedReader::new(encoded, 7);
        let decoded = read_record(&mut reader).unwrap().expect("one record");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn round_trips_consecutive_records_in_order() {
        let mut encoded = Vec::new();
        write_record(&mut encoded, b"first").unwrap();
        write_record(&mut encoded, b"second").unwrap();
        write_end_of_stream(&mut encoded).unwrap();

        let mut cursor = Cursor::new(encoded);
        assert_eq!(read_record(&mut cursor).unwrap().unwrap(), b"first");
        assert_eq!(read_record(&mut cursor).unwrap().unwrap(), b"second");
        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn close_during_length_prefix_is_clean_end() {
        let mut cursor = Cursor::new(vec![0x00, 0x01]);
        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn close_mid_payload_is_clean_end() {
        let mut encoded = Vec::new();
        write_record(&mut encoded, &[1u8; 64]).unwrap();
        encoded.truncate(LENGTH_PREFIX_BYTES + 10);
        assert!(read_record(&mut Cursor::new(encoded)).unwrap().is_none());
    }

    #[test]
    fn oversized_length_prefix_is_an_error() {
        let prefix = ((MAX_RECORD_BYTES + 1) as u32).to_be_bytes();
        let err = read_record(&mut Cursor::new(prefix.to_vec())).unwrap_err();
        assert!(matches!(err, TransportError::OversizedRecord(_)));
    }
}
