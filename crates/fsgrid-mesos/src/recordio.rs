//! RecordIO framing of the subscription stream: `<length>\n<bytes>`.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{MesosError, MesosResult};

/// Largest record accepted. Offers for big clusters stay well under it.
const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;
/// Longest length header, digits plus slack for whitespace.
const MAX_HEADER_LEN: usize = 24;

#[derive(Debug, Default)]
pub struct RecordIoDecoder {
    buf: BytesMut,
}

impl RecordIoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet returned as a record.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete record, or `None` until more bytes arrive.
    pub fn next_record(&mut self) -> MesosResult<Option<Bytes>> {
        let Some(newline) = self.buf.iter().position(|b| *b == b'\n') else {
            if self.buf.len() > MAX_HEADER_LEN {
                return Err(MesosError::Protocol("record length header too long".into()));
            }
            return Ok(None);
        };

        let header = std::str::from_utf8(&self.buf[..newline])
            .map_err(|_| MesosError::Protocol("record length is not utf-8".into()))?;
        let len: usize = header
            .trim()
            .parse()
            .map_err(|_| MesosError::Protocol(format!("invalid record length: {header:?}")))?;
        if len > MAX_RECORD_LEN {
            return Err(MesosError::Protocol(format!("record too large: {len}")));
        }

        if self.buf.len() < newline + 1 + len {
            return Ok(None);
        }

        self.buf.advance(newline + 1);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

/// Frame one record. Used by tests standing in for a master.
pub fn encode_record(data: &[u8]) -> Vec<u8> {
    let mut out = format!("{}\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_records_split_across_chunks() {
        let mut stream = encode_record(b"{\"type\":\"HEARTBEAT\"}");
        stream.extend(encode_record(b"abc"));

        let mut decoder = RecordIoDecoder::new();
        let mut records = Vec::new();
        for chunk in stream.chunks(3) {
            decoder.push(chunk);
            while let Some(record) = decoder.next_record().unwrap() {
                records.push(record);
            }
        }

        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][..], b"{\"type\":\"HEARTBEAT\"}");
        assert_eq!(&records[1][..], b"abc");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn waits_for_full_record() {
        let mut decoder = RecordIoDecoder::new();
        decoder.push(b"5\nab");
        assert!(decoder.next_record().unwrap().is_none());
        decoder.push(b"cde");
        assert_eq!(&decoder.next_record().unwrap().unwrap()[..], b"abcde");
    }

    #[test]
    fn empty_record() {
        let mut decoder = RecordIoDecoder::new();
        decoder.push(b"0\n");
        assert_eq!(decoder.next_record().unwrap().unwrap().len(), 0);
    }

    #[test]
    fn rejects_bad_headers() {
        let mut decoder = RecordIoDecoder::new();
        decoder.push(b"x1\n");
        assert!(decoder.next_record().is_err());

        let mut decoder = RecordIoDecoder::new();
        decoder.push(&[b'1'; 40]);
        assert!(decoder.next_record().is_err());

        let mut decoder = RecordIoDecoder::new();
        decoder.push(b"999999999999\n");
        assert!(decoder.next_record().is_err());
    }
}
