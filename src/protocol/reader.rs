//! Bounds-checked reader over inbound message buffers.

use crate::{FlightdeckError, Result};

/// Sequential little-endian reader that validates every access against the
/// buffer length before touching it.
///
/// The inbound buffers come from the vendor DLL and their declared sizes are
/// untrusted; all field extraction in the codec goes through this reader so a
/// short or lying buffer surfaces as a [`FlightdeckError::Malformed`] instead
/// of an out-of-bounds read.
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    position: usize,
    context: &'static str,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over `buffer`; `context` names the record being
    /// decoded in error messages.
    pub fn new(buffer: &'a [u8], context: &'static str) -> Self {
        Self { buffer, position: 0, context }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buffer[self.position..]
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.position
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(count).ok_or_else(|| {
            FlightdeckError::malformed(self.context, "field offset overflows usize")
        })?;
        let slice = self.buffer.get(self.position..end).ok_or_else(|| {
            FlightdeckError::malformed(
                self.context,
                format!(
                    "need {count} bytes at offset {}, buffer has {}",
                    self.position,
                    self.buffer.len()
                ),
            )
        })?;
        self.position = end;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Read a fixed-width byte array holding a null-terminated 8-bit string.
    /// The result is truncated at the first NUL; invalid UTF-8 is replaced.
    pub fn read_cstring(&mut self, width: usize) -> Result<String> {
        let bytes = self.take(width)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Skip `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reads_sequence_of_fields() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&7u32.to_le_bytes());
        buffer.extend_from_slice(&1234.5f64.to_le_bytes());
        buffer.extend_from_slice(b"Paused\0junk");

        let mut reader = ByteReader::new(&buffer, "test");
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_f64().unwrap(), 1234.5);
        assert_eq!(reader.read_cstring(11).unwrap(), "Paused");
        assert!(reader.remaining().is_empty());
    }

    #[test]
    fn short_buffer_reports_offset_and_need() {
        let mut reader = ByteReader::new(&[0u8; 6], "test record");
        reader.read_u32().unwrap();
        let err = reader.read_u32().unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("test record"));
        assert!(rendered.contains("offset 4"));
    }

    #[test]
    fn cstring_without_terminator_takes_full_width() {
        let mut reader = ByteReader::new(b"Sim", "test");
        assert_eq!(reader.read_cstring(3).unwrap(), "Sim");
    }

    proptest! {
        #[test]
        fn u32_roundtrip(value in any::<u32>()) {
            let bytes = value.to_le_bytes();
            let mut reader = ByteReader::new(&bytes, "test");
            prop_assert_eq!(reader.read_u32().unwrap(), value);
        }

        #[test]
        fn f64_roundtrip(value in any::<f64>()) {
            let bytes = value.to_le_bytes();
            let mut reader = ByteReader::new(&bytes, "test");
            let parsed = reader.read_f64().unwrap();
            prop_assert_eq!(parsed.to_bits(), value.to_bits());
        }

        #[test]
        fn never_reads_past_the_end(
            data in proptest::collection::vec(any::<u8>(), 0..64),
            reads in proptest::collection::vec(1usize..16, 0..16),
        ) {
            let mut reader = ByteReader::new(&data, "fuzz");
            for width in reads {
                // Either the read succeeds entirely inside the buffer or it
                // fails without advancing.
                let before = reader.position();
                match reader.skip(width) {
                    Ok(()) => prop_assert!(before + width <= data.len()),
                    Err(_) => prop_assert_eq!(reader.position(), before),
                }
            }
        }
    }
}
