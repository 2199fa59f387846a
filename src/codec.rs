//! Fixed-width integer helpers used to embed probe fields in a payload.
//!
//! Both ends of the exchange are the same probe, so the byte order only has to
//! be self-consistent. We store the least significant byte first.

/// Write `value` into `buffer[offset..offset + 4]`, least significant byte first.
///
/// Panics if the buffer is too short.
pub fn write32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read a value written by [`write32`].
///
/// Panics if the buffer is too short.
pub fn read32(buffer: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use crate::codec::{read32, write32};

    #[test]
    fn test_least_significant_byte_first() {
        let mut buffer = [0u8; 8];
        write32(&mut buffer, 2, 0x0403_0201);
        assert_eq!(buffer, [0, 0, 1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_round_trip_edges() {
        let mut buffer = [0xffu8; 12];
        for (offset, value) in [(0, 0), (4, u32::MAX), (8, 0x8000_0001)] {
            write32(&mut buffer, offset, value);
            assert_eq!(read32(&buffer, offset), value);
        }
        // Neighbouring fields are left untouched.
        assert_eq!(read32(&buffer, 0), 0);
        assert_eq!(read32(&buffer, 4), u32::MAX);
    }

    #[test]
    #[should_panic]
    fn test_short_buffer_panics() {
        let buffer = [0u8; 3];
        read32(&buffer, 0);
    }
}
