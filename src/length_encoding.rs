use crate::errors::RdbError;
use byteorder::{ByteOrder, LittleEndian};

/// Variable-width length encoding shared by the snapshot reader and writer.
///
/// The top two bits of the first byte select the width:
/// `00`: the low six bits are the length;
/// `01`: 14-bit big-endian length across two bytes;
/// `10`: `0x80` followed by a 32-bit little-endian length;
/// `11`: reserved for special string encodings, never emitted here.
pub fn encode_length(length: usize) -> Result<Vec<u8>, RdbError> {
    if length < 1 << 6 {
        return Ok(vec![length as u8]);
    }
    if length < 1 << 14 {
        return Ok(vec![(length >> 8) as u8 | 0x40, length as u8]);
    }
    if length <= u32::MAX as usize {
        let mut buffer = vec![0u8; 5];
        buffer[0] = 0x80;
        LittleEndian::write_u32(&mut buffer[1..], length as u32);
        return Ok(buffer);
    }
    Err(RdbError::LengthTooLarge)
}

/// Decodes a length prefix from the front of `input`, returning the value
/// and the number of bytes consumed. A `0b11` prefix is rejected; the
/// special-integer forms are only legal inside metadata records, which the
/// snapshot reader handles separately.
pub fn decode_length(input: &[u8]) -> Result<(usize, usize), RdbError> {
    let first = *input.first().ok_or(RdbError::InvalidLengthPrefix)?;
    match first >> 6 {
        0b00 => Ok(((first & 0x3F) as usize, 1)),
        0b01 => {
            let second = *input.get(1).ok_or(RdbError::InvalidLengthPrefix)?;
            Ok(((((first & 0x3F) as usize) << 8) | second as usize, 2))
        }
        0b10 => {
            if input.len() < 5 {
                return Err(RdbError::InvalidLengthPrefix);
            }
            Ok((LittleEndian::read_u32(&input[1..5]) as usize, 5))
        }
        _ => Err(RdbError::InvalidLengthPrefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_across_width_boundaries() {
        for length in [0usize, 1, 42, 63, 64, 300, 16383, 16384, 1 << 20, u32::MAX as usize] {
            let encoded = encode_length(length).unwrap();
            let (decoded, consumed) = decode_length(&encoded).unwrap();
            assert_eq!(decoded, length);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn picks_the_narrowest_width() {
        assert_eq!(encode_length(63).unwrap().len(), 1);
        assert_eq!(encode_length(64).unwrap().len(), 2);
        assert_eq!(encode_length(16383).unwrap().len(), 2);
        assert_eq!(encode_length(16384).unwrap().len(), 5);
    }

    #[test]
    fn fourteen_bit_form_is_big_endian() {
        assert_eq!(encode_length(700).unwrap(), vec![0x42, 0xBC]);
        let (decoded, _) = decode_length(&[0x42, 0xBC]).unwrap();
        assert_eq!(decoded, 700);
    }

    #[test]
    fn rejects_oversized_lengths() {
        assert!(matches!(
            encode_length(u32::MAX as usize + 1),
            Err(RdbError::LengthTooLarge)
        ));
    }

    #[test]
    fn rejects_special_string_prefix() {
        assert!(matches!(
            decode_length(&[0xC0, 0x01]),
            Err(RdbError::InvalidLengthPrefix)
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(decode_length(&[]).is_err());
        assert!(decode_length(&[0x42]).is_err());
        assert!(decode_length(&[0x80, 0x01, 0x02]).is_err());
    }
}
