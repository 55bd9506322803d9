use crate::errors::RdbError;
use crate::keyspace::Keyspace;
use crate::length_encoding::encode_length;
use crate::protocol_constants::*;
use byteorder::{LittleEndian, WriteBytesExt};
use crc::{Crc, CRC_64_ECMA_182};

pub static RDB_CRC: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Produces the binary snapshot image of a keyspace: magic and version,
/// one metadata record, database selector, table sizes, entries, the EOF
/// marker and a CRC64 trailer over everything before it.
pub struct RdbSerializer;

impl RdbSerializer {
    pub fn serialize(keyspace: &Keyspace) -> Result<Vec<u8>, RdbError> {
        let mut buf = Vec::new();

        buf.extend_from_slice(MAGIC_NUMBER);
        buf.extend_from_slice(RDB_VERSION);

        buf.push(OPCODE_META);
        Self::write_string(&mut buf, RDB_META_VERSION_KEY.as_bytes())?;
        Self::write_string(&mut buf, RDB_META_VERSION_VALUE.as_bytes())?;

        buf.push(OPCODE_START_DB);
        buf.extend_from_slice(&encode_length(RDB_DB_INDEX)?);

        buf.push(OPCODE_SIZE);
        buf.extend_from_slice(&encode_length(keyspace.len())?);
        buf.extend_from_slice(&encode_length(keyspace.expiring_len())?);

        for (key, entry) in keyspace.iter_for_snapshot() {
            if let Some(expires_at) = entry.expires_at() {
                buf.push(OPCODE_EXPIRETIME_MS);
                buf.write_u64::<LittleEndian>(expires_at)?;
            }
            buf.push(TYPE_STRING);
            Self::write_string(&mut buf, key)?;
            Self::write_string(&mut buf, &entry.value)?;
        }

        buf.push(OPCODE_EOF);

        let checksum = RDB_CRC.checksum(&buf);
        buf.write_u64::<LittleEndian>(checksum)?;
        Ok(buf)
    }

    /// The payload sent during full-resync: a valid snapshot of an empty
    /// keyspace. Replicas converge through the command stream that follows.
    pub fn empty_snapshot() -> Result<Vec<u8>, RdbError> {
        Self::serialize(&Keyspace::new())
    }

    fn write_string(buf: &mut Vec<u8>, data: &[u8]) -> Result<(), RdbError> {
        buf.extend_from_slice(&encode_length(data.len())?);
        buf.extend_from_slice(data);
        Ok(())
    }
}
