use crate::errors::RdbError;
use crate::keyspace::Keyspace;
use crate::protocol_constants::*;
use crate::rdb_serializer::RDB_CRC;
use crate::value_entry::ValueEntry;
use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use crc::Digest;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

pub struct RdbLoadSummary {
    pub entries: usize,
    pub checksum_ok: bool,
}

/// Streaming snapshot reader. Every byte consumed before the trailer feeds
/// a CRC64 digest, so verification needs no second pass over the file.
pub struct RdbParser<'a, R> {
    reader: R,
    db: &'a mut Keyspace,
    digest: Digest<'static, u64>,
}

impl<'a, R> RdbParser<'a, R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, db: &'a mut Keyspace) -> Self {
        Self {
            reader,
            db,
            digest: RDB_CRC.digest(),
        }
    }

    pub async fn parse(mut self) -> Result<RdbLoadSummary, RdbError> {
        self.verify_magic_number().await?;
        self.skip_metadata().await?;

        // database index: length-encoded, written as 7, ignored on read
        let db_index = self.read_length().await?;
        debug!(db_index, "database selector");

        let marker = self.read_u8().await?;
        if marker != OPCODE_SIZE {
            return Err(RdbError::UnexpectedOpcode(marker));
        }
        let keyspace_size = self.read_length().await?;
        let expiring_size = self.read_length().await?;
        debug!(keyspace_size, expiring_size, "hash table sizes");

        for _ in 0..keyspace_size {
            self.process_entry().await?;
        }

        let marker = self.read_u8().await?;
        if marker != OPCODE_EOF {
            return Err(RdbError::MissingEof);
        }

        let checksum_ok = self.verify_checksum().await;
        Ok(RdbLoadSummary {
            entries: self.db.len(),
            checksum_ok,
        })
    }

    async fn verify_magic_number(&mut self) -> Result<(), RdbError> {
        let mut magic = [0; 5];
        self.fill(&mut magic).await?;
        if magic != MAGIC_NUMBER {
            return Err(RdbError::InvalidMagic);
        }
        let mut version = [0; 4];
        self.fill(&mut version).await?;
        if version != RDB_VERSION {
            return Err(RdbError::InvalidMagic);
        }
        Ok(())
    }

    /// Consumes `0xFA` metadata records up to the database selector. Record
    /// values may use the special-integer string encodings.
    async fn skip_metadata(&mut self) -> Result<(), RdbError> {
        loop {
            let marker = self.read_u8().await?;
            match marker {
                OPCODE_START_DB => return Ok(()),
                OPCODE_META => {
                    let key = self.read_string().await?;
                    let value = self.read_string_or_integer().await?;
                    debug!(
                        key = %String::from_utf8_lossy(&key),
                        value = %String::from_utf8_lossy(&value),
                        "metadata record"
                    );
                }
                other => return Err(RdbError::UnexpectedOpcode(other)),
            }
        }
    }

    async fn process_entry(&mut self) -> Result<(), RdbError> {
        let marker = self.read_u8().await?;
        let (expires_at, type_byte) = match marker {
            OPCODE_EXPIRETIME_MS => {
                let ms = self.read_u64_le().await?;
                (Some(ms), self.read_u8().await?)
            }
            OPCODE_EXPIRETIME_S => {
                let secs = self.read_u32_le().await?;
                (Some(secs as u64 * 1000), self.read_u8().await?)
            }
            other => (None, other),
        };

        match type_byte {
            TYPE_STRING => {
                let key = self.read_string().await?;
                let value = self.read_string().await?;
                let entry = ValueEntry::new_absolute(value, expires_at);
                // entries already past their expiration are dropped at load
                if !entry.is_expired() {
                    self.db.set(key, entry);
                }
                Ok(())
            }
            TYPE_LIST | TYPE_SET | TYPE_ZSET | TYPE_HASH => {
                Err(RdbError::UnsupportedType(type_byte))
            }
            other => Err(RdbError::UnexpectedOpcode(other)),
        }
    }

    async fn read_string(&mut self) -> Result<Bytes, RdbError> {
        let length = self.read_length().await?;
        let mut buf = vec![0; length];
        self.fill(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn read_string_or_integer(&mut self) -> Result<Bytes, RdbError> {
        let first = self.read_u8().await?;
        if first >> 6 == 0b11 {
            let value = match first & 0x3F {
                0 => self.read_u8().await? as u64,
                1 => self.read_u16_le().await? as u64,
                2 => self.read_u32_le().await? as u64,
                _ => return Err(RdbError::InvalidLengthPrefix),
            };
            return Ok(Bytes::from(value.to_string()));
        }
        let length = self.read_length_from(first).await?;
        let mut buf = vec![0; length];
        self.fill(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn read_length(&mut self) -> Result<usize, RdbError> {
        let first = self.read_u8().await?;
        self.read_length_from(first).await
    }

    async fn read_length_from(&mut self, first: u8) -> Result<usize, RdbError> {
        match first >> 6 {
            0b00 => Ok((first & 0x3F) as usize),
            0b01 => {
                let second = self.read_u8().await?;
                Ok((((first & 0x3F) as usize) << 8) | second as usize)
            }
            0b10 => Ok(self.read_u32_le().await? as usize),
            _ => Err(RdbError::InvalidLengthPrefix),
        }
    }

    /// Reads the 8-byte trailer (outside the digest) and checks it against
    /// the bytes consumed so far. A mismatch is recoverable; the load keeps
    /// whatever was decoded.
    async fn verify_checksum(&mut self) -> bool {
        let mut trailer = [0; 8];
        if let Err(e) = self.reader.read_exact(&mut trailer).await {
            warn!("snapshot is missing its checksum trailer: {}", e);
            return false;
        }
        let stored = LittleEndian::read_u64(&trailer);
        let digest = std::mem::replace(&mut self.digest, RDB_CRC.digest());
        let computed = digest.finalize();
        if stored != computed {
            warn!(stored, computed, "snapshot checksum mismatch");
            return false;
        }
        true
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<(), RdbError> {
        self.reader.read_exact(buf).await?;
        self.digest.update(buf);
        Ok(())
    }

    async fn read_u8(&mut self) -> Result<u8, RdbError> {
        let mut buf = [0; 1];
        self.fill(&mut buf).await?;
        Ok(buf[0])
    }

    async fn read_u16_le(&mut self) -> Result<u16, RdbError> {
        let mut buf = [0; 2];
        self.fill(&mut buf).await?;
        Ok(LittleEndian::read_u16(&buf))
    }

    async fn read_u32_le(&mut self) -> Result<u32, RdbError> {
        let mut buf = [0; 4];
        self.fill(&mut buf).await?;
        Ok(LittleEndian::read_u32(&buf))
    }

    async fn read_u64_le(&mut self) -> Result<u64, RdbError> {
        let mut buf = [0; 8];
        self.fill(&mut buf).await?;
        Ok(LittleEndian::read_u64(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdb_serializer::RdbSerializer;
    use crate::util::now_unix_ms;

    async fn parse_bytes(input: &[u8]) -> Result<(Keyspace, RdbLoadSummary), RdbError> {
        let mut keyspace = Keyspace::new();
        let summary = RdbParser::new(input, &mut keyspace).parse().await?;
        Ok((keyspace, summary))
    }

    fn with_crc(mut body: Vec<u8>) -> Vec<u8> {
        let checksum = RDB_CRC.checksum(&body);
        body.extend_from_slice(&checksum.to_le_bytes());
        body
    }

    #[tokio::test]
    async fn round_trips_a_serialized_keyspace() {
        let mut original = Keyspace::new();
        original.set(
            Bytes::from_static(b"foo"),
            ValueEntry::new_relative(Bytes::from_static(b"bar"), None),
        );
        original.set(
            Bytes::from_static(b"ttl"),
            ValueEntry::new_relative(Bytes::from_static(b"soon"), Some(60_000)),
        );
        let snapshot = RdbSerializer::serialize(&original).unwrap();

        let (mut loaded, summary) = parse_bytes(&snapshot).await.unwrap();
        assert!(summary.checksum_ok);
        assert_eq!(summary.entries, 2);
        assert_eq!(loaded.get(b"foo"), Some(Bytes::from_static(b"bar")));
        assert_eq!(loaded.get(b"ttl"), Some(Bytes::from_static(b"soon")));
    }

    #[tokio::test]
    async fn entries_expired_before_load_are_dropped() {
        let mut original = Keyspace::new();
        original.set(
            Bytes::from_static(b"stale"),
            ValueEntry::new_absolute(Bytes::from_static(b"v"), Some(1)),
        );
        original.set(
            Bytes::from_static(b"live"),
            ValueEntry::new_relative(Bytes::from_static(b"v"), None),
        );
        let snapshot = RdbSerializer::serialize(&original).unwrap();

        let (loaded, summary) = parse_bytes(&snapshot).await.unwrap();
        assert_eq!(summary.entries, 1);
        assert!(loaded.keys() == vec![Bytes::from_static(b"live")]);
    }

    #[tokio::test]
    async fn rejects_a_bad_magic_number() {
        let result = parse_bytes(b"RUBIS0011\xFE\x00").await;
        assert!(matches!(result, Err(RdbError::InvalidMagic)));
    }

    #[tokio::test]
    async fn rejects_unsupported_value_types() {
        let mut body = b"REDIS0011".to_vec();
        body.extend_from_slice(&[OPCODE_START_DB, 0x00, OPCODE_SIZE, 0x01, 0x00]);
        body.extend_from_slice(&[TYPE_LIST, 0x01, b'k', 0x01, b'v', OPCODE_EOF]);
        let result = parse_bytes(&with_crc(body)).await;
        assert!(matches!(result, Err(RdbError::UnsupportedType(TYPE_LIST))));
    }

    #[tokio::test]
    async fn accepts_seconds_granularity_expiry() {
        let secs: u32 = (now_unix_ms() / 1000) as u32 + 3600;
        let mut body = b"REDIS0011".to_vec();
        body.extend_from_slice(&[OPCODE_START_DB, 0x00, OPCODE_SIZE, 0x01, 0x01]);
        body.push(OPCODE_EXPIRETIME_S);
        body.extend_from_slice(&secs.to_le_bytes());
        body.extend_from_slice(&[TYPE_STRING, 0x01, b'k', 0x01, b'v']);
        body.push(OPCODE_EOF);

        let (mut loaded, summary) = parse_bytes(&with_crc(body)).await.unwrap();
        assert!(summary.checksum_ok);
        assert_eq!(loaded.get(b"k"), Some(Bytes::from_static(b"v")));
        let entry_expiry = loaded
            .iter_for_snapshot()
            .next()
            .map(|(_, e)| e.expires_at())
            .unwrap();
        assert_eq!(entry_expiry, Some(secs as u64 * 1000));
    }

    #[tokio::test]
    async fn skips_metadata_with_special_integer_values() {
        let mut body = b"REDIS0011".to_vec();
        body.push(OPCODE_META);
        body.extend_from_slice(b"\x04bits");
        body.extend_from_slice(&[0xC0, 64]); // 8-bit special integer
        body.push(OPCODE_META);
        body.extend_from_slice(b"\x02os");
        body.extend_from_slice(b"\x05linux");
        body.extend_from_slice(&[OPCODE_START_DB, 0x00, OPCODE_SIZE, 0x00, 0x00, OPCODE_EOF]);

        let (loaded, summary) = parse_bytes(&with_crc(body)).await.unwrap();
        assert!(summary.checksum_ok);
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn corrupted_bytes_fail_verification_but_still_load() {
        let mut original = Keyspace::new();
        original.set(
            Bytes::from_static(b"foo"),
            ValueEntry::new_relative(Bytes::from_static(b"bar"), None),
        );
        let mut snapshot = RdbSerializer::serialize(&original).unwrap();
        // flip one bit inside the value bytes, leaving the framing intact
        let value_pos = snapshot.len() - 8 - 2;
        snapshot[value_pos] ^= 0x01;

        let (_, summary) = parse_bytes(&snapshot).await.unwrap();
        assert!(!summary.checksum_ok);
        assert_eq!(summary.entries, 1);
    }

    #[tokio::test]
    async fn missing_eof_marker_is_an_error() {
        let mut body = b"REDIS0011".to_vec();
        body.extend_from_slice(&[OPCODE_START_DB, 0x00, OPCODE_SIZE, 0x00, 0x00]);
        body.push(0x42); // not the EOF marker
        let result = parse_bytes(&with_crc(body)).await;
        assert!(matches!(result, Err(RdbError::MissingEof)));
    }
}
