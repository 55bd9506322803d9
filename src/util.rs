use crate::protocol_constants::*;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock in milliseconds since the UNIX epoch. Expirations are stored
/// and compared at this resolution.
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn construct_redis_command(args: &[&str]) -> String {
    let mut command = format!("{}{}{}", ARRAY_PREFIX, args.len(), CRLF);
    for arg in args {
        command.push_str(&format!("{}{}{}{}", BULK_STRING_PREFIX, arg.len(), CRLF, arg));
        command.push_str(CRLF);
    }
    command
}

/// Re-encodes parsed request tokens as an array of bulk strings, byte for
/// byte the frame a client would have sent. Used for replica fan-out.
pub fn encode_array_of_bulks(tokens: &[Bytes]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("{}{}{}", ARRAY_PREFIX, tokens.len(), CRLF).as_bytes());
    for token in tokens {
        out.extend_from_slice(
            format!("{}{}{}", BULK_STRING_PREFIX, token.len(), CRLF).as_bytes(),
        );
        out.extend_from_slice(token);
        out.extend_from_slice(CRLF.as_bytes());
    }
    out
}

pub fn encode_bulk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.extend_from_slice(format!("{}{}{}", BULK_STRING_PREFIX, data.len(), CRLF).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF.as_bytes());
    out
}

pub fn encode_error(message: &str) -> String {
    format!("{}ERR {}{}", ERROR_PREFIX, message, CRLF)
}

pub fn encode_simple(message: &str) -> String {
    format!("{}{}{}", SIMPLE_STRING_PREFIX, message, CRLF)
}
