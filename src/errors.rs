use thiserror::Error;

/// Usage-level failures: known framing, bad command. The connection stays
/// open; the message becomes the `-ERR` reply.
#[derive(Error, Debug)]
pub enum ArgumentError {
    #[error("{0}")]
    General(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// Framing-level failures. Any of these ends the connection after the error
/// reply is written; the framing is unrecoverable mid-stream.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("send a valid command")]
    NotAnArray,
    #[error("expected bulk string header")]
    InvalidBulkHeader,
    #[error("invalid length in frame header")]
    InvalidLength,
    #[error("connection closed mid-frame")]
    UnexpectedEof,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum RdbError {
    #[error("not a valid snapshot file")]
    InvalidMagic,
    #[error("invalid length prefix")]
    InvalidLengthPrefix,
    #[error("length too large")]
    LengthTooLarge,
    #[error("value type 0x{0:02X} not supported")]
    UnsupportedType(u8),
    #[error("unexpected opcode 0x{0:02X}")]
    UnexpectedOpcode(u8),
    #[error("missing end-of-file marker")]
    MissingEof,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
