pub const ARRAY_PREFIX: &str = "*";
pub const BULK_STRING_PREFIX: &str = "$";
pub const SIMPLE_STRING_PREFIX: &str = "+";
pub const ERROR_PREFIX: &str = "-";
pub const INTEGER_PREFIX: &str = ":";
pub const CRLF: &str = "\r\n";

pub const PING_COMMAND: &str = "PING";
pub const COMMAND_COMMAND: &str = "COMMAND";
pub const ECHO_COMMAND: &str = "ECHO";
pub const GET_COMMAND: &str = "GET";
pub const SET_COMMAND: &str = "SET";
pub const CONFIG_COMMAND: &str = "CONFIG";
pub const KEYS_COMMAND: &str = "KEYS";
pub const SAVE_COMMAND: &str = "SAVE";
pub const INFO_COMMAND: &str = "INFO";
pub const REPLCONF_COMMAND: &str = "REPLCONF";
pub const PSYNC_COMMAND: &str = "PSYNC";

pub const PX_OPTION: &str = "PX";
pub const EX_OPTION: &str = "EX";

pub const CONFIG_GET_OPTION: &str = "GET";

pub const OK_RESPONSE: &str = "+OK\r\n";
pub const PONG_RESPONSE: &str = "+PONG\r\n";
pub const NULL_BULK_RESPONSE: &str = "$-1\r\n";

// The unknown-command reply carries a leading space, the framing reply does
// not; clients depend on both spellings.
pub const INVALID_FRAME_ERROR_RESPONSE: &str = "-ERR send a valid command\r\n";
pub const UNKNOWN_COMMAND_ERROR_RESPONSE: &str = "- ERR send a valid command\r\n";
pub const EMPTY_KEYS_ERROR_RESPONSE: &str = "-ERROR: no data is saved\r\n";

pub const OPCODE_META: u8 = 0xFA;
pub const OPCODE_START_DB: u8 = 0xFE;
pub const OPCODE_SIZE: u8 = 0xFB;
pub const OPCODE_EXPIRETIME_MS: u8 = 0xFC;
pub const OPCODE_EXPIRETIME_S: u8 = 0xFD;
pub const OPCODE_EOF: u8 = 0xFF;

pub const TYPE_STRING: u8 = 0x00;
pub const TYPE_LIST: u8 = 0x01;
pub const TYPE_SET: u8 = 0x02;
pub const TYPE_ZSET: u8 = 0x03;
pub const TYPE_HASH: u8 = 0x04;

pub const MAGIC_NUMBER: &[u8] = b"REDIS";
pub const RDB_VERSION: &[u8] = b"0011";
pub const RDB_META_VERSION_KEY: &str = "redis-ver";
pub const RDB_META_VERSION_VALUE: &str = "6.0.0";
pub const RDB_DB_INDEX: usize = 7;

pub const SET_ARGUMENTS_ERROR: &str = "not enough args";
pub const UNKNOWN_OPTION_ERROR: &str = "Unknown option";
pub const INVALID_OPTION_VALUE_ERROR: &str = "Invalid option value";
pub const OPTION_ARGUMENT_MISSING_ERROR: &str = "Option requires an argument";
pub const CONFIG_ARGUMENTS_ERROR: &str = "CONFIG subcommand requires at least 2 arguments";
pub const UNSUPPORTED_CONFIG_SUBCOMMAND_ERROR: &str = "Unsupported CONFIG subcommand";
pub const UNSUPPORTED_PATTERN_ERROR: &str = "Unsupported KEYS pattern";
