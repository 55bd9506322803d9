use crate::command::{Command, ConfigCommand};
use crate::errors::{ArgumentError, ProtocolError};
use crate::protocol_constants::*;
use bytes::Bytes;

/// Result of attempting to frame one request out of the accumulation
/// buffer. `Incomplete` means the caller should read more bytes and retry;
/// nothing has been consumed.
pub enum FrameOutcome {
    Complete { tokens: Vec<Bytes>, consumed: usize },
    Incomplete,
}

pub struct CommandParser;

impl CommandParser {
    /// Frames one request from the front of `input`. Requests are arrays of
    /// bulk strings; argument bytes pass through verbatim.
    pub fn try_parse_request(input: &[u8]) -> Result<FrameOutcome, ProtocolError> {
        if input.is_empty() {
            return Ok(FrameOutcome::Incomplete);
        }
        if input[0] != b'*' {
            return Err(ProtocolError::NotAnArray);
        }

        let mut pos = 1;
        let num_args = match Self::read_decimal_line(input, &mut pos)? {
            Some(n) => n,
            None => return Ok(FrameOutcome::Incomplete),
        };

        let mut tokens = Vec::with_capacity(num_args.min(64));
        for _ in 0..num_args {
            if pos >= input.len() {
                return Ok(FrameOutcome::Incomplete);
            }
            if input[pos] != b'$' {
                return Err(ProtocolError::InvalidBulkHeader);
            }
            pos += 1;
            let bulk_len = match Self::read_decimal_line(input, &mut pos)? {
                Some(n) => n,
                None => return Ok(FrameOutcome::Incomplete),
            };
            if input.len() < pos + bulk_len + 2 {
                return Ok(FrameOutcome::Incomplete);
            }
            if &input[pos + bulk_len..pos + bulk_len + 2] != CRLF.as_bytes() {
                return Err(ProtocolError::InvalidLength);
            }
            tokens.push(Bytes::copy_from_slice(&input[pos..pos + bulk_len]));
            pos += bulk_len + 2;
        }

        Ok(FrameOutcome::Complete { tokens, consumed: pos })
    }

    /// Reads a CRLF-terminated base-10 integer starting at `*pos`. Returns
    /// `None` when the terminator has not arrived yet.
    fn read_decimal_line(input: &[u8], pos: &mut usize) -> Result<Option<usize>, ProtocolError> {
        let rest = &input[*pos..];
        let line_end = match rest.windows(2).position(|w| w == CRLF.as_bytes()) {
            Some(i) => i,
            None => return Ok(None),
        };
        let value = std::str::from_utf8(&rest[..line_end])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(ProtocolError::InvalidLength)?;
        *pos += line_end + 2;
        Ok(Some(value))
    }

    /// Turns framed tokens into a command. The name compares
    /// case-insensitively; everything after it is kept as raw bytes.
    pub fn parse_tokens(tokens: Vec<Bytes>) -> Result<Command, ArgumentError> {
        let name = tokens
            .first()
            .map(|t| String::from_utf8_lossy(t).to_uppercase())
            .ok_or_else(|| ArgumentError::General("empty command".into()))?;

        match name.as_str() {
            PING_COMMAND => Self::parse_ping(&tokens),
            COMMAND_COMMAND => Ok(Command::Ping),
            ECHO_COMMAND => Self::parse_echo(&tokens),
            GET_COMMAND => Self::parse_get(&tokens),
            SET_COMMAND => Self::parse_set(&tokens),
            CONFIG_COMMAND => Self::parse_config(&tokens),
            KEYS_COMMAND => Self::parse_keys(&tokens),
            SAVE_COMMAND => Ok(Command::Save),
            INFO_COMMAND => Self::parse_info(&tokens),
            REPLCONF_COMMAND => Ok(Command::ReplConf(Self::string_args(&tokens))),
            PSYNC_COMMAND => Ok(Command::Psync(Self::string_args(&tokens))),
            _ => Err(ArgumentError::UnknownCommand(name)),
        }
    }

    fn string_args(tokens: &[Bytes]) -> Vec<String> {
        tokens[1..]
            .iter()
            .map(|t| String::from_utf8_lossy(t).to_string())
            .collect()
    }

    fn check_args_len(
        tokens: &[Bytes],
        expected_len: usize,
        command_name: &str,
    ) -> Result<(), ArgumentError> {
        if tokens.len() != expected_len {
            Err(ArgumentError::General(format!(
                "wrong number of arguments for {}",
                command_name
            )))
        } else {
            Ok(())
        }
    }

    fn parse_ping(tokens: &[Bytes]) -> Result<Command, ArgumentError> {
        Self::check_args_len(tokens, 1, PING_COMMAND)?;
        Ok(Command::Ping)
    }

    fn parse_echo(tokens: &[Bytes]) -> Result<Command, ArgumentError> {
        Self::check_args_len(tokens, 2, ECHO_COMMAND)?;
        Ok(Command::Echo(tokens[1].clone()))
    }

    fn parse_get(tokens: &[Bytes]) -> Result<Command, ArgumentError> {
        Self::check_args_len(tokens, 2, GET_COMMAND)?;
        Ok(Command::Get(tokens[1].clone()))
    }

    fn parse_set(tokens: &[Bytes]) -> Result<Command, ArgumentError> {
        if tokens.len() < 3 {
            return Err(ArgumentError::General(SET_ARGUMENTS_ERROR.into()));
        }

        let key = tokens[1].clone();
        let value = tokens[2].clone();
        let mut px = None;
        let mut ex = None;

        let mut arg_index = 3;
        while arg_index < tokens.len() {
            let option = String::from_utf8_lossy(&tokens[arg_index]).to_uppercase();
            match option.as_str() {
                PX_OPTION => {
                    px = Some(Self::parse_option_value(tokens, arg_index, PX_OPTION)?);
                    arg_index += 2;
                }
                EX_OPTION => {
                    ex = Some(Self::parse_option_value(tokens, arg_index, EX_OPTION)?);
                    arg_index += 2;
                }
                _ => {
                    return Err(ArgumentError::General(format!(
                        "{}: '{}'",
                        UNKNOWN_OPTION_ERROR, option
                    )))
                }
            }
        }

        Ok(Command::Set { key, value, px, ex })
    }

    fn parse_option_value(
        tokens: &[Bytes],
        index: usize,
        option: &str,
    ) -> Result<i64, ArgumentError> {
        let raw = tokens.get(index + 1).ok_or_else(|| {
            ArgumentError::General(format!("{}: {}", OPTION_ARGUMENT_MISSING_ERROR, option))
        })?;
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                ArgumentError::General(format!("{}: {}", INVALID_OPTION_VALUE_ERROR, option))
            })
    }

    fn parse_config(tokens: &[Bytes]) -> Result<Command, ArgumentError> {
        if tokens.len() < 3 {
            return Err(ArgumentError::General(CONFIG_ARGUMENTS_ERROR.into()));
        }
        let subcommand = String::from_utf8_lossy(&tokens[1]).to_uppercase();
        match subcommand.as_str() {
            CONFIG_GET_OPTION => Ok(Command::Config(ConfigCommand::Get(
                String::from_utf8_lossy(&tokens[2]).to_string(),
            ))),
            _ => Err(ArgumentError::General(
                UNSUPPORTED_CONFIG_SUBCOMMAND_ERROR.into(),
            )),
        }
    }

    fn parse_keys(tokens: &[Bytes]) -> Result<Command, ArgumentError> {
        Self::check_args_len(tokens, 2, KEYS_COMMAND)?;
        if tokens[1].as_ref() != b"*" {
            return Err(ArgumentError::General(UNSUPPORTED_PATTERN_ERROR.into()));
        }
        Ok(Command::Keys)
    }

    fn parse_info(tokens: &[Bytes]) -> Result<Command, ArgumentError> {
        Self::check_args_len(tokens, 2, INFO_COMMAND)?;
        Ok(Command::Info(String::from_utf8_lossy(&tokens[1]).to_string()))
    }
}
