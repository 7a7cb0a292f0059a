//! 커맨드 레코드 코덱
//!
//! 바디는 커맨드 레코드의 연속:
//!
//! ```text
//! 0: 레코드 전체 길이 (u16 BE, 헤드 8바이트 포함)
//! 2: 예약 (0)
//! 4: 커맨드 이름 (ASCII 4바이트)
//! 8: 페이로드
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// 레코드 헤드 길이
pub const COMMAND_HEAD_LEN: usize = 8;

/// 4바이트 커맨드 이름 (예: `PrgI`, `TlIn`)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandName([u8; 4]);

impl CommandName {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl FromStr for CommandName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidCommandName(s.to_string()))?;
        if !s.is_ascii() {
            return Err(Error::InvalidCommandName(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandName({})", self)
    }
}

/// 이름과 가공되지 않은 페이로드로 이루어진 커맨드
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    name: CommandName,
    payload: Bytes,
}

impl RawCommand {
    pub fn new(name: CommandName, payload: impl Into<Bytes>) -> Self {
        Self {
            name,
            payload: payload.into(),
        }
    }

    pub fn name(&self) -> CommandName {
        self.name
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// 인코딩된 레코드 길이 (헤드 8바이트 + 페이로드)
    pub fn encoded_len(&self) -> usize {
        COMMAND_HEAD_LEN + self.payload.len()
    }

    /// 길이 검사는 [`crate::Packet::encode`]가 한다
    pub(crate) fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.encoded_len() as u16);
        buf.put_u16(0);
        buf.put_slice(self.name.as_bytes());
        buf.put_slice(&self.payload);
    }
}

/// 커맨드 목록을 바디로 직렬화
pub(crate) fn encode_commands(commands: &[RawCommand], buf: &mut BytesMut) {
    for command in commands {
        command.encode(buf);
    }
}

/// 바디를 커맨드 목록으로 역직렬화
///
/// 커서가 바디 끝에 정확히 도달해야 한다. 선언 길이가 남은 바이트를
/// 넘거나 헤드보다 짧으면 `Framing` 에러이며 레코드는 하나도 반환되지 않는다.
pub fn decode_commands(body: &Bytes) -> Result<Vec<RawCommand>> {
    let mut commands = Vec::new();
    let mut cursor = 0;

    while cursor < body.len() {
        let remaining = body.len() - cursor;
        if remaining < COMMAND_HEAD_LEN {
            return Err(Error::Framing {
                offset: cursor,
                declared: COMMAND_HEAD_LEN,
                remaining,
            });
        }

        let declared = u16::from_be_bytes([body[cursor], body[cursor + 1]]) as usize;
        if declared < COMMAND_HEAD_LEN || declared > remaining {
            return Err(Error::Framing {
                offset: cursor,
                declared,
                remaining,
            });
        }

        let mut name = [0u8; 4];
        name.copy_from_slice(&body[cursor + 4..cursor + 8]);
        let payload = body.slice(cursor + COMMAND_HEAD_LEN..cursor + declared);

        commands.push(RawCommand::new(CommandName::from_bytes(name), payload));
        cursor += declared;
    }

    Ok(commands)
}
