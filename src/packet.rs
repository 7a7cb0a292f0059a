//! 패킷 프레이밍
//!
//! 모든 필드는 빅 엔디안:
//!
//! ```text
//! 0:  플래그 (상위 5비트) | 전체 패킷 길이 (하위 11비트), u16
//! 2:  세션 ID, u16
//! 4:  상대 시퀀스 (ACK 플래그일 때만, 아니면 0), u16
//! 6:  예약 (0), 4바이트
//! 10: 로컬 시퀀스 (SYNC/CONNECT 플래그일 때만, 아니면 0), u16
//! 12: 바디
//! ```
//!
//! CONNECT 패킷의 바디는 커맨드 레코드가 아닌 불투명한 핸드쉐이크 페이로드다.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::command::{decode_commands, encode_commands, RawCommand};
use crate::{Error, Result, HEADER_LEN, MAX_PACKET_LEN};

const LENGTH_MASK: u16 = 0x07FF;
const FLAG_SHIFT: u32 = 11;

bitflags! {
    /// 헤더 플래그 (첫 바이트 상위 5비트)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u8 {
        /// 신뢰성 전송, 상대의 ACK 필요
        const SYNC    = 0b0000_0001;
        /// 연결 핸드쉐이크
        const CONNECT = 0b0000_0010;
        /// 재전송
        const REPEAT  = 0b0000_0100;
        const UNKNOWN = 0b0000_1000;
        /// 상대 시퀀스 필드 유효
        const ACK     = 0b0001_0000;
    }
}

/// 12바이트 패킷 헤더
///
/// 전체 길이 필드는 바디로부터 계산되므로 여기에 없다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub flags: Flags,
    pub session_id: u16,
    pub foreign_seq: u16,
    pub local_seq: u16,
}

impl Default for Flags {
    fn default() -> Self {
        Flags::empty()
    }
}

impl PacketHeader {
    pub fn is_sync(&self) -> bool {
        self.flags.contains(Flags::SYNC)
    }

    pub fn is_connect(&self) -> bool {
        self.flags.contains(Flags::CONNECT)
    }

    pub fn is_ack(&self) -> bool {
        self.flags.contains(Flags::ACK)
    }

    /// 상대의 확인이 필요한 패킷인지 여부
    pub fn is_reliable(&self) -> bool {
        self.flags.intersects(Flags::SYNC | Flags::CONNECT)
    }

    fn encode(&self, total_len: usize, buf: &mut impl BufMut) {
        let first = (total_len as u16 & LENGTH_MASK) | ((self.flags.bits() as u16) << FLAG_SHIFT);
        buf.put_u16(first);
        buf.put_u16(self.session_id);
        buf.put_u16(if self.is_ack() { self.foreign_seq } else { 0 });
        buf.put_u32(0);
        buf.put_u16(if self.is_reliable() { self.local_seq } else { 0 });
    }
}

/// 패킷 바디
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Commands(Vec<RawCommand>),
    Handshake(Bytes),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Body::Commands(commands) => commands.iter().map(RawCommand::encoded_len).sum(),
            Body::Handshake(payload) => payload.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn commands(&self) -> &[RawCommand] {
        match self {
            Body::Commands(commands) => commands,
            Body::Handshake(_) => &[],
        }
    }
}

/// 헤더 + 바디
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub body: Body,
}

impl Packet {
    pub fn new(flags: Flags, commands: Vec<RawCommand>) -> Self {
        Self {
            header: PacketHeader {
                flags,
                ..PacketHeader::default()
            },
            body: Body::Commands(commands),
        }
    }

    /// 핸드쉐이크 페이로드를 가진 CONNECT 패킷
    pub fn connect(payload: Bytes) -> Self {
        Self {
            header: PacketHeader {
                flags: Flags::CONNECT,
                ..PacketHeader::default()
            },
            body: Body::Handshake(payload),
        }
    }

    /// 전체 길이 (헤더 + 바디)
    pub fn len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// 커맨드 없는 헤더 전용 패킷 여부
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn commands(&self) -> &[RawCommand] {
        self.body.commands()
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Result<Bytes> {
        let total_len = self.len();
        if total_len > MAX_PACKET_LEN {
            return Err(Error::PacketTooLarge {
                len: total_len,
                max: MAX_PACKET_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(total_len);
        self.header.encode(total_len, &mut buf);
        match &self.body {
            Body::Commands(commands) => encode_commands(commands, &mut buf),
            Body::Handshake(payload) => buf.put_slice(payload),
        }
        Ok(buf.freeze())
    }

    /// 수신 데이터그램 역직렬화
    ///
    /// 길이 필드와 실제 수신 길이가 다르면 `LengthMismatch`.
    /// 세션 ID 검증은 세션 상태가 필요하므로 여기서 하지 않는다.
    pub fn decode(datagram: Bytes) -> Result<Self> {
        if datagram.len() < HEADER_LEN {
            return Err(Error::Truncated {
                len: datagram.len(),
                min: HEADER_LEN,
            });
        }

        let mut buf = datagram.clone();
        let first = buf.get_u16();
        let declared = (first & LENGTH_MASK) as usize;
        if declared != datagram.len() {
            return Err(Error::LengthMismatch {
                declared,
                actual: datagram.len(),
            });
        }

        let flags = Flags::from_bits_retain((first >> FLAG_SHIFT) as u8);
        let session_id = buf.get_u16();
        let foreign_seq = buf.get_u16();
        buf.advance(4);
        let local_seq = buf.get_u16();

        let header = PacketHeader {
            flags,
            session_id,
            foreign_seq,
            local_seq,
        };

        let body = if header.is_connect() {
            Body::Handshake(buf)
        } else {
            Body::Commands(decode_commands(&buf)?)
        };

        Ok(Self { header, body })
    }
}
