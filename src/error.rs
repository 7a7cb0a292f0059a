//! 에러 타입 정의

use thiserror::Error;

/// 제어 링크 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("유효하지 않은 IP 주소: {0}")]
    InvalidAddress(String),

    #[error("대상 주소가 설정되지 않음")]
    AddressNotSet,

    #[error("패킷이 너무 짧음: {len} bytes (최소 {min})")]
    Truncated { len: usize, min: usize },

    #[error("패킷 길이 불일치: header={declared}, received={actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("세션 ID 불일치: expected {expected:#06X}, got {got:#06X}")]
    IdentityMismatch { expected: u16, got: u16 },

    #[error("커맨드 프레이밍 에러: offset={offset}, declared={declared}, remaining={remaining}")]
    Framing {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    #[error("유효하지 않은 커맨드 이름: {0:?}")]
    InvalidCommandName(String),

    #[error("커맨드가 너무 큼: {len} bytes (최대 {max})")]
    CommandTooLarge { len: usize, max: usize },

    #[error("패킷이 너무 큼: {len} bytes (최대 {max})")]
    PacketTooLarge { len: usize, max: usize },

    #[error("채널 닫힘")]
    ChannelClosed,
}

impl Error {
    /// 수신 데이터그램 디코딩 단계의 에러인지 여부
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::Truncated { .. }
                | Error::LengthMismatch { .. }
                | Error::IdentityMismatch { .. }
                | Error::Framing { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_classification() {
        assert!(Error::Truncated { len: 4, min: 12 }.is_decode_error());
        assert!(Error::IdentityMismatch { expected: 1, got: 2 }.is_decode_error());
        assert!(!Error::AddressNotSet.is_decode_error());
        assert!(!Error::CommandTooLarge { len: 4096, max: 2035 }.is_decode_error());
    }

    #[test]
    fn test_identity_mismatch_message() {
        let message = Error::IdentityMismatch { expected: 0x8001, got: 0x0042 }.to_string();
        assert!(message.contains("0x8001"));
        assert!(message.contains("0x0042"));
    }
}
