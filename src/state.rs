//! 연결 상태

use std::fmt;

use serde::Serialize;

/// 연결 상태 머신의 상태
///
/// ```text
/// Closed ──connect──▶ Attempting ──SYNC 수신──▶ Establishing ──12바이트 패킷──▶ Open
///   ▲                                                                          │
///   └───────────────────────────── disconnect ─────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// 연결 없음
    #[default]
    Closed,
    /// CONNECT 패킷 전송, 응답 대기
    Attempting,
    /// 세션 ID 확정, 초기 상태 덤프 수신 중
    Establishing,
    /// 연결 완료
    Open,
}

impl ConnectionState {
    pub fn description(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "Not connected",
            ConnectionState::Attempting => "Attempting to connect",
            ConnectionState::Establishing => "Establishing connection",
            ConnectionState::Open => "Connected",
        }
    }

    pub fn is_open(&self) -> bool {
        *self == ConnectionState::Open
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Attempting => "attempting",
            ConnectionState::Establishing => "establishing",
            ConnectionState::Open => "open",
        };
        f.write_str(name)
    }
}
