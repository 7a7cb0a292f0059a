//! 링크 설정

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DEFAULT_PORT;

/// 제어 링크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 스위처 UDP 포트
    pub port: u16,

    /// 로컬 바인드 주소 (포트 0이면 자동 할당)
    pub bind_addr: SocketAddr,

    /// 미확인 패킷 재전송 간격 (밀리초)
    pub retransmit_interval_ms: u64,

    /// ACK 대기 타임아웃 (밀리초)
    /// 만료되어도 재전송은 계속됨
    pub ack_timeout_ms: u64,

    /// Open 상태 하트비트 간격 (밀리초)
    pub heartbeat_interval_ms: u64,

    /// 커맨드 배칭 지연 (밀리초)
    pub batch_delay_ms: u64,

    /// 수신 침묵 허용 시간 (밀리초)
    pub liveness_timeout_ms: u64,

    /// 연결 손실 시 자동 재연결 여부
    pub auto_reconnect: bool,

    /// 내부 명령 채널 크기
    pub command_buffer: usize,

    /// 알림 채널 크기. 가득 차면 새 알림은 버려진다
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            retransmit_interval_ms: 600,
            ack_timeout_ms: 1000,
            heartbeat_interval_ms: 600,
            batch_delay_ms: 16,
            liveness_timeout_ms: 800,
            auto_reconnect: true,
            command_buffer: 1000,
            event_buffer: 1000,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 불안정한 네트워크용 설정
    ///
    /// 스위처가 보내는 하트비트 주기는 바꿀 수 없으므로
    /// 수신 쪽 허용 시간과 ACK 타임아웃만 늘린다.
    pub fn lossy_network() -> Self {
        Self {
            ack_timeout_ms: 2000,
            liveness_timeout_ms: 2500,
            ..Self::default()
        }
    }

    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timers() {
        let config = Config::default();

        assert_eq!(config.port, 9910);
        assert_eq!(config.retransmit_interval(), Duration::from_millis(600));
        assert_eq!(config.ack_timeout(), Duration::from_millis(1000));
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(600));
        assert_eq!(config.batch_delay(), Duration::from_millis(16));
        assert_eq!(config.liveness_timeout(), Duration::from_millis(800));
        assert!(config.auto_reconnect);
        assert_eq!(config.event_buffer, 1000);
    }

    #[test]
    fn test_lossy_preset_keeps_wire_intervals() {
        let config = Config::lossy_network();

        assert_eq!(config.retransmit_interval_ms, 600);
        assert!(config.liveness_timeout_ms > Config::default().liveness_timeout_ms);
    }
}
