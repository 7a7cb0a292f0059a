//! 세션 통계

use serde::Serialize;

/// 세션 카운터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// 송신 패킷 수 (재전송 제외)
    pub packets_sent: u64,

    /// 수신 패킷 수 (디코딩 실패 포함)
    pub packets_received: u64,

    /// 재전송 수
    pub retransmissions: u64,

    /// 보낸 ACK 수 (피기백 포함)
    pub acks_sent: u64,

    /// 송신 커맨드 수
    pub commands_sent: u64,

    /// 수신 커맨드 수
    pub commands_received: u64,

    /// ACK 타임아웃 수
    pub message_timeouts: u64,

    /// 연결 손실 수
    pub connection_losses: u64,

    /// 버려진 데이터그램 수
    pub decode_errors: u64,

    /// Open에 도달한 횟수
    pub connections_opened: u64,

    /// 알림 채널이 가득 차 버려진 알림 수 (드라이버가 기록)
    pub events_dropped: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.packets_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Packets: {} sent / {} recv | Retransmits: {} ({:.1}%) | Acks: {} | Commands: {} sent / {} recv | Timeouts: {} | Lost: {} | Dropped: {}",
            self.packets_sent,
            self.packets_received,
            self.retransmissions,
            self.retransmit_ratio() * 100.0,
            self.acks_sent,
            self.commands_sent,
            self.commands_received,
            self.message_timeouts,
            self.connection_losses,
            self.decode_errors,
        )
    }
}
