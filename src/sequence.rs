//! 시퀀스 번호와 확인 응답 추적
//!
//! - 로컬 시퀀스 카운터 (16비트, wrap-around)
//! - 확인 대기 중인 송신 패킷 (재전송 / 타임아웃 타이머 포함)
//! - 아직 ACK를 보내지 않은 수신 패킷

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::scheduler::{earliest, Timer};

/// 16비트 시리얼 비교: `a <= b`
///
/// 카운터가 한 바퀴 돈 뒤에도 누적 ACK가 동작하도록 절반 범위 안에서 비교한다.
pub fn seq_le(a: u16, b: u16) -> bool {
    b.wrapping_sub(a) < 0x8000
}

/// 확인 대기 중인 송신 패킷
#[derive(Debug)]
pub struct PendingConfirmation {
    /// 로컬 시퀀스
    pub local_seq: u16,

    /// 재전송용 캐시 (REPEAT 플래그가 켜진 직렬화 바이트)
    pub datagram: Bytes,

    repeat: Timer,
    timeout: Timer,
}

/// ACK 대기 중인 수신 패킷
#[derive(Debug, Clone, Copy)]
struct UnackedInbound {
    token: u64,
    local_seq: u16,
}

#[derive(Debug, Default)]
pub struct SequenceTracker {
    local_seq: u16,
    pending: VecDeque<PendingConfirmation>,
    unacked: VecDeque<UnackedInbound>,
    deferred: VecDeque<u64>,
    next_token: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 연결 시도: 카운터를 0으로 되돌리고 모든 대기열을 비운다
    pub fn reset(&mut self) {
        self.local_seq = 0;
        self.clear();
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.unacked.clear();
        self.deferred.clear();
    }

    pub fn local_seq(&self) -> u16 {
        self.local_seq
    }

    pub fn advance(&mut self) {
        self.local_seq = self.local_seq.wrapping_add(1);
    }

    #[cfg(test)]
    pub(crate) fn set_local_seq(&mut self, value: u16) {
        self.local_seq = value;
    }

    /// 송신한 SYNC/CONNECT 패킷을 확인 대기로 등록
    pub fn register_pending(
        &mut self,
        local_seq: u16,
        datagram: Bytes,
        now: Instant,
        retransmit_interval: Duration,
        ack_timeout: Duration,
    ) {
        let mut repeat = Timer::default();
        repeat.arm(now, retransmit_interval);
        let mut timeout = Timer::default();
        timeout.arm(now, ack_timeout);

        self.pending.push_back(PendingConfirmation {
            local_seq,
            datagram,
            repeat,
            timeout,
        });
    }

    /// 누적 ACK: `foreign_seq` 이하의 대기 패킷을 모두 제거하고 개수를 반환
    pub fn confirm(&mut self, foreign_seq: u16) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| !seq_le(p.local_seq, foreign_seq));
        before - self.pending.len()
    }

    /// 시퀀스가 정확히 같은 대기 패킷 하나만 제거
    pub fn confirm_exact(&mut self, local_seq: u16) -> bool {
        let Some(index) = self.pending.iter().position(|p| p.local_seq == local_seq) else {
            return false;
        };
        self.pending.remove(index);
        true
    }

    pub fn pending_seqs(&self) -> Vec<u16> {
        self.pending.iter().map(|p| p.local_seq).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 재전송 시각이 된 패킷의 캐시 바이트
    pub fn due_retransmissions(&mut self, now: Instant, interval: Duration) -> Vec<Bytes> {
        self.pending
            .iter_mut()
            .filter_map(|p| {
                p.repeat
                    .expire_periodic(now, interval)
                    .then(|| p.datagram.clone())
            })
            .collect()
    }

    /// ACK 타임아웃이 지난 패킷의 시퀀스 (패킷당 한 번)
    pub fn expired_timeouts(&mut self, now: Instant) -> Vec<u16> {
        self.pending
            .iter_mut()
            .filter_map(|p| p.timeout.expire(now).then_some(p.local_seq))
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(
            self.pending
                .iter()
                .flat_map(|p| [p.repeat.deadline(), p.timeout.deadline()]),
        )
    }

    /// 수신한 SYNC/CONNECT 패킷을 ACK 대기로 기록하고 식별 토큰 반환
    pub fn record_inbound(&mut self, local_seq: u16) -> u64 {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.unacked.push_back(UnackedInbound { token, local_seq });
        token
    }

    pub fn unacked_len(&self) -> usize {
        self.unacked.len()
    }

    /// 피기백: 가장 오래된 미확인 수신 패킷 하나를 꺼낸다
    pub fn take_piggyback(&mut self) -> Option<u16> {
        self.unacked.pop_front().map(|u| u.local_seq)
    }

    /// 토큰에 해당하는 미확인 수신 패킷이 아직 남아 있으면 꺼낸다
    pub fn take_unacked(&mut self, token: u64) -> Option<u16> {
        let index = self.unacked.iter().position(|u| u.token == token)?;
        self.unacked.remove(index).map(|u| u.local_seq)
    }

    /// ACK 전용 응답을 다음 틱으로 미룬다
    pub fn defer_response(&mut self, token: u64) {
        self.deferred.push_back(token);
    }

    pub fn take_deferred(&mut self) -> Vec<u64> {
        self.deferred.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETRANSMIT: Duration = Duration::from_millis(600);
    const TIMEOUT: Duration = Duration::from_millis(1000);

    fn tracker_with_pending(seqs: &[u16], now: Instant) -> SequenceTracker {
        let mut tracker = SequenceTracker::new();
        for &seq in seqs {
            tracker.register_pending(seq, Bytes::from(vec![seq as u8]), now, RETRANSMIT, TIMEOUT);
        }
        tracker
    }

    #[test]
    fn test_counter_wraps() {
        let mut tracker = SequenceTracker::new();
        tracker.set_local_seq(u16::MAX);
        tracker.advance();
        assert_eq!(tracker.local_seq(), 0);
    }

    #[test]
    fn test_cumulative_ack() {
        let mut tracker = tracker_with_pending(&[3, 4, 5], Instant::now());

        assert_eq!(tracker.confirm(4), 2);
        assert_eq!(tracker.pending_seqs(), vec![5]);
    }

    #[test]
    fn test_cumulative_ack_across_wrap() {
        let mut tracker = tracker_with_pending(&[65534, 65535, 0, 1], Instant::now());

        assert_eq!(tracker.confirm(0), 3);
        assert_eq!(tracker.pending_seqs(), vec![1]);
    }

    #[test]
    fn test_stale_ack_removes_nothing() {
        let mut tracker = tracker_with_pending(&[10, 11], Instant::now());
        assert_eq!(tracker.confirm(9), 0);
        assert_eq!(tracker.pending_len(), 2);
    }

    #[test]
    fn test_confirm_exact_leaves_other_entries() {
        let mut tracker = tracker_with_pending(&[0, 40000, 40001], Instant::now());

        assert!(tracker.confirm_exact(0));
        assert!(!tracker.confirm_exact(0));
        assert_eq!(tracker.pending_seqs(), vec![40000, 40001]);
    }

    #[test]
    fn test_retransmit_and_timeout_schedule() {
        let t0 = Instant::now();
        let mut tracker = tracker_with_pending(&[7], t0);

        assert!(tracker.due_retransmissions(t0 + Duration::from_millis(599), RETRANSMIT).is_empty());
        assert_eq!(
            tracker.due_retransmissions(t0 + RETRANSMIT, RETRANSMIT),
            vec![Bytes::from(vec![7u8])]
        );
        assert!(tracker.expired_timeouts(t0 + Duration::from_millis(999)).is_empty());
        assert_eq!(tracker.expired_timeouts(t0 + TIMEOUT), vec![7]);
        assert!(tracker.expired_timeouts(t0 + TIMEOUT * 3).is_empty());
        assert_eq!(tracker.next_deadline(), Some(t0 + RETRANSMIT * 2));
    }

    #[test]
    fn test_piggyback_drains_one() {
        let mut tracker = SequenceTracker::new();
        tracker.record_inbound(10);
        let second = tracker.record_inbound(11);

        assert_eq!(tracker.take_piggyback(), Some(10));
        assert_eq!(tracker.unacked_len(), 1);
        assert_eq!(tracker.take_unacked(second), Some(11));
        assert_eq!(tracker.take_piggyback(), None);
    }

    #[test]
    fn test_deferred_response_skipped_after_piggyback() {
        let mut tracker = SequenceTracker::new();
        let token = tracker.record_inbound(3);
        tracker.defer_response(token);

        assert_eq!(tracker.take_piggyback(), Some(3));
        let deferred = tracker.take_deferred();
        assert_eq!(deferred, vec![token]);
        assert_eq!(tracker.take_unacked(token), None);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = tracker_with_pending(&[1, 2], Instant::now());
        tracker.set_local_seq(40);
        tracker.record_inbound(9);

        tracker.reset();
        assert_eq!(tracker.local_seq(), 0);
        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(tracker.unacked_len(), 0);
        assert!(tracker.next_deadline().is_none());
    }
}
