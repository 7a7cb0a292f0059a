//! 타이머 스케줄링
//!
//! 타이머는 별도 태스크가 아닌 마감 시각(deadline) 필드다. 구동 루프는
//! [`crate::Session::poll_timeout`]이 돌려주는 가장 이른 마감까지 잠들었다가
//! [`crate::Session::handle_timeout`]을 호출한다. 재설정은 항상 기존 마감을
//! 덮어쓰므로 같은 타이머가 두 번 걸리는 일은 없다.

use std::time::Duration;

use tokio::time::Instant;

/// 단일 마감 시각 타이머
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// 기존 마감을 지우고 `now + after`로 설정
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// 설정되어 있지 않을 때만 설정. 설정했으면 true
    pub fn arm_if_idle(&mut self, now: Instant, after: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.arm(now, after);
        true
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 단발성: 마감이 지났으면 해제하고 true
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// 반복성: 마감이 지났으면 다음 주기로 옮기고 true
    ///
    /// 한 주기 이상 밀렸으면 `now` 기준으로 다시 잡는다.
    pub fn expire_periodic(&mut self, now: Instant, period: Duration) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                let next = deadline + period;
                self.deadline = Some(if next <= now { now + period } else { next });
                true
            }
            _ => false,
        }
    }
}

/// 가장 이른 마감 시각
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

/// 세션 전역 타이머
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Open 상태 유휴 하트비트
    pub heartbeat: Timer,

    /// 지연된 ACK 전용 응답 (다음 스케줄링 기회에 즉시 실행)
    pub deferred_ack: Timer,
}

impl Scheduler {
    pub fn cancel_all(&mut self) {
        self.heartbeat.cancel();
        self.deferred_ack.cancel();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.heartbeat.deadline(), self.deferred_ack.deadline()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rearm_replaces_deadline() {
        let t0 = Instant::now();
        let mut timer = Timer::default();

        timer.arm(t0, Duration::from_millis(600));
        timer.arm(t0 + Duration::from_millis(100), Duration::from_millis(600));

        assert_eq!(timer.deadline(), Some(t0 + Duration::from_millis(700)));
        assert!(!timer.expire(t0 + Duration::from_millis(600)));
        assert!(timer.expire(t0 + Duration::from_millis(700)));
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_arm_if_idle() {
        let t0 = Instant::now();
        let mut timer = Timer::default();

        assert!(timer.arm_if_idle(t0, Duration::from_millis(16)));
        assert!(!timer.arm_if_idle(t0 + Duration::from_millis(5), Duration::from_millis(16)));
        assert_eq!(timer.deadline(), Some(t0 + Duration::from_millis(16)));
    }

    #[test]
    fn test_periodic_catches_up() {
        let t0 = Instant::now();
        let period = Duration::from_millis(600);
        let mut timer = Timer::default();
        timer.arm(t0, period);

        assert!(timer.expire_periodic(t0 + period, period));
        assert_eq!(timer.deadline(), Some(t0 + period * 2));

        assert!(timer.expire_periodic(t0 + period * 5, period));
        assert_eq!(timer.deadline(), Some(t0 + period * 6));
    }

    #[test]
    fn test_earliest() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_millis(1);

        assert_eq!(earliest([None, Some(later), Some(t0)]), Some(t0));
        assert_eq!(earliest([None, None]), None);
    }
}
