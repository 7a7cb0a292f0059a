//! 생존 감시
//!
//! 세션 앞으로 온 패킷마다 타이머를 다시 건다. 만료되면 연결 손실.

use std::time::Duration;

use tokio::time::Instant;

use crate::scheduler::Timer;

#[derive(Debug)]
pub struct LivenessMonitor {
    timer: Timer,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timer: Timer::default(),
            timeout,
        }
    }

    /// 패킷 수신 기록
    pub fn touch(&mut self, now: Instant) {
        self.timer.arm(now, self.timeout);
    }

    pub fn stop(&mut self) {
        self.timer.cancel();
    }

    /// 침묵이 허용 시간을 넘었으면 true (한 번만)
    pub fn expire(&mut self, now: Instant) -> bool {
        self.timer.expire(now)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }
}
