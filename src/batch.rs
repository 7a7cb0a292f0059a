//! 커맨드 큐와 배칭
//!
//! 틱 사이에 제출된 커맨드를 모아 하나의 SYNC 패킷으로 보낸다.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::command::RawCommand;
use crate::scheduler::Timer;

#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<RawCommand>,
    timer: Timer,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: RawCommand) {
        self.commands.push_back(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 앞에서부터 `max_bytes` 안에 들어가는 만큼 꺼낸다
    pub fn take_fitting(&mut self, max_bytes: usize) -> Vec<RawCommand> {
        let mut taken = Vec::new();
        let mut used = 0;

        while let Some(command) = self.commands.front() {
            let len = command.encoded_len();
            if used + len > max_bytes {
                break;
            }
            used += len;
            if let Some(command) = self.commands.pop_front() {
                taken.push(command);
            }
        }

        taken
    }

    /// 배치 타이머가 없을 때만 건다
    pub fn arm_batch(&mut self, now: Instant, delay: Duration) -> bool {
        self.timer.arm_if_idle(now, delay)
    }

    /// 배치 타이머 만료 여부 (만료되면 해제)
    pub fn expire_batch(&mut self, now: Instant) -> bool {
        self.timer.expire(now)
    }

    pub fn batch_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.timer.cancel();
    }
}
