//! 상위 계층 알림
//!
//! 문자열 키 이벤트 대신 닫힌 열거형과 이름별 구독 채널을 쓴다.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::command::{CommandName, RawCommand};
use crate::state::ConnectionState;
use crate::Error;

/// 세션이 내보내는 알림
#[derive(Debug)]
pub enum Event {
    /// 연결 상태 변경
    StateChanged(ConnectionState),

    /// Open 진입
    Connected,

    /// 대상 주소 변경
    AddressChanged(Ipv4Addr),

    /// 복구 가능한 에러 (설정, 디코딩, 전송)
    Error(Error),

    /// ACK 타임아웃 (재전송은 계속됨)
    MessageTimeout { local_seq: u16 },

    /// 상대 침묵으로 연결 손실
    ConnectionLost,

    /// 수신 패킷 하나에 담긴 커맨드 (순서 유지)
    Commands(Vec<RawCommand>),

    /// 개별 커맨드
    RawCommand(RawCommand),
}

/// 이름별 커맨드 페이로드 수신기
pub type CommandReceiver = mpsc::UnboundedReceiver<Bytes>;

/// 커맨드 이름별 구독자 목록
#[derive(Debug, Default)]
pub struct Subscriptions {
    subscribers: HashMap<CommandName, Vec<mpsc::UnboundedSender<Bytes>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, name: CommandName) -> CommandReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.insert(name, tx);
        rx
    }

    pub fn insert(&mut self, name: CommandName, tx: mpsc::UnboundedSender<Bytes>) {
        self.subscribers.entry(name).or_default().push(tx);
    }

    /// 같은 이름의 구독자에게 페이로드 전달. 닫힌 구독은 정리한다
    pub fn dispatch(&mut self, command: &RawCommand) -> usize {
        let Some(senders) = self.subscribers.get_mut(&command.name()) else {
            return 0;
        };

        senders.retain(|tx| tx.send(command.payload().clone()).is_ok());
        let delivered = senders.len();

        if senders.is_empty() {
            debug!("구독 해제: {}", command.name());
            self.subscribers.remove(&command.name());
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
