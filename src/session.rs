//! 세션 상태 머신 (sans-IO)
//!
//! 소켓도 타이머 태스크도 갖지 않는다. 호출자가 현재 시각과 함께 입력을
//! 넣고, 보낼 데이터그램과 알림을 꺼내 가며, 다음 마감 시각에 맞춰
//! [`Session::handle_timeout`]을 호출한다.
//!
//! ## 핸드쉐이크
//!
//! ```text
//! client                                   switcher
//!   │── CONNECT (uid=임의, 8바이트 페이로드) ──▶│
//!   │◀──────────── SYNC (uid=할당) ─────────────│   Attempting → Establishing
//!   │◀──────────── 상태 덤프 (SYNC...) ─────────│
//!   │◀──────────── 12바이트 패킷 ───────────────│   Establishing → Open
//!   │── SYNC (빈 패킷, 첫 동기화) ─────────────▶│
//! ```

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::batch::CommandQueue;
use crate::command::RawCommand;
use crate::event::Event;
use crate::liveness::LivenessMonitor;
use crate::packet::{Body, Flags, Packet};
use crate::scheduler::{earliest, Scheduler};
use crate::sequence::SequenceTracker;
use crate::state::ConnectionState;
use crate::stats::SessionStats;
use crate::{
    Config, Error, Result, CONNECT_PAYLOAD, HEADER_LEN, MAX_COMMAND_LEN, MAX_INITIAL_SESSION_ID,
    MAX_PACKET_LEN,
};

/// 대상 주소 검증 (IPv4만 허용)
pub fn parse_address(input: &str) -> Result<Ipv4Addr> {
    input
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| Error::InvalidAddress(input.to_string()))
}

/// 하나의 제어 세션
///
/// 연결/해제를 반복해도 같은 객체를 재사용한다.
#[derive(Debug)]
pub struct Session {
    config: Config,
    state: ConnectionState,
    address: Option<Ipv4Addr>,
    session_id: u16,
    sequence: SequenceTracker,
    queue: CommandQueue,
    scheduler: Scheduler,
    liveness: LivenessMonitor,
    /// 핸드쉐이크 후 첫 SYNC 전송 여부 (첫 SYNC는 커맨드를 싣지 않는다)
    handshake_sync_sent: bool,
    /// 아직 확인되지 않은 CONNECT 패킷의 로컬 시퀀스
    connect_seq: Option<u16>,
    transmits: VecDeque<Bytes>,
    events: VecDeque<Event>,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            liveness: LivenessMonitor::new(config.liveness_timeout()),
            config,
            state: ConnectionState::Closed,
            address: None,
            session_id: 0,
            sequence: SequenceTracker::new(),
            queue: CommandQueue::new(),
            scheduler: Scheduler::default(),
            handshake_sync_sent: false,
            connect_seq: None,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
            stats: SessionStats::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    /// 스위처 소켓 주소 (주소 + 설정 포트)
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.address
            .map(|ip| SocketAddr::from((ip, self.config.port)))
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn local_seq(&self) -> u16 {
        self.sequence.local_seq()
    }

    pub fn pending_confirmations(&self) -> Vec<u16> {
        self.sequence.pending_seqs()
    }

    pub fn queued_commands(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// 대상 주소 설정
    ///
    /// 연결 중이면 관찰 가능한 중간 상태 없이 새 주소로 재연결한다.
    pub fn set_address(&mut self, input: &str, now: Instant) -> Result<()> {
        let ip = match parse_address(input) {
            Ok(ip) => ip,
            Err(e) => {
                warn!("{}", e);
                self.events.push_back(Event::Error(Error::InvalidAddress(input.to_string())));
                return Err(e);
            }
        };

        self.address = Some(ip);
        if self.state != ConnectionState::Closed {
            self.teardown();
            self.begin_attempt(now);
        }

        info!("대상 주소: {}", ip);
        self.events.push_back(Event::AddressChanged(ip));
        Ok(())
    }

    /// 연결 시작. 이미 연결 중이면 먼저 해제한다
    pub fn connect(&mut self, now: Instant) {
        if self.state != ConnectionState::Closed {
            self.teardown();
        }
        self.begin_attempt(now);
    }

    /// 연결 해제: 모든 타이머 취소, 대기 중인 확인은 만족된 것으로 처리
    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::Closed {
            info!("연결 해제 (uid={:#06X})", self.session_id);
        }
        self.teardown();
        self.transition(ConnectionState::Closed);
    }

    /// 커맨드 제출 (다음 SYNC에 실린다)
    pub fn submit(&mut self, command: RawCommand, now: Instant) -> Result<()> {
        if command.encoded_len() > MAX_COMMAND_LEN {
            return Err(Error::CommandTooLarge {
                len: command.encoded_len(),
                max: MAX_COMMAND_LEN,
            });
        }

        self.queue.push(command);
        if self.state.is_open() && self.handshake_sync_sent {
            self.queue.arm_batch(now, self.config.batch_delay());
        }
        Ok(())
    }

    /// 수신 데이터그램 처리
    pub fn handle_datagram(&mut self, datagram: Bytes, now: Instant) {
        if self.state == ConnectionState::Closed {
            debug!("연결 종료 상태에서 수신, 무시: {} bytes", datagram.len());
            return;
        }
        self.stats.packets_received += 1;

        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                self.report_dropped(e);
                return;
            }
        };
        let header = packet.header;

        if header.flags.contains(Flags::UNKNOWN) {
            warn!("알 수 없는 패킷 플래그: {:?}", header.flags);
        }

        let previous = self.state;
        if previous == ConnectionState::Attempting && header.is_sync() {
            info!("세션 ID 할당: {:#06X} -> {:#06X}", self.session_id, header.session_id);
            self.session_id = header.session_id;
            self.transition(ConnectionState::Establishing);
        }

        if !header.is_connect() && header.session_id != self.session_id {
            self.report_dropped(Error::IdentityMismatch {
                expected: self.session_id,
                got: header.session_id,
            });
            return;
        }

        let opened = previous == ConnectionState::Establishing
            && !header.is_connect()
            && packet.len() == HEADER_LEN;
        if opened {
            self.transition(ConnectionState::Open);
            self.scheduler
                .heartbeat
                .arm(now, self.config.heartbeat_interval());
        }

        if header.is_ack() {
            let confirmed = self.sequence.confirm(header.foreign_seq);
            if confirmed > 0 {
                debug!("ACK {}: {} 패킷 확인", header.foreign_seq, confirmed);
            }
        } else if header.is_connect() {
            // ACK 없는 CONNECT의 상대 시퀀스는 0으로 채워진 값이라 누적 ACK로 쓰지 않는다
            if let Some(seq) = self.connect_seq.take() {
                if self.sequence.confirm_exact(seq) {
                    debug!("CONNECT 응답: seq={} 확인", seq);
                }
            }
        }

        if header.is_reliable() {
            let token = self.sequence.record_inbound(header.local_seq);
            if self.state == ConnectionState::Attempting {
                // 핸드쉐이크를 앞당기기 위해 즉시 응답
                if let Some(seq) = self.sequence.take_unacked(token) {
                    self.send_ack(seq, now);
                }
            } else {
                self.sequence.defer_response(token);
                self.scheduler.deferred_ack.arm(now, Duration::ZERO);
            }
        }

        self.liveness.touch(now);

        if opened {
            self.sync(now);
        }

        let commands = packet.commands();
        if !commands.is_empty() {
            self.stats.commands_received += commands.len() as u64;
            self.events.push_back(Event::Commands(commands.to_vec()));
            for command in commands {
                self.events.push_back(Event::RawCommand(command.clone()));
            }
        }
    }

    /// 다음 타이머 마감 시각
    pub fn poll_timeout(&self) -> Option<Instant> {
        earliest([
            self.sequence.next_deadline(),
            self.queue.batch_deadline(),
            self.scheduler.next_deadline(),
            self.liveness.deadline(),
        ])
    }

    /// 마감이 지난 타이머 처리
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.liveness.expire(now) {
            warn!("연결 손실: {}ms 동안 수신 없음", self.config.liveness_timeout_ms);
            self.stats.connection_losses += 1;
            self.events.push_back(Event::ConnectionLost);
            if self.config.auto_reconnect {
                self.connect(now);
            }
            return;
        }

        let resent = self
            .sequence
            .due_retransmissions(now, self.config.retransmit_interval());
        if !resent.is_empty() {
            debug!("재전송: {} 패킷", resent.len());
            self.stats.retransmissions += resent.len() as u64;
            self.transmits.extend(resent);
            if self.state.is_open() {
                self.scheduler
                    .heartbeat
                    .arm(now, self.config.heartbeat_interval());
            }
        }

        for local_seq in self.sequence.expired_timeouts(now) {
            warn!("ACK 타임아웃: seq={}", local_seq);
            self.stats.message_timeouts += 1;
            self.events.push_back(Event::MessageTimeout { local_seq });
        }

        if self.scheduler.deferred_ack.expire(now) {
            for token in self.sequence.take_deferred() {
                if let Some(seq) = self.sequence.take_unacked(token) {
                    self.send_ack(seq, now);
                }
            }
        }

        if self.queue.expire_batch(now) && !self.queue.is_empty() && self.state.is_open() {
            debug!("배치 전송: {} 커맨드", self.queue.len());
            self.sync(now);
        }

        if self.scheduler.heartbeat.expire(now) && self.state.is_open() {
            self.sync(now);
        }
    }

    /// 보낼 데이터그램
    pub fn poll_transmit(&mut self) -> Option<Bytes> {
        self.transmits.pop_front()
    }

    /// 상위 계층 알림
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn begin_attempt(&mut self, now: Instant) {
        self.session_id = rand::thread_rng().gen_range(0..=MAX_INITIAL_SESSION_ID);
        self.sequence.reset();
        self.handshake_sync_sent = false;

        let Some(address) = self.address else {
            warn!("연결 실패: 대상 주소 없음");
            self.transition(ConnectionState::Closed);
            self.events.push_back(Event::Error(Error::AddressNotSet));
            return;
        };

        info!(
            "연결 시도: {}:{} (uid={:#06X})",
            address, self.config.port, self.session_id
        );
        self.transition(ConnectionState::Attempting);
        self.connect_seq = Some(self.sequence.local_seq());
        self.transmit(Packet::connect(Bytes::from_static(&CONNECT_PAYLOAD)), now);
    }

    /// 상태는 건드리지 않고 세션 자원만 정리
    fn teardown(&mut self) {
        self.scheduler.cancel_all();
        self.liveness.stop();
        self.queue.clear();
        self.sequence.clear();
        self.transmits.clear();
        self.connect_seq = None;
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }

        info!("연결 상태: {} -> {}", self.state, next);
        self.state = next;
        self.events.push_back(Event::StateChanged(next));

        if next.is_open() {
            self.stats.connections_opened += 1;
            self.events.push_back(Event::Connected);
        }
    }

    /// 빈 SYNC 패킷 (대기 중인 커맨드가 있으면 transmit에서 실린다)
    fn sync(&mut self, now: Instant) {
        self.transmit(Packet::new(Flags::SYNC, Vec::new()), now);
    }

    /// 버려진 데이터그램 보고. 세션 상태는 바뀌지 않는다
    fn report_dropped(&mut self, error: Error) {
        warn!("데이터그램 버림: {}", error);
        self.stats.decode_errors += 1;
        self.events.push_back(Event::Error(error));
    }

    fn send_ack(&mut self, foreign_seq: u16, now: Instant) {
        let mut packet = Packet::new(Flags::ACK, Vec::new());
        packet.header.foreign_seq = foreign_seq;
        self.transmit(packet, now);
    }

    /// 패킷 최초 전송
    fn transmit(&mut self, mut packet: Packet, now: Instant) {
        if !packet.header.is_ack() {
            if let Some(seq) = self.sequence.take_piggyback() {
                packet.header.flags |= Flags::ACK;
                packet.header.foreign_seq = seq;
            }
        }

        packet.header.session_id = self.session_id;
        let reliable = packet.header.is_reliable();
        if reliable {
            packet.header.local_seq = self.sequence.local_seq();
        }

        let open_sync = self.state.is_open() && packet.header.is_sync();
        if open_sync {
            if self.handshake_sync_sent && !self.queue.is_empty() {
                if let Body::Commands(commands) = &mut packet.body {
                    let room = MAX_PACKET_LEN - HEADER_LEN - packet_body_len(commands);
                    commands.extend(self.queue.take_fitting(room));
                }
            }
            self.handshake_sync_sent = true;
            if !self.queue.is_empty() {
                self.queue.arm_batch(now, self.config.batch_delay());
            }
        }

        let datagram = match packet.encode() {
            Ok(datagram) => datagram,
            Err(e) => {
                warn!("패킷 인코딩 실패: {}", e);
                self.events.push_back(Event::Error(e));
                return;
            }
        };

        if packet.header.is_ack() {
            self.stats.acks_sent += 1;
        }
        self.stats.packets_sent += 1;
        self.stats.commands_sent += packet.commands().len() as u64;

        if reliable {
            let mut repeat = BytesMut::from(&datagram[..]);
            repeat[0] |= Flags::REPEAT.bits() << 3;
            self.sequence.register_pending(
                packet.header.local_seq,
                repeat.freeze(),
                now,
                self.config.retransmit_interval(),
                self.config.ack_timeout(),
            );

            if self.state != ConnectionState::Attempting {
                self.sequence.advance();
            }
        }

        if open_sync {
            self.scheduler
                .heartbeat
                .arm(now, self.config.heartbeat_interval());
        }

        self.transmits.push_back(datagram);
    }
}

fn packet_body_len(commands: &[RawCommand]) -> usize {
    commands.iter().map(RawCommand::encoded_len).sum()
}
