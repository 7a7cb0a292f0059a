//! 클라이언트 (비동기 드라이버)
//!
//! - 세션을 소유하는 단일 태스크
//! - 핸들 호출, 데이터그램 수신, 타이머 만료를 순차 처리
//! - 상태/통계 스냅샷 공유

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::{CommandName, RawCommand};
use crate::event::{CommandReceiver, Event, Subscriptions};
use crate::session::{parse_address, Session};
use crate::state::ConnectionState;
use crate::stats::SessionStats;
use crate::{Config, Error, Result, MAX_COMMAND_LEN};

/// 알림 채널 수신기 타입
pub type EventReceiver = mpsc::Receiver<Event>;

const RECV_BUFFER_LEN: usize = 2048;

/// 내부 명령
enum ClientCmd {
    SetAddress(String),
    Connect,
    Disconnect(oneshot::Sender<()>),
    Send(RawCommand),
    Subscribe(CommandName, mpsc::UnboundedSender<Bytes>),
    Shutdown,
}

/// 핸들에서 동기적으로 읽는 스냅샷
#[derive(Debug, Default)]
struct Shared {
    state: ConnectionState,
    address: Option<Ipv4Addr>,
    stats: SessionStats,
}

/// 클라이언트 내부 상태 (단일 태스크에서만 접근)
struct ClientInner {
    session: Session,
    socket: Option<Arc<UdpSocket>>,
    subscriptions: Subscriptions,
    events_tx: mpsc::Sender<Event>,
    events_dropped: u64,
    shared: Arc<RwLock<Shared>>,
    disconnect_waiters: Vec<oneshot::Sender<()>>,
}

impl ClientInner {
    /// 알림 전달. 채널이 가득 차면 프로토콜 루프를 막지 않고 버린다
    fn emit(&mut self, event: Event) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.events_dropped += 1;
                warn!("알림 채널 가득 참, 버림: {:?}", event);
            }
            // 수신자가 없으면 조용히 버린다
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn handle_cmd(&mut self, cmd: ClientCmd) {
        let now = Instant::now();
        match cmd {
            ClientCmd::SetAddress(address) => {
                // 실패는 세션이 알림으로 보고한다
                let _ = self.session.set_address(&address, now);
            }
            ClientCmd::Connect => self.session.connect(now),
            ClientCmd::Disconnect(done) => {
                self.session.disconnect();
                self.disconnect_waiters.push(done);
            }
            ClientCmd::Send(command) => {
                if let Err(e) = self.session.submit(command, now) {
                    warn!("커맨드 제출 실패: {}", e);
                    self.emit(Event::Error(e));
                }
            }
            ClientCmd::Subscribe(name, tx) => {
                debug!("구독 추가: {}", name);
                self.subscriptions.insert(name, tx);
            }
            ClientCmd::Shutdown => self.session.disconnect(),
        }
    }

    fn handle_datagram(&mut self, datagram: Bytes, from: SocketAddr) {
        if self.session.remote_addr() != Some(from) {
            debug!("다른 주소의 데이터그램 무시: {} ({} bytes)", from, datagram.len());
            return;
        }
        self.session.handle_datagram(datagram, Instant::now());
    }

    /// 세션 출력 처리: 소켓 관리, 송신, 알림 전달, 스냅샷 갱신
    async fn flush(&mut self) {
        if self.session.state() == ConnectionState::Closed {
            if self.socket.take().is_some() {
                debug!("소켓 해제");
            }
        } else if self.socket.is_none() {
            let bind_addr = self.session.config().bind_addr;
            match UdpSocket::bind(bind_addr).await {
                Ok(socket) => {
                    if let Ok(local) = socket.local_addr() {
                        info!("소켓 바인드: {}", local);
                    }
                    self.socket = Some(Arc::new(socket));
                }
                Err(e) => {
                    warn!("소켓 바인드 실패: {}", e);
                    self.emit(Event::Error(Error::Io(e)));
                }
            }
        }

        match (self.socket.clone(), self.session.remote_addr()) {
            (Some(socket), Some(remote)) => {
                while let Some(datagram) = self.session.poll_transmit() {
                    if let Err(e) = socket.send_to(&datagram, remote).await {
                        warn!("전송 실패: {}", e);
                        self.emit(Event::Error(Error::Io(e)));
                    }
                }
            }
            _ => while self.session.poll_transmit().is_some() {},
        }

        while let Some(event) = self.session.poll_event() {
            if let Event::RawCommand(command) = &event {
                self.subscriptions.dispatch(command);
            }
            self.emit(event);
        }

        {
            let mut shared = self.shared.write();
            shared.state = self.session.state();
            shared.address = self.session.address();
            shared.stats = self.session.stats().clone();
            shared.stats.events_dropped = self.events_dropped;
        }

        for done in self.disconnect_waiters.drain(..) {
            let _ = done.send(());
        }
    }
}

async fn recv_datagram(socket: Option<Arc<UdpSocket>>) -> std::io::Result<(Bytes, SocketAddr)> {
    let Some(socket) = socket else {
        return std::future::pending().await;
    };

    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    let (len, from) = socket.recv_from(&mut buf).await?;
    buf.truncate(len);
    Ok((Bytes::from(buf), from))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// 클라이언트 핸들 (외부에서 제어용)
#[derive(Clone)]
pub struct Client {
    cmd_tx: mpsc::Sender<ClientCmd>,
    shared: Arc<RwLock<Shared>>,
}

impl Client {
    /// 클라이언트 태스크 시작
    ///
    /// 소켓은 연결 시도 시 바인드되고 연결 종료 시 해제된다.
    /// tokio 런타임 안에서 호출해야 한다.
    pub fn start(config: Config) -> (Self, EventReceiver) {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ClientCmd>(config.command_buffer.max(1));
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let shared = Arc::new(RwLock::new(Shared::default()));

        info!("ATEM 클라이언트 시작 (port={})", config.port);

        let mut inner = ClientInner {
            session: Session::new(config),
            socket: None,
            subscriptions: Subscriptions::new(),
            events_tx,
            events_dropped: 0,
            shared: shared.clone(),
            disconnect_waiters: Vec::new(),
        };

        tokio::spawn(async move {
            loop {
                let socket = inner.socket.clone();
                let deadline = inner.session.poll_timeout();

                tokio::select! {
                    biased;

                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(ClientCmd::Shutdown) | None => {
                                inner.handle_cmd(ClientCmd::Shutdown);
                                inner.flush().await;
                                break;
                            }
                            Some(cmd) => inner.handle_cmd(cmd),
                        }
                    }
                    received = recv_datagram(socket) => {
                        match received {
                            Ok((datagram, from)) => inner.handle_datagram(datagram, from),
                            Err(e) => {
                                warn!("수신 에러: {}", e);
                                inner.emit(Event::Error(Error::Io(e)));
                            }
                        }
                    }
                    _ = sleep_until(deadline) => {
                        inner.session.handle_timeout(Instant::now());
                    }
                }

                inner.flush().await;
            }

            cmd_rx.close();
            info!("ATEM 클라이언트 종료: {}", inner.session.stats().summary());
        });

        (Self { cmd_tx, shared }, events_rx)
    }

    async fn send(&self, cmd: ClientCmd) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::ChannelClosed)
    }

    /// 대상 주소 설정. 연결 중이면 새 주소로 재연결
    ///
    /// 잘못된 주소는 알림 채널에도 보고된다.
    pub async fn set_address(&self, address: &str) -> Result<()> {
        let checked = parse_address(address).map(|_| ());
        self.send(ClientCmd::SetAddress(address.to_string())).await?;
        checked
    }

    pub async fn connect(&self) -> Result<()> {
        self.send(ClientCmd::Connect).await
    }

    /// 연결 해제. 세션 정리가 끝나면 반환
    pub async fn disconnect(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(ClientCmd::Disconnect(done_tx)).await?;
        done_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// 커맨드 전송 (배치 큐에 추가)
    pub async fn send_command(&self, command: RawCommand) -> Result<()> {
        if command.encoded_len() > MAX_COMMAND_LEN {
            return Err(Error::CommandTooLarge {
                len: command.encoded_len(),
                max: MAX_COMMAND_LEN,
            });
        }
        self.send(ClientCmd::Send(command)).await
    }

    /// 이름이 같은 수신 커맨드의 페이로드 구독
    pub async fn subscribe(&self, name: CommandName) -> Result<CommandReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(ClientCmd::Subscribe(name, tx)).await?;
        Ok(rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.read().state
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.shared.read().address
    }

    /// 통계 반환
    pub fn stats(&self) -> SessionStats {
        self.shared.read().stats.clone()
    }

    /// 정지 (연결 해제 후 태스크 종료)
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ClientCmd::Shutdown).await;
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}
