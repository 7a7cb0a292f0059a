//! 루프백 UDP 위에서 가짜 스위처와 핸드쉐이크부터 해제까지

use std::net::SocketAddr;
use std::time::Duration;

use atem_link::{
    Client, CommandName, Config, ConnectionState, Error, Event, EventReceiver, Flags, Packet,
    RawCommand,
};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const PEER_UID: u16 = 0x1234;
const WAIT: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 스위처 역할을 하는 소켓
struct FakeSwitcher {
    socket: UdpSocket,
    client: Option<SocketAddr>,
}

impl FakeSwitcher {
    async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            client: None,
        }
    }

    fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    async fn recv(&mut self) -> Packet {
        let mut buf = vec![0u8; 2048];
        let (len, from) = timeout(WAIT, self.socket.recv_from(&mut buf))
            .await
            .expect("packet from client")
            .unwrap();
        self.client = Some(from);
        buf.truncate(len);
        Packet::decode(Bytes::from(buf)).unwrap()
    }

    /// 조건에 맞는 패킷이 올 때까지 수신 (ACK, 하트비트 등은 건너뜀)
    async fn recv_until(&mut self, pred: impl Fn(&Packet) -> bool) -> Packet {
        loop {
            let packet = self.recv().await;
            if pred(&packet) {
                return packet;
            }
        }
    }

    async fn send(&self, mut packet: Packet) {
        packet.header.session_id = PEER_UID;
        let bytes = packet.encode().unwrap();
        let client = self.client.expect("client address");
        self.socket.send_to(&bytes, client).await.unwrap();
    }

    async fn send_sync(&self, local_seq: u16, commands: Vec<RawCommand>) {
        let mut packet = Packet::new(Flags::SYNC, commands);
        packet.header.local_seq = local_seq;
        self.send(packet).await;
    }
}

fn test_config(port: u16) -> Config {
    Config {
        port,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        liveness_timeout_ms: 10_000,
        auto_reconnect: false,
        ..Config::default()
    }
}

async fn wait_for(events: &mut EventReceiver, pred: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("event before timeout")
            .expect("event channel open");
        if pred(&event) {
            return event;
        }
    }
}

/// 핸드쉐이크를 마친 클라이언트
async fn open_client(switcher: &mut FakeSwitcher) -> (Client, EventReceiver) {
    let (client, mut events) = Client::start(test_config(switcher.port()));
    client.set_address("127.0.0.1").await.unwrap();
    client.connect().await.unwrap();

    let hello = switcher.recv().await;
    assert!(hello.header.is_connect());
    assert_eq!(hello.len(), 20);

    let mut reply = Packet::connect(Bytes::from_static(&[0x02, 0, 0, 0, 0, 0, 0, 0]));
    reply.header.flags |= Flags::SYNC;
    switcher.send(reply).await;
    switcher
        .send_sync(1, vec![RawCommand::new("_ver".parse().unwrap(), vec![0, 2, 0, 28])])
        .await;
    switcher.send_sync(2, vec![]).await;

    wait_for(&mut events, |e| matches!(e, Event::Connected)).await;
    assert_eq!(client.state(), ConnectionState::Open);
    (client, events)
}

#[tokio::test]
async fn test_handshake_reaches_open() {
    init_tracing();
    let mut switcher = FakeSwitcher::bind().await;
    let (client, _events) = open_client(&mut switcher).await;

    // 첫 SYNC는 빈 패킷이고 새 세션 ID를 쓴다
    let first_sync = switcher.recv_until(|p| p.header.is_sync()).await;
    assert!(first_sync.commands().is_empty());
    assert_eq!(first_sync.header.session_id, PEER_UID);
    assert_eq!(first_sync.header.local_seq, 0);

    assert!(client.stats().connections_opened >= 1);
    assert_eq!(client.address(), Some("127.0.0.1".parse().unwrap()));
    client.shutdown().await;
}

#[tokio::test]
async fn test_command_round_trip() {
    init_tracing();
    let mut switcher = FakeSwitcher::bind().await;
    let (client, mut events) = open_client(&mut switcher).await;
    let mut program = client.subscribe("PrgI".parse().unwrap()).await.unwrap();

    // 첫 SYNC를 기다린 뒤 보낸 커맨드는 다음 SYNC에 실린다
    switcher.recv_until(|p| p.header.is_sync()).await;
    let cut: CommandName = "DCut".parse().unwrap();
    client
        .send_command(RawCommand::new(cut, vec![0, 0, 0, 0]))
        .await
        .unwrap();

    let carrying = switcher.recv_until(|p| !p.commands().is_empty()).await;
    assert!(carrying.header.is_sync());
    assert_eq!(carrying.commands()[0].name(), cut);

    switcher
        .send_sync(3, vec![RawCommand::new("PrgI".parse().unwrap(), vec![0, 0, 0, 4])])
        .await;

    let payload = timeout(WAIT, program.recv()).await.unwrap().unwrap();
    assert_eq!(payload.as_ref(), &[0, 0, 0, 4]);
    wait_for(&mut events, |e| {
        matches!(e, Event::RawCommand(c) if c.name().to_string() == "PrgI")
    })
    .await;

    // 수신 SYNC는 ACK로 확인된다
    let ack = switcher
        .recv_until(|p| p.header.is_ack() && p.header.foreign_seq == 3)
        .await;
    assert_eq!(ack.header.session_id, PEER_UID);
    client.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_emits_closed() {
    init_tracing();
    let mut switcher = FakeSwitcher::bind().await;
    let (client, mut events) = open_client(&mut switcher).await;

    client.disconnect().await.unwrap();

    assert_eq!(client.state(), ConnectionState::Closed);
    wait_for(&mut events, |e| {
        matches!(e, Event::StateChanged(ConnectionState::Closed))
    })
    .await;
    client.shutdown().await;
}

#[tokio::test]
async fn test_invalid_address_reported() {
    init_tracing();
    let switcher = FakeSwitcher::bind().await;
    let (client, mut events) = Client::start(test_config(switcher.port()));

    assert!(client.set_address("10.0.0.300").await.is_err());
    wait_for(&mut events, |e| matches!(e, Event::Error(Error::InvalidAddress(_)))).await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.address(), None);
    client.shutdown().await;
}
