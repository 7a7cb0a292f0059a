//! # ATEM Link
//!
//! ATEM 비디오 스위처 제어 링크. UDP 위의 신뢰성 전송 클라이언트
//!
//! ## 핵심 특징
//! - **핸드쉐이크**: CONNECT → SYNC → 상태 덤프 → 12바이트 패킷으로 Open
//! - **누적 ACK**: 16비트 시퀀스, wrap-around 안전 비교
//! - **재전송**: 600ms 주기, 캐시된 바이트에 REPEAT 플래그만 추가
//! - **배칭**: 16ms 안에 제출된 커맨드를 하나의 SYNC 패킷으로
//! - **생존 감시**: 800ms 침묵 시 연결 손실 후 자동 재연결
//! - **sans-IO 코어**: [`Session`]은 시각과 바이트만 다루고 [`Client`]가 소켓과 타이머를 구동

pub mod batch;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod liveness;
pub mod packet;
pub mod scheduler;
pub mod sequence;
pub mod session;
pub mod state;
pub mod stats;

pub use client::{Client, EventReceiver};
pub use command::{CommandName, RawCommand};
pub use config::Config;
pub use error::{Error, Result};
pub use event::{CommandReceiver, Event};
pub use packet::{Body, Flags, Packet, PacketHeader};
pub use session::Session;
pub use state::ConnectionState;
pub use stats::SessionStats;

/// 패킷 헤더 길이 (바이트)
pub const HEADER_LEN: usize = 12;

/// 최대 패킷 길이 (11비트 길이 필드)
pub const MAX_PACKET_LEN: usize = 0x07FF;

/// 패킷 하나에 실을 수 있는 최대 커맨드 레코드 길이
pub const MAX_COMMAND_LEN: usize = MAX_PACKET_LEN - HEADER_LEN;

/// 기본 스위처 포트
pub const DEFAULT_PORT: u16 = 9910;

/// CONNECT 패킷 핸드쉐이크 페이로드
pub const CONNECT_PAYLOAD: [u8; 8] = [0x01, 0, 0, 0, 0, 0, 0, 0];

/// 연결 시도 시 임의로 고르는 세션 ID의 상한
pub const MAX_INITIAL_SESSION_ID: u16 = 0x07FF;
