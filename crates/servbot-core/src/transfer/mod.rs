//! DCC 文件传输
//!
//! 包含:
//! - DCC 线路格式（SEND 报文与确认帧）
//! - 单飞请求队列
//! - 单个出站字节流的会话状态机
//! - 驱动排队、监听超时和空闲超时的调度器

pub mod protocol;
pub mod queue;
pub mod scheduler;
pub mod session;

pub use protocol::{AckError, DccOffer, CHUNK_SIZE};
pub use queue::{TransferQueue, TransferRequest};
pub use scheduler::{PendingListen, Scheduler, SchedulerConfig};
pub use session::{AckOutcome, ChunkSource, SessionEnd, TransferSession};

use crate::transport::TransportError;

/// 等待对端接入的最大 tick 数
pub const LISTEN_TIMEOUT_TICKS: u32 = 60;

/// 会话无确认时的最大 tick 数
pub const IDLE_TIMEOUT_TICKS: u32 = 60;

/// 传输错误
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Ack(#[from] AckError),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
