//! 单个出站字节流的会话状态机
//!
//! 状态流转: `Listening -> Active -> {Completed | TimedOut | PeerDisconnected}`
//!
//! - 进入 Active 时立即发送第一个分块，无需等待确认
//! - 每收到一个确认发送下一个分块，并清零空闲计数
//! - 首个确认大于零时视为续传请求，先定位到确认偏移
//! - 空闲计数达到阈值时由调度器拆除会话
//!
//! 会话独占文件句柄，销毁时（drop）无条件关闭。

use log::debug;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use super::TransferError;
use super::protocol::{CHUNK_SIZE, decode_ack};
use crate::transport::{ConnectionId, Transport};

/// 会话读取的数据源
pub trait ChunkSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ChunkSource for T {}

/// 确认处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Continue,
    Completed,
}

/// 会话终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    TimedOut,
    PeerDisconnected,
    /// 读文件、发送或确认格式出错
    Failed,
    /// 主连接断开或引擎关闭
    Aborted,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEnd::Completed => "completed",
            SessionEnd::TimedOut => "timed out",
            SessionEnd::PeerDisconnected => "peer disconnected",
            SessionEnd::Failed => "failed",
            SessionEnd::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

pub struct TransferSession {
    connection: ConnectionId,
    file: Box<dyn ChunkSource>,
    file_name: String,
    file_size: u64,
    bytes_sent: u64,
    idle_ticks: u32,
    idle_timeout: u32,
    acknowledged: bool,
    chunk: Box<[u8; CHUNK_SIZE]>,
}

impl fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSession")
            .field("connection", &self.connection)
            .field("file_name", &self.file_name)
            .field("file_size", &self.file_size)
            .field("bytes_sent", &self.bytes_sent)
            .field("idle_ticks", &self.idle_ticks)
            .finish_non_exhaustive()
    }
}

impl TransferSession {
    pub fn new(
        connection: ConnectionId,
        file: Box<dyn ChunkSource>,
        file_name: impl Into<String>,
        file_size: u64,
        idle_timeout: u32,
    ) -> Self {
        Self {
            connection,
            file,
            file_name: file_name.into(),
            file_size,
            bytes_sent: 0,
            idle_ticks: 0,
            idle_timeout,
            acknowledged: false,
            chunk: Box::new([0; CHUNK_SIZE]),
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// 进入 Active：立即发送第一个分块
    pub fn start<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), TransferError> {
        self.send_chunk(transport)
    }

    /// 处理对端确认
    pub fn on_ack<T: Transport + ?Sized>(
        &mut self,
        payload: &[u8],
        transport: &mut T,
    ) -> Result<AckOutcome, TransferError> {
        let acked = decode_ack(payload)?;
        let first = !self.acknowledged;
        self.acknowledged = true;

        if self.is_complete(acked) {
            return Ok(AckOutcome::Completed);
        }

        if first && acked > 0 {
            debug!(
                "{}: resuming {} at offset {}",
                self.connection, self.file_name, acked
            );
            let offset = u64::from(acked);
            self.file.seek(SeekFrom::Start(offset))?;
            self.bytes_sent = offset;
        }

        self.send_chunk(transport)?;
        Ok(AckOutcome::Continue)
    }

    /// 记一次空闲 tick，返回是否已超时
    pub fn tick(&mut self) -> bool {
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        self.idle_ticks >= self.idle_timeout
    }

    // 确认值只有 32 位：超过 4 GiB 的文件在全部发出后按 2^32 取模比较
    fn is_complete(&self, acked: u32) -> bool {
        if self.file_size <= u64::from(u32::MAX) {
            u64::from(acked) == self.file_size
        } else {
            self.bytes_sent >= self.file_size && u64::from(acked) == (self.file_size & 0xFFFF_FFFF)
        }
    }

    fn send_chunk<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), TransferError> {
        let read = fill_chunk(self.file.as_mut(), &mut self.chunk[..])?;
        if read > 0 {
            transport.send_bytes(self.connection, &self.chunk[..read])?;
            self.bytes_sent += read as u64;
        }
        self.idle_ticks = 0;
        Ok(())
    }
}

/// 尽量读满缓冲区，返回实际读取的字节数（到达 EOF 时可能小于缓冲区）
fn fill_chunk(source: &mut dyn ChunkSource, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
