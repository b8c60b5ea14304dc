//! 聊天传输层边界
//!
//! 核心状态机只通过 [`Transport`] 与外部交互，所有入站通知都以 [`Event`]
//! 的形式在同一个事件循环中串行投递，因此核心内部不需要任何锁。

use std::fmt;

/// DCC 连接标识
///
/// 在打开监听套接字时分配，对端接入后沿用同一个标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dcc#{}", self.0)
    }
}

/// 已打开的监听套接字
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenSocket {
    pub id: ConnectionId,
    /// 实际绑定的端口（请求端口为 0 时由系统分配）
    pub port: u16,
}

/// 传输层错误
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Listen socket unavailable: {0}")]
    Listen(#[from] std::io::Error),

    #[error("Connection {0} is closed")]
    Closed(ConnectionId),
}

/// 入站事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// 聊天服务器注册完成
    Connected,
    /// 与聊天服务器的主连接断开
    Disconnected,
    /// 私聊消息，`sender` 为完整身份 `nick!user@host`
    PrivateMessage { sender: String, text: String },
    PeerConnected(ConnectionId),
    /// 对端确认（正常情况下为 4 字节大端整数）
    PeerMessage(ConnectionId, Vec<u8>),
    PeerDisconnected(ConnectionId),
}

/// 出站操作
///
/// 所有方法都是同步调用：实现者可以在内部排队异步发送，但必须保持调用顺序。
pub trait Transport {
    fn join_channel(&mut self, channel: &str);

    fn send_private_message(&mut self, target: &str, text: &str);

    /// 发送 DCC 控制消息，例如 `SEND <file> <addr> <port> <size>`
    fn send_control_message(&mut self, target: &str, text: &str);

    fn open_listen_socket(&mut self, port: u16) -> Result<ListenSocket, TransportError>;

    /// 释放尚未有对端接入的监听套接字
    fn close_listen_socket(&mut self, id: ConnectionId);

    fn send_bytes(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<(), TransportError>;

    fn disconnect(&mut self, id: ConnectionId);
}
