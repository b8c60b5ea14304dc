//! DCC 套接字管理
//!
//! - 每个监听套接字只接受一个对端，接入后沿用监听时分配的连接标识
//! - 读任务把入站字节流切分为 4 字节确认帧，EOF 时残留的半帧作为畸形确认投递
//! - 写任务按顺序发送分块，`send` 只入队，不阻塞事件循环

use log::{debug, warn};
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpSocket;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::LoopEvent;
use crate::transfer::protocol::ACK_LEN;
use crate::transport::{ConnectionId, Event, ListenSocket, TransportError};

struct Peer {
    writer: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

pub struct DccManager {
    next_id: u64,
    events: mpsc::UnboundedSender<LoopEvent>,
    listeners: HashMap<ConnectionId, JoinHandle<()>>,
    peers: HashMap<ConnectionId, Peer>,
}

impl DccManager {
    pub(crate) fn new(events: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self {
            next_id: 0,
            events,
            listeners: HashMap::new(),
            peers: HashMap::new(),
        }
    }

    /// 绑定监听套接字并在后台等待一个对端
    pub fn listen(&mut self, port: u16) -> io::Result<ListenSocket> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
        let listener = socket.listen(1)?;
        let port = listener.local_addr()?.port();

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let event = match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("{}: accepted {}", id, addr);
                    LoopEvent::Accepted(id, stream)
                }
                Err(e) => LoopEvent::AcceptFailed(id, e),
            };
            let _ = events.send(event);
        });

        self.listeners.insert(id, handle);
        debug!("{}: listening on port {}", id, port);
        Ok(ListenSocket { id, port })
    }

    pub fn close_listener(&mut self, id: ConnectionId) {
        if let Some(handle) = self.listeners.remove(&id) {
            handle.abort();
        }
    }

    /// 登记已接入的对端；监听已被关闭（例如超时）时返回 false
    pub fn attach(&mut self, id: ConnectionId, stream: TcpStream) -> bool {
        if self.listeners.remove(&id).is_none() {
            return false;
        }

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_chunks(id, write_half, rx));
        let reader = tokio::spawn(read_acks(id, read_half, self.events.clone()));

        self.peers.insert(id, Peer { writer: tx, reader });
        true
    }

    /// 接受失败时丢弃监听记录
    pub fn listen_failed(&mut self, id: ConnectionId) {
        self.listeners.remove(&id);
    }

    pub fn send(&self, id: ConnectionId, bytes: &[u8]) -> Result<(), TransportError> {
        let peer = self.peers.get(&id).ok_or(TransportError::Closed(id))?;
        peer.writer
            .send(bytes.to_vec())
            .map_err(|_| TransportError::Closed(id))
    }

    /// 主动断开：停止读取，写任务发送完已排队的数据后关闭
    pub fn disconnect(&mut self, id: ConnectionId) {
        if let Some(peer) = self.peers.remove(&id) {
            peer.reader.abort();
        }
    }

    /// 对端已断开，只清理记录
    pub fn forget(&mut self, id: ConnectionId) {
        self.peers.remove(&id);
    }

    pub fn shutdown(&mut self) {
        for (_, handle) in self.listeners.drain() {
            handle.abort();
        }
        for (_, peer) in self.peers.drain() {
            peer.reader.abort();
        }
    }
}

impl Drop for DccManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn write_chunks(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut chunks: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(chunk) = chunks.recv().await {
        if let Err(e) = writer.write_all(&chunk).await {
            warn!("{}: write failed: {}", id, e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_acks(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<LoopEvent>,
) {
    let mut frame = [0u8; ACK_LEN];
    let mut filled = 0;

    loop {
        match reader.read(&mut frame[filled..]).await {
            Ok(0) => {
                if filled > 0 {
                    let _ = events.send(LoopEvent::Peer(Event::PeerMessage(
                        id,
                        frame[..filled].to_vec(),
                    )));
                }
                break;
            }
            Ok(n) => {
                filled += n;
                if filled == ACK_LEN {
                    let _ = events.send(LoopEvent::Peer(Event::PeerMessage(id, frame.to_vec())));
                    filled = 0;
                }
            }
            Err(e) => {
                debug!("{}: read failed: {}", id, e);
                break;
            }
        }
    }

    let _ = events.send(LoopEvent::Peer(Event::PeerDisconnected(id)));
}
