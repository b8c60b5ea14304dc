//! 传输调度器
//!
//! 一个固定周期的 tick 驱动三项彼此独立的检查，每个 tick 都会重新评估：
//!
//! 1. 等待中的监听是否已超时（超时即丢弃、关闭文件、释放监听套接字）
//! 2. 每个活跃会话的空闲计数（达到阈值即拆除）
//! 3. 监听槽位空闲且已连接时，从队列取出一个请求并发出 DCC SEND
//!
//! 监听超时和会话空闲超时是两个互不依赖的计时器，只是共用同一个 tick 源。
//! 同一时刻最多只有一个 [`PendingListen`]。

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fs::{self, File};
use std::net::Ipv4Addr;

use super::protocol::DccOffer;
use super::queue::{TransferQueue, TransferRequest};
use super::session::{AckOutcome, ChunkSource, SessionEnd, TransferSession};
use super::{IDLE_TIMEOUT_TICKS, LISTEN_TIMEOUT_TICKS, TransferError};
use crate::transport::{ConnectionId, Transport};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 监听端口，0 表示由系统分配
    pub dcc_port: u16,
    /// DCC 报文中公布的地址
    pub address: Ipv4Addr,
    pub listen_timeout: u32,
    pub idle_timeout: u32,
}

impl SchedulerConfig {
    pub fn new(address: Ipv4Addr, dcc_port: u16) -> Self {
        Self {
            dcc_port,
            address,
            listen_timeout: LISTEN_TIMEOUT_TICKS,
            idle_timeout: IDLE_TIMEOUT_TICKS,
        }
    }
}

/// 已公布、等待对端接入的传输
pub struct PendingListen {
    pub connection: ConnectionId,
    pub request: TransferRequest,
    pub file_name: String,
    pub file_size: u64,
    pub ticks_waiting: u32,
    file: Box<dyn ChunkSource>,
}

impl std::fmt::Debug for PendingListen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingListen")
            .field("connection", &self.connection)
            .field("request", &self.request)
            .field("file_name", &self.file_name)
            .field("file_size", &self.file_size)
            .field("ticks_waiting", &self.ticks_waiting)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    queue: TransferQueue,
    pending: Option<PendingListen>,
    sessions: HashMap<ConnectionId, TransferSession>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            queue: TransferQueue::new(),
            pending: None,
            sessions: HashMap::new(),
        }
    }

    pub fn queue(&self) -> &TransferQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut TransferQueue {
        &mut self.queue
    }

    pub fn pending(&self) -> Option<&PendingListen> {
        self.pending.as_ref()
    }

    pub fn session(&self, id: ConnectionId) -> Option<&TransferSession> {
        self.sessions.get(&id)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 周期性 tick
    ///
    /// 超时检查先于出队执行，因此同一个 tick 内腾出的槽位可以立即被复用。
    /// `drain` 为 false（主连接未就绪）时只做超时检查。
    pub fn tick<T: Transport + ?Sized>(&mut self, transport: &mut T, drain: bool) {
        self.expire_pending(transport);
        self.expire_idle_sessions(transport);
        if drain {
            self.drain_queue(transport);
        }
    }

    pub fn on_peer_connected<T: Transport + ?Sized>(&mut self, id: ConnectionId, transport: &mut T) {
        let pending = match self.pending.take() {
            Some(p) if p.connection == id => p,
            other => {
                self.pending = other;
                warn!("{} connected too late, dropping", id);
                transport.disconnect(id);
                return;
            }
        };

        info!(
            "{}: peer connected for {} ({} bytes)",
            id, pending.file_name, pending.file_size
        );
        let mut session = TransferSession::new(
            id,
            pending.file,
            pending.file_name,
            pending.file_size,
            self.config.idle_timeout,
        );

        match session.start(transport) {
            Ok(()) => {
                self.sessions.insert(id, session);
            }
            Err(e) => {
                error!("{}: failed to send first chunk: {}", id, e);
                drop(session);
                transport.disconnect(id);
            }
        }
    }

    pub fn on_peer_message<T: Transport + ?Sized>(
        &mut self,
        id: ConnectionId,
        payload: &[u8],
        transport: &mut T,
    ) {
        let Some(session) = self.sessions.get_mut(&id) else {
            debug!("{}: ignoring message for unknown session", id);
            return;
        };

        match session.on_ack(payload, transport) {
            Ok(AckOutcome::Continue) => {}
            Ok(AckOutcome::Completed) => self.end_session(id, SessionEnd::Completed, transport),
            Err(TransferError::Ack(e)) => {
                warn!("{}: protocol error: {}", id, e);
                self.end_session(id, SessionEnd::Failed, transport);
            }
            Err(e) => {
                error!("{}: transfer error: {}", id, e);
                self.end_session(id, SessionEnd::Failed, transport);
            }
        }
    }

    pub fn on_peer_disconnected<T: Transport + ?Sized>(&mut self, id: ConnectionId, transport: &mut T) {
        if self.pending.as_ref().is_some_and(|p| p.connection == id) {
            // 监听套接字在对端接入前失效
            if let Some(pending) = self.pending.take() {
                warn!("{}: listen socket for {} failed", id, pending.file_name);
            }
            return;
        }
        if self.sessions.contains_key(&id) {
            self.end_session(id, SessionEnd::PeerDisconnected, transport);
        }
    }

    /// 强制结束所有会话并丢弃等待中的监听，队列保持不变
    pub fn teardown<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if let Some(pending) = self.pending.take() {
            info!("Dropping pending offer of {}", pending.file_name);
            transport.close_listen_socket(pending.connection);
        }
        let ids: Vec<ConnectionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.end_session(id, SessionEnd::Aborted, transport);
        }
    }

    /// 为请求打开文件和监听套接字并发出 DCC SEND
    pub(crate) fn begin_listen<T: Transport + ?Sized>(
        &mut self,
        request: TransferRequest,
        file: Box<dyn ChunkSource>,
        file_size: u64,
        transport: &mut T,
    ) -> Result<(), TransferError> {
        let listen = transport.open_listen_socket(self.config.dcc_port)?;
        let file_name = request
            .path
            .file_name()
            .map_or_else(|| "unknown".to_string(), |n| n.to_string_lossy().to_string());

        let offer = DccOffer {
            file_name: file_name.clone(),
            address: self.config.address,
            port: listen.port,
            size: file_size,
        };
        info!("sendfile: {} {:?} on {}", request.nick(), request.path, listen.id);
        transport.send_control_message(request.nick(), &offer.to_string());

        self.pending = Some(PendingListen {
            connection: listen.id,
            request,
            file_name,
            file_size,
            ticks_waiting: 0,
            file,
        });
        Ok(())
    }

    fn drain_queue<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if self.pending.is_some() {
            return;
        }
        let Some(request) = self.queue.take_next() else {
            return;
        };

        let opened = fs::metadata(&request.path)
            .and_then(|meta| File::open(&request.path).map(|f| (f, meta.len())));
        let result = match opened {
            Ok((file, size)) => {
                let path = request.path.clone();
                self.begin_listen(request, Box::new(file), size, transport)
                    .map_err(|e| (path, e))
            }
            Err(e) => Err((request.path, e.into())),
        };

        if let Err((path, e)) = result {
            error!("Failed to offer {:?}: {}", path, e);
        }
    }

    fn expire_pending<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        pending.ticks_waiting += 1;
        if pending.ticks_waiting < self.config.listen_timeout {
            return;
        }
        if let Some(pending) = self.pending.take() {
            warn!(
                "{}: no peer connected for {} after {} ticks",
                pending.connection, pending.file_name, pending.ticks_waiting
            );
            transport.close_listen_socket(pending.connection);
        }
    }

    fn expire_idle_sessions<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        let expired: Vec<ConnectionId> = self
            .sessions
            .iter_mut()
            .filter_map(|(id, session)| session.tick().then_some(*id))
            .collect();
        for id in expired {
            self.end_session(id, SessionEnd::TimedOut, transport);
        }
    }

    fn end_session<T: Transport + ?Sized>(
        &mut self,
        id: ConnectionId,
        reason: SessionEnd,
        transport: &mut T,
    ) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        info!(
            "{}: {} {} ({}/{} bytes)",
            id,
            session.file_name(),
            reason,
            session.bytes_sent(),
            session.file_size()
        );
        drop(session);
        if reason != SessionEnd::PeerDisconnected {
            transport.disconnect(id);
        }
    }
}
