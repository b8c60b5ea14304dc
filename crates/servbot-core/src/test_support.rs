//! 单元测试共用的记录型传输层

use crate::transport::{ConnectionId, ListenSocket, Transport, TransportError};
use std::collections::HashSet;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub joined: Vec<String>,
    pub messages: Vec<(String, String)>,
    pub control: Vec<(String, String)>,
    pub sends: Vec<(ConnectionId, Vec<u8>)>,
    pub listens: Vec<ListenSocket>,
    pub closed_listens: Vec<ConnectionId>,
    pub disconnected: Vec<ConnectionId>,
    pub fail_listen: bool,
    pub fail_sends: bool,
    pub(crate) next_id: u64,
    pub(crate) dead: HashSet<ConnectionId>,
}

impl RecordingTransport {
    pub fn sends_to(&self, id: ConnectionId) -> Vec<usize> {
        self.sends
            .iter()
            .filter(|(c, _)| *c == id)
            .map(|(_, b)| b.len())
            .collect()
    }

    pub fn bytes_to(&self, id: ConnectionId) -> Vec<u8> {
        self.sends
            .iter()
            .filter(|(c, _)| *c == id)
            .flat_map(|(_, b)| b.iter().copied())
            .collect()
    }

    pub fn replies_to(&self, nick: &str) -> Vec<String> {
        self.messages
            .iter()
            .filter(|(t, _)| t == nick)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn join_channel(&mut self, channel: &str) {
        self.joined.push(channel.to_string());
    }

    fn send_private_message(&mut self, target: &str, text: &str) {
        self.messages.push((target.to_string(), text.to_string()));
    }

    fn send_control_message(&mut self, target: &str, text: &str) {
        self.control.push((target.to_string(), text.to_string()));
    }

    fn open_listen_socket(&mut self, port: u16) -> Result<ListenSocket, TransportError> {
        if self.fail_listen {
            return Err(TransportError::Listen(io::Error::new(
                io::ErrorKind::AddrInUse,
                "address in use",
            )));
        }
        self.next_id += 1;
        let socket = ListenSocket {
            id: ConnectionId(self.next_id),
            port,
        };
        self.listens.push(socket);
        Ok(socket)
    }

    fn close_listen_socket(&mut self, id: ConnectionId) {
        self.closed_listens.push(id);
    }

    fn send_bytes(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends || self.dead.contains(&id) {
            return Err(TransportError::Closed(id));
        }
        self.sends.push((id, bytes.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self, id: ConnectionId) {
        self.dead.insert(id);
        self.disconnected.push(id);
    }
}

/// 统计关闭次数的数据源
pub struct DropCounter {
    inner: Cursor<Vec<u8>>,
    closes: CloseCount,
}

#[derive(Debug, Clone, Default)]
pub struct CloseCount(Arc<AtomicUsize>);

impl CloseCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl DropCounter {
    pub fn new(content: Vec<u8>) -> (Self, CloseCount) {
        let closes = CloseCount::default();
        let source = Self {
            inner: Cursor::new(content),
            closes: closes.clone(),
        };
        (source, closes)
    }
}

impl Read for DropCounter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for DropCounter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.closes.0.fetch_add(1, Ordering::SeqCst);
    }
}
