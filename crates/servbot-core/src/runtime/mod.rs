//! tokio 运行时
//!
//! 把 [`ServBot`] 接到真实的 IRC 连接和 DCC 套接字上。网络读写都在后台任务中完成，
//! 所有事件经由一个通道汇入同一个循环，与 tick 串行处理：
//!
//! ```text
//! IRC 读任务 ─┐
//! DCC 监听任务 ├─> LoopEvent 通道 ─┐
//! DCC 读任务 ─┘                   ├─> ServBot（唯一的可变状态持有者）
//! interval tick ──────────────────┘
//! ```

mod dcc;

use log::{debug, info, warn};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::bot::ServBot;
use crate::config::ServerAddr;
use crate::irc::{Inbound, IrcMessage};
use crate::transport::{ConnectionId, Event, ListenSocket, Transport, TransportError};
use dcc::DccManager;

/// 汇入事件循环的后台通知
pub(crate) enum LoopEvent {
    Irc(IrcMessage),
    /// IRC 连接关闭，`None` 表示服务器正常断开
    IrcClosed(Option<io::Error>),
    Accepted(ConnectionId, TcpStream),
    AcceptFailed(ConnectionId, io::Error),
    Peer(Event),
}

/// 基于 IRC 连接和 DCC 套接字的传输层实现
pub struct IrcTransport {
    lines: mpsc::UnboundedSender<IrcMessage>,
    dcc: DccManager,
    nick: String,
}

impl IrcTransport {
    /// 当前使用的昵称（被占用时会追加 `_`）
    pub fn nick(&self) -> &str {
        &self.nick
    }

    fn send(&self, msg: IrcMessage) {
        debug!("-> {}", msg);
        if self.lines.send(msg).is_err() {
            debug!("IRC writer is gone, dropping message");
        }
    }

    fn on_irc(&mut self, msg: &IrcMessage, bot: &mut ServBot) {
        match Inbound::classify(msg, &self.nick) {
            Inbound::Ping(token) => self.send(IrcMessage::pong(&token)),
            Inbound::Welcome => {
                bot.set_nick(self.nick());
                bot.handle_event(Event::Connected, self);
            }
            Inbound::NickInUse => {
                self.nick.push('_');
                warn!("nickname in use, retrying as {}", self.nick);
                self.send(IrcMessage::nick(&self.nick));
            }
            Inbound::Private { sender, text } => {
                bot.handle_event(Event::PrivateMessage { sender, text }, self);
            }
            Inbound::Ctcp { sender, body } => info!("got ctcp from {}: {}", sender, body),
            Inbound::Error(reason) => warn!("server error: {}", reason),
            Inbound::Other => {}
        }
    }

    fn on_event(&mut self, event: LoopEvent, bot: &mut ServBot) {
        match event {
            LoopEvent::Irc(msg) => self.on_irc(&msg, bot),
            LoopEvent::Accepted(id, stream) => {
                if self.dcc.attach(id, stream) {
                    bot.handle_event(Event::PeerConnected(id), self);
                } else {
                    debug!("{}: listener already closed, dropping peer", id);
                }
            }
            LoopEvent::AcceptFailed(id, e) => {
                warn!("{}: accept failed: {}", id, e);
                self.dcc.listen_failed(id);
                bot.handle_event(Event::PeerDisconnected(id), self);
            }
            LoopEvent::Peer(Event::PeerDisconnected(id)) => {
                self.dcc.forget(id);
                bot.handle_event(Event::PeerDisconnected(id), self);
            }
            LoopEvent::Peer(event) => bot.handle_event(event, self),
            LoopEvent::IrcClosed(_) => {}
        }
    }
}

impl Transport for IrcTransport {
    fn join_channel(&mut self, channel: &str) {
        self.send(IrcMessage::join(channel));
    }

    fn send_private_message(&mut self, target: &str, text: &str) {
        self.send(IrcMessage::privmsg(target, text));
    }

    fn send_control_message(&mut self, target: &str, text: &str) {
        self.send(IrcMessage::ctcp(target, &format!("DCC {text}")));
    }

    fn open_listen_socket(&mut self, port: u16) -> Result<ListenSocket, TransportError> {
        Ok(self.dcc.listen(port)?)
    }

    fn close_listen_socket(&mut self, id: ConnectionId) {
        self.dcc.close_listener(id);
    }

    fn send_bytes(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<(), TransportError> {
        self.dcc.send(id, bytes)
    }

    fn disconnect(&mut self, id: ConnectionId) {
        self.dcc.disconnect(id);
    }
}

/// 连接服务器并运行事件循环，直到 IRC 连接断开
///
/// 返回前引擎会被拆除（所有会话强制结束），队列保留，调用方可以重新连接。
pub async fn run_connection(bot: &mut ServBot, server: &ServerAddr) -> anyhow::Result<()> {
    info!("connecting to {}", server);
    let stream = TcpStream::connect((server.host.as_str(), server.port)).await?;
    let (read_half, write_half) = stream.into_split();

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (lines_tx, lines_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lines(write_half, lines_rx));
    let reader = tokio::spawn(read_lines(read_half, events_tx.clone()));

    let mut transport = IrcTransport {
        lines: lines_tx,
        dcc: DccManager::new(events_tx),
        nick: bot.config().nick.clone(),
    };
    transport.send(IrcMessage::nick(&transport.nick));
    transport.send(IrcMessage::user(&transport.nick, "servbot"));

    let mut ticker = time::interval(bot.config().tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let closed = loop {
        tokio::select! {
            _ = ticker.tick() => bot.tick(&mut transport),
            event = events_rx.recv() => match event {
                Some(LoopEvent::IrcClosed(reason)) => break reason,
                Some(event) => transport.on_event(event, bot),
                None => break None,
            },
        }
    };

    bot.handle_event(Event::Disconnected, &mut transport);
    reader.abort();
    drop(transport);
    let _ = writer.await;

    match closed {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

async fn write_lines(mut writer: OwnedWriteHalf, mut lines: mpsc::UnboundedReceiver<IrcMessage>) {
    while let Some(msg) = lines.recv().await {
        let line = format!("{msg}\r\n");
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!("IRC write failed: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_lines(reader: OwnedReadHalf, events: mpsc::UnboundedSender<LoopEvent>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    let reason = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break None,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Some(msg) = IrcMessage::parse(&line) {
                    debug!("<- {}", msg);
                    let _ = events.send(LoopEvent::Irc(msg));
                }
            }
            Err(e) => break Some(e),
        }
    };

    let _ = events.send(LoopEvent::IrcClosed(reason));
}
