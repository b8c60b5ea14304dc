//! 机器人引擎
//!
//! 拥有全部可变状态（目录、命令表、队列、等待中的监听、活跃会话），
//! 由唯一的事件循环串行驱动：
//!
//! ```text
//! 聊天事件 -> CommandDispatcher -> (FileCatalog | TransferQueue)
//! tick     -> Scheduler -> 监听 + DCC SEND -> 对端接入 -> TransferSession
//! ```

use log::info;
use std::io;

use crate::catalog::FileCatalog;
use crate::command::{CommandContext, CommandDispatcher};
use crate::config::EngineConfig;
use crate::irc::nick_of;
use crate::transfer::Scheduler;
use crate::transport::{Event, Transport};

pub struct ServBot {
    config: EngineConfig,
    catalog: FileCatalog,
    dispatcher: CommandDispatcher,
    scheduler: Scheduler,
    connected: bool,
}

impl ServBot {
    /// 初始化引擎，根目录不存在时创建
    pub fn new(config: EngineConfig) -> io::Result<Self> {
        let catalog = FileCatalog::open(&config.root)?;
        let dispatcher = CommandDispatcher::new(&config.command_prefix, &config.nick);
        let scheduler = Scheduler::new(config.scheduler_config());
        info!("serving files in {:?}", catalog.root());

        Ok(Self {
            config,
            catalog,
            dispatcher,
            scheduler,
            connected: false,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// 服务器实际接受的昵称
    pub fn nick(&self) -> &str {
        self.dispatcher.bot_nick()
    }

    /// 记录注册成功时使用的昵称，帮助提示随之更新
    pub fn set_nick(&mut self, nick: &str) {
        if nick != self.dispatcher.bot_nick() {
            info!("registered as {}", nick);
            self.dispatcher.set_bot_nick(nick);
        }
    }

    pub fn handle_event<T: Transport + ?Sized>(&mut self, event: Event, transport: &mut T) {
        match event {
            Event::Connected => {
                info!("connected");
                self.connected = true;
                transport.join_channel(&self.config.channel);
            }
            Event::Disconnected => {
                info!("disconnected");
                self.teardown(transport);
            }
            Event::PrivateMessage { sender, text } => self.on_private_message(&sender, &text, transport),
            Event::PeerConnected(id) => self.scheduler.on_peer_connected(id, transport),
            Event::PeerMessage(id, payload) => self.scheduler.on_peer_message(id, &payload, transport),
            Event::PeerDisconnected(id) => self.scheduler.on_peer_disconnected(id, transport),
        }
    }

    /// 周期性 tick，只在主连接就绪时出队
    pub fn tick<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        self.scheduler.tick(transport, self.connected);
    }

    /// 结束所有传输，保留队列，之后可以重新连接
    pub fn teardown<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        self.connected = false;
        self.scheduler.teardown(transport);
    }

    fn on_private_message<T: Transport + ?Sized>(&mut self, sender: &str, text: &str, transport: &mut T) {
        let Some(invocation) = self.dispatcher.parse(text) else {
            return;
        };

        let mut ctx = CommandContext {
            catalog: &self.catalog,
            queue: self.scheduler.queue_mut(),
        };
        let replies = self
            .dispatcher
            .dispatch(sender, invocation.name, &invocation.args, &mut ctx);

        let nick = nick_of(sender);
        for line in replies {
            transport.send_private_message(nick, &line);
        }
    }
}
