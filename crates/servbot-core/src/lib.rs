//! Servbot Core Library
//!
//! IRC XDCC 文件服务机器人的核心实现：远程用户通过私聊命令搜索共享目录、
//! 请求文件，文件经由 DCC 点对点通道逐块发送。
//!
//! # 模块
//!
//! - **catalog**: 受沙箱约束的目录检索
//! - **command**: 带前缀文本命令的分发
//! - **transfer**: 单飞请求队列、会话状态机和 tick 调度器
//! - **bot**: 持有全部状态的引擎，串行处理事件和 tick
//! - **irc**: IRC 行协议
//! - **runtime**: 把引擎接到真实套接字上的 tokio 事件循环
//!
//! # 使用示例
//!
//! ```ignore
//! use servbot_core::{BotSettings, ServBot, runtime};
//!
//! let settings = BotSettings::load();
//! let server = settings.server_addr()?;
//! let mut bot = ServBot::new(settings.engine_config()?)?;
//!
//! loop {
//!     if let Err(e) = runtime::run_connection(&mut bot, &server).await {
//!         log::warn!("connection lost: {}", e);
//!     }
//!     tokio::time::sleep(Duration::from_secs(10)).await;
//! }
//! ```

pub mod bot;
pub mod catalog;
pub mod command;
pub mod config;
pub mod irc;
pub mod runtime;
pub mod transfer;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use bot::ServBot;
pub use catalog::{CatalogEntry, CatalogError, FileCatalog, NameFilter, SearchResult};
pub use command::{Command, CommandDispatcher, CommandError};
pub use config::{BotSettings, ConfigError, EngineConfig, ServerAddr};
pub use irc::IrcMessage;
pub use transfer::{
    DccOffer, PendingListen, Scheduler, TransferError, TransferQueue, TransferRequest,
    TransferSession,
};
pub use transport::{ConnectionId, Event, ListenSocket, Transport, TransportError};
