//! 连接服务 - 构造引擎并在断线后重连

use anyhow::Result;
use servbot_core::{BotSettings, ServBot, runtime};
use std::time::Duration;

/// 两次连接尝试之间的等待时间
const RECONNECT_DELAY: Duration = Duration::from_secs(10);

pub async fn run_service(settings: &BotSettings) -> Result<()> {
    let server = settings.server_addr()?;
    let mut bot = ServBot::new(settings.engine_config()?)?;

    tracing::info!(
        "serving {:?} as {} in {}",
        bot.catalog().root(),
        bot.config().nick,
        bot.config().channel
    );

    // 队列跨连接保留，重连后继续服务
    loop {
        match runtime::run_connection(&mut bot, &server).await {
            Ok(()) => tracing::warn!("server closed the connection"),
            Err(e) => tracing::warn!("connection to {} failed: {:#}", server, e),
        }
        tracing::info!("reconnecting in {}s", RECONNECT_DELAY.as_secs());
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
