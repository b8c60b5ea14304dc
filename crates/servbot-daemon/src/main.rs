//! Servbot Daemon
//!
//! IRC XDCC 文件服务机器人：
//! - 解析命令行并与持久化设置合并
//! - 初始化日志（core 的 log 输出桥接到 tracing）
//! - 断线后自动重连

mod service;

use anyhow::Result;
use clap::Parser;
use servbot_core::BotSettings;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "servbot", version, about = "IRC XDCC 文件服务机器人")]
struct Args {
    /// IRC 服务器 host[:port]
    #[arg(long)]
    server: Option<String>,
    /// DCC 报文中公布的 IPv4 地址
    #[arg(long)]
    address: Option<Ipv4Addr>,
    /// DCC 监听端口
    #[arg(long)]
    port: Option<u16>,
    /// 要加入的频道
    #[arg(long)]
    chan: Option<String>,
    /// 机器人昵称
    #[arg(long)]
    botname: Option<String>,
    /// 共享根目录
    #[arg(long)]
    root: Option<PathBuf>,
    /// 输出调试日志
    #[arg(long)]
    debug: bool,
    /// 配置文件路径 (默认: ~/.config/servbot/settings.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// 把合并后的设置写回配置文件
    #[arg(long)]
    save: bool,
}

impl Args {
    /// 命令行参数覆盖文件中的值
    fn merge_into(self, settings: &mut BotSettings) {
        if let Some(server) = self.server {
            settings.server = Some(server);
        }
        if let Some(address) = self.address {
            settings.address = Some(address);
        }
        if let Some(port) = self.port {
            settings.dcc_port = Some(port);
        }
        if let Some(chan) = self.chan {
            settings.channel = Some(chan);
        }
        if let Some(nick) = self.botname {
            settings.nick = nick;
        }
        if let Some(root) = self.root {
            settings.root = root;
        }
        settings.debug |= self.debug;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    let config_path = args.config.take().unwrap_or_else(BotSettings::config_path);
    let save = args.save;
    let mut settings = BotSettings::load_from(&config_path);
    args.merge_into(&mut settings);

    init_logging(settings.debug);

    if save {
        settings.save_to(&config_path)?;
        tracing::info!("settings saved to {:?}", config_path);
    }

    tracing::info!("Servbot starting...");

    tokio::select! {
        res = service::run_service(&settings) => {
            if let Err(e) = &res {
                tracing::error!("servbot exited: {:#}", e);
            }
            res
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    }
}

fn init_logging(debug: bool) {
    // 桥接 log crate（servbot-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let default = if debug {
        "debug"
    } else {
        "info,servbot_core=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .try_init();
}
