//! 机器人配置和持久化
//!
//! 设置保存在 `<config_dir>/servbot/settings.toml`，命令行参数可以覆盖其中的值。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::transfer::{IDLE_TIMEOUT_TICKS, LISTEN_TIMEOUT_TICKS, SchedulerConfig};

/// 未指定端口时使用的 IRC 端口
pub const DEFAULT_IRC_PORT: u16 = 6667;

/// 调度器 tick 周期
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("bad port number: {0}")]
    BadPort(String),

    #[error("incorrect server format")]
    ServerFormat,

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// IRC 服务器地址，格式 `host[:port]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl FromStr for ServerAddr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [host] => Ok(Self {
                host: (*host).to_string(),
                port: DEFAULT_IRC_PORT,
            }),
            [host, port] => {
                let port = port
                    .parse()
                    .map_err(|_| ConfigError::BadPort((*port).to_string()))?;
                Ok(Self {
                    host: (*host).to_string(),
                    port,
                })
            }
            _ => Err(ConfigError::ServerFormat),
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 持久化设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// IRC 服务器 `host[:port]`
    pub server: Option<String>,
    pub channel: Option<String>,
    pub nick: String,
    /// 共享根目录
    pub root: PathBuf,
    /// DCC 报文中公布的 IPv4 地址
    pub address: Option<Ipv4Addr>,
    pub dcc_port: Option<u16>,
    /// 命令前缀
    pub command_prefix: String,
    pub debug: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            server: None,
            channel: None,
            nick: "xdccbot".to_string(),
            root: dirs::data_local_dir()
                .map_or_else(|| PathBuf::from("share"), |d| d.join("servbot").join("share")),
            address: None,
            dcc_port: None,
            command_prefix: "\\".to_string(),
            debug: false,
        }
    }
}

impl BotSettings {
    /// 默认配置文件路径
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("servbot")
            .join("settings.toml")
    }

    /// 从默认路径加载
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// 加载设置（文件不存在或无法解析时使用默认值）
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn server_addr(&self) -> Result<ServerAddr, ConfigError> {
        self.server
            .as_deref()
            .ok_or(ConfigError::Missing("server"))?
            .parse()
    }

    /// 构造引擎配置，缺少必填项时报错
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let channel = self.channel.clone().ok_or(ConfigError::Missing("chan"))?;
        let address = self.address.ok_or(ConfigError::Missing("address"))?;
        let dcc_port = self.dcc_port.ok_or(ConfigError::Missing("port"))?;

        let mut config = EngineConfig::new(&self.root, channel, &self.nick, address, dcc_port);
        config.command_prefix.clone_from(&self.command_prefix);
        Ok(config)
    }
}

/// 引擎运行参数
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub root: PathBuf,
    pub channel: String,
    pub nick: String,
    pub command_prefix: String,
    pub address: Ipv4Addr,
    pub dcc_port: u16,
    pub tick_period: Duration,
    pub listen_timeout_ticks: u32,
    pub idle_timeout_ticks: u32,
}

impl EngineConfig {
    pub fn new(
        root: impl Into<PathBuf>,
        channel: impl Into<String>,
        nick: impl Into<String>,
        address: Ipv4Addr,
        dcc_port: u16,
    ) -> Self {
        Self {
            root: root.into(),
            channel: channel.into(),
            nick: nick.into(),
            command_prefix: "\\".to_string(),
            address,
            dcc_port,
            tick_period: TICK_PERIOD,
            listen_timeout_ticks: LISTEN_TIMEOUT_TICKS,
            idle_timeout_ticks: IDLE_TIMEOUT_TICKS,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            dcc_port: self.dcc_port,
            address: self.address,
            listen_timeout: self.listen_timeout_ticks,
            idle_timeout: self.idle_timeout_ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_server_addr_parsing() {
        assert_eq!(
            "irc.example.net".parse::<ServerAddr>().unwrap(),
            ServerAddr {
                host: "irc.example.net".to_string(),
                port: 6667
            }
        );
        assert_eq!("irc.example.net:6697".parse::<ServerAddr>().unwrap().port, 6697);
        assert_eq!(
            "irc.example.net:abc".parse::<ServerAddr>(),
            Err(ConfigError::BadPort("abc".to_string()))
        );
        assert_eq!("a:1:2".parse::<ServerAddr>(), Err(ConfigError::ServerFormat));
    }

    #[test]
    fn test_engine_config_requires_settings() {
        let settings = BotSettings::default();
        assert_eq!(settings.engine_config().unwrap_err(), ConfigError::Missing("chan"));

        let settings = BotSettings {
            channel: Some("#files".to_string()),
            address: Some(Ipv4Addr::new(1, 2, 3, 4)),
            dcc_port: Some(5000),
            command_prefix: "!".to_string(),
            ..Default::default()
        };
        let config = settings.engine_config().unwrap();
        assert_eq!(config.channel, "#files");
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.tick_period, Duration::from_secs(1));
        assert_eq!(config.scheduler_config().listen_timeout, 60);
    }

    #[test]
    fn test_default_settings() {
        let settings = BotSettings::default();
        assert_eq!(settings.command_prefix, "\\");
        assert_eq!(settings.nick, "xdccbot");
        assert!(!settings.debug);
    }

    #[test]
    fn test_settings_file_roundtrip_and_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        assert_eq!(BotSettings::load_from(&path), BotSettings::default());

        let settings = BotSettings {
            server: Some("irc.example.net:6697".to_string()),
            dcc_port: Some(5000),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(BotSettings::load_from(&path), settings);

        fs::write(&path, "dcc_port = \"nope\"").unwrap();
        assert_eq!(BotSettings::load_from(&path), BotSettings::default());
    }
}
