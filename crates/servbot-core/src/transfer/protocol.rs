//! DCC 线路格式
//!
//! - 发送报文: `SEND <file> <addr> <port> <size>`，`addr` 为 IPv4 地址的十进制整数形式
//! - 确认帧: 4 字节大端无符号整数，表示对端已收到的总字节数

use regex::Regex;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

/// 固定分块大小
pub const CHUNK_SIZE: usize = 1024;

/// 确认帧长度
pub const ACK_LEN: usize = 4;

static OFFER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^SEND (?:"([^"]+)"|(\S+)) (\d+) (\d+) (\d+)$"#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AckError {
    #[error("Malformed acknowledgement: expected {ACK_LEN} bytes, got {0}")]
    Length(usize),
}

/// 解析确认帧
pub fn decode_ack(payload: &[u8]) -> Result<u32, AckError> {
    let bytes: [u8; ACK_LEN] = payload
        .try_into()
        .map_err(|_| AckError::Length(payload.len()))?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn encode_ack(received: u32) -> [u8; ACK_LEN] {
    received.to_be_bytes()
}

/// DCC SEND 报文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DccOffer {
    pub file_name: String,
    pub address: Ipv4Addr,
    pub port: u16,
    pub size: u64,
}

impl fmt::Display for DccOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file_name.contains(char::is_whitespace) {
            write!(f, "SEND \"{}\"", self.file_name)?;
        } else {
            write!(f, "SEND {}", self.file_name)?;
        }
        write!(f, " {} {} {}", u32::from(self.address), self.port, self.size)
    }
}

impl DccOffer {
    /// 解析 `SEND` 报文（不含 CTCP 包装）
    pub fn parse(text: &str) -> Option<Self> {
        let caps = OFFER_PATTERN.captures(text)?;

        let file_name = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
        let address = Ipv4Addr::from(caps.get(3)?.as_str().parse::<u32>().ok()?);
        let port = caps.get(4)?.as_str().parse().ok()?;
        let size = caps.get(5)?.as_str().parse().ok()?;

        Some(Self {
            file_name,
            address,
            port,
            size,
        })
    }
}
