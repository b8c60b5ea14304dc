//! 传输请求队列
//!
//! 请求按后进先出的顺序取出：最近入队的请求最先被服务。

use crate::irc::nick_of;
use std::path::PathBuf;

/// 由 `get` 命令创建、被调度器恰好消费一次的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// 完整身份 `nick!user@host`
    pub requester: String,
    pub path: PathBuf,
}

impl TransferRequest {
    pub fn new(requester: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            requester: requester.into(),
            path: path.into(),
        }
    }

    /// 用于回复和 DCC 报文的昵称
    pub fn nick(&self) -> &str {
        nick_of(&self.requester)
    }
}

#[derive(Debug, Default)]
pub struct TransferQueue {
    requests: Vec<TransferRequest>,
}

impl TransferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: TransferRequest) {
        self.requests.push(request);
    }

    /// 取出下一个请求（LIFO）
    pub fn take_next(&mut self) -> Option<TransferRequest> {
        self.requests.pop()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
