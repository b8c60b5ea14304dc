//! IRC 行协议
//!
//! 消息格式: `[:prefix] COMMAND param... [:trailing]`

use std::borrow::Cow;
use std::fmt;

/// CTCP 定界符
pub const CTCP_DELIM: char = '\x01';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        let Some((last, middle)) = self.params.split_last() else {
            return Ok(());
        };
        for param in middle {
            write!(f, " {}", line_safe(param))?;
        }
        let last = line_safe(last);
        if last.is_empty() || last.contains(' ') || last.starts_with(':') {
            write!(f, " :{last}")
        } else {
            write!(f, " {last}")
        }
    }
}

// 参数里的 CR/LF/NUL 会截断当前行，格式化时替换为空格
fn line_safe(param: &str) -> Cow<'_, str> {
    if param.contains(['\r', '\n', '\0']) {
        Cow::Owned(param.replace(['\r', '\n', '\0'], " "))
    } else {
        Cow::Borrowed(param)
    }
}

impl IrcMessage {
    pub fn new<I, S>(command: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: None,
            command: command.to_string(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// 解析一行 IRC 消息（行尾的 `\r\n` 会被忽略）
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(stripped) => {
                let (prefix, rest) = stripped.split_once(' ')?;
                (Some(prefix.to_string()), rest)
            }
            None => (None, line),
        };

        let rest = rest.trim_start_matches(' ');
        let (head, trailing) = match rest.find(" :") {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 2..])),
            None => (rest, None),
        };

        let mut parts = head.split(' ').filter(|p| !p.is_empty());
        let command = parts.next()?.to_string();
        let mut params: Vec<String> = parts.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    pub fn nick(nick: &str) -> Self {
        Self::new("NICK", [nick])
    }

    pub fn user(user: &str, realname: &str) -> Self {
        Self::new("USER", [user, "0", "*", realname])
    }

    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", [channel])
    }

    pub fn pong(token: &str) -> Self {
        Self::new("PONG", [token])
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", [target, text])
    }

    /// CTCP 请求，例如 `DCC SEND ...`
    pub fn ctcp(target: &str, text: &str) -> Self {
        Self::privmsg(target, &format!("{CTCP_DELIM}{text}{CTCP_DELIM}"))
    }

    /// 前缀中的昵称部分
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_deref().map(super::nick_of)
    }

    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }
}

/// 如果文本是 CTCP 消息，返回去掉定界符的内容
pub fn ctcp_body(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(CTCP_DELIM)?;
    Some(inner.strip_suffix(CTCP_DELIM).unwrap_or(inner))
}
