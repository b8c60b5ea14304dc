//! IRC 聊天传输
//!
//! 包含:
//! - 行协议解析与格式化
//! - 入站消息分类（把服务器消息翻译为机器人关心的事件）

pub mod protocol;

pub use protocol::{IrcMessage, ctcp_body};

/// 从 `nick!user@host` 中取出昵称
pub fn nick_of(identity: &str) -> &str {
    identity.split('!').next().unwrap_or(identity)
}

/// 机器人关心的入站消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ping(String),
    /// 注册完成（001）
    Welcome,
    /// 昵称已被占用（433）
    NickInUse,
    /// 发给机器人的私聊文本
    Private { sender: String, text: String },
    /// 发给机器人的 CTCP 请求，只记录不处理
    Ctcp { sender: String, body: String },
    /// 服务器报错，随后通常会断开
    Error(String),
    Other,
}

impl Inbound {
    pub fn classify(msg: &IrcMessage, own_nick: &str) -> Self {
        match msg.command.as_str() {
            "PING" => Inbound::Ping(msg.param(0).unwrap_or_default().to_string()),
            "001" => Inbound::Welcome,
            "433" => Inbound::NickInUse,
            "ERROR" => Inbound::Error(msg.param(0).unwrap_or_default().to_string()),
            "PRIVMSG" => {
                let (Some(target), Some(text), Some(sender)) =
                    (msg.param(0), msg.param(1), msg.prefix.as_deref())
                else {
                    return Inbound::Other;
                };
                if !target.eq_ignore_ascii_case(own_nick) {
                    return Inbound::Other;
                }
                match ctcp_body(text) {
                    Some(body) => Inbound::Ctcp {
                        sender: sender.to_string(),
                        body: body.to_string(),
                    },
                    None => Inbound::Private {
                        sender: sender.to_string(),
                        text: text.to_string(),
                    },
                }
            }
            _ => Inbound::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str) -> Inbound {
        Inbound::classify(&IrcMessage::parse(line).unwrap(), "xdccbot")
    }

    #[test]
    fn test_nick_of() {
        assert_eq!(nick_of("alice!x@y"), "alice");
        assert_eq!(nick_of("irc.example.net"), "irc.example.net");
    }

    #[test]
    fn test_classify_server_messages() {
        assert_eq!(classify("PING :abc"), Inbound::Ping("abc".to_string()));
        assert_eq!(classify(":srv 001 xdccbot :Welcome"), Inbound::Welcome);
        assert_eq!(classify(":srv 433 * xdccbot :in use"), Inbound::NickInUse);
        assert_eq!(
            classify("ERROR :Closing link"),
            Inbound::Error("Closing link".to_string())
        );
        assert_eq!(classify(":srv 372 xdccbot :motd"), Inbound::Other);
    }

    #[test]
    fn test_classify_private_messages() {
        assert_eq!(
            classify(":alice!x@y PRIVMSG XDCCBOT :\\ping"),
            Inbound::Private {
                sender: "alice!x@y".to_string(),
                text: "\\ping".to_string()
            }
        );
        assert_eq!(
            classify(":alice!x@y PRIVMSG xdccbot :\x01VERSION\x01"),
            Inbound::Ctcp {
                sender: "alice!x@y".to_string(),
                body: "VERSION".to_string()
            }
        );
        // 频道消息不处理
        assert_eq!(classify(":alice!x@y PRIVMSG #files :\\ping"), Inbound::Other);
    }
}
