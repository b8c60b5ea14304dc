//! 文本命令分发
//!
//! 命令表在初始化时一次性构建，按名称区分大小写查找。每个处理器返回
//! `Result<Vec<String>, CommandError>`，失败在分发边界统一转换为一行
//! `error: ...` 回复，因此 [`CommandDispatcher::dispatch`] 本身永不失败。
//!
//! | 命令 | 作用 |
//! |------|------|
//! | `ping` | 回复 `pong` |
//! | `help` | 用法说明 |
//! | `find <text>` | 文件名子串搜索 |
//! | `regex <pattern>` | 文件名前缀正则搜索 |
//! | `get <path>` | 校验路径并加入传输队列 |

use log::{info, warn};
use std::collections::HashMap;

use crate::catalog::{CatalogError, FileCatalog, NameFilter};
use crate::transfer::{TransferQueue, TransferRequest};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Help,
    Find,
    Regex,
    Get,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Ping,
        Command::Help,
        Command::Find,
        Command::Regex,
        Command::Get,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Help => "help",
            Command::Find => "find",
            Command::Regex => "regex",
            Command::Get => "get",
        }
    }
}

/// 处理器可访问的引擎状态
pub struct CommandContext<'a> {
    pub catalog: &'a FileCatalog,
    pub queue: &'a mut TransferQueue,
}

/// 解析后的命令行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'t> {
    pub name: &'t str,
    pub args: Vec<&'t str>,
}

#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    prefix: String,
    bot_nick: String,
    handlers: HashMap<&'static str, Command>,
}

impl CommandDispatcher {
    pub fn new(prefix: impl Into<String>, bot_nick: impl Into<String>) -> Self {
        let handlers = Command::ALL.iter().map(|c| (c.name(), *c)).collect();
        Self {
            prefix: prefix.into(),
            bot_nick: bot_nick.into(),
            handlers,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn bot_nick(&self) -> &str {
        &self.bot_nick
    }

    /// 更新帮助提示中的昵称（注册时昵称可能被改过）
    pub fn set_bot_nick(&mut self, nick: impl Into<String>) {
        self.bot_nick = nick.into();
    }

    /// 拆分带前缀的消息，不带前缀时返回 `None`
    pub fn parse<'t>(&self, text: &'t str) -> Option<Invocation<'t>> {
        let mut words = text.split_whitespace();
        let name = words.next()?.strip_prefix(self.prefix.as_str())?;
        Some(Invocation {
            name,
            args: words.collect(),
        })
    }

    /// 执行命令并返回回复行
    pub fn dispatch(
        &self,
        requester: &str,
        name: &str,
        args: &[&str],
        ctx: &mut CommandContext<'_>,
    ) -> Vec<String> {
        let Some(command) = self.handlers.get(name).copied() else {
            return vec![format!("no such command: {name}")];
        };

        info!("cmd_{} from {}", command.name(), requester);
        match self.run(command, requester, args, ctx) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("{} failed for {}: {}", command.name(), requester, e);
                vec![format!("error: {e}")]
            }
        }
    }

    fn run(
        &self,
        command: Command,
        requester: &str,
        args: &[&str],
        ctx: &mut CommandContext<'_>,
    ) -> Result<Vec<String>, CommandError> {
        match command {
            Command::Ping => Ok(vec!["pong".to_string()]),
            Command::Help => Ok(self.help()),
            Command::Find => {
                let needle = args.join(" ");
                info!("checking {:?} for {}", ctx.catalog.root(), needle);
                let result = ctx.catalog.search(&NameFilter::substring(needle))?;
                Ok(result.to_lines())
            }
            Command::Regex => {
                let pattern = args.first().ok_or(CommandError::MissingArgument("pattern"))?;
                info!("checking {:?} for regexp {}", ctx.catalog.root(), pattern);
                let filter = NameFilter::prefix(pattern)?;
                Ok(ctx.catalog.search(&filter)?.to_lines())
            }
            Command::Get => get(requester, args, ctx),
        }
    }

    fn help(&self) -> Vec<String> {
        let p = &self.prefix;
        vec![
            format!("use {p}regex , {p}find and {p}get"),
            format!("make sure to /quote dccallow +{}", self.bot_nick),
        ]
    }
}

fn get(
    requester: &str,
    args: &[&str],
    ctx: &mut CommandContext<'_>,
) -> Result<Vec<String>, CommandError> {
    if args.is_empty() {
        return Err(CommandError::MissingArgument("path"));
    }
    let raw = args.join(" ");

    let path = match ctx.catalog.resolve(&raw) {
        Ok(path) => path,
        Err(CatalogError::InvalidName) => return Ok(vec!["invalid file name".to_string()]),
        Err(CatalogError::NotFound) => return Ok(vec!["no such file".to_string()]),
        Err(e) => return Err(e.into()),
    };

    info!("queueing {:?} for {}", path, requester);
    ctx.queue.enqueue(TransferRequest::new(requester, path));
    Ok(vec!["your request has been queued".to_string()])
}
