//! 共享目录检索
//!
//! 根目录是硬沙箱边界：搜索结果和 `get` 请求解析出的路径都不会落在根目录之外。
//!
//! # 匹配方式
//!
//! - [`NameFilter::Substring`]: 文件名包含子串（区分大小写）
//! - [`NameFilter::Prefix`]: 正则表达式只锚定在文件名开头，不要求完整匹配
//!
//! 遍历不跟随符号链接，遍历顺序不保证稳定。

use log::{debug, info};
use regex::Regex;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 搜索结果最多列出的条目数
pub const SAMPLE_LIMIT: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid file name")]
    InvalidName,

    #[error("no such file")]
    NotFound,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// 文件名过滤条件，只作用于不含目录的文件名
#[derive(Debug, Clone)]
pub enum NameFilter {
    Substring(String),
    Prefix(Regex),
}

impl NameFilter {
    pub fn substring(needle: impl Into<String>) -> Self {
        NameFilter::Substring(needle.into())
    }

    /// 编译前缀匹配的正则
    ///
    /// 先单独校验原始模式，避免锚定包装让非法模式意外变得合法。
    pub fn prefix(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern)?;
        let anchored = Regex::new(&format!(r"\A(?:{pattern})"))?;
        Ok(NameFilter::Prefix(anchored))
    }

    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            NameFilter::Substring(needle) => file_name.contains(needle.as_str()),
            NameFilter::Prefix(re) => re.is_match(file_name),
        }
    }
}

/// 搜索输出的单个条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// 相对根目录的路径，以 `/` 开头
    pub relative_path: String,
    pub size: u64,
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - size: {}B", self.relative_path, self.size)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// 真实匹配总数，不受 [`SAMPLE_LIMIT`] 影响
    pub total: usize,
    pub sample: Vec<CatalogEntry>,
}

impl SearchResult {
    /// 渲染为聊天回复行
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.sample.len() + 1);
        lines.push(format!("{} matches", self.total));
        lines.extend(self.sample.iter().map(ToString::to_string));
        lines
    }
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
}

impl FileCatalog {
    /// 打开根目录，不存在时创建
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root)?;
            info!("Created served directory {:?}", root);
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 递归搜索根目录
    pub fn search(&self, filter: &NameFilter) -> Result<SearchResult, CatalogError> {
        debug!("Searching {:?} with {:?}", self.root, filter);
        let mut result = SearchResult::default();

        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if !filter.matches(&entry.file_name().to_string_lossy()) {
                continue;
            }
            result.total += 1;

            if result.sample.len() < SAMPLE_LIMIT {
                let size = entry.metadata().map_err(io::Error::from)?.len();
                result.sample.push(CatalogEntry {
                    relative_path: self.display_path(entry.path()),
                    size,
                });
            }
        }

        Ok(result)
    }

    /// 把用户提供的路径解析为根目录下的文件
    ///
    /// 校验顺序：`..` 检查，去掉一个前导 `/`，拼接根目录，存在性检查，
    /// 最后确认规范化后的路径仍在根目录之内（防止符号链接逃逸）。
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, CatalogError> {
        if raw.contains("..") {
            return Err(CatalogError::InvalidName);
        }
        let relative = raw.strip_prefix('/').unwrap_or(raw);
        let candidate = self.root.join(relative);

        if !candidate.exists() {
            return Err(CatalogError::NotFound);
        }

        let canonical = candidate.canonicalize()?;
        if !canonical.starts_with(self.root.canonicalize()?) {
            return Err(CatalogError::InvalidName);
        }
        if !canonical.is_file() {
            return Err(CatalogError::NotFound);
        }

        Ok(canonical)
    }

    fn display_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        format!("/{}", relative.to_string_lossy())
    }
}
