//! Ingestion 错误类型

use std::path::PathBuf;

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 回放文件无法读取
    #[error("failed to load replay file {path:?}: {source}")]
    ReplayLoad {
        /// 回放文件路径
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 回放行不是合法读数
    #[error("invalid replay record at line {line}: {message}")]
    ReplayParse {
        /// 行号 (从 1 开始)
        line: usize,
        /// 错误信息
        message: String,
    },

    /// 数据源参数缺失或格式错误
    #[error("invalid sensor parameter '{key}': {message}")]
    InvalidParam {
        /// 参数键
        key: String,
        /// 错误信息
        message: String,
    },

    /// 来自传感器契约的错误
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),
}

impl IngestionError {
    pub(crate) fn invalid_param(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Ingestion Result 别名
pub type Result<T> = std::result::Result<T, IngestionError>;
