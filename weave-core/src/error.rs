//! 统一的错误处理类型
//!
//! 容器边界相关的错误使用 `CoreError` 枚举；
//! 其他一般性的可失败路径沿用 anyhow::Result，通过 .context() 附加上下文。

use thiserror::Error;

/// 容器边界错误
#[derive(Debug, Error)]
pub enum CoreError {
    /// 找不到指定名称的 Bean
    #[error("bean not found: '{0}'")]
    BeanNotFound(String),

    /// Bean 创建失败
    #[error("bean creation failed: {0}")]
    BeanCreationFailed(String),

    /// 检测到循环创建
    #[error("circular creation detected: {0}")]
    CircularCreation(String),

    /// 配置解析失败
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 容器边界操作的统一结果类型
pub type CoreResult<T> = std::result::Result<T, CoreError>;
