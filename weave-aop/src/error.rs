//! 引擎错误类型
//!
//! 区分两类失败：配置类错误（切面整体非法，立即上抛）
//! 与候选级错误（单个通知成员不可用，记录诊断后跳过）。
//! 运行期间用户通知抛出的错误不属于这里，它们原样穿透引擎。

use thiserror::Error;
use weave_core::CoreError;

/// 引擎错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 切面整体校验失败（不受支持的实例化模型、声明式优先级等）
    #[error("invalid aspect '{aspect}': {reason}")]
    InvalidAspect { aspect: String, reason: String },

    /// 单个成员上的通知声明非法
    #[error("illegal advice declaration on '{aspect}::{member}': {reason}")]
    IllegalAdvice {
        aspect: String,
        member: String,
        reason: String,
    },

    /// 必需的切点表达式缺失或为空
    #[error("missing or empty pointcut expression at {scope}")]
    MissingPointcut { scope: String },

    /// 没有适配器能识别该通知形态
    #[error("no adapter recognizes advice '{0}'")]
    UnknownAdviceKind(String),

    /// 切面实例物化失败
    #[error("failed to materialize aspect instance '{aspect}'")]
    AspectInstance {
        aspect: String,
        #[source]
        source: CoreError,
    },
}

/// 引擎操作的统一结果类型
pub type AopResult<T> = std::result::Result<T, AopError>;
