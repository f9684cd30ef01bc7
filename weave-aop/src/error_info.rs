//! 错误信息结构
//!
//! 提供结构化的错误信息传递给通知

use std::error::Error;

/// 结构化的错误信息
///
/// 用于在异常通知中传递更丰富的错误信息
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误类型名称
    pub error_type: String,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从具体错误类型创建 ErrorInfo
    pub fn from_error<E: Error + 'static>(error: &E) -> Self {
        let mut info = Self::from_dyn(error);
        info.error_type = std::any::type_name::<E>().to_string();
        info
    }

    /// 从 trait object 形态的错误创建 ErrorInfo
    pub fn from_dyn(error: &(dyn Error + 'static)) -> Self {
        let message = error.to_string();

        let mut source_chain = Vec::new();
        let mut current_source = error.source();
        while let Some(source) = current_source {
            source_chain.push(source.to_string());
            current_source = source.source();
        }

        Self {
            message,
            error_type: "Unknown".to_string(),
            source_chain,
        }
    }

    /// 创建简单的 ErrorInfo（只包含消息）
    pub fn simple(message: String) -> Self {
        Self {
            message,
            error_type: "Unknown".to_string(),
            source_chain: Vec::new(),
        }
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}
