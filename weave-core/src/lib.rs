//! Weave Core - 容器边界与共享基础设施
//!
//! 为 Weave 拦截引擎提供：
//! - 对象生命周期容器的边界接口（Bean 查找、创建中探测、单例创建锁）
//! - 循环创建检测
//! - 统一的优先级排序契约
//! - 错误类型、日志装配与引擎配置

pub mod bean;
pub mod config;
pub mod error;
pub mod logging;
pub mod ordering;
pub mod utils;

// 重新导出核心类型
pub use bean::{BeanFactory, BeanInstance, BeanScope, BeanSupplier, StaticBeanRegistry};
pub use config::{EngineSettings, LoggingSettings};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, LogFormat, LogLevel};
pub use ordering::{Ordered, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};

/// 预导入模块
pub mod prelude {
    pub use crate::bean::{BeanFactory, BeanInstance, BeanScope, StaticBeanRegistry};
    pub use crate::config::EngineSettings;
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::logging::init_logging;
    pub use crate::ordering::{Ordered, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};
    pub use crate::utils::dependency::CreationTracker;
}
