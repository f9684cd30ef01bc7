//! 连接点（JoinPoint）定义
//!
//! 没有运行时反射，候选对象由描述符刻画：
//! `TargetDescriptor` 描述一个类型及其可达方法，`MethodDescriptor`
//! 描述单个方法，`JoinPoint` 则是一次具体调用的上下文。

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// 调用参数的统一形态
pub type ArgValue = Arc<dyn Any + Send + Sync>;

/// 方法描述符
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// 方法名称
    pub name: String,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// 目标描述符
///
/// 描述一个候选对象的类型名与可达方法；`infrastructure` 标记
/// 引擎自身的基础设施对象（通知、切点、Advisor 等），它们永不被代理。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// 目标类型名称
    pub type_name: String,

    /// 可达方法列表
    pub methods: Vec<MethodDescriptor>,

    /// 是否为引擎基础设施对象
    #[serde(default)]
    pub infrastructure: bool,
}

impl TargetDescriptor {
    /// 创建新的目标描述符
    pub fn new(type_name: impl Into<String>, methods: &[&str]) -> Self {
        Self {
            type_name: type_name.into(),
            methods: methods.iter().map(|m| MethodDescriptor::new(*m)).collect(),
            infrastructure: false,
        }
    }

    /// 创建基础设施对象的描述符
    pub fn infrastructure(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            methods: Vec::new(),
            infrastructure: true,
        }
    }

    /// 按名称查找方法
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// 连接点信息
///
/// 包含方法调用时的上下文信息
#[derive(Clone)]
pub struct JoinPoint {
    /// 目标描述符
    pub target: Arc<TargetDescriptor>,

    /// 被调用的方法
    pub method: Arc<MethodDescriptor>,

    /// 调用参数
    pub args: Vec<ArgValue>,

    /// 调用时间戳
    pub timestamp: Instant,
}

impl JoinPoint {
    /// 创建新的连接点
    pub fn new(target: Arc<TargetDescriptor>, method: Arc<MethodDescriptor>) -> Self {
        Self {
            target,
            method,
            args: Vec::new(),
            timestamp: Instant::now(),
        }
    }

    /// 设置参数
    pub fn with_args(mut self, args: Vec<ArgValue>) -> Self {
        self.args = args;
        self
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target.type_name, self.method.name)
    }

    /// 尝试按类型取第 index 个参数
    pub fn arg<T: Any + Send + Sync>(&self, index: usize) -> Option<&T> {
        self.args.get(index)?.downcast_ref::<T>()
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("args", &self.args.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}
