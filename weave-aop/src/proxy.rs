//! 代理构造边界
//!
//! 引擎不生成任何动态类型：它只产出一份 `ProxyPlan`（有序 Advisor、
//! 目标访问器与代理配置），由外部的代理构造器消费。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::advisor::Advisor;
use crate::auto_proxy::ProxyDecision;
use crate::error::AopResult;
use crate::joinpoint::TargetDescriptor;
use weave_core::bean::BeanInstance;

/// 代理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// 是否把当前调用暴露给通知可见的调用上下文
    pub expose_invocation: bool,

    /// 冻结后代理的 Advisor 列表不再变化
    pub frozen: bool,

    /// 不透明代理不对外暴露自身被通知的事实
    pub opaque: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            expose_invocation: false,
            frozen: false,
            opaque: false,
        }
    }
}

/// 目标访问器
///
/// 为代理提供被包装的目标对象；实现决定目标是固定的还是每次获取
pub trait TargetSource: Send + Sync {
    /// 目标的类型描述
    fn descriptor(&self) -> &TargetDescriptor;

    /// 实际目标对象（若可获得）
    fn target(&self) -> Option<BeanInstance>;

    /// 目标是否固定不变
    fn is_static(&self) -> bool {
        true
    }
}

/// 固定单例目标
pub struct SingletonTargetSource {
    descriptor: Arc<TargetDescriptor>,
    instance: BeanInstance,
}

impl SingletonTargetSource {
    pub fn new(descriptor: Arc<TargetDescriptor>, instance: BeanInstance) -> Self {
        Self {
            descriptor,
            instance,
        }
    }
}

impl TargetSource for SingletonTargetSource {
    fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    fn target(&self) -> Option<BeanInstance> {
        Some(self.instance.clone())
    }
}

/// 只有类型描述、没有实际对象的目标
///
/// 决策阶段未提供显式目标访问器时的缺省形态
pub struct EmptyTargetSource {
    descriptor: Arc<TargetDescriptor>,
}

impl EmptyTargetSource {
    pub fn new(descriptor: Arc<TargetDescriptor>) -> Self {
        Self { descriptor }
    }
}

impl TargetSource for EmptyTargetSource {
    fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    fn target(&self) -> Option<BeanInstance> {
        None
    }
}

/// 代理构造计划
///
/// 交给外部代理构造器的全部输入
pub struct ProxyPlan {
    pub config: ProxyConfig,
    pub advisors: Vec<Arc<dyn Advisor>>,
    pub target_source: Arc<dyn TargetSource>,
}

impl ProxyPlan {
    pub fn new(
        config: ProxyConfig,
        advisors: Vec<Arc<dyn Advisor>>,
        target_source: Arc<dyn TargetSource>,
    ) -> Self {
        Self {
            config,
            advisors,
            target_source,
        }
    }

    /// 从代理决策构建计划；NoProxy 没有计划
    pub fn from_decision(decision: ProxyDecision, config: ProxyConfig) -> Option<Self> {
        match decision {
            ProxyDecision::NoProxy => None,
            ProxyDecision::Proxy {
                advisors,
                target_source,
            } => Some(Self::new(config, advisors, target_source)),
        }
    }
}

impl fmt::Debug for ProxyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPlan")
            .field("target", &self.target_source.descriptor().type_name)
            .field("advisors", &self.advisors.len())
            .field("config", &self.config)
            .finish()
    }
}

/// 代理构造器（外部协作方）
///
/// 消费计划、产出运行时代理对象；引擎自身永不做这件事
pub trait ProxyFabricator: Send + Sync {
    /// 构造代理对象
    fn fabricate(&self, plan: &ProxyPlan) -> AopResult<BeanInstance>;

    /// 构造出的代理的类型名（用于决策缓存回填）
    fn proxy_type_name(&self, plan: &ProxyPlan) -> String;
}
