//! 切面声明（Aspect）定义
//!
//! 声明来自外部的描述源（标注扫描、描述符文件等），引擎只消费
//! 其数据形态：一份 `AspectDeclaration` 元数据，加上按成员名绑定
//! 的行为回调。`AspectMetadata` 是通过整体校验后的形态。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::advice::{AdviceKind, ExceptionSelector};
use crate::error::{AopError, AopResult};
use crate::invocation::{InvocationError, InvocationResult, InvocationValue, MethodInvocation};
use crate::joinpoint::JoinPoint;
use crate::pointcut::{ExpressionPointcut, Pointcut, TruePointcut};
use weave_core::bean::BeanInstance;

/// 切面实例引用
pub type InstanceRef = BeanInstance;

/// 实例化模型
///
/// 控制切面实例何时存在、存在几份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstantiationModel {
    /// 急切单例：实例在注册时即存在
    #[default]
    Singleton,

    /// 惰性单例：首个命中调用时物化，至多一份
    LazySingleton,

    /// 每目标对象一份
    PerTarget,

    /// 每代理对象一份
    PerThis,

    /// 每匹配类型一份
    PerTypeWithin,

    /// 基于控制流（不受支持，声明时即拒绝）
    PerControlFlow,

    /// 基于控制流下界（不受支持，声明时即拒绝）
    PerControlFlowBelow,
}

impl InstantiationModel {
    /// 是否为急切模型
    pub fn is_eager(&self) -> bool {
        matches!(self, InstantiationModel::Singleton)
    }

    /// 引擎是否支持该模型
    pub fn is_supported(&self) -> bool {
        !matches!(
            self,
            InstantiationModel::PerControlFlow | InstantiationModel::PerControlFlowBelow
        )
    }

    /// 该模型是否要求声明激活谓词（per 子句）
    pub fn requires_per_clause(&self) -> bool {
        matches!(
            self,
            InstantiationModel::PerTarget
                | InstantiationModel::PerThis
                | InstantiationModel::PerTypeWithin
        )
    }
}

/// 通知标记
///
/// 描述源在单个成员上放置的声明；一个成员至多承载一个通知标记，
/// 纯切点标记不产生 Advisor，只贡献一个可复用的命名切点
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AdviceMarker {
    Pointcut {
        expression: String,
    },
    Before {
        expression: String,
    },
    After {
        expression: String,
    },
    AfterReturning {
        expression: String,
        returning: Option<String>,
    },
    AfterThrowing {
        expression: String,
        throwing: Option<String>,
    },
    Around {
        expression: String,
    },
}

impl AdviceMarker {
    /// 对应的通知类型；纯切点标记返回 None
    pub fn advice_kind(&self) -> Option<AdviceKind> {
        match self {
            AdviceMarker::Pointcut { .. } => None,
            AdviceMarker::Before { .. } => Some(AdviceKind::Before),
            AdviceMarker::After { .. } => Some(AdviceKind::After),
            AdviceMarker::AfterReturning { .. } => Some(AdviceKind::AfterReturning),
            AdviceMarker::AfterThrowing { .. } => Some(AdviceKind::AfterThrowing),
            AdviceMarker::Around { .. } => Some(AdviceKind::Around),
        }
    }

    /// 标记携带的切点表达式
    pub fn expression(&self) -> &str {
        match self {
            AdviceMarker::Pointcut { expression }
            | AdviceMarker::Before { expression }
            | AdviceMarker::After { expression }
            | AdviceMarker::AfterReturning { expression, .. }
            | AdviceMarker::AfterThrowing { expression, .. }
            | AdviceMarker::Around { expression } => expression,
        }
    }

    /// 返回值/异常的绑定名
    pub fn binding(&self) -> Option<&str> {
        match self {
            AdviceMarker::AfterReturning { returning, .. } => returning.as_deref(),
            AdviceMarker::AfterThrowing { throwing, .. } => throwing.as_deref(),
            _ => None,
        }
    }
}

/// 单个通知承载成员的声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceMemberDeclaration {
    /// 成员（方法）名
    pub method_name: String,

    /// 成员上的标记
    pub markers: Vec<AdviceMarker>,

    /// 声明的参数名列表
    #[serde(default)]
    pub arg_names: Vec<String>,
}

impl AdviceMemberDeclaration {
    pub fn new(method_name: impl Into<String>, marker: AdviceMarker) -> Self {
        Self {
            method_name: method_name.into(),
            markers: vec![marker],
            arg_names: Vec::new(),
        }
    }
}

/// 切面声明（元数据半边）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectDeclaration {
    /// 切面名
    pub name: String,

    /// 实例化模型
    #[serde(default)]
    pub model: InstantiationModel,

    /// 激活谓词表达式（per 子句；单例模型可省略）
    #[serde(default)]
    pub per_clause: Option<String>,

    /// 声明式优先级特性（引擎不支持，出现即校验失败）
    #[serde(default)]
    pub declare_precedence: Option<String>,

    /// 切面级优先级
    #[serde(default)]
    pub order: Option<i32>,

    /// 通知承载成员
    #[serde(default)]
    pub members: Vec<AdviceMemberDeclaration>,
}

impl AspectDeclaration {
    /// 创建急切单例切面声明
    pub fn singleton(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: InstantiationModel::Singleton,
            per_clause: None,
            declare_precedence: None,
            order: None,
            members: Vec::new(),
        }
    }

    /// 切换实例化模型
    pub fn with_model(mut self, model: InstantiationModel) -> Self {
        self.model = model;
        self
    }

    /// 设置激活谓词表达式
    pub fn with_per_clause(mut self, expression: impl Into<String>) -> Self {
        self.per_clause = Some(expression.into());
        self
    }

    /// 设置切面级优先级
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// 追加一个通知承载成员
    pub fn member(mut self, method_name: impl Into<String>, marker: AdviceMarker) -> Self {
        self.members
            .push(AdviceMemberDeclaration::new(method_name, marker));
        self
    }
}

/// 通过整体校验的切面元数据
#[derive(Clone)]
pub struct AspectMetadata {
    declaration: AspectDeclaration,
    per_clause_pointcut: Arc<dyn Pointcut>,
}

impl AspectMetadata {
    /// 校验声明并构建元数据
    ///
    /// 整体性问题（不受支持的模型、声明式优先级、缺失的激活谓词）
    /// 在这里立即失败；成员级问题留给 Advisor 构建阶段逐个处置
    pub fn new(declaration: AspectDeclaration) -> AopResult<Self> {
        if !declaration.model.is_supported() {
            return Err(AopError::InvalidAspect {
                aspect: declaration.name.clone(),
                reason: format!("unsupported instantiation model {:?}", declaration.model),
            });
        }

        if declaration.declare_precedence.is_some() {
            return Err(AopError::InvalidAspect {
                aspect: declaration.name.clone(),
                reason: "declared precedence is not supported".to_string(),
            });
        }

        let per_clause_pointcut: Arc<dyn Pointcut> = match &declaration.per_clause {
            Some(expression) if expression.trim().is_empty() => {
                return Err(AopError::MissingPointcut {
                    scope: format!("aspect '{}' per-clause", declaration.name),
                });
            }
            Some(expression) => Arc::new(ExpressionPointcut::parse(expression)),
            None if declaration.model.requires_per_clause() => {
                return Err(AopError::MissingPointcut {
                    scope: format!("aspect '{}' per-clause", declaration.name),
                });
            }
            None => Arc::new(TruePointcut),
        };

        Ok(Self {
            declaration,
            per_clause_pointcut,
        })
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    pub fn model(&self) -> InstantiationModel {
        self.declaration.model
    }

    pub fn order(&self) -> Option<i32> {
        self.declaration.order
    }

    pub fn members(&self) -> &[AdviceMemberDeclaration] {
        &self.declaration.members
    }

    /// 激活谓词切点（单例模型为恒真切点）
    pub fn per_clause_pointcut(&self) -> Arc<dyn Pointcut> {
        self.per_clause_pointcut.clone()
    }
}

impl fmt::Debug for AspectMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectMetadata")
            .field("name", &self.declaration.name)
            .field("model", &self.declaration.model)
            .field("members", &self.declaration.members.len())
            .finish()
    }
}

/// 行为回调
///
/// 声明中每个成员名对应的可执行行为；回调收到当前切面实例与调用上下文
#[derive(Clone)]
pub enum AdviceCallback {
    Before(Arc<dyn Fn(&InstanceRef, &JoinPoint) -> Result<(), InvocationError> + Send + Sync>),
    After(Arc<dyn Fn(&InstanceRef, &JoinPoint) + Send + Sync>),
    AfterReturning(
        Arc<
            dyn Fn(&InstanceRef, &JoinPoint, &InvocationValue) -> Result<(), InvocationError>
                + Send
                + Sync,
        >,
    ),
    AfterThrowing {
        callback: Arc<dyn Fn(&InstanceRef, &JoinPoint, &InvocationError) + Send + Sync>,
        selector: ExceptionSelector,
    },
    Around(Arc<dyn Fn(&InstanceRef, &mut MethodInvocation) -> InvocationResult + Send + Sync>),
}

impl AdviceCallback {
    pub fn kind(&self) -> AdviceKind {
        match self {
            AdviceCallback::Before(_) => AdviceKind::Before,
            AdviceCallback::After(_) => AdviceKind::After,
            AdviceCallback::AfterReturning(_) => AdviceKind::AfterReturning,
            AdviceCallback::AfterThrowing { .. } => AdviceKind::AfterThrowing,
            AdviceCallback::Around(_) => AdviceKind::Around,
        }
    }

    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&InstanceRef, &JoinPoint) -> Result<(), InvocationError> + Send + Sync + 'static,
    {
        AdviceCallback::Before(Arc::new(f))
    }

    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&InstanceRef, &JoinPoint) + Send + Sync + 'static,
    {
        AdviceCallback::After(Arc::new(f))
    }

    pub fn after_returning<F>(f: F) -> Self
    where
        F: Fn(&InstanceRef, &JoinPoint, &InvocationValue) -> Result<(), InvocationError>
            + Send
            + Sync
            + 'static,
    {
        AdviceCallback::AfterReturning(Arc::new(f))
    }

    pub fn after_throwing<F>(selector: ExceptionSelector, f: F) -> Self
    where
        F: Fn(&InstanceRef, &JoinPoint, &InvocationError) + Send + Sync + 'static,
    {
        AdviceCallback::AfterThrowing {
            callback: Arc::new(f),
            selector,
        }
    }

    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&InstanceRef, &mut MethodInvocation) -> InvocationResult + Send + Sync + 'static,
    {
        AdviceCallback::Around(Arc::new(f))
    }
}

/// 完整的切面定义：声明元数据 + 行为绑定
#[derive(Clone)]
pub struct AspectDefinition {
    pub declaration: AspectDeclaration,
    behaviors: HashMap<String, AdviceCallback>,
}

impl AspectDefinition {
    pub fn new(declaration: AspectDeclaration) -> Self {
        Self {
            declaration,
            behaviors: HashMap::new(),
        }
    }

    /// 按成员名绑定行为回调
    pub fn bind(mut self, method_name: impl Into<String>, callback: AdviceCallback) -> Self {
        self.behaviors.insert(method_name.into(), callback);
        self
    }

    /// 查找成员的行为回调
    pub fn behavior(&self, method_name: &str) -> Option<&AdviceCallback> {
        self.behaviors.get(method_name)
    }
}

/// 切面注册器
///
/// 用于 inventory 自动收集和注册切面
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    /// 构建完整切面定义的函数
    pub definition: fn() -> AspectDefinition,

    /// 创建切面实例的函数
    pub instance: fn() -> InstanceRef,
}

impl AspectRegistration {
    /// 创建新的切面注册器
    pub const fn new(
        name: &'static str,
        definition: fn() -> AspectDefinition,
        instance: fn() -> InstanceRef,
    ) -> Self {
        Self {
            name,
            definition,
            instance,
        }
    }
}

// 使用 inventory 收集所有切面注册器
inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_declaration_validates() {
        let declaration = AspectDeclaration::singleton("logging").member(
            "log_before",
            AdviceMarker::Before {
                expression: "* *Service.*(..)".to_string(),
            },
        );
        let metadata = AspectMetadata::new(declaration).unwrap();
        assert_eq!(metadata.name(), "logging");
        assert!(metadata.model().is_eager());
        assert_eq!(metadata.per_clause_pointcut().key(), "true");
    }

    #[test]
    fn test_control_flow_model_is_rejected() {
        let declaration =
            AspectDeclaration::singleton("cflow").with_model(InstantiationModel::PerControlFlow);
        assert!(matches!(
            AspectMetadata::new(declaration),
            Err(AopError::InvalidAspect { .. })
        ));
    }

    #[test]
    fn test_declare_precedence_is_rejected() {
        let mut declaration = AspectDeclaration::singleton("ordered");
        declaration.declare_precedence = Some("A, B".to_string());
        assert!(matches!(
            AspectMetadata::new(declaration),
            Err(AopError::InvalidAspect { .. })
        ));
    }

    #[test]
    fn test_per_target_requires_per_clause() {
        let declaration =
            AspectDeclaration::singleton("tracker").with_model(InstantiationModel::PerTarget);
        assert!(matches!(
            AspectMetadata::new(declaration),
            Err(AopError::MissingPointcut { .. })
        ));

        let with_clause = AspectDeclaration::singleton("tracker")
            .with_model(InstantiationModel::PerTarget)
            .with_per_clause("* Tracker.activate(..)");
        assert!(AspectMetadata::new(with_clause).is_ok());
    }

    #[test]
    fn test_empty_per_clause_is_rejected() {
        let declaration = AspectDeclaration::singleton("blank")
            .with_model(InstantiationModel::PerTarget)
            .with_per_clause("  ");
        assert!(matches!(
            AspectMetadata::new(declaration),
            Err(AopError::MissingPointcut { .. })
        ));
    }

    #[test]
    fn test_marker_accessors() {
        let marker = AdviceMarker::AfterReturning {
            expression: "* *.*(..)".to_string(),
            returning: Some("result".to_string()),
        };
        assert_eq!(marker.advice_kind(), Some(AdviceKind::AfterReturning));
        assert_eq!(marker.binding(), Some("result"));

        let pointcut_only = AdviceMarker::Pointcut {
            expression: "* *Service.*(..)".to_string(),
        };
        assert_eq!(pointcut_only.advice_kind(), None);
    }
}
