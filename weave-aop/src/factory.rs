//! Advisor 工厂
//!
//! 把声明式的切面定义转换为统一的 Advisor 记录：
//! 先整体校验切面，再把通知承载成员按确定性顺序逐个转换；
//! 单个成员转换失败只记录诊断并跳过，不拖垮整个切面。

use std::sync::Arc;

use crate::advice::{
    Advice, AdviceKind, AdviceRef, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice,
    AroundAdvice, BeforeAdvice, ExceptionSelector,
};
use crate::advisor::{
    AdviceBuilder, Advisor, InstantiationAwareAdvisor, SyntheticInstantiationAdvisor,
};
use crate::aspect::{
    AdviceCallback, AdviceMarker, AdviceMemberDeclaration, AspectDefinition, AspectMetadata,
    InstanceRef,
};
use crate::error::{AopError, AopResult};
use crate::instance::AspectInstanceProvider;
use crate::invocation::{InvocationError, InvocationResult, InvocationValue, MethodInvocation};
use crate::joinpoint::JoinPoint;
use crate::pointcut::{ExpressionPointcut, Pointcut};

/// 声明驱动的 Advisor 工厂
#[derive(Debug, Default)]
pub struct DeclarativeAdvisorFactory;

impl DeclarativeAdvisorFactory {
    pub fn new() -> Self {
        Self
    }

    /// 校验切面并构建其全部 Advisor（有序）
    ///
    /// 非急切模型会在最前面放置一个合成的物化 Advisor；
    /// 此阶段不创建任何切面实例（急切单例的实例由提供者在注册时持有）
    pub fn build_advisors(
        &self,
        definition: &AspectDefinition,
        provider: Arc<dyn AspectInstanceProvider>,
    ) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let metadata = AspectMetadata::new(definition.declaration.clone())?;

        let mut advice_members: Vec<(AdviceKind, &AdviceMarker, &AdviceMemberDeclaration)> =
            Vec::new();
        for member in metadata.members() {
            match Self::extract_advice_marker(metadata.name(), member)? {
                Some((kind, marker)) => advice_members.push((kind, marker, member)),
                None => {
                    // 纯切点声明不是可运行的通知，静默跳过
                    tracing::debug!(
                        "Member '{}::{}' declares a pointcut only, no advisor built",
                        metadata.name(),
                        member.method_name
                    );
                }
            }
        }

        // 先按通知类型的嵌套序，再按成员名，得到跨次运行一致的声明位次
        advice_members.sort_by(|(kind_a, _, member_a), (kind_b, _, member_b)| {
            kind_a
                .rank()
                .cmp(&kind_b.rank())
                .then_with(|| member_a.method_name.cmp(&member_b.method_name))
        });

        let mut advisors: Vec<Arc<dyn Advisor>> = Vec::new();
        let mut declaration_order = 1usize;

        for (kind, marker, member) in advice_members {
            let Some(callback) = definition.behavior(&member.method_name) else {
                tracing::warn!(
                    "Skipping advice member '{}::{}': no behavior bound for it",
                    metadata.name(),
                    member.method_name
                );
                continue;
            };

            if callback.kind() != kind {
                tracing::warn!(
                    "Skipping advice member '{}::{}': marker declares {} but bound behavior is {}",
                    metadata.name(),
                    member.method_name,
                    kind,
                    callback.kind()
                );
                continue;
            }

            let declared_pointcut: Arc<dyn Pointcut> =
                Arc::new(ExpressionPointcut::parse(marker.expression()));
            let builder = Self::advice_builder(
                metadata.name(),
                &member.method_name,
                marker,
                callback.clone(),
                provider.clone(),
            );

            advisors.push(Arc::new(InstantiationAwareAdvisor::new(
                declared_pointcut,
                metadata.per_clause_pointcut(),
                provider.clone(),
                declaration_order,
                None,
                builder,
            )));
            declaration_order += 1;
        }

        if !metadata.model().is_eager() {
            advisors.insert(
                0,
                Arc::new(SyntheticInstantiationAdvisor::new(
                    provider,
                    metadata.per_clause_pointcut(),
                )),
            );
        }

        tracing::debug!(
            "Built {} advisor(s) for aspect '{}'",
            advisors.len(),
            metadata.name()
        );
        Ok(advisors)
    }

    /// 收集切面里声明的可复用命名切点
    pub fn named_pointcuts(
        &self,
        definition: &AspectDefinition,
    ) -> Vec<(String, Arc<dyn Pointcut>)> {
        definition
            .declaration
            .members
            .iter()
            .flat_map(|member| {
                member.markers.iter().filter_map(move |marker| match marker {
                    AdviceMarker::Pointcut { expression } => Some((
                        member.method_name.clone(),
                        Arc::new(ExpressionPointcut::parse(expression)) as Arc<dyn Pointcut>,
                    )),
                    _ => None,
                })
            })
            .collect()
    }

    /// 提取成员上唯一的通知标记
    ///
    /// 多个不可调和的通知标记是致命错误；纯切点标记返回 None
    fn extract_advice_marker<'a>(
        aspect: &str,
        member: &'a AdviceMemberDeclaration,
    ) -> AopResult<Option<(AdviceKind, &'a AdviceMarker)>> {
        let mut found: Option<(AdviceKind, &'a AdviceMarker)> = None;

        for marker in &member.markers {
            let Some(kind) = marker.advice_kind() else {
                continue;
            };

            if found.is_some() {
                return Err(AopError::IllegalAdvice {
                    aspect: aspect.to_string(),
                    member: member.method_name.clone(),
                    reason: "more than one advice marker on a single member".to_string(),
                });
            }

            if marker.expression().trim().is_empty() {
                return Err(AopError::MissingPointcut {
                    scope: format!("{}::{}", aspect, member.method_name),
                });
            }

            found = Some((kind, marker));
        }

        Ok(found)
    }

    fn advice_builder(
        aspect: &str,
        member: &str,
        marker: &AdviceMarker,
        callback: AdviceCallback,
        provider: Arc<dyn AspectInstanceProvider>,
    ) -> AdviceBuilder {
        let name = format!("{}::{}", aspect, member);
        let binding = marker.binding().map(str::to_string);

        Arc::new(move || match callback.clone() {
            AdviceCallback::Before(f) => AdviceRef::Before(Arc::new(DeclarativeBeforeAdvice {
                name: name.clone(),
                provider: provider.clone(),
                callback: f,
            })),
            AdviceCallback::After(f) => AdviceRef::After(Arc::new(DeclarativeAfterAdvice {
                name: name.clone(),
                provider: provider.clone(),
                callback: f,
            })),
            AdviceCallback::AfterReturning(f) => {
                AdviceRef::AfterReturning(Arc::new(DeclarativeAfterReturningAdvice {
                    name: name.clone(),
                    returning_name: binding.clone(),
                    provider: provider.clone(),
                    callback: f,
                }))
            }
            AdviceCallback::AfterThrowing {
                callback: f,
                selector,
            } => AdviceRef::AfterThrowing(Arc::new(DeclarativeAfterThrowingAdvice {
                name: name.clone(),
                throwing_name: binding.clone(),
                selector,
                provider: provider.clone(),
                callback: f,
            })),
            AdviceCallback::Around(f) => AdviceRef::Around(Arc::new(DeclarativeAroundAdvice {
                name: name.clone(),
                provider: provider.clone(),
                callback: f,
            })),
        })
    }
}

fn materialize(
    provider: &Arc<dyn AspectInstanceProvider>,
) -> Result<InstanceRef, InvocationError> {
    provider.get().map_err(|e| Arc::new(e) as InvocationError)
}

/// 声明式前置通知
struct DeclarativeBeforeAdvice {
    name: String,
    provider: Arc<dyn AspectInstanceProvider>,
    callback: Arc<dyn Fn(&InstanceRef, &JoinPoint) -> Result<(), InvocationError> + Send + Sync>,
}

impl Advice for DeclarativeBeforeAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::Before
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl BeforeAdvice for DeclarativeBeforeAdvice {
    fn before(&self, join_point: &JoinPoint) -> Result<(), InvocationError> {
        let instance = materialize(&self.provider)?;
        (self.callback)(&instance, join_point)
    }
}

/// 声明式后置通知
struct DeclarativeAfterAdvice {
    name: String,
    provider: Arc<dyn AspectInstanceProvider>,
    callback: Arc<dyn Fn(&InstanceRef, &JoinPoint) + Send + Sync>,
}

impl Advice for DeclarativeAfterAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::After
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl AfterAdvice for DeclarativeAfterAdvice {
    fn after(&self, join_point: &JoinPoint) {
        match materialize(&self.provider) {
            Ok(instance) => (self.callback)(&instance, join_point),
            Err(e) => tracing::error!("After advice '{}' lost its aspect instance: {}", self.name, e),
        }
    }
}

/// 声明式返回后通知
struct DeclarativeAfterReturningAdvice {
    name: String,
    returning_name: Option<String>,
    provider: Arc<dyn AspectInstanceProvider>,
    callback: Arc<
        dyn Fn(&InstanceRef, &JoinPoint, &InvocationValue) -> Result<(), InvocationError>
            + Send
            + Sync,
    >,
}

impl Advice for DeclarativeAfterReturningAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::AfterReturning
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl AfterReturningAdvice for DeclarativeAfterReturningAdvice {
    fn returning_name(&self) -> Option<&str> {
        self.returning_name.as_deref()
    }

    fn after_returning(
        &self,
        join_point: &JoinPoint,
        value: &InvocationValue,
    ) -> Result<(), InvocationError> {
        let instance = materialize(&self.provider)?;
        (self.callback)(&instance, join_point, value)
    }
}

/// 声明式异常通知
struct DeclarativeAfterThrowingAdvice {
    name: String,
    throwing_name: Option<String>,
    selector: ExceptionSelector,
    provider: Arc<dyn AspectInstanceProvider>,
    callback: Arc<dyn Fn(&InstanceRef, &JoinPoint, &InvocationError) + Send + Sync>,
}

impl Advice for DeclarativeAfterThrowingAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::AfterThrowing
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl AfterThrowingAdvice for DeclarativeAfterThrowingAdvice {
    fn throwing_name(&self) -> Option<&str> {
        self.throwing_name.as_deref()
    }

    fn selector(&self) -> &ExceptionSelector {
        &self.selector
    }

    fn after_throwing(&self, join_point: &JoinPoint, error: &InvocationError) {
        match materialize(&self.provider) {
            Ok(instance) => (self.callback)(&instance, join_point, error),
            Err(e) => tracing::error!(
                "After-throwing advice '{}' lost its aspect instance: {}",
                self.name,
                e
            ),
        }
    }
}

/// 声明式环绕通知
struct DeclarativeAroundAdvice {
    name: String,
    provider: Arc<dyn AspectInstanceProvider>,
    callback: Arc<dyn Fn(&InstanceRef, &mut MethodInvocation) -> InvocationResult + Send + Sync>,
}

impl Advice for DeclarativeAroundAdvice {
    fn kind(&self) -> AdviceKind {
        AdviceKind::Around
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl AroundAdvice for DeclarativeAroundAdvice {
    fn around(&self, invocation: &mut MethodInvocation) -> InvocationResult {
        let instance = materialize(&self.provider)?;
        (self.callback)(&instance, invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::{AspectDeclaration, InstantiationModel};
    use crate::instance::{FunctionAspectInstanceProvider, SingletonAspectInstanceProvider};

    fn provider_for(
        definition: &AspectDefinition,
    ) -> Arc<dyn AspectInstanceProvider> {
        match definition.declaration.model {
            InstantiationModel::Singleton => Arc::new(SingletonAspectInstanceProvider::new(
                definition.declaration.name.clone(),
                Arc::new(0u8) as InstanceRef,
                definition.declaration.order,
            )),
            model => Arc::new(FunctionAspectInstanceProvider::new(
                definition.declaration.name.clone(),
                model,
                definition.declaration.order,
                || Arc::new(0u8) as InstanceRef,
            )),
        }
    }

    fn noop_before() -> AdviceCallback {
        AdviceCallback::before(|_, _| Ok(()))
    }

    #[test]
    fn test_member_ordering_by_kind_then_name() {
        // 声明顺序故意打乱：两个前置（名字逆序）在环绕之前声明
        let declaration = AspectDeclaration::singleton("audit")
            .member(
                "b_before",
                AdviceMarker::Before {
                    expression: "* *.*(..)".to_string(),
                },
            )
            .member(
                "a_before",
                AdviceMarker::Before {
                    expression: "* *.*(..)".to_string(),
                },
            )
            .member(
                "wrap",
                AdviceMarker::Around {
                    expression: "* *.*(..)".to_string(),
                },
            );
        let definition = AspectDefinition::new(declaration)
            .bind("b_before", noop_before())
            .bind("a_before", noop_before())
            .bind("wrap", AdviceCallback::around(|_, inv| inv.proceed()));

        let factory = DeclarativeAdvisorFactory::new();
        let advisors = factory
            .build_advisors(&definition, provider_for(&definition))
            .unwrap();

        // Around < Before；同类之内按成员名
        assert_eq!(advisors.len(), 3);
        assert_eq!(advisors[0].advice().name(), "audit::wrap");
        assert_eq!(advisors[1].advice().name(), "audit::a_before");
        assert_eq!(advisors[2].advice().name(), "audit::b_before");
        assert_eq!(advisors[0].declaration_order(), 1);
        assert_eq!(advisors[1].declaration_order(), 2);
        assert_eq!(advisors[2].declaration_order(), 3);
    }

    #[test]
    fn test_lazy_model_prepends_materializing_advisor() {
        let declaration = AspectDeclaration::singleton("tracker")
            .with_model(InstantiationModel::PerTarget)
            .with_per_clause("* Repo.activate(..)")
            .member(
                "on_save",
                AdviceMarker::Before {
                    expression: "* Repo.save(..)".to_string(),
                },
            );
        let definition = AspectDefinition::new(declaration).bind("on_save", noop_before());

        let factory = DeclarativeAdvisorFactory::new();
        let advisors = factory
            .build_advisors(&definition, provider_for(&definition))
            .unwrap();

        assert_eq!(advisors.len(), 2);
        assert_eq!(advisors[0].advice().name(), "tracker#materialize");
        assert_eq!(advisors[0].declaration_order(), 0);
        assert_eq!(advisors[1].advice().name(), "tracker::on_save");
    }

    #[test]
    fn test_multiple_markers_is_illegal() {
        let mut member = AdviceMemberDeclaration::new(
            "confused",
            AdviceMarker::Before {
                expression: "* *.*(..)".to_string(),
            },
        );
        member.markers.push(AdviceMarker::After {
            expression: "* *.*(..)".to_string(),
        });

        let mut declaration = AspectDeclaration::singleton("broken");
        declaration.members.push(member);
        let definition = AspectDefinition::new(declaration).bind("confused", noop_before());

        let factory = DeclarativeAdvisorFactory::new();
        assert!(matches!(
            factory.build_advisors(&definition, provider_for(&definition)),
            Err(AopError::IllegalAdvice { .. })
        ));
    }

    #[test]
    fn test_empty_expression_is_fatal() {
        let declaration = AspectDeclaration::singleton("blank").member(
            "log",
            AdviceMarker::Before {
                expression: "   ".to_string(),
            },
        );
        let definition = AspectDefinition::new(declaration).bind("log", noop_before());

        let factory = DeclarativeAdvisorFactory::new();
        assert!(matches!(
            factory.build_advisors(&definition, provider_for(&definition)),
            Err(AopError::MissingPointcut { .. })
        ));
    }

    #[test]
    fn test_unbound_member_is_skipped_not_fatal() {
        let declaration = AspectDeclaration::singleton("partial")
            .member(
                "bound",
                AdviceMarker::Before {
                    expression: "* *.*(..)".to_string(),
                },
            )
            .member(
                "unbound",
                AdviceMarker::Before {
                    expression: "* *.*(..)".to_string(),
                },
            );
        let definition = AspectDefinition::new(declaration).bind("bound", noop_before());

        let factory = DeclarativeAdvisorFactory::new();
        let advisors = factory
            .build_advisors(&definition, provider_for(&definition))
            .unwrap();
        assert_eq!(advisors.len(), 1);
        assert_eq!(advisors[0].advice().name(), "partial::bound");
    }

    #[test]
    fn test_kind_mismatch_is_skipped() {
        let declaration = AspectDeclaration::singleton("mismatch").member(
            "log",
            AdviceMarker::After {
                expression: "* *.*(..)".to_string(),
            },
        );
        // 标记声明 after，却绑定了 before 行为
        let definition = AspectDefinition::new(declaration).bind("log", noop_before());

        let factory = DeclarativeAdvisorFactory::new();
        let advisors = factory
            .build_advisors(&definition, provider_for(&definition))
            .unwrap();
        assert!(advisors.is_empty());
    }

    #[test]
    fn test_pointcut_only_member_yields_named_pointcut() {
        let declaration = AspectDeclaration::singleton("shared").member(
            "in_services",
            AdviceMarker::Pointcut {
                expression: "* *Service.*(..)".to_string(),
            },
        );
        let definition = AspectDefinition::new(declaration);

        let factory = DeclarativeAdvisorFactory::new();
        let advisors = factory
            .build_advisors(&definition, provider_for(&definition))
            .unwrap();
        assert!(advisors.is_empty());

        let named = factory.named_pointcuts(&definition);
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].0, "in_services");
    }

    #[test]
    fn test_after_returning_binding_is_carried() {
        let declaration = AspectDeclaration::singleton("binder").member(
            "capture",
            AdviceMarker::AfterReturning {
                expression: "* *.*(..)".to_string(),
                returning: Some("result".to_string()),
            },
        );
        let definition = AspectDefinition::new(declaration)
            .bind("capture", AdviceCallback::after_returning(|_, _, _| Ok(())));

        let factory = DeclarativeAdvisorFactory::new();
        let advisors = factory
            .build_advisors(&definition, provider_for(&definition))
            .unwrap();

        match advisors[0].advice() {
            AdviceRef::AfterReturning(advice) => {
                assert_eq!(advice.returning_name(), Some("result"));
            }
            other => panic!("unexpected advice shape: {:?}", other),
        }
    }
}
