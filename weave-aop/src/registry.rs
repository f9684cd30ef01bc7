//! Advisor 注册表
//!
//! 显式持有全部已知的切面与独立 Advisor，并按切面缓存构建产物。
//! 收集候选 Advisor 不会触发任何切面实例的提前创建；正在容器中
//! 创建的切面 Bean 被跳过而非报错，以避免自引用环。
//! 整体校验失败的切面记录日志后跳过，不影响其余切面的解析。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::advisor::Advisor;
use crate::aspect::{all_aspect_registrations, AspectDefinition, InstanceRef, InstantiationModel};
use crate::error::{AopError, AopResult};
use crate::factory::DeclarativeAdvisorFactory;
use crate::instance::{
    AspectInstanceProvider, BeanAspectInstanceProvider, FunctionAspectInstanceProvider,
    LazySingletonProviderDecorator, SingletonAspectInstanceProvider,
};
use weave_core::bean::BeanFactory;

struct RegisteredAspect {
    name: String,
    definition: AspectDefinition,
    provider: Arc<dyn AspectInstanceProvider>,
    /// 容器支撑的切面记录其 Bean 名，用于创建中探测
    bean_name: Option<String>,
}

/// Advisor 注册表
pub struct AdvisorRegistry {
    factory: DeclarativeAdvisorFactory,
    bean_factory: Option<Arc<dyn BeanFactory>>,
    aspects: RwLock<Vec<RegisteredAspect>>,

    /// 按切面名缓存的构建产物；写入幂等，重复计算产出等值内容
    advisors_cache: RwLock<HashMap<String, Vec<Arc<dyn Advisor>>>>,

    /// 独立注册的 Advisor（框架声明与用户声明共用）
    manual: RwLock<Vec<Arc<dyn Advisor>>>,
}

impl AdvisorRegistry {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self {
            factory: DeclarativeAdvisorFactory::new(),
            bean_factory: None,
            aspects: RwLock::new(Vec::new()),
            advisors_cache: RwLock::new(HashMap::new()),
            manual: RwLock::new(Vec::new()),
        }
    }

    /// 创建挂接容器的注册表
    pub fn with_bean_factory(bean_factory: Arc<dyn BeanFactory>) -> Self {
        let mut registry = Self::new();
        registry.bean_factory = Some(bean_factory);
        registry
    }

    /// 注册一个已构建实例支撑的切面（急切单例）
    pub fn register_aspect_instance(&self, definition: AspectDefinition, instance: InstanceRef) {
        let name = definition.declaration.name.clone();
        tracing::debug!("Registering aspect '{}' with pre-built instance", name);
        let provider = Arc::new(SingletonAspectInstanceProvider::new(
            name.clone(),
            instance,
            definition.declaration.order,
        ));
        self.aspects.write().push(RegisteredAspect {
            name,
            definition,
            provider,
            bean_name: None,
        });
    }

    /// 注册一个由创建函数支撑的切面
    ///
    /// 急切单例当场创建实例；其余模型只记录创建配方，
    /// 实例留到首个命中调用时物化
    pub fn register_aspect<F>(&self, definition: AspectDefinition, creator: F)
    where
        F: Fn() -> InstanceRef + Send + Sync + 'static,
    {
        let name = definition.declaration.name.clone();
        let model = definition.declaration.model;
        let order = definition.declaration.order;

        let provider: Arc<dyn AspectInstanceProvider> = match model {
            InstantiationModel::Singleton => {
                tracing::debug!("Registering eager singleton aspect '{}'", name);
                Arc::new(SingletonAspectInstanceProvider::new(
                    name.clone(),
                    creator(),
                    order,
                ))
            }
            InstantiationModel::LazySingleton => {
                tracing::debug!("Registering lazy singleton aspect '{}'", name);
                Arc::new(LazySingletonProviderDecorator::new(Arc::new(
                    FunctionAspectInstanceProvider::new(name.clone(), model, order, creator),
                )))
            }
            other => {
                tracing::debug!("Registering aspect '{}' with model {:?}", name, other);
                Arc::new(FunctionAspectInstanceProvider::new(
                    name.clone(),
                    other,
                    order,
                    creator,
                ))
            }
        };

        self.aspects.write().push(RegisteredAspect {
            name,
            definition,
            provider,
            bean_name: None,
        });
    }

    /// 注册一个容器 Bean 支撑的切面
    pub fn register_aspect_bean(
        &self,
        definition: AspectDefinition,
        bean_name: &str,
    ) -> AopResult<()> {
        let name = definition.declaration.name.clone();
        let Some(bean_factory) = self.bean_factory.clone() else {
            return Err(AopError::InvalidAspect {
                aspect: name,
                reason: "no bean factory attached to this registry".to_string(),
            });
        };

        let model = definition.declaration.model;
        let order = definition.declaration.order;
        let base = Arc::new(BeanAspectInstanceProvider::new(
            name.clone(),
            bean_name,
            model,
            bean_factory,
            order,
        ));

        // 惰性单例叠加至多一次物化；其余模型由容器或作用域自行约束
        let provider: Arc<dyn AspectInstanceProvider> = match model {
            InstantiationModel::LazySingleton => {
                Arc::new(LazySingletonProviderDecorator::new(base))
            }
            _ => base,
        };

        tracing::debug!(
            "Registering bean-backed aspect '{}' (bean '{}')",
            name,
            bean_name
        );
        self.aspects.write().push(RegisteredAspect {
            name,
            definition,
            provider,
            bean_name: Some(bean_name.to_string()),
        });
        Ok(())
    }

    /// 注册一个独立 Advisor
    pub fn add_advisor(&self, advisor: Arc<dyn Advisor>) {
        self.manual.write().push(advisor);
    }

    /// 从 inventory 自动加载所有注册的切面
    pub fn auto_load_aspects(&self) {
        let registrations: Vec<_> = all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        for registration in registrations {
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            let instance = registration.instance;
            self.register_aspect((registration.definition)(), move || instance());
        }
    }

    /// 收集当前已知的全部 Advisor
    ///
    /// 顺序：独立 Advisor 在前，随后按切面注册顺序展开各切面的产物
    pub fn all_advisors(&self) -> Vec<Arc<dyn Advisor>> {
        let mut advisors = self.manual.read().clone();

        let aspects = self.aspects.read();
        for aspect in aspects.iter() {
            if let (Some(bean_name), Some(bean_factory)) =
                (&aspect.bean_name, &self.bean_factory)
            {
                if bean_factory.is_bean_in_creation(bean_name) {
                    // 切面 Bean 正在创建中：跳过以打断自引用环
                    tracing::debug!(
                        "Skipping aspect '{}': backing bean '{}' is currently in creation",
                        aspect.name,
                        bean_name
                    );
                    continue;
                }
            }

            if let Some(cached) = self.advisors_cache.read().get(&aspect.name) {
                advisors.extend(cached.iter().cloned());
                continue;
            }

            match self
                .factory
                .build_advisors(&aspect.definition, aspect.provider.clone())
            {
                Ok(built) => {
                    self.advisors_cache
                        .write()
                        .insert(aspect.name.clone(), built.clone());
                    advisors.extend(built);
                }
                Err(err) => {
                    // 坏掉的切面不拖垮其余解析
                    tracing::warn!("Skipping aspect '{}': {}", aspect.name, err);
                }
            }
        }

        advisors
    }

    /// 已注册的切面数量
    pub fn aspect_count(&self) -> usize {
        self.aspects.read().len()
    }

    /// 是否没有任何切面或独立 Advisor
    pub fn is_empty(&self) -> bool {
        self.aspects.read().is_empty() && self.manual.read().is_empty()
    }

    /// 丢弃某个切面的构建缓存（显式的再解析触发点）
    pub fn invalidate_aspect(&self, name: &str) {
        self.advisors_cache.write().remove(name);
    }

    /// 清空注册表
    pub fn clear(&self) {
        self.aspects.write().clear();
        self.advisors_cache.write().clear();
        self.manual.write().clear();
    }
}

impl Default for AdvisorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
