//! 切面实例提供者
//!
//! 提供并持有支撑一族通知的对象实例。实例何时产生由实例化模型
//! 决定；惰性物化的临界区通过提供者暴露的创建互斥锁保护，
//! 锁缺席意味着拥有方容器已自行保证单次创建。

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::aspect::{InstanceRef, InstantiationModel};
use crate::error::{AopError, AopResult};
use weave_core::bean::BeanFactory;
use weave_core::ordering::{Ordered, LOWEST_PRECEDENCE};

/// 切面实例提供者 Trait
pub trait AspectInstanceProvider: Ordered + Send + Sync {
    /// 所属切面名
    fn aspect_name(&self) -> &str;

    /// 实例化模型
    fn model(&self) -> InstantiationModel;

    /// 获取（必要时物化）切面实例
    fn get(&self) -> AopResult<InstanceRef>;

    /// 实例是否已物化
    fn is_materialized(&self) -> bool;

    /// 创建互斥锁
    ///
    /// None 表示拥有方容器已保证单次创建，调用方不应再加锁
    fn creation_mutex(&self) -> Option<Arc<Mutex<()>>>;
}

/// 预物化的单例提供者（急切模型）
pub struct SingletonAspectInstanceProvider {
    aspect_name: String,
    instance: InstanceRef,
    order: Option<i32>,
}

impl SingletonAspectInstanceProvider {
    pub fn new(aspect_name: impl Into<String>, instance: InstanceRef, order: Option<i32>) -> Self {
        Self {
            aspect_name: aspect_name.into(),
            instance,
            order,
        }
    }
}

impl Ordered for SingletonAspectInstanceProvider {
    fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }
}

impl AspectInstanceProvider for SingletonAspectInstanceProvider {
    fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    fn model(&self) -> InstantiationModel {
        InstantiationModel::Singleton
    }

    fn get(&self) -> AopResult<InstanceRef> {
        Ok(self.instance.clone())
    }

    fn is_materialized(&self) -> bool {
        true
    }

    fn creation_mutex(&self) -> Option<Arc<Mutex<()>>> {
        // 实例早已存在，没有临界区
        None
    }
}

/// 以创建函数支撑的提供者
///
/// 每次 get 产出新实例（per-* 族模型），或由惰性装饰器在外层
/// 叠加至多一次语义；自带私有创建锁供装饰器使用
pub struct FunctionAspectInstanceProvider {
    aspect_name: String,
    model: InstantiationModel,
    creator: Arc<dyn Fn() -> InstanceRef + Send + Sync>,
    order: Option<i32>,
    created: AtomicUsize,
    mutex: Arc<Mutex<()>>,
}

impl FunctionAspectInstanceProvider {
    pub fn new<F>(
        aspect_name: impl Into<String>,
        model: InstantiationModel,
        order: Option<i32>,
        creator: F,
    ) -> Self
    where
        F: Fn() -> InstanceRef + Send + Sync + 'static,
    {
        Self {
            aspect_name: aspect_name.into(),
            model,
            creator: Arc::new(creator),
            order,
            created: AtomicUsize::new(0),
            mutex: Arc::new(Mutex::new(())),
        }
    }

    /// 已创建的实例数
    pub fn created_count(&self) -> usize {
        self.created.load(AtomicOrdering::SeqCst)
    }
}

impl Ordered for FunctionAspectInstanceProvider {
    fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }
}

impl AspectInstanceProvider for FunctionAspectInstanceProvider {
    fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    fn model(&self) -> InstantiationModel {
        self.model
    }

    fn get(&self) -> AopResult<InstanceRef> {
        let instance = (self.creator)();
        self.created.fetch_add(1, AtomicOrdering::SeqCst);
        tracing::debug!(
            "Created aspect instance '{}' (model {:?})",
            self.aspect_name,
            self.model
        );
        Ok(instance)
    }

    fn is_materialized(&self) -> bool {
        self.created.load(AtomicOrdering::SeqCst) > 0
    }

    fn creation_mutex(&self) -> Option<Arc<Mutex<()>>> {
        Some(self.mutex.clone())
    }
}

/// 由容器 Bean 支撑的提供者
///
/// 实例的创建与缓存归容器所有；创建互斥锁沿用容器的单例锁
pub struct BeanAspectInstanceProvider {
    aspect_name: String,
    bean_name: String,
    model: InstantiationModel,
    factory: Arc<dyn BeanFactory>,
    order: Option<i32>,
    fetched: AtomicUsize,
}

impl BeanAspectInstanceProvider {
    pub fn new(
        aspect_name: impl Into<String>,
        bean_name: impl Into<String>,
        model: InstantiationModel,
        factory: Arc<dyn BeanFactory>,
        order: Option<i32>,
    ) -> Self {
        Self {
            aspect_name: aspect_name.into(),
            bean_name: bean_name.into(),
            model,
            factory,
            order,
            fetched: AtomicUsize::new(0),
        }
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }
}

impl Ordered for BeanAspectInstanceProvider {
    fn order(&self) -> i32 {
        self.order.unwrap_or(LOWEST_PRECEDENCE)
    }
}

impl AspectInstanceProvider for BeanAspectInstanceProvider {
    fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    fn model(&self) -> InstantiationModel {
        self.model
    }

    fn get(&self) -> AopResult<InstanceRef> {
        let instance = self
            .factory
            .get_bean(&self.bean_name)
            .map_err(|source| AopError::AspectInstance {
                aspect: self.aspect_name.clone(),
                source,
            })?;
        self.fetched.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(instance)
    }

    fn is_materialized(&self) -> bool {
        self.fetched.load(AtomicOrdering::SeqCst) > 0
    }

    fn creation_mutex(&self) -> Option<Arc<Mutex<()>>> {
        self.factory.singleton_mutex(&self.bean_name)
    }
}

/// 惰性单例装饰器
///
/// 为任意提供者叠加"至多物化一次"的语义：
/// 取被包装提供者的创建锁，加锁后双重检查再创建、发布；
/// 锁缺席时直接创建（容器已保证单次创建，属刻意省锁）
pub struct LazySingletonProviderDecorator {
    inner: Arc<dyn AspectInstanceProvider>,
    materialized: RwLock<Option<InstanceRef>>,
}

impl LazySingletonProviderDecorator {
    pub fn new(inner: Arc<dyn AspectInstanceProvider>) -> Self {
        Self {
            inner,
            materialized: RwLock::new(None),
        }
    }
}

impl Ordered for LazySingletonProviderDecorator {
    fn order(&self) -> i32 {
        self.inner.order()
    }
}

impl AspectInstanceProvider for LazySingletonProviderDecorator {
    fn aspect_name(&self) -> &str {
        self.inner.aspect_name()
    }

    fn model(&self) -> InstantiationModel {
        InstantiationModel::LazySingleton
    }

    fn get(&self) -> AopResult<InstanceRef> {
        if let Some(instance) = self.materialized.read().clone() {
            return Ok(instance);
        }

        match self.inner.creation_mutex() {
            Some(mutex) => {
                let _guard = mutex.lock();
                // 双重检查：竞争者可能已完成物化
                if let Some(instance) = self.materialized.read().clone() {
                    return Ok(instance);
                }
                let instance = self.inner.get()?;
                *self.materialized.write() = Some(instance.clone());
                tracing::debug!("Lazily materialized aspect instance '{}'", self.aspect_name());
                Ok(instance)
            }
            None => {
                let instance = self.inner.get()?;
                *self.materialized.write() = Some(instance.clone());
                Ok(instance)
            }
        }
    }

    fn is_materialized(&self) -> bool {
        self.materialized.read().is_some() || self.inner.is_materialized()
    }

    fn creation_mutex(&self) -> Option<Arc<Mutex<()>>> {
        self.inner.creation_mutex()
    }
}
