//! 对象生命周期容器的边界接口
//!
//! 拦截引擎不拥有容器，只消费容器的三项能力：
//! 按名称取得对象、探测某个对象是否正在创建中（用于跳过自引用环）、
//! 以及单例的创建互斥锁。`StaticBeanRegistry` 是一个满足该边界的
//! 参考实现，供实例提供者与测试使用。

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{CoreError, CoreResult};
use crate::utils::dependency::CreationTracker;

/// 容器托管对象的统一形态
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// 对象创建函数
pub type BeanSupplier = Arc<dyn Fn() -> CoreResult<BeanInstance> + Send + Sync>;

/// Bean 的作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeanScope {
    /// 单例模式 - 容器中只有一个实例
    #[default]
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,
}

/// 容器边界 Trait
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean
    fn get_bean(&self, name: &str) -> CoreResult<BeanInstance>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;

    /// 检查指定名称的 Bean 是否正在创建中
    fn is_bean_in_creation(&self, name: &str) -> bool;

    /// 返回容器为该单例维护的创建互斥锁
    ///
    /// 返回 None 表示容器自身已保证单次创建，调用方无须再加锁
    fn singleton_mutex(&self, name: &str) -> Option<Arc<Mutex<()>>>;
}

struct BeanEntry {
    supplier: BeanSupplier,
    scope: BeanScope,
    mutex: Arc<Mutex<()>>,
}

/// 容器边界的参考实现
///
/// 以注册时提供的创建函数支撑 Bean，单例实例在首次获取后缓存。
pub struct StaticBeanRegistry {
    entries: RwLock<HashMap<String, BeanEntry>>,

    /// 单例 Bean 缓存
    singletons: RwLock<HashMap<String, BeanInstance>>,

    /// 循环创建检测
    creation_tracker: CreationTracker,
}

impl StaticBeanRegistry {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            singletons: RwLock::new(HashMap::new()),
            creation_tracker: CreationTracker::new(),
        }
    }

    /// 注册一个由创建函数支撑的 Bean
    pub fn register<F>(&self, name: &str, scope: BeanScope, supplier: F)
    where
        F: Fn() -> CoreResult<BeanInstance> + Send + Sync + 'static,
    {
        tracing::debug!("Registering bean '{}' with scope {:?}", name, scope);
        self.entries.write().insert(
            name.to_string(),
            BeanEntry {
                supplier: Arc::new(supplier),
                scope,
                mutex: Arc::new(Mutex::new(())),
            },
        );
    }

    /// 注册一个已构建完成的单例实例
    pub fn register_singleton_instance(&self, name: &str, instance: BeanInstance) {
        tracing::debug!("Registering pre-built singleton bean '{}'", name);
        let cached = instance.clone();
        self.register(name, BeanScope::Singleton, move || Ok(cached.clone()));
        self.singletons.write().insert(name.to_string(), instance);
    }

    fn create_bean(&self, name: &str, supplier: &BeanSupplier) -> CoreResult<BeanInstance> {
        if !self.creation_tracker.start_creating(name) {
            let chain = self.creation_tracker.current_creating().join(" -> ");
            return Err(CoreError::CircularCreation(format!("{} -> {}", chain, name)));
        }

        // RAII 守卫：创建无论成败都要清理标记
        struct CreationGuard<'a> {
            tracker: &'a CreationTracker,
            name: &'a str,
        }

        impl Drop for CreationGuard<'_> {
            fn drop(&mut self) {
                self.tracker.finish_creating(self.name);
            }
        }

        let _guard = CreationGuard {
            tracker: &self.creation_tracker,
            name,
        };

        supplier().map_err(|e| match e {
            CoreError::CircularCreation(_) => e,
            other => CoreError::BeanCreationFailed(format!("{}: {}", name, other)),
        })
    }
}

impl Default for StaticBeanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanFactory for StaticBeanRegistry {
    fn get_bean(&self, name: &str) -> CoreResult<BeanInstance> {
        tracing::trace!("Requesting bean: '{}'", name);

        let (supplier, scope) = {
            let entries = self.entries.read();
            let entry = entries
                .get(name)
                .ok_or_else(|| CoreError::BeanNotFound(name.to_string()))?;
            (entry.supplier.clone(), entry.scope)
        };

        match scope {
            BeanScope::Singleton => {
                {
                    let singletons = self.singletons.read();
                    if let Some(bean) = singletons.get(name) {
                        tracing::trace!("Returning cached instance of singleton bean '{}'", name);
                        return Ok(Arc::clone(bean));
                    }
                }

                tracing::debug!("Creating shared instance of singleton bean '{}'", name);
                let bean = self.create_bean(name, &supplier)?;

                self.singletons
                    .write()
                    .insert(name.to_string(), Arc::clone(&bean));
                Ok(bean)
            }
            BeanScope::Prototype => {
                tracing::debug!("Creating new instance of prototype bean '{}'", name);
                self.create_bean(name, &supplier)
            }
        }
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    fn is_bean_in_creation(&self, name: &str) -> bool {
        self.creation_tracker.is_creating(name)
    }

    fn singleton_mutex(&self, name: &str) -> Option<Arc<Mutex<()>>> {
        let entries = self.entries.read();
        entries
            .get(name)
            .filter(|entry| entry.scope == BeanScope::Singleton)
            .map(|entry| entry.mutex.clone())
    }
}
