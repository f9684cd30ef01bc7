//! 切点（Pointcut）能力定义与表达式系统
//!
//! 切点不是一个简单的布尔函数，而是一个两段式能力：
//! 类过滤器回答"该类型的代理是否可能命中"，方法匹配器回答
//! "具体方法（静态）乃至具体参数（动态）是否命中"。
//! 表达式求值器本身是可插拔的，`PointcutExpression` 是内置实现。

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::joinpoint::{ArgValue, MethodDescriptor, TargetDescriptor};

/// 类过滤器
pub trait ClassFilter: Send + Sync {
    /// 该类型的代理是否可能命中此切点
    fn matches_type(&self, target: &TargetDescriptor) -> bool;
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配：仅凭类型与方法即可判定
    fn matches(&self, method: &MethodDescriptor, target: &TargetDescriptor) -> bool;

    /// 是否为动态匹配器（需在调用时结合实际参数复核）
    ///
    /// 动态匹配器即使静态看似不命中也不会被提前剔除，
    /// 其真值可能在切面实例物化后发生变化。
    fn is_dynamic(&self) -> bool {
        false
    }

    /// 动态匹配：静态匹配通过且匹配器声明为动态时，在调用时复核
    fn matches_args(
        &self,
        method: &MethodDescriptor,
        target: &TargetDescriptor,
        _args: &[ArgValue],
    ) -> bool {
        self.matches(method, target)
    }
}

/// 切点 Trait
pub trait Pointcut: Send + Sync {
    /// 类过滤器
    fn class_filter(&self) -> &dyn ClassFilter;

    /// 方法匹配器
    fn method_matcher(&self) -> &dyn MethodMatcher;

    /// 规范化键，用于等价性比较与诊断输出
    fn key(&self) -> String;
}

/// 恒真切点
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePointcut;

impl ClassFilter for TruePointcut {
    fn matches_type(&self, _target: &TargetDescriptor) -> bool {
        true
    }
}

impl MethodMatcher for TruePointcut {
    fn matches(&self, _method: &MethodDescriptor, _target: &TargetDescriptor) -> bool {
        true
    }
}

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn key(&self) -> String {
        "true".to_string()
    }
}

/// 切点表达式
///
/// 内置的表达式求值器，支持通配符、正则与组合运算
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配特定类型的所有方法
    /// 例如：TypePattern("UserService")
    TypePattern(String),

    /// 匹配特定方法名
    /// 例如：MethodPattern("get_user")
    MethodPattern(String),

    /// 匹配特定类型的特定方法
    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: String,
        method_pattern: String,
    },

    /// 使用正则表达式匹配类型
    TypeRegex(Regex),

    /// 使用正则表达式匹配方法
    MethodRegex(Regex),

    /// 自定义匹配函数
    Custom(Arc<dyn Fn(&MethodDescriptor, &TargetDescriptor) -> bool + Send + Sync>),

    /// 与运算（AND）
    And(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 或运算（OR）
    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 非运算（NOT）
    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 类级匹配
    ///
    /// 仅凭类型名判定；无法由类型单独判定的子表达式按"可能命中"处理
    pub fn matches_type(&self, type_name: &str) -> bool {
        match self {
            PointcutExpression::All => true,

            PointcutExpression::TypePattern(pattern) => Self::pattern_matches(pattern, type_name),

            PointcutExpression::TypeRegex(regex) => regex.is_match(type_name),

            // 方法级与自定义判定推迟到方法匹配阶段
            PointcutExpression::MethodPattern(_)
            | PointcutExpression::MethodRegex(_)
            | PointcutExpression::Custom(_) => true,

            PointcutExpression::Execution { type_pattern, .. } => {
                Self::pattern_matches(type_pattern, type_name)
            }

            PointcutExpression::And(left, right) => {
                left.matches_type(type_name) && right.matches_type(type_name)
            }

            PointcutExpression::Or(left, right) => {
                left.matches_type(type_name) || right.matches_type(type_name)
            }

            PointcutExpression::Not(inner) => {
                if inner.is_type_only() {
                    !inner.matches_type(type_name)
                } else {
                    true
                }
            }
        }
    }

    /// 方法级匹配
    pub fn matches_method(&self, method: &MethodDescriptor, target: &TargetDescriptor) -> bool {
        match self {
            PointcutExpression::All => true,

            PointcutExpression::TypePattern(pattern) => {
                Self::pattern_matches(pattern, &target.type_name)
            }

            PointcutExpression::MethodPattern(pattern) => {
                Self::pattern_matches(pattern, &method.name)
            }

            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => {
                Self::pattern_matches(type_pattern, &target.type_name)
                    && Self::pattern_matches(method_pattern, &method.name)
            }

            PointcutExpression::TypeRegex(regex) => regex.is_match(&target.type_name),

            PointcutExpression::MethodRegex(regex) => regex.is_match(&method.name),

            PointcutExpression::Custom(func) => func(method, target),

            PointcutExpression::And(left, right) => {
                left.matches_method(method, target) && right.matches_method(method, target)
            }

            PointcutExpression::Or(left, right) => {
                left.matches_method(method, target) || right.matches_method(method, target)
            }

            PointcutExpression::Not(inner) => !inner.matches_method(method, target),
        }
    }

    /// 该子表达式是否仅依赖类型即可判定
    fn is_type_only(&self) -> bool {
        match self {
            PointcutExpression::All
            | PointcutExpression::TypePattern(_)
            | PointcutExpression::TypeRegex(_) => true,

            PointcutExpression::MethodPattern(_)
            | PointcutExpression::MethodRegex(_)
            | PointcutExpression::Execution { .. }
            | PointcutExpression::Custom(_) => false,

            PointcutExpression::And(left, right) | PointcutExpression::Or(left, right) => {
                left.is_type_only() && right.is_type_only()
            }

            PointcutExpression::Not(inner) => inner.is_type_only(),
        }
    }

    /// 简单的模式匹配（支持 * 通配符）
    ///
    /// 支持的模式：
    /// - `*` - 匹配任意字符串
    /// - `User*` - 以 User 开头
    /// - `*Service` - 以 Service 结尾
    /// - `*Service*` - 包含 Service
    fn pattern_matches(pattern: &str, target: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        if !pattern.contains('*') {
            return pattern == target;
        }

        let regex_pattern = regex::escape(pattern).replace("\\*", ".*");
        let regex_pattern = format!("^{}$", regex_pattern);

        if let Ok(regex) = Regex::new(&regex_pattern) {
            regex.is_match(target)
        } else {
            false
        }
    }

    /// 创建 execution 表达式
    ///
    /// 例如：execution("* UserService.get_user(..)")
    /// 格式：返回类型 类型名.方法名(参数)
    ///
    /// 简化版本，只支持类型和方法名匹配
    pub fn execution(expression: &str) -> Self {
        let parts: Vec<&str> = expression.split_whitespace().collect();

        if parts.len() < 2 {
            return PointcutExpression::All;
        }

        let method_part = parts[1];
        if let Some((type_pattern, method_pattern)) = method_part.split_once('.') {
            let method_pattern = method_pattern.trim_end_matches("(..)");

            PointcutExpression::Execution {
                type_pattern: type_pattern.to_string(),
                method_pattern: method_pattern.to_string(),
            }
        } else {
            PointcutExpression::MethodPattern(method_part.to_string())
        }
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::TypePattern(p) => write!(f, "TypePattern({})", p),
            PointcutExpression::MethodPattern(p) => write!(f, "MethodPattern({})", p),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => {
                write!(f, "Execution({}.{})", type_pattern, method_pattern)
            }
            PointcutExpression::TypeRegex(r) => write!(f, "TypeRegex({})", r.as_str()),
            PointcutExpression::MethodRegex(r) => write!(f, "MethodRegex({})", r.as_str()),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 以表达式支撑的切点
///
/// 静态切点：匹配结果仅由类型与方法决定
pub struct ExpressionPointcut {
    expression: PointcutExpression,
    raw: String,
}

impl ExpressionPointcut {
    /// 从表达式树创建
    pub fn new(expression: PointcutExpression) -> Self {
        let raw = format!("{:?}", expression);
        Self { expression, raw }
    }

    /// 从 execution 表达式文本解析
    pub fn parse(expression: &str) -> Self {
        Self {
            expression: PointcutExpression::execution(expression),
            raw: expression.to_string(),
        }
    }

    /// 获取底层表达式
    pub fn expression(&self) -> &PointcutExpression {
        &self.expression
    }
}

impl ClassFilter for ExpressionPointcut {
    fn matches_type(&self, target: &TargetDescriptor) -> bool {
        self.expression.matches_type(&target.type_name)
    }
}

impl MethodMatcher for ExpressionPointcut {
    fn matches(&self, method: &MethodDescriptor, target: &TargetDescriptor) -> bool {
        self.expression.matches_method(method, target)
    }
}

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn key(&self) -> String {
        format!("expr({})", self.raw)
    }
}

impl fmt::Debug for ExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpressionPointcut({})", self.raw)
    }
}

/// 两个切点的并
///
/// 类过滤与方法匹配都取"或"；任一侧为动态则整体为动态
pub struct UnionPointcut {
    left: Arc<dyn Pointcut>,
    right: Arc<dyn Pointcut>,
}

impl UnionPointcut {
    pub fn new(left: Arc<dyn Pointcut>, right: Arc<dyn Pointcut>) -> Self {
        Self { left, right }
    }
}

impl ClassFilter for UnionPointcut {
    fn matches_type(&self, target: &TargetDescriptor) -> bool {
        self.left.class_filter().matches_type(target)
            || self.right.class_filter().matches_type(target)
    }
}

impl MethodMatcher for UnionPointcut {
    fn matches(&self, method: &MethodDescriptor, target: &TargetDescriptor) -> bool {
        self.left.method_matcher().matches(method, target)
            || self.right.method_matcher().matches(method, target)
    }

    fn is_dynamic(&self) -> bool {
        self.left.method_matcher().is_dynamic() || self.right.method_matcher().is_dynamic()
    }

    fn matches_args(
        &self,
        method: &MethodDescriptor,
        target: &TargetDescriptor,
        args: &[ArgValue],
    ) -> bool {
        let left = self.left.method_matcher();
        let right = self.right.method_matcher();
        (left.matches(method, target) && left.matches_args(method, target, args))
            || (right.matches(method, target) && right.matches_args(method, target, args))
    }
}

impl Pointcut for UnionPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn key(&self) -> String {
        format!("union({}, {})", self.left.key(), self.right.key())
    }
}

/// 动态切点
///
/// 在静态切点之上叠加一个参数谓词；静态部分通过后，
/// 每次调用都以实际参数复核
pub struct DynamicPointcut {
    base: Arc<dyn Pointcut>,
    predicate: Arc<dyn Fn(&[ArgValue]) -> bool + Send + Sync>,
    label: String,
}

impl DynamicPointcut {
    pub fn new<F>(base: Arc<dyn Pointcut>, label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&[ArgValue]) -> bool + Send + Sync + 'static,
    {
        Self {
            base,
            predicate: Arc::new(predicate),
            label: label.into(),
        }
    }
}

impl ClassFilter for DynamicPointcut {
    fn matches_type(&self, target: &TargetDescriptor) -> bool {
        self.base.class_filter().matches_type(target)
    }
}

impl MethodMatcher for DynamicPointcut {
    fn matches(&self, method: &MethodDescriptor, target: &TargetDescriptor) -> bool {
        self.base.method_matcher().matches(method, target)
    }

    fn is_dynamic(&self) -> bool {
        true
    }

    fn matches_args(
        &self,
        _method: &MethodDescriptor,
        _target: &TargetDescriptor,
        args: &[ArgValue],
    ) -> bool {
        (self.predicate)(args)
    }
}

impl Pointcut for DynamicPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn key(&self) -> String {
        format!("dynamic({}, {})", self.base.key(), self.label)
    }
}
