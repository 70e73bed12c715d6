//! 运行时值
//!
//! 带类型标签的联合体。数字统一为 64 位浮点，标量按值复制，
//! 堆对象（字符串、函数、原生函数、进程模板）复制句柄共享存储，
//! 字符串在值克隆时从不深拷贝。

use std::rc::Rc;

use super::object::{Function, ObjNative, ObjString, ProcessTemplate};

/// 数字相等判断的误差容限
///
/// 继承自原引擎的行为并在此显式固定：两个数字差值小于该容限
/// 即视为相等。常量池去重同样使用该规则。
pub const NUMBER_EQ_EPSILON: f64 = 0.02;

/// 运行时值
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<ObjString>),
    Function(Rc<Function>),
    Native(Rc<ObjNative>),
    Process(Rc<ProcessTemplate>),
}

impl Value {
    // ==================== 构造方法 ====================

    /// 创建数字
    #[inline]
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    /// 创建布尔值
    #[inline]
    pub fn boolean(b: bool) -> Self {
        Value::Bool(b)
    }

    /// 创建字符串值（共享句柄）
    #[inline]
    pub fn string(s: Rc<ObjString>) -> Self {
        Value::Str(s)
    }

    /// 创建函数值
    #[inline]
    pub fn function(f: Rc<Function>) -> Self {
        Value::Function(f)
    }

    /// 创建原生函数值
    #[inline]
    pub fn native(n: Rc<ObjNative>) -> Self {
        Value::Native(n)
    }

    /// 创建进程模板值
    #[inline]
    pub fn process(p: Rc<ProcessTemplate>) -> Self {
        Value::Process(p)
    }

    // ==================== 类型判断 ====================

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        matches!(self, Value::Native(_))
    }

    #[inline]
    pub fn is_process(&self) -> bool {
        matches!(self, Value::Process(_))
    }

    /// 是否为真值
    ///
    /// nil 和 false 为假；数字 0.0 为假；空字符串为假；其余为真。
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.chars.is_empty(),
            _ => true,
        }
    }

    #[inline]
    pub fn is_falsey(&self) -> bool {
        !self.is_truthy()
    }

    // ==================== 解包方法 ====================

    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// 解包为整数（显式截断）
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number().map(|n| n as i64)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&Rc<ObjString>> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_native(&self) -> Option<&Rc<ObjNative>> {
        match self {
            Value::Native(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_process(&self) -> Option<&Rc<ProcessTemplate>> {
        match self {
            Value::Process(p) => Some(p),
            _ => None,
        }
    }

    // ==================== 相等判断 ====================

    /// 值相等
    ///
    /// 标签不同即不等。数字按 [`NUMBER_EQ_EPSILON`] 容限比较，
    /// 字符串按字节内容，布尔与 nil 按标签，其余按句柄同一性。
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => (a - b).abs() < NUMBER_EQ_EPSILON,
            (Value::Str(a), Value::Str(b)) => a.chars == b.chars,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Process(a), Value::Process(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// 类型名称（错误消息用）
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
            Value::Process(_) => "process",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Number(n) => write!(f, "{n:.6}"),
            Value::Str(s) => write!(f, "{}", s.chars),
            Value::Function(func) => write!(f, "<{}>", func.name),
            Value::Native(n) => write!(f, "<native {}>", n.name),
            Value::Process(p) => write!(f, "<process {}>", p.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::boolean(false).is_truthy());
        assert!(Value::boolean(true).is_truthy());
        assert!(!Value::number(0.0).is_truthy());
        assert!(Value::number(0.5).is_truthy());
        assert!(!Value::string(Rc::new(ObjString::new(""))).is_truthy());
        assert!(Value::string(Rc::new(ObjString::new("x"))).is_truthy());
    }

    #[test]
    fn test_number_equality_epsilon() {
        assert!(Value::number(1.0).equals(&Value::number(1.0)));
        assert!(Value::number(1.0).equals(&Value::number(1.01)));
        assert!(!Value::number(1.0).equals(&Value::number(1.5)));
    }

    #[test]
    fn test_mixed_tags_not_equal() {
        assert!(!Value::number(0.0).equals(&Value::Nil));
        assert!(!Value::boolean(false).equals(&Value::number(0.0)));
        let s = Value::string(Rc::new(ObjString::new("1")));
        assert!(!s.equals(&Value::number(1.0)));
    }

    #[test]
    fn test_string_equality_by_content() {
        let a = Value::string(Rc::new(ObjString::new("abc")));
        let b = Value::string(Rc::new(ObjString::new("abc")));
        let c = Value::string(Rc::new(ObjString::new("abd")));
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_string_clone_shares_storage() {
        let s = Rc::new(ObjString::new("shared"));
        let a = Value::string(s.clone());
        let b = a.clone();
        match (&a, &b) {
            (Value::Str(x), Value::Str(y)) => assert!(Rc::ptr_eq(x, y)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Value::number(7.0)), "7.000000");
        assert_eq!(format!("{}", Value::Nil), "nil");
        assert_eq!(format!("{}", Value::boolean(true)), "true");
        assert_eq!(
            format!("{}", Value::string(Rc::new(ObjString::new("hi")))),
            "hi"
        );
    }
}
