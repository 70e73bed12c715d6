//! 运行时对象定义
//!
//! 堆对象统一由解释器持有，生命周期到解释器销毁为止。

use std::collections::HashMap;
use std::rc::Rc;

use super::chunk::Chunk;
use super::value::Value;

/// 字符串对象
#[derive(Debug, PartialEq, Eq)]
pub struct ObjString {
    /// 字符串内容
    pub chars: String,
}

impl ObjString {
    pub fn new(chars: impl Into<String>) -> Self {
        Self {
            chars: chars.into(),
        }
    }
}

/// 驻留字符串池
///
/// 字面量共享存储；运行期拼接出的字符串同样驻留，
/// 由解释器持有直到程序结束。
#[derive(Debug, Default)]
pub struct StringPool {
    entries: HashMap<String, Rc<ObjString>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 驻留字符串，返回共享句柄
    pub fn intern(&mut self, s: &str) -> Rc<ObjString> {
        if let Some(existing) = self.entries.get(s) {
            return existing.clone();
        }
        let obj = Rc::new(ObjString::new(s));
        self.entries.insert(s.to_string(), obj.clone());
        obj
    }

    /// 池中条目数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 函数对象
///
/// 编译结束后不可变：参数个数、字节码块与名称。
/// 编译期的循环上下文栈属于编译器，不在此处。
#[derive(Debug)]
pub struct Function {
    /// 函数名（调试与错误消息用）
    pub name: String,
    /// 参数数量
    pub arity: u8,
    /// 函数的字节码
    pub chunk: Chunk,
}

/// 进程模板
///
/// `process` 声明的产物：名称加函数体。模板没有栈、没有
/// 指令指针、没有计时状态，每次调用克隆出新的进程实例。
#[derive(Debug)]
pub struct ProcessTemplate {
    pub name: String,
    pub function: Rc<Function>,
}

/// 原生函数指针类型
///
/// 宿主回调接收参数切片，返回单个值（无返回语义用 Nil）。
pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

/// 上下文原生函数指针类型
///
/// 额外获得解释器上下文：全局表、字符串池、当前进程身份
/// 以及调度请求接口。内建的调度动词由此实现。
pub type NativeCtxFn = fn(&mut NativeCtx, &[Value]) -> Result<Value, String>;

/// 原生函数的两种形态
#[derive(Clone, Copy)]
pub enum NativeKind {
    Plain(NativeFn),
    Ctx(NativeCtxFn),
}

impl std::fmt::Debug for NativeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeKind::Plain(_) => write!(f, "Plain"),
            NativeKind::Ctx(_) => write!(f, "Ctx"),
        }
    }
}

/// 原生函数对象
#[derive(Debug)]
pub struct ObjNative {
    pub name: String,
    pub kind: NativeKind,
}

impl ObjNative {
    pub fn new(name: impl Into<String>, kind: NativeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// 批量注册表项
///
/// C 风格的哨兵终止表在 Rust 里就是切片本身。
pub struct NativeReg {
    pub name: &'static str,
    pub kind: NativeKind,
}

/// 杀进程目标：按名或按 id
#[derive(Debug, Clone, PartialEq)]
pub enum KillTarget {
    Name(String),
    Id(u32),
}

/// 原生函数发出的调度请求
///
/// 请求由派发循环在原生调用返回后统一执行，
/// 原生函数不得递归驱动调度器。
#[derive(Debug, Default)]
pub struct SchedRequests {
    pub exit: Option<i32>,
    pub kills: Vec<KillTarget>,
    pub pause: Option<f64>,
    pub speed: Option<f64>,
}

/// 上下文原生函数可见的解释器状态
pub struct NativeCtx<'a> {
    /// 全局变量表
    pub globals: &'a mut HashMap<String, Value>,
    /// 字符串池
    pub strings: &'a mut StringPool,
    /// 当前进程 id
    pub pid: u32,
    /// 当前进程名
    pub process_name: &'a str,
    /// 存活进程快照 (id, name)，含排队中的新实例
    pub processes: &'a [(u32, String)],
    /// 解释器启动以来的秒数
    pub elapsed: f64,
    /// 输出接管钩子（缺省直接写 stdout）
    pub(crate) print_hook: &'a mut Option<Box<dyn FnMut(&str)>>,
    pub(crate) requests: SchedRequests,
}

impl NativeCtx<'_> {
    /// 经由宿主输出钩子打印文本
    pub fn emit(&mut self, text: &str) {
        match self.print_hook {
            Some(hook) => hook(text),
            None => print!("{text}"),
        }
    }

    /// 请求调度器退出
    pub fn request_exit(&mut self, code: i32) {
        self.requests.exit = Some(code);
    }

    /// 请求杀死进程，返回目标当前是否存在
    pub fn request_kill(&mut self, target: KillTarget) -> bool {
        let hit = match &target {
            KillTarget::Name(name) => self.processes.iter().any(|(_, n)| n == name),
            KillTarget::Id(id) => self.processes.iter().any(|(i, _)| i == id),
        };
        self.requests.kills.push(target);
        hit
    }

    /// 请求暂停当前进程至少 secs 秒
    pub fn request_pause(&mut self, secs: f64) {
        self.requests.pause = Some(secs);
    }

    /// 请求设置当前进程速率倍数
    pub fn request_speed(&mut self, multiplier: f64) {
        self.requests.speed = Some(multiplier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares() {
        let mut pool = StringPool::new();
        let a = pool.intern("hello");
        let b = pool.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_intern_distinct() {
        let mut pool = StringPool::new();
        let a = pool.intern("a");
        let b = pool.intern("b");
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }
}
