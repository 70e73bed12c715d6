//! 进程实例
//!
//! 调度器眼中的协作式执行单元：私有求值栈、调用帧栈、
//! 状态机与速率控制计时器。编译期符号表在编译器一侧，
//! 实例只携带运行所需的状态。

use std::rc::Rc;

use super::error::RuntimeError;
use super::object::Function;
use super::value::Value;

/// 求值栈容量
pub const STACK_MAX: usize = 256;
/// 调用帧栈容量
pub const FRAMES_MAX: usize = 16;
/// 进程可打印名称最大字节数
pub const PROCESS_NAME_MAX: usize = 15;

/// 约定槽位：x 坐标
pub const SLOT_X: usize = 0;
/// 约定槽位：y 坐标
pub const SLOT_Y: usize = 1;
/// 约定槽位：角度
pub const SLOT_ANGLE: usize = 2;

/// 约定槽位的初始值
const DEFAULT_X: f64 = 360.0;
const DEFAULT_Y: f64 = 2.0;
const DEFAULT_ANGLE: f64 = 30.0;

/// 进程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Sleeping,
    Frozen,
    Waiting,
    Paused,
    Dead,
    Killed,
}

/// 调用帧
///
/// `ip` 为该帧函数字节码内的索引，`slots` 为该帧在进程
/// 求值栈上的窗口基址。
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub function: Rc<Function>,
    pub ip: usize,
    pub slots: usize,
}

/// 进程实例
#[derive(Debug)]
pub struct Process {
    /// 可打印名称，最多 [`PROCESS_NAME_MAX`] 字节
    pub name: String,
    /// 唯一 id
    pub id: u32,
    pub status: ProcessStatus,
    /// 是否为隐式 `_main_` 根进程
    pub root: bool,

    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,

    /// 累计真实秒数；负值表示挂起等待
    pub(crate) frame_timer: f64,
    /// 每次执行的目标间隔秒数
    pub(crate) frame_interval: f64,
    pub(crate) frame_speed_multiplier: f64,

    /// DefineLocal 计数器（保留语义）
    pub(crate) define_locals: usize,

    // 运行链表（slab 索引）
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
}

impl Process {
    /// 创建新进程
    pub fn new(name: &str, id: u32, root: bool) -> Self {
        let mut name = name.to_string();
        let mut cut = PROCESS_NAME_MAX.min(name.len());
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
        Self {
            name,
            id,
            status: ProcessStatus::Running,
            root,
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            frame_timer: 0.0,
            frame_interval: 1.0 / 60.0,
            frame_speed_multiplier: 1.0,
            define_locals: 0,
            prev: None,
            next: None,
        }
    }

    // ==================== 栈操作 ====================

    /// 压栈，超出容量时报告栈溢出
    #[inline]
    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    /// 弹栈
    #[inline]
    pub fn pop(&mut self) -> Value {
        debug_assert!(!self.stack.is_empty(), "pop on empty stack");
        self.stack.pop().unwrap_or(Value::Nil)
    }

    /// 查看距栈顶 distance 处的值（0 为栈顶）
    #[inline]
    pub fn peek(&self, distance: usize) -> Value {
        debug_assert!(distance < self.stack.len(), "peek out of range");
        self.stack
            .get(self.stack.len().wrapping_sub(1 + distance))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    /// 弹出 n 个值
    pub fn pop_n(&mut self, n: usize) {
        let keep = self.stack.len().saturating_sub(n);
        self.stack.truncate(keep);
    }

    /// 清空栈与调用帧
    pub fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
    }

    /// 当前栈深度
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// 读取约定槽位（x/y/angle），越界或非数字返回 None
    pub fn well_known(&self, slot: usize) -> Option<f64> {
        self.stack.get(slot).and_then(Value::as_number)
    }

    /// 为非根实例播种约定槽位：x=360, y=2, angle=30
    pub(crate) fn seed_visual_locals(&mut self) {
        debug_assert!(self.stack.is_empty());
        self.stack.push(Value::number(DEFAULT_X));
        self.stack.push(Value::number(DEFAULT_Y));
        self.stack.push(Value::number(DEFAULT_ANGLE));
    }

    // ==================== 调用 ====================

    /// 压入新调用帧
    ///
    /// 帧的槽位基址为 `stack_top - argc - 1`（被调用值占槽位 0）。
    pub fn call(&mut self, function: Rc<Function>, arg_count: u8) -> Result<(), RuntimeError> {
        if arg_count != function.arity {
            return Err(RuntimeError::ArityMismatch {
                expected: function.arity,
                got: arg_count,
            });
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::FrameOverflow);
        }
        let slots = self.stack.len() - arg_count as usize - 1;
        self.frames.push(CallFrame {
            function,
            ip: 0,
            slots,
        });
        Ok(())
    }

    // ==================== 生命周期与速率 ====================

    /// 进程是否存活
    pub fn is_alive(&self) -> bool {
        self.status != ProcessStatus::Dead && self.status != ProcessStatus::Killed
    }

    /// 设置速率倍数：1.0 为 60 tick/s，2.0 为 120 tick/s
    pub fn set_frame_speed(&mut self, multiplier: f64) {
        self.frame_speed_multiplier = multiplier;
        let adjusted = (60.0 * multiplier).max(0.1);
        self.frame_interval = 1.0 / adjusted;
    }

    /// 挂起至少 seconds 秒（负计时器编码等待）
    pub fn pause_for_seconds(&mut self, seconds: f64) {
        self.frame_timer = -seconds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::chunk::Chunk;

    fn dummy_function(arity: u8) -> Rc<Function> {
        Rc::new(Function {
            name: "test".to_string(),
            arity,
            chunk: Chunk::new(),
        })
    }

    #[test]
    fn test_push_pop() {
        let mut p = Process::new("t", 1, false);
        p.push(Value::number(1.0)).unwrap();
        p.push(Value::number(2.0)).unwrap();
        assert_eq!(p.peek(0).as_number(), Some(2.0));
        assert_eq!(p.peek(1).as_number(), Some(1.0));
        assert_eq!(p.pop().as_number(), Some(2.0));
        assert_eq!(p.stack_depth(), 1);
    }

    #[test]
    fn test_stack_overflow() {
        let mut p = Process::new("t", 1, false);
        for i in 0..STACK_MAX {
            p.push(Value::number(i as f64)).unwrap();
        }
        assert_eq!(p.push(Value::Nil), Err(RuntimeError::StackOverflow));
    }

    #[test]
    fn test_call_arity_mismatch() {
        let mut p = Process::new("t", 1, false);
        p.push(Value::Nil).unwrap(); // callee 槽位
        p.push(Value::number(1.0)).unwrap();
        let err = p.call(dummy_function(2), 1).unwrap_err();
        assert_eq!(err, RuntimeError::ArityMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn test_call_frame_base() {
        let mut p = Process::new("t", 1, false);
        p.push(Value::Nil).unwrap();
        p.push(Value::number(1.0)).unwrap();
        p.push(Value::number(2.0)).unwrap();
        p.call(dummy_function(2), 2).unwrap();
        assert_eq!(p.frames.last().unwrap().slots, 0);
    }

    #[test]
    fn test_frame_overflow() {
        let mut p = Process::new("t", 1, false);
        for _ in 0..FRAMES_MAX {
            p.push(Value::Nil).unwrap();
            p.call(dummy_function(0), 0).unwrap();
        }
        p.push(Value::Nil).unwrap();
        assert_eq!(p.call(dummy_function(0), 0), Err(RuntimeError::FrameOverflow));
    }

    #[test]
    fn test_seed_visual_locals() {
        let mut p = Process::new("t", 1, false);
        p.seed_visual_locals();
        assert_eq!(p.well_known(SLOT_X), Some(360.0));
        assert_eq!(p.well_known(SLOT_Y), Some(2.0));
        assert_eq!(p.well_known(SLOT_ANGLE), Some(30.0));
    }

    #[test]
    fn test_frame_speed() {
        let mut p = Process::new("t", 1, false);
        p.set_frame_speed(2.0);
        assert!((p.frame_interval - 1.0 / 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_pause_encodes_negative_timer() {
        let mut p = Process::new("t", 1, false);
        p.pause_for_seconds(1.5);
        assert_eq!(p.frame_timer, -1.5);
    }

    #[test]
    fn test_name_truncated() {
        let p = Process::new("a_very_long_process_name", 1, false);
        assert_eq!(p.name.len(), PROCESS_NAME_MAX);
    }
}
