//! 测试辅助工具
//!
//! 编译源码、接管打印输出、用固定步长时钟驱动调度器。

use std::cell::RefCell;
use std::rc::Rc;

use fenn_core::{CompileError, HostClock, Interpreter};

/// 固定步长测试时钟：每帧 dt 相同，最多走 frames 帧
pub struct FixedClock {
    pub dt: f64,
    pub frames: u64,
}

impl FixedClock {
    /// dt = 1/60 的标准时钟
    pub fn standard(frames: u64) -> Self {
        Self {
            dt: 1.0 / 60.0,
            frames,
        }
    }
}

impl HostClock for FixedClock {
    fn tick(&mut self) -> f64 {
        self.dt
    }

    fn should_continue(&mut self) -> bool {
        if self.frames == 0 {
            return false;
        }
        self.frames -= 1;
        true
    }
}

/// 一次编译会话：解释器加捕获到的输出
#[derive(Debug)]
pub struct Session {
    pub interp: Interpreter,
    buffer: Rc<RefCell<String>>,
}

impl Session {
    /// 编译源码并安装输出捕获钩子
    pub fn compile(source: &str) -> Result<Session, CompileError> {
        let mut interp = Interpreter::new();
        let buffer = Rc::new(RefCell::new(String::new()));
        let sink = buffer.clone();
        interp.set_print_hook(Box::new(move |text| sink.borrow_mut().push_str(text)));
        interp.compile(source)?;
        Ok(Session { interp, buffer })
    }

    /// 以标准时钟驱动 frames 帧，返回退出码
    pub fn run_frames(&mut self, frames: u64) -> i32 {
        let mut clock = FixedClock::standard(frames);
        self.interp.run(&mut clock)
    }

    /// 捕获到的全部输出
    pub fn output(&self) -> String {
        self.buffer.borrow().clone()
    }

    /// 输出按行切分
    pub fn lines(&self) -> Vec<String> {
        self.output().lines().map(str::to_string).collect()
    }
}

/// 编译并驱动到程序自然结束（最多 600 帧）
pub fn run_source(source: &str) -> Result<Session, CompileError> {
    let mut session = Session::compile(source)?;
    session.run_frames(600);
    Ok(session)
}
