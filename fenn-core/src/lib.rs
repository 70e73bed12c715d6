//! fenn-core - Fenn 语言核心
//!
//! 帧驱动的交互式程序运行时：程序声明普通函数与 *进程*
//! （各自持栈、逐帧让出的协作式执行体），源码编译为字节码，
//! 运行链表按宿主时钟时间片轮转，宿主在两帧之间通过原生
//! 函数与约定槽位参与渲染。
//!
//! 三层结构：
//! - `kit::lexer`：手写扫描器
//! - `compiler`：单趟 Pratt 解析器，直接发射字节码
//! - `runtime`：值模型、进程虚拟机与协作式调度器

pub mod compiler;
pub mod kit;
pub mod runtime;

pub use compiler::CompileError;
pub use runtime::{
    HostClock, Interpreter, NativeCtx, NativeKind, NativeReg, ProcessStatus, ProcessView,
    RuntimeError, Value,
};

use thiserror::Error;

/// 统一错误类型（CLI 与嵌入宿主用）
#[derive(Debug, Clone, Error)]
pub enum FennError {
    /// 编译失败
    #[error("{0}")]
    Compile(#[from] CompileError),

    /// 运行时错误（报告用；进程级错误不会传播到这里）
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}
