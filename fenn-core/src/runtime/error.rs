//! 运行时错误类型

use thiserror::Error;

/// 运行时错误
///
/// 任一错误只杀死当前进程，不跨进程传播。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Expected {expected} arguments but got {got}")]
    ArityMismatch { expected: u8, got: u8 },

    #[error("Operation '{op}' not supported for {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Call stack overflow")]
    FrameOverflow,

    #[error("Undefined variable '{0}'")]
    UndefinedGlobal(String),

    #[error("String too long")]
    StringTooLong,

    #[error("Invalid opcode {0}")]
    InvalidOpcode(u8),

    #[error("Value of type {0} is not callable")]
    NotCallable(&'static str),

    #[error("Native '{name}' failed: {message}")]
    NativeFailed { name: String, message: String },

    #[error("{0}")]
    Internal(String),
}

/// 带源码行号的运行时错误报告
#[derive(Debug, Clone, Error, PartialEq)]
#[error("[line {line}] in {process}: {error}")]
pub struct RuntimeReport {
    pub line: u32,
    pub process: String,
    pub error: RuntimeError,
}
