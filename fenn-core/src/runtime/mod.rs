//! 运行时：值模型、字节码、进程、派发循环与调度器

pub mod chunk;
pub mod debug;
pub mod error;
mod execution;
pub mod interpreter;
pub mod object;
pub mod opcode;
pub mod process;
pub mod stdlib;
pub mod value;

pub use chunk::Chunk;
pub use error::{RuntimeError, RuntimeReport};
pub use interpreter::{HostClock, Interpreter, ProcessView};
pub use object::{
    Function, KillTarget, NativeCtx, NativeCtxFn, NativeFn, NativeKind, NativeReg, ObjNative,
    ObjString, ProcessTemplate, StringPool,
};
pub use opcode::OpCode;
pub use process::{CallFrame, Process, ProcessStatus, FRAMES_MAX, STACK_MAX};
pub use value::{Value, NUMBER_EQ_EPSILON};
