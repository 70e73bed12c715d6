//! 派发循环
//!
//! 在当前调用帧上执行字节码，直到进程让出（Frame）、停机、
//! 从帧 0 返回或死亡。任何运行时错误带当前源码行号报告，
//! 只标记当前进程死亡，不跨进程传播。

use tracing::error;

use super::error::RuntimeError;
use super::interpreter::Interpreter;
use super::object::{KillTarget, NativeCtx, NativeKind, SchedRequests};
use super::opcode::OpCode;
use super::process::{Process, ProcessStatus};
use super::value::Value;

/// 字符串拼接结果的最大字节数
const CONCAT_MAX: usize = 255;

/// 当前指令的源码行号（ip 已越过操作码本身）
fn current_line(proc: &Process) -> u32 {
    proc.frames
        .last()
        .map(|f| f.function.chunk.line_at(f.ip.saturating_sub(1)))
        .unwrap_or(0)
}

/// 读取一个操作数字节并前移 ip
#[inline]
fn read_byte(proc: &mut Process) -> u8 {
    match proc.frames.last_mut() {
        Some(frame) => {
            let byte = frame.function.chunk.read(frame.ip);
            frame.ip += 1;
            byte
        }
        None => 0,
    }
}

/// 读取一个 16 位大端操作数并前移 ip
#[inline]
fn read_u16(proc: &mut Process) -> u16 {
    match proc.frames.last_mut() {
        Some(frame) => {
            let value = frame.function.chunk.read_u16(frame.ip);
            frame.ip += 2;
            value
        }
        None => 0,
    }
}

/// 报告运行时错误并标记进程死亡
fn report(proc: &mut Process, err: RuntimeError) {
    error!(
        target: "fenn::vm",
        line = current_line(proc),
        process = %proc.name,
        %err,
        "runtime error"
    );
    proc.status = ProcessStatus::Dead;
}

/// 弹出两个数字操作数，非数字时报告类型错误
fn pop_numeric_pair(proc: &mut Process, op: &'static str) -> Result<(f64, f64), RuntimeError> {
    let b = proc.peek(0);
    let a = proc.peek(1);
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => {
            proc.pop_n(2);
            Ok((x, y))
        }
        _ => Err(RuntimeError::TypeMismatch {
            op,
            lhs: a.type_name(),
            rhs: b.type_name(),
        }),
    }
}

impl Interpreter {
    /// 执行一个进程直到让出或死亡
    ///
    /// 返回 true 表示进程干净地让出（调度器扣除间隔），
    /// false 表示进程已死亡或出错。
    pub(crate) fn step(&mut self, proc: &mut Process) -> bool {
        if proc.frames.is_empty() {
            report(proc, RuntimeError::Internal("empty call frames".to_string()));
            return false;
        }

        loop {
            let at_end = match proc.frames.last() {
                Some(frame) => frame.ip >= frame.function.chunk.len(),
                None => true,
            };
            if at_end {
                // 跑出代码末尾视作让出
                return true;
            }

            let byte = read_byte(proc);
            let op = match OpCode::from_byte(byte) {
                Some(op) => op,
                None => {
                    report(proc, RuntimeError::InvalidOpcode(byte));
                    return false;
                }
            };

            match op {
                OpCode::Constant => {
                    let index = read_byte(proc) as usize;
                    let value = match self.constants.get(index) {
                        Some(v) => v.clone(),
                        None => {
                            report(
                                proc,
                                RuntimeError::Internal(format!("constant {index} out of range")),
                            );
                            return false;
                        }
                    };
                    if let Err(e) = proc.push(value) {
                        report(proc, e);
                        return false;
                    }
                }
                OpCode::Nil => {
                    if let Err(e) = proc.push(Value::Nil) {
                        report(proc, e);
                        return false;
                    }
                }
                OpCode::True => {
                    if let Err(e) = proc.push(Value::boolean(true)) {
                        report(proc, e);
                        return false;
                    }
                }
                OpCode::False => {
                    if let Err(e) = proc.push(Value::boolean(false)) {
                        report(proc, e);
                        return false;
                    }
                }
                OpCode::Pop => {
                    proc.pop();
                }
                OpCode::Dup => {
                    let value = proc.peek(0);
                    if let Err(e) = proc.push(value) {
                        report(proc, e);
                        return false;
                    }
                }
                OpCode::Halt => {
                    proc.status = ProcessStatus::Dead;
                    return false;
                }
                OpCode::Return => {
                    let result = proc.pop();
                    let frame = match proc.frames.pop() {
                        Some(f) => f,
                        None => {
                            proc.status = ProcessStatus::Dead;
                            return false;
                        }
                    };
                    proc.stack.truncate(frame.slots);
                    if proc.frames.is_empty() {
                        proc.status = ProcessStatus::Dead;
                        return false;
                    }
                    if let Err(e) = proc.push(result) {
                        report(proc, e);
                        return false;
                    }
                }
                OpCode::Print => {
                    let value = proc.pop();
                    self.out(&format!("{value}\n"));
                }
                OpCode::Call => {
                    let arg_count = read_byte(proc);
                    match self.dispatch_call(proc, arg_count) {
                        Ok(CallFlow::Continue) => {}
                        Ok(CallFlow::Yield) => return true,
                        Err(e) => {
                            report(proc, e);
                            return false;
                        }
                    }
                    if proc.status != ProcessStatus::Running {
                        return false;
                    }
                    if self.must_exit {
                        return true;
                    }
                }
                OpCode::Frame => {
                    let value = proc.pop();
                    let pct = match value.as_number() {
                        Some(n) => n,
                        None => {
                            report(
                                proc,
                                RuntimeError::TypeMismatch {
                                    op: "frame",
                                    lhs: value.type_name(),
                                    rhs: "number",
                                },
                            );
                            return false;
                        }
                    };
                    // frame(100) = 60fps, frame(50) = 30fps, frame(200) = 120fps
                    let target_fps = ((pct / 100.0) * 60.0).max(0.1);
                    proc.frame_interval = 1.0 / target_fps;
                    return true;
                }
                OpCode::Add => {
                    if let Err(e) = self.execute_add(proc) {
                        report(proc, e);
                        return false;
                    }
                }
                OpCode::Subtract => match pop_numeric_pair(proc, "sub") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::number(a - b));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::Multiply => match pop_numeric_pair(proc, "mul") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::number(a * b));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::Divide => match pop_numeric_pair(proc, "div") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::number(a / b));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::Modulo => match pop_numeric_pair(proc, "mod") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::number(a % b));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::Power => match pop_numeric_pair(proc, "pow") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::number(a.powf(b)));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::Negate => {
                    let value = proc.peek(0);
                    match value.as_number() {
                        Some(n) => {
                            proc.pop();
                            let _ = proc.push(Value::number(-n));
                        }
                        None => {
                            report(
                                proc,
                                RuntimeError::TypeMismatch {
                                    op: "neg",
                                    lhs: value.type_name(),
                                    rhs: "number",
                                },
                            );
                            return false;
                        }
                    }
                }
                OpCode::Equal => {
                    let b = proc.pop();
                    let a = proc.pop();
                    let _ = proc.push(Value::boolean(a.equals(&b)));
                }
                OpCode::NotEqual => {
                    let b = proc.pop();
                    let a = proc.pop();
                    let _ = proc.push(Value::boolean(!a.equals(&b)));
                }
                OpCode::Greater => match pop_numeric_pair(proc, ">") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::boolean(a > b));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::GreaterEqual => match pop_numeric_pair(proc, ">=") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::boolean(a >= b));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::Less => match pop_numeric_pair(proc, "<") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::boolean(a < b));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::LessEqual => match pop_numeric_pair(proc, "<=") {
                    Ok((a, b)) => {
                        let _ = proc.push(Value::boolean(a <= b));
                    }
                    Err(e) => {
                        report(proc, e);
                        return false;
                    }
                },
                OpCode::Xor => {
                    let b = proc.pop();
                    let a = proc.pop();
                    let _ = proc.push(Value::boolean(a.is_truthy() != b.is_truthy()));
                }
                OpCode::Not => {
                    let value = proc.pop();
                    let _ = proc.push(Value::boolean(value.is_falsey()));
                }
                OpCode::GetLocal => {
                    let slot = read_byte(proc) as usize;
                    let base = proc.frames.last().map(|f| f.slots).unwrap_or(0);
                    let value = match proc.stack.get(base + slot) {
                        Some(v) => v.clone(),
                        None => {
                            report(
                                proc,
                                RuntimeError::Internal(format!("local slot {slot} out of range")),
                            );
                            return false;
                        }
                    };
                    if let Err(e) = proc.push(value) {
                        report(proc, e);
                        return false;
                    }
                }
                OpCode::SetLocal => {
                    let slot = read_byte(proc) as usize;
                    let base = proc.frames.last().map(|f| f.slots).unwrap_or(0);
                    let value = proc.peek(0);
                    match proc.stack.get_mut(base + slot) {
                        Some(cell) => *cell = value,
                        None => {
                            report(
                                proc,
                                RuntimeError::Internal(format!("local slot {slot} out of range")),
                            );
                            return false;
                        }
                    }
                }
                OpCode::DefineLocal => {
                    // 保留语义：按声明计数写入帧窗口
                    let index = read_byte(proc) as usize;
                    if !matches!(self.constants.get(index), Some(Value::Str(_))) {
                        report(
                            proc,
                            RuntimeError::Internal("variable name must be a string".to_string()),
                        );
                        return false;
                    }
                    proc.define_locals += 1;
                    let base = proc.frames.last().map(|f| f.slots).unwrap_or(0);
                    let target = base + proc.define_locals;
                    let value = proc.pop();
                    match proc.stack.get_mut(target) {
                        Some(cell) => *cell = value,
                        None => {
                            report(
                                proc,
                                RuntimeError::Internal(format!("local slot {target} out of range")),
                            );
                            return false;
                        }
                    }
                }
                OpCode::GetGlobal => {
                    let name = match self.read_name_constant(proc) {
                        Ok(name) => name,
                        Err(e) => {
                            report(proc, e);
                            return false;
                        }
                    };
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            if let Err(e) = proc.push(value) {
                                report(proc, e);
                                return false;
                            }
                        }
                        None => {
                            report(proc, RuntimeError::UndefinedGlobal(name));
                            return false;
                        }
                    }
                }
                OpCode::SetGlobal => {
                    let name = match self.read_name_constant(proc) {
                        Ok(name) => name,
                        Err(e) => {
                            report(proc, e);
                            return false;
                        }
                    };
                    // 赋值是表达式，值留在栈上
                    let value = proc.peek(0);
                    self.define(&name, value);
                }
                OpCode::DefineGlobal => {
                    let name = match self.read_name_constant(proc) {
                        Ok(name) => name,
                        Err(e) => {
                            report(proc, e);
                            return false;
                        }
                    };
                    let value = proc.peek(0);
                    self.define(&name, value);
                    proc.pop();
                }
                OpCode::Jump => {
                    let offset = read_u16(proc) as usize;
                    if let Some(frame) = proc.frames.last_mut() {
                        frame.ip += offset;
                    }
                }
                OpCode::JumpIfFalse => {
                    let offset = read_u16(proc) as usize;
                    if proc.peek(0).is_falsey() {
                        if let Some(frame) = proc.frames.last_mut() {
                            frame.ip += offset;
                        }
                    }
                }
                OpCode::JumpIfTrue => {
                    let offset = read_u16(proc) as usize;
                    if proc.peek(0).is_truthy() {
                        if let Some(frame) = proc.frames.last_mut() {
                            frame.ip += offset;
                        }
                    }
                }
                OpCode::Loop => {
                    let offset = read_u16(proc) as usize;
                    if let Some(frame) = proc.frames.last_mut() {
                        frame.ip -= offset;
                    }
                }
                OpCode::Now => {
                    let now = self.elapsed();
                    if let Err(e) = proc.push(Value::number(now)) {
                        report(proc, e);
                        return false;
                    }
                }
                // 保留操作码：编译器从不发射
                OpCode::And | OpCode::Or | OpCode::Break | OpCode::Continue => {
                    report(proc, RuntimeError::InvalidOpcode(byte));
                    return false;
                }
            }
        }
    }

    /// 读取常量池中的名字字符串
    fn read_name_constant(&self, proc: &mut Process) -> Result<String, RuntimeError> {
        let index = read_byte(proc) as usize;
        match self.constants.get(index) {
            Some(Value::Str(s)) => Ok(s.chars.clone()),
            Some(other) => Err(RuntimeError::Internal(format!(
                "variable name must be a string, got {}",
                other.type_name()
            ))),
            None => Err(RuntimeError::Internal(format!(
                "constant {index} out of range"
            ))),
        }
    }

    /// Add：数字相加、字符串拼接、字符串拼数字（整数截断渲染）
    fn execute_add(&mut self, proc: &mut Process) -> Result<(), RuntimeError> {
        let b = proc.peek(0);
        let a = proc.peek(1);
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => {
                proc.pop_n(2);
                proc.push(Value::number(x + y))
            }
            (Value::Str(x), Value::Str(y)) => {
                if x.chars.len() + y.chars.len() > CONCAT_MAX {
                    return Err(RuntimeError::StringTooLong);
                }
                let joined = format!("{}{}", x.chars, y.chars);
                let interned = self.strings.intern(&joined);
                proc.pop_n(2);
                proc.push(Value::string(interned))
            }
            (Value::Str(x), Value::Number(y)) => {
                let joined = format!("{}{}", x.chars, *y as i64);
                if joined.len() > CONCAT_MAX {
                    return Err(RuntimeError::StringTooLong);
                }
                let interned = self.strings.intern(&joined);
                proc.pop_n(2);
                proc.push(Value::string(interned))
            }
            _ => Err(RuntimeError::TypeMismatch {
                op: "add",
                lhs: a.type_name(),
                rhs: b.type_name(),
            }),
        }
    }

    /// Call 派发：函数压帧、原生调用、进程模板孵化
    fn dispatch_call(&mut self, proc: &mut Process, arg_count: u8) -> Result<CallFlow, RuntimeError> {
        let callee = proc.peek(arg_count as usize);
        match &callee {
            Value::Function(function) => {
                proc.call(function.clone(), arg_count)?;
                Ok(CallFlow::Continue)
            }
            Value::Native(native) => {
                let start = proc.stack.len() - arg_count as usize;
                let args: Vec<Value> = proc.stack[start..].to_vec();
                let result = match native.kind {
                    NativeKind::Plain(f) => f(&args),
                    NativeKind::Ctx(f) => self.call_ctx_native(proc, f, &args),
                };
                match result {
                    Ok(value) => {
                        proc.pop_n(arg_count as usize + 1);
                        proc.push(value)?;
                        Ok(CallFlow::Continue)
                    }
                    Err(message) => Err(RuntimeError::NativeFailed {
                        name: native.name.clone(),
                        message,
                    }),
                }
            }
            Value::Process(template) => {
                if arg_count != template.function.arity {
                    return Err(RuntimeError::ArityMismatch {
                        expected: template.function.arity,
                        got: arg_count,
                    });
                }
                // 约定槽位 3 个加参数不得超过子进程栈容量
                if arg_count as usize + 3 > super::process::STACK_MAX {
                    return Err(RuntimeError::StackOverflow);
                }
                let start = proc.stack.len() - arg_count as usize;
                let args: Vec<Value> = proc.stack[start..].to_vec();
                let id = self.spawn_instance(template, &args);
                proc.pop_n(arg_count as usize + 1);
                proc.push(Value::number(id as f64))?;
                // 父进程立即把控制权还给调度器
                Ok(CallFlow::Yield)
            }
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    /// 调用上下文原生函数并应用其调度请求
    fn call_ctx_native(
        &mut self,
        proc: &mut Process,
        f: super::object::NativeCtxFn,
        args: &[Value],
    ) -> Result<Value, String> {
        // 当前进程已从 slab 取出，快照需手工补上
        let mut processes = self.live_snapshot();
        processes.push((proc.id, proc.name.clone()));
        let elapsed = self.elapsed();

        let mut ctx = NativeCtx {
            globals: &mut self.globals,
            strings: &mut self.strings,
            pid: proc.id,
            process_name: &proc.name,
            processes: &processes,
            elapsed,
            print_hook: &mut self.print_hook,
            requests: SchedRequests::default(),
        };
        let result = f(&mut ctx, args);
        let requests = ctx.requests;

        if let Some(code) = requests.exit {
            self.must_exit = true;
            self.exit_value = code;
        }
        for target in requests.kills {
            match target {
                KillTarget::Name(name) => {
                    if proc.name == name {
                        proc.status = ProcessStatus::Killed;
                    } else {
                        self.kill_process_by_name(&name);
                    }
                }
                KillTarget::Id(id) => {
                    if proc.id == id {
                        proc.status = ProcessStatus::Killed;
                    } else {
                        self.kill_process_by_id(id);
                    }
                }
            }
        }
        if let Some(secs) = requests.pause {
            proc.pause_for_seconds(secs);
        }
        if let Some(multiplier) = requests.speed {
            proc.set_frame_speed(multiplier);
        }
        result
    }
}

/// Call 派发的控制流结果
enum CallFlow {
    Continue,
    Yield,
}
