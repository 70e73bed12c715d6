//! 核心原生函数库
//!
//! 解释器构造时注册。绘图与输入类原生函数属于宿主，
//! 不在此处。数学函数对非法参数返回 nil。

use super::interpreter::Interpreter;
use super::object::{KillTarget, NativeCtx, NativeKind, NativeReg};
use super::value::Value;

/// 核心原生函数注册表
pub const CORE_NATIVES: &[NativeReg] = &[
    // ===== 数学 =====
    NativeReg { name: "abs", kind: NativeKind::Plain(abs_native) },
    NativeReg { name: "sqrt", kind: NativeKind::Plain(sqrt_native) },
    NativeReg { name: "floor", kind: NativeKind::Plain(floor_native) },
    NativeReg { name: "ceil", kind: NativeKind::Plain(ceil_native) },
    NativeReg { name: "sin", kind: NativeKind::Plain(sin_native) },
    NativeReg { name: "cos", kind: NativeKind::Plain(cos_native) },
    NativeReg { name: "tan", kind: NativeKind::Plain(tan_native) },
    NativeReg { name: "min", kind: NativeKind::Plain(min_native) },
    NativeReg { name: "max", kind: NativeKind::Plain(max_native) },
    NativeReg { name: "rand", kind: NativeKind::Plain(rand_native) },
    NativeReg { name: "random", kind: NativeKind::Plain(random_native) },
    // ===== 输出与时间 =====
    NativeReg { name: "write", kind: NativeKind::Ctx(write_native) },
    NativeReg { name: "writeln", kind: NativeKind::Ctx(writeln_native) },
    NativeReg { name: "clock", kind: NativeKind::Ctx(clock_native) },
    // ===== 调度动词 =====
    NativeReg { name: "exit", kind: NativeKind::Ctx(exit_native) },
    NativeReg { name: "kill", kind: NativeKind::Ctx(kill_native) },
    NativeReg { name: "alive_count", kind: NativeKind::Ctx(alive_count_native) },
    NativeReg { name: "pid", kind: NativeKind::Ctx(pid_native) },
    NativeReg { name: "set_speed", kind: NativeKind::Ctx(set_speed_native) },
    NativeReg { name: "pause", kind: NativeKind::Ctx(pause_native) },
];

/// 注册核心原生函数
pub fn register_core(interp: &mut Interpreter) {
    interp.define_natives(CORE_NATIVES);
}

// ===== 数学函数 =====

fn unary_math(args: &[Value], f: fn(f64) -> f64) -> Result<Value, String> {
    match args {
        [v] => Ok(v.as_number().map(f).map(Value::number).unwrap_or(Value::Nil)),
        _ => Ok(Value::Nil),
    }
}

fn abs_native(args: &[Value]) -> Result<Value, String> {
    unary_math(args, f64::abs)
}

fn sqrt_native(args: &[Value]) -> Result<Value, String> {
    unary_math(args, f64::sqrt)
}

fn floor_native(args: &[Value]) -> Result<Value, String> {
    unary_math(args, f64::floor)
}

fn ceil_native(args: &[Value]) -> Result<Value, String> {
    unary_math(args, f64::ceil)
}

fn sin_native(args: &[Value]) -> Result<Value, String> {
    unary_math(args, f64::sin)
}

fn cos_native(args: &[Value]) -> Result<Value, String> {
    unary_math(args, f64::cos)
}

fn tan_native(args: &[Value]) -> Result<Value, String> {
    unary_math(args, f64::tan)
}

fn binary_math(args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, String> {
    match args {
        [a, b] => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::number(f(x, y))),
            _ => Ok(Value::Nil),
        },
        _ => Ok(Value::Nil),
    }
}

fn min_native(args: &[Value]) -> Result<Value, String> {
    binary_math(args, f64::min)
}

fn max_native(args: &[Value]) -> Result<Value, String> {
    binary_math(args, f64::max)
}

/// [0, 1) 均匀分布
fn rand_native(_args: &[Value]) -> Result<Value, String> {
    Ok(Value::number(rand::random::<f64>()))
}

/// [min, max] 均匀分布，参数顺序颠倒时交换
fn random_native(args: &[Value]) -> Result<Value, String> {
    let (a, b) = match args {
        [a, b] => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ok(Value::Nil),
        },
        _ => return Ok(Value::Nil),
    };
    let (lo, hi) = if a > b { (b, a) } else { (a, b) };
    let r = rand::random::<f64>();
    Ok(Value::number(lo + r * (hi - lo)))
}

// ===== 输出与时间 =====

fn write_native(ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    for value in args {
        ctx.emit(&value.to_string());
    }
    Ok(Value::Nil)
}

fn writeln_native(ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    for value in args {
        ctx.emit(&value.to_string());
    }
    ctx.emit("\n");
    Ok(Value::Nil)
}

fn clock_native(ctx: &mut NativeCtx, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::number(ctx.elapsed))
}

// ===== 调度动词 =====

fn exit_native(ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    let code = match args {
        [] => 0,
        [v] => v
            .as_integer()
            .ok_or_else(|| "exit() expects a numeric code".to_string())? as i32,
        _ => return Err(format!("exit() takes at most 1 argument ({} given)", args.len())),
    };
    ctx.request_exit(code);
    Ok(Value::Nil)
}

/// 按名或按 id 杀进程，命中返回 true
fn kill_native(ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    let target = match args {
        [Value::Str(name)] => KillTarget::Name(name.chars.clone()),
        [v] if v.is_number() => KillTarget::Id(v.as_integer().unwrap_or(0) as u32),
        _ => return Err("kill() expects a process name or id".to_string()),
    };
    let hit = ctx.request_kill(target);
    Ok(Value::boolean(hit))
}

fn alive_count_native(ctx: &mut NativeCtx, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::number(ctx.processes.len() as f64))
}

fn pid_native(ctx: &mut NativeCtx, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::number(ctx.pid as f64))
}

fn set_speed_native(ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match args {
        [v] => {
            let multiplier = v
                .as_number()
                .ok_or_else(|| "set_speed() expects a number".to_string())?;
            ctx.request_speed(multiplier);
            Ok(Value::Nil)
        }
        _ => Err(format!("set_speed() takes exactly 1 argument ({} given)", args.len())),
    }
}

fn pause_native(ctx: &mut NativeCtx, args: &[Value]) -> Result<Value, String> {
    match args {
        [v] => {
            let seconds = v
                .as_number()
                .ok_or_else(|| "pause() expects seconds".to_string())?;
            ctx.request_pause(seconds);
            Ok(Value::Nil)
        }
        _ => Err(format!("pause() takes exactly 1 argument ({} given)", args.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unary_math() {
        let v = abs_native(&[Value::number(-3.0)]).unwrap();
        assert_eq!(v.as_number(), Some(3.0));
        // 非法参数返回 nil
        assert!(abs_native(&[Value::Nil]).unwrap().is_nil());
        assert!(abs_native(&[]).unwrap().is_nil());
    }

    #[test]
    fn test_random_range() {
        for _ in 0..32 {
            let v = random_native(&[Value::number(5.0), Value::number(1.0)])
                .unwrap()
                .as_number()
                .unwrap();
            assert!((1.0..=5.0).contains(&v));
        }
    }

    #[test]
    fn test_rand_unit_interval() {
        for _ in 0..32 {
            let v = rand_native(&[]).unwrap().as_number().unwrap();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
