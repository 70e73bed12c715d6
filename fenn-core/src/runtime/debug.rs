//! 字节码反汇编
//!
//! 按 偏移 / 行号 / 操作码 / 操作数 排版，行号与上一条相同
//! 时打印竖线。

use super::chunk::Chunk;
use super::opcode::OpCode;
use super::value::Value;

/// 反汇编整个字节码块
pub fn disassemble_chunk(chunk: &Chunk, constants: &[Value], name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("================== {name} ==================\n"));
    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, constants, offset, &mut out);
    }
    out.push('\n');
    out
}

/// 反汇编单条指令，返回下一条指令的偏移
pub fn disassemble_instruction(
    chunk: &Chunk,
    constants: &[Value],
    offset: usize,
    out: &mut String,
) -> usize {
    out.push_str(&format!("{offset:04} "));
    if offset > 0 && chunk.line_at(offset) == chunk.line_at(offset - 1) {
        out.push_str("   | ");
    } else {
        out.push_str(&format!("{:4} ", chunk.line_at(offset)));
    }

    let byte = chunk.read(offset);
    let Some(op) = OpCode::from_byte(byte) else {
        out.push_str(&format!("Unknown opcode {byte}\n"));
        return offset + 1;
    };

    match op {
        OpCode::Constant
        | OpCode::DefineLocal
        | OpCode::GetGlobal
        | OpCode::SetGlobal
        | OpCode::DefineGlobal => {
            let index = chunk.read(offset + 1);
            let preview = constants
                .get(index as usize)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string());
            out.push_str(&format!("{:<16} {:4} '{}'\n", op.name(), index, preview));
            offset + 2
        }
        OpCode::GetLocal | OpCode::SetLocal | OpCode::Call => {
            let operand = chunk.read(offset + 1);
            out.push_str(&format!("{:<16} {:4}\n", op.name(), operand));
            offset + 2
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
            let jump = chunk.read_u16(offset + 1) as usize;
            let target = offset + 3 + jump;
            out.push_str(&format!("{:<16} {:4} -> {}\n", op.name(), offset, target));
            offset + 3
        }
        OpCode::Loop => {
            let jump = chunk.read_u16(offset + 1) as usize;
            let target = (offset + 3).saturating_sub(jump);
            out.push_str(&format!("{:<16} {:4} -> {}\n", op.name(), offset, target));
            offset + 3
        }
        _ => {
            out.push_str(&format!("{}\n", op.name()));
            offset + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_simple() {
        let mut chunk = Chunk::new();
        chunk.write_op_u8(OpCode::Constant, 0, 1);
        chunk.write_op(OpCode::Print, 1);
        chunk.write_op(OpCode::Halt, 2);
        let constants = vec![Value::number(7.0)];
        let text = disassemble_chunk(&chunk, &constants, "test");
        assert!(text.contains("CONSTANT"));
        assert!(text.contains("7.000000"));
        assert!(text.contains("PRINT"));
        assert!(text.contains("HALT"));
    }

    #[test]
    fn test_disassemble_jump_target() {
        let mut chunk = Chunk::new();
        let jump = chunk.write_jump(OpCode::JumpIfFalse, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.patch_jump(jump);
        let text = disassemble_chunk(&chunk, &[], "jumps");
        assert!(text.contains("JUMP_IF_FALSE"));
        assert!(text.contains("-> 4"));
    }
}
