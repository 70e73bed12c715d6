//! 操作码定义
//!
//! 所有指令为 8 位操作码。立即操作数为 8 位索引（局部槽位 / 常量池）
//! 或 16 位大端偏移（跳转类指令）。

/// 操作码
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // ===== 常量与字面量 =====
    Constant = 0, // + u8 常量池索引
    Nil,
    True,
    False,

    // ===== 栈操作 =====
    Pop,
    Dup,

    // ===== 进程控制 =====
    Halt,
    Return,
    Frame, // 弹出速率百分比并让出控制权

    // ===== 输出 =====
    Print,

    // ===== 调用 =====
    Call, // + u8 参数个数

    // ===== 算术运算 =====
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Negate,

    // ===== 比较运算 =====
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // ===== 逻辑运算 =====
    // And / Or 由编译器降级为条件跳转，保留操作码但不派发
    And,
    Or,
    Xor,
    Not,

    // ===== 变量 =====
    GetLocal,     // + u8 槽位
    SetLocal,     // + u8 槽位
    DefineLocal,  // + u8 常量池索引（变量名）
    GetGlobal,    // + u8 常量池索引（变量名）
    SetGlobal,    // + u8 常量池索引（变量名）
    DefineGlobal, // + u8 常量池索引（变量名）

    // ===== 控制流 =====
    Jump,        // + u16 前向偏移（大端）
    JumpIfFalse, // + u16 前向偏移，检查栈顶但不弹出
    JumpIfTrue,  // + u16 前向偏移，检查栈顶但不弹出
    Loop,        // + u16 后向偏移（大端）

    // ===== 时间 =====
    Now,

    // ===== 保留 =====
    // break/continue 在编译期降级为 Jump/Loop，以下操作码保留不发射
    Break,
    Continue,
}

/// 最大有效操作码值，用于字节解码
const OP_MAX: u8 = OpCode::Continue as u8;

impl OpCode {
    /// 获取操作码名称（反汇编用）
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Constant => "CONSTANT",
            OpCode::Nil => "NIL",
            OpCode::True => "TRUE",
            OpCode::False => "FALSE",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::Halt => "HALT",
            OpCode::Return => "RETURN",
            OpCode::Frame => "FRAME",
            OpCode::Print => "PRINT",
            OpCode::Call => "CALL",
            OpCode::Add => "ADD",
            OpCode::Subtract => "SUBTRACT",
            OpCode::Multiply => "MULTIPLY",
            OpCode::Divide => "DIVIDE",
            OpCode::Modulo => "MODULO",
            OpCode::Power => "POWER",
            OpCode::Negate => "NEGATE",
            OpCode::Equal => "EQUAL",
            OpCode::NotEqual => "NOT_EQUAL",
            OpCode::Greater => "GREATER",
            OpCode::GreaterEqual => "GREATER_EQUAL",
            OpCode::Less => "LESS",
            OpCode::LessEqual => "LESS_EQUAL",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Xor => "XOR",
            OpCode::Not => "NOT",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::DefineLocal => "DEFINE_LOCAL",
            OpCode::GetGlobal => "GET_GLOBAL",
            OpCode::SetGlobal => "SET_GLOBAL",
            OpCode::DefineGlobal => "DEFINE_GLOBAL",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::JumpIfTrue => "JUMP_IF_TRUE",
            OpCode::Loop => "LOOP",
            OpCode::Now => "NOW",
            OpCode::Break => "BREAK",
            OpCode::Continue => "CONTINUE",
        }
    }

    /// 操作数大小 (bytes)
    pub fn operand_size(&self) -> usize {
        match self {
            OpCode::Constant
            | OpCode::Call
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::DefineLocal
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::DefineGlobal => 1,

            OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue | OpCode::Loop => 2,

            _ => 0,
        }
    }

    /// 从字节解码，非法字节返回 None
    #[inline]
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        if byte <= OP_MAX {
            // SAFETY: 操作码从 0 起连续编号，byte 在 [0, OP_MAX] 内必为有效判别值
            Some(unsafe { std::mem::transmute::<u8, OpCode>(byte) })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_name() {
        assert_eq!(OpCode::Add.name(), "ADD");
        assert_eq!(OpCode::Constant.name(), "CONSTANT");
        assert_eq!(OpCode::JumpIfFalse.name(), "JUMP_IF_FALSE");
    }

    #[test]
    fn test_operand_size() {
        assert_eq!(OpCode::Add.operand_size(), 0);
        assert_eq!(OpCode::Constant.operand_size(), 1);
        assert_eq!(OpCode::Jump.operand_size(), 2);
        assert_eq!(OpCode::Loop.operand_size(), 2);
    }

    #[test]
    fn test_from_byte_roundtrip() {
        assert_eq!(OpCode::from_byte(OpCode::Halt as u8), Some(OpCode::Halt));
        assert_eq!(OpCode::from_byte(OpCode::Continue as u8), Some(OpCode::Continue));
        assert_eq!(OpCode::from_byte(OP_MAX + 1), None);
        assert_eq!(OpCode::from_byte(0xFF), None);
    }
}
