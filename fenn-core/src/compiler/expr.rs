//! 表达式编译
//!
//! 规则表指向的前缀 / 中缀函数。每个函数进入时算符 token
//! 已在 previous 中。

use super::{get_rule, Parser, Precedence, ARGS_MAX};
use crate::kit::lexer::TokenKind;
use crate::runtime::opcode::OpCode;
use crate::runtime::value::Value;

/// `( expr )`
pub(crate) fn grouping(p: &mut Parser<'_, '_>, _can_assign: bool) {
    p.expression();
    p.consume(TokenKind::RightParen, "Expect ')' after expression");
}

/// 数字字面量
pub(crate) fn number(p: &mut Parser<'_, '_>, _can_assign: bool) {
    match p.previous.lexeme.parse::<f64>() {
        Ok(value) => p.emit_constant(Value::number(value)),
        Err(_) => p.error("Invalid number literal"),
    }
}

/// 字符串字面量（驻留共享）
pub(crate) fn string(p: &mut Parser<'_, '_>, _can_assign: bool) {
    let interned = p.interp.intern(&p.previous.lexeme);
    p.emit_constant(Value::string(interned));
}

/// nil / true / false / now
pub(crate) fn literal(p: &mut Parser<'_, '_>, _can_assign: bool) {
    match p.previous.kind {
        TokenKind::Nil => p.emit_op(OpCode::Nil),
        TokenKind::True => p.emit_op(OpCode::True),
        TokenKind::False => p.emit_op(OpCode::False),
        TokenKind::Now => p.emit_op(OpCode::Now),
        _ => {}
    }
}

/// 标识符：局部槽位或全局名，支持赋值与复合赋值
pub(crate) fn variable(p: &mut Parser<'_, '_>, can_assign: bool) {
    let name = p.previous.lexeme.clone();

    // 先查局部（从新到旧），未命中按全局处理
    let (get_op, set_op, arg) = match p.resolve_local(&name) {
        Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
        None => {
            let index = p.identifier_constant(&name);
            (OpCode::GetGlobal, OpCode::SetGlobal, index)
        }
    };

    if can_assign && p.match_token(TokenKind::Equal) {
        p.expression();
        p.emit_op_u8(set_op, arg);
        return;
    }

    // 复合赋值按 x op= e ≡ x = x op e 展开
    let compound = if can_assign {
        match p.current.kind {
            TokenKind::PlusEqual => Some(OpCode::Add),
            TokenKind::MinusEqual => Some(OpCode::Subtract),
            TokenKind::StarEqual => Some(OpCode::Multiply),
            TokenKind::SlashEqual => Some(OpCode::Divide),
            _ => None,
        }
    } else {
        None
    };
    if let Some(op) = compound {
        p.advance();
        p.emit_op_u8(get_op, arg);
        p.expression();
        p.emit_op(op);
        p.emit_op_u8(set_op, arg);
        return;
    }

    if p.current.kind == TokenKind::PlusPlus || p.current.kind == TokenKind::MinusMinus {
        // 词法保留，语义未定义
        p.error_at_current("'++' and '--' are not supported");
        return;
    }

    p.emit_op_u8(get_op, arg);
}

/// 一元算符：- ! not
pub(crate) fn unary(p: &mut Parser<'_, '_>, _can_assign: bool) {
    let operator = p.previous.kind;
    p.parse_precedence(Precedence::Unary);
    match operator {
        TokenKind::Minus => p.emit_op(OpCode::Negate),
        TokenKind::Bang | TokenKind::Not => p.emit_op(OpCode::Not),
        _ => {}
    }
}

/// 二元算符（左结合：右操作数按高一级优先级解析）
pub(crate) fn binary(p: &mut Parser<'_, '_>, _can_assign: bool) {
    let operator = p.previous.kind;
    let precedence = get_rule(operator).precedence;
    p.parse_precedence(precedence.higher());

    match operator {
        TokenKind::Plus => p.emit_op(OpCode::Add),
        TokenKind::Minus => p.emit_op(OpCode::Subtract),
        TokenKind::Star => p.emit_op(OpCode::Multiply),
        TokenKind::Slash => p.emit_op(OpCode::Divide),
        TokenKind::Percent => p.emit_op(OpCode::Modulo),
        TokenKind::Caret => p.emit_op(OpCode::Power),
        TokenKind::EqualEqual => p.emit_op(OpCode::Equal),
        TokenKind::BangEqual => p.emit_op(OpCode::NotEqual),
        TokenKind::Greater => p.emit_op(OpCode::Greater),
        TokenKind::GreaterEqual => p.emit_op(OpCode::GreaterEqual),
        TokenKind::Less => p.emit_op(OpCode::Less),
        TokenKind::LessEqual => p.emit_op(OpCode::LessEqual),
        _ => {}
    }
}

/// and：左值为假短路
pub(crate) fn and_(p: &mut Parser<'_, '_>, _can_assign: bool) {
    let end_jump = p.emit_jump(OpCode::JumpIfFalse);
    p.emit_op(OpCode::Pop);
    p.parse_precedence(Precedence::And);
    p.patch_jump(end_jump);
}

/// or：左值为真短路
pub(crate) fn or_(p: &mut Parser<'_, '_>, _can_assign: bool) {
    let else_jump = p.emit_jump(OpCode::JumpIfFalse);
    let end_jump = p.emit_jump(OpCode::Jump);
    p.patch_jump(else_jump);
    p.emit_op(OpCode::Pop);
    p.parse_precedence(Precedence::Or);
    p.patch_jump(end_jump);
}

/// xor：两侧都求值
pub(crate) fn xor_(p: &mut Parser<'_, '_>, _can_assign: bool) {
    p.parse_precedence(Precedence::Xor);
    p.emit_op(OpCode::Xor);
}

/// 调用：`callee(args)`
pub(crate) fn call(p: &mut Parser<'_, '_>, _can_assign: bool) {
    let arg_count = argument_list(p);
    p.emit_op_u8(OpCode::Call, arg_count);
}

/// 解析实参表，返回个数
fn argument_list(p: &mut Parser<'_, '_>) -> u8 {
    let mut count: u8 = 0;
    if !p.check(TokenKind::RightParen) {
        loop {
            p.expression();
            if count == ARGS_MAX {
                p.error("Can't have more than 255 arguments");
                break;
            }
            count += 1;
            if !p.match_token(TokenKind::Comma) {
                break;
            }
        }
    }
    p.consume(TokenKind::RightParen, "Expect ')' after arguments");
    count
}
