//! 编译器前端
//!
//! 单趟 Pratt 解析器：扫描器驱动，按 token 类型查规则表，
//! 字节码直接发射进当前函数的 chunk。词法作用域、循环上下文
//! （break/continue 的目标）与局部符号表都在编译目标上，
//! 运行时函数只携带编译完成后的不可变状态。

pub mod error;
mod expr;
mod stmt;

pub use error::CompileError;

use std::rc::Rc;

use tracing::{debug, error as log_error};

use crate::kit::lexer::{Scanner, Token, TokenKind};
use crate::runtime::chunk::Chunk;
use crate::runtime::interpreter::Interpreter;
use crate::runtime::object::Function;
use crate::runtime::opcode::OpCode;
use crate::runtime::value::Value;

/// 每个函数的局部变量上限（8 位槽位索引）
pub const LOCALS_MAX: usize = 256;
/// 单次调用的参数上限
pub const ARGS_MAX: u8 = 255;

/// 优先级，从低到高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Precedence {
    None = 0,
    Assignment, // =, +=, -=
    Or,
    Xor,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equality,   // == !=
    Comparison, // < > <= >=
    Shift,
    Term,   // + -
    Factor, // * / %
    Power,  // ^
    Unary,  // - ! not
    Call,   // ()
    Primary,
}

impl Precedence {
    /// 高一级的优先级（左结合二元算符用）
    pub fn higher(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::Xor,
            Precedence::Xor => Precedence::And,
            Precedence::And => Precedence::BitOr,
            Precedence::BitOr => Precedence::BitXor,
            Precedence::BitXor => Precedence::BitAnd,
            Precedence::BitAnd => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Shift,
            Precedence::Shift => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Power,
            Precedence::Power => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

/// 前缀 / 中缀解析函数
pub(crate) type ParseFn = for<'a, 'i, 's> fn(&'a mut Parser<'i, 's>, bool);

/// 规则表条目
pub(crate) struct ParseRule {
    pub prefix: Option<ParseFn>,
    pub infix: Option<ParseFn>,
    pub precedence: Precedence,
}

fn rule(
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
) -> ParseRule {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

/// 按 token 类型取解析规则
pub(crate) fn get_rule(kind: TokenKind) -> ParseRule {
    match kind {
        TokenKind::LeftParen => rule(Some(expr::grouping), Some(expr::call), Precedence::Call),
        TokenKind::Minus => rule(Some(expr::unary), Some(expr::binary), Precedence::Term),
        TokenKind::Plus => rule(None, Some(expr::binary), Precedence::Term),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => {
            rule(None, Some(expr::binary), Precedence::Factor)
        }
        TokenKind::Caret => rule(None, Some(expr::binary), Precedence::Power),
        TokenKind::Bang | TokenKind::Not => rule(Some(expr::unary), None, Precedence::None),
        TokenKind::EqualEqual | TokenKind::BangEqual => {
            rule(None, Some(expr::binary), Precedence::Equality)
        }
        TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::Less
        | TokenKind::LessEqual => rule(None, Some(expr::binary), Precedence::Comparison),
        TokenKind::And => rule(None, Some(expr::and_), Precedence::And),
        TokenKind::Or => rule(None, Some(expr::or_), Precedence::Or),
        TokenKind::Xor => rule(None, Some(expr::xor_), Precedence::Xor),
        TokenKind::Identifier => rule(Some(expr::variable), None, Precedence::None),
        TokenKind::String => rule(Some(expr::string), None, Precedence::None),
        TokenKind::Number => rule(Some(expr::number), None, Precedence::None),
        TokenKind::True | TokenKind::False | TokenKind::Nil | TokenKind::Now => {
            rule(Some(expr::literal), None, Precedence::None)
        }
        _ => rule(None, None, Precedence::None),
    }
}

/// 编译期局部变量记录
#[derive(Debug)]
pub(crate) struct Local {
    pub name: String,
    /// -1 表示已声明未初始化
    pub depth: i32,
    /// 参数与隐式槽位不随作用域弹出
    pub is_arg: bool,
}

/// 循环上下文：continue 的目标与待回填的 break 跳转
#[derive(Debug, Default)]
pub(crate) struct LoopContext {
    pub loop_start: usize,
    pub break_jumps: Vec<usize>,
}

/// 正在编译的函数 / 进程体
pub(crate) struct Target {
    pub name: String,
    pub arity: u8,
    pub chunk: Chunk,
    pub locals: Vec<Local>,
    pub scope_depth: i32,
    pub loop_stack: Vec<LoopContext>,
    pub saw_return: bool,
}

impl Target {
    fn script() -> Self {
        Self::new("_main_")
    }

    /// 函数目标：槽位 0 为被调用值本身（函数名）
    fn function(name: &str) -> Self {
        let mut target = Self::new(name);
        target.locals.push(Local {
            name: name.to_string(),
            depth: 0,
            is_arg: true,
        });
        target
    }

    /// 进程目标：槽位 0/1/2 为约定局部变量 x / y / angle
    fn process(name: &str) -> Self {
        let mut target = Self::new(name);
        for well_known in ["x", "y", "angle"] {
            target.locals.push(Local {
                name: well_known.to_string(),
                depth: 0,
                is_arg: true,
            });
        }
        target
    }

    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arity: 0,
            chunk: Chunk::new(),
            locals: Vec::new(),
            scope_depth: 0,
            loop_stack: Vec::new(),
            saw_return: false,
        }
    }

    fn finish(self) -> Rc<Function> {
        Rc::new(Function {
            name: self.name,
            arity: self.arity,
            chunk: self.chunk,
        })
    }
}

/// Pratt 解析器
pub struct Parser<'i, 's> {
    scanner: Scanner<'s>,
    pub(crate) interp: &'i mut Interpreter,
    pub(crate) current: Token,
    pub(crate) previous: Token,
    pub(crate) had_error: bool,
    pub(crate) panic_mode: bool,
    pub(crate) errors: Vec<CompileError>,
    pub(crate) targets: Vec<Target>,
}

impl<'i, 's> Parser<'i, 's> {
    pub fn new(interp: &'i mut Interpreter, source: &'s str) -> Self {
        Self {
            scanner: Scanner::new(source),
            interp,
            current: Token::empty(),
            previous: Token::empty(),
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            targets: vec![Target::script()],
        }
    }

    /// 编译整个编译单元，返回根进程的顶层函数
    pub fn compile(&mut self) -> Result<Rc<Function>, CompileError> {
        self.advance();
        while !self.match_token(TokenKind::Eof) {
            self.declaration();
        }
        self.emit_op(OpCode::Halt);

        if self.had_error {
            return Err(self.errors.first().cloned().unwrap_or(CompileError::AtEnd {
                line: self.previous.line,
                message: "compilation failed".to_string(),
            }));
        }
        debug!(target: "fenn::compiler", "compilation unit finished");
        let target = match self.targets.pop() {
            Some(t) => t,
            None => {
                return Err(CompileError::AtEnd {
                    line: self.previous.line,
                    message: "compiler target stack empty".to_string(),
                })
            }
        };
        Ok(target.finish())
    }

    // ==================== token 流 ====================

    pub(crate) fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, Token::empty());
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.clone();
            self.error_at_current(&message);
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ==================== 错误报告 ====================

    pub(crate) fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    pub(crate) fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let err = if token.kind == TokenKind::Eof {
            CompileError::AtEnd {
                line: token.line,
                message: message.to_string(),
            }
        } else {
            CompileError::Syntax {
                line: token.line,
                lexeme: token.lexeme.clone(),
                message: message.to_string(),
            }
        };
        log_error!(target: "fenn::compiler", %err, "syntax error");
        self.errors.push(err);
    }

    pub(crate) fn push_error(&mut self, err: CompileError) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        log_error!(target: "fenn::compiler", %err, "compile error");
        self.errors.push(err);
    }

    /// 恐慌模式恢复：丢弃 token 到下一个语句边界
    pub(crate) fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Def
                | TokenKind::Process
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Frame
                | TokenKind::Do
                | TokenKind::Loop
                | TokenKind::Switch
                | TokenKind::Case
                | TokenKind::Else
                | TokenKind::Default
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ==================== 发射 ====================

    pub(crate) fn target(&self) -> &Target {
        self.targets.last().expect("compiler target stack empty")
    }

    pub(crate) fn target_mut(&mut self) -> &mut Target {
        self.targets.last_mut().expect("compiler target stack empty")
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        let line = self.current.line;
        self.target_mut().chunk.write_op(op, line);
    }

    pub(crate) fn emit_op_u8(&mut self, op: OpCode, operand: u8) {
        let line = self.current.line;
        self.target_mut().chunk.write_op_u8(op, operand, line);
    }

    /// 发射跳转占位，返回操作数偏移
    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        let line = self.current.line;
        self.target_mut().chunk.write_jump(op, line)
    }

    /// 回填跳转到当前位置，过远时报告编译错误
    pub(crate) fn patch_jump(&mut self, offset: usize) {
        if !self.target_mut().chunk.patch_jump(offset) {
            let line = self.previous.line;
            self.push_error(CompileError::JumpTooFar { line });
        }
    }

    /// 发射后向跳转到 loop_start
    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        let line = self.current.line;
        if !self.target_mut().chunk.write_loop(loop_start, line) {
            let line = self.previous.line;
            self.push_error(CompileError::JumpTooFar { line });
        }
    }

    /// 追加常量并发射加载指令
    pub(crate) fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_u8(OpCode::Constant, index);
    }

    /// 追加常量（去重），池满时报告错误
    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        match self.interp.add_constant(value) {
            Some(index) => index,
            None => {
                let line = self.previous.line;
                self.push_error(CompileError::TooManyConstants { line });
                0
            }
        }
    }

    /// 标识符驻留后入常量池，返回索引
    pub(crate) fn identifier_constant(&mut self, name: &str) -> u8 {
        let interned = self.interp.intern(name);
        self.make_constant(Value::string(interned))
    }

    // ==================== 作用域与局部变量 ====================

    pub(crate) fn begin_scope(&mut self) {
        self.target_mut().scope_depth += 1;
    }

    /// 离开作用域：弹出深度更深的非参数局部变量
    pub(crate) fn end_scope(&mut self) {
        let line = self.current.line;
        let target = self.target_mut();
        target.scope_depth -= 1;
        while let Some(local) = target.locals.last() {
            if local.depth <= target.scope_depth || local.is_arg {
                break;
            }
            target.chunk.write_op(OpCode::Pop, line);
            target.locals.pop();
        }
    }

    /// 声明局部变量（深度 -1，待初始化），返回槽位
    pub(crate) fn add_local(&mut self, name: &str, is_arg: bool) -> u8 {
        if self.target().locals.len() >= LOCALS_MAX {
            let line = self.previous.line;
            self.push_error(CompileError::TooManyLocals { line });
            return 0;
        }
        let target = self.target_mut();
        target.locals.push(Local {
            name: name.to_string(),
            depth: -1,
            is_arg,
        });
        (target.locals.len() - 1) as u8
    }

    /// 标记最近声明的局部变量为已初始化
    pub(crate) fn mark_initialized(&mut self) {
        let target = self.target_mut();
        if target.scope_depth == 0 {
            // 顶层参数槽位：直接可用
            if let Some(local) = target.locals.last_mut() {
                local.depth = 0;
            }
            return;
        }
        let depth = target.scope_depth;
        if let Some(local) = target.locals.last_mut() {
            local.depth = depth;
        }
    }

    /// 从新到旧解析局部变量，命中返回槽位
    pub(crate) fn resolve_local(&mut self, name: &str) -> Option<u8> {
        let mut uninitialized = false;
        let mut found = None;
        for (i, local) in self.target().locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    uninitialized = true;
                }
                found = Some(i as u8);
                break;
            }
        }
        if uninitialized {
            self.error("Can't read local variable in its own initializer");
        }
        found
    }

    // ==================== Pratt 驱动 ====================

    pub(crate) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = match get_rule(self.previous.kind).prefix {
            Some(f) => f,
            None => {
                self.error("Expect expression");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            match get_rule(self.previous.kind).infix {
                Some(infix) => infix(self, can_assign),
                None => break,
            }
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target");
        }
    }

    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }
}
