//! 声明与语句编译

use std::rc::Rc;

use super::{LoopContext, Parser, Target};
use crate::kit::lexer::TokenKind;
use crate::runtime::object::ProcessTemplate;
use crate::runtime::opcode::OpCode;
use crate::runtime::value::Value;

impl Parser<'_, '_> {
    /// declaration := var | def | process | statement
    pub(crate) fn declaration(&mut self) {
        if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else if self.match_token(TokenKind::Def) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Process) {
            self.proc_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    pub(crate) fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::Frame) {
            self.frame_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Do) {
            self.do_statement();
        } else if self.match_token(TokenKind::Loop) {
            self.loop_statement();
        } else if self.match_token(TokenKind::Switch) {
            self.switch_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::Break) {
            self.break_statement();
        } else if self.match_token(TokenKind::Continue) {
            self.continue_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    /// `{ declaration* }`
    pub(crate) fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block");
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression");
        self.emit_op(OpCode::Pop);
    }

    // ==================== 简单语句 ====================

    fn print_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'print'");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression");
        self.consume(TokenKind::Semicolon, "Expect ';' after value");
        self.emit_op(OpCode::Print);
    }

    /// `frame;` 等价于 `frame(100);`
    fn frame_statement(&mut self) {
        if self.match_token(TokenKind::LeftParen) {
            self.expression();
            self.consume(TokenKind::RightParen, "Expect ')' after expression");
        } else {
            self.emit_constant(Value::number(100.0));
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after value");
        self.emit_op(OpCode::Frame);
    }

    fn return_statement(&mut self) {
        self.target_mut().saw_return = true;
        if self.match_token(TokenKind::Semicolon) {
            self.emit_op(OpCode::Nil);
            self.emit_op(OpCode::Return);
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value");
            self.emit_op(OpCode::Return);
        }
    }

    // ==================== 变量声明 ====================

    /// 顶层为全局定义，块内为局部槽位
    fn var_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect variable name");
        let name = self.previous.lexeme.clone();

        if self.target().scope_depth > 0 {
            self.add_local(&name, false);
            if self.match_token(TokenKind::Equal) {
                self.expression();
            } else {
                self.emit_op(OpCode::Nil);
            }
            self.mark_initialized();
            self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration");
            return;
        }

        let index = self.identifier_constant(&name);
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration");
        self.emit_op_u8(OpCode::DefineGlobal, index);
    }

    /// 进程体顶层的 var：总是局部槽位
    fn var_process_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect variable name");
        let name = self.previous.lexeme.clone();
        self.add_local(&name, false);
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.mark_initialized();
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration");
    }

    // ==================== 控制流 ====================

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition");

        let mut then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let mut end_jumps = vec![self.emit_jump(OpCode::Jump)];

        while self.match_token(TokenKind::Elif) {
            self.patch_jump(then_jump);
            self.emit_op(OpCode::Pop);

            self.consume(TokenKind::LeftParen, "Expect '(' after 'elif'");
            self.expression();
            self.consume(TokenKind::RightParen, "Expect ')' after elif condition");

            then_jump = self.emit_jump(OpCode::JumpIfFalse);
            self.emit_op(OpCode::Pop);
            self.statement();

            end_jumps.push(self.emit_jump(OpCode::Jump));
        }

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }

        for jump in end_jumps {
            self.patch_jump(jump);
        }
    }

    fn push_loop_context(&mut self, loop_start: usize) {
        self.target_mut().loop_stack.push(LoopContext {
            loop_start,
            break_jumps: Vec::new(),
        });
    }

    /// 回填本层循环所有 break 跳转并弹出上下文
    fn patch_break_jumps(&mut self) {
        let context = match self.target_mut().loop_stack.pop() {
            Some(c) => c,
            None => return,
        };
        for jump in context.break_jumps {
            self.patch_jump(jump);
        }
    }

    fn while_statement(&mut self) {
        let loop_start = self.target().chunk.current_offset();
        self.push_loop_context(loop_start);

        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);

        self.patch_break_jumps();
    }

    fn do_statement(&mut self) {
        let loop_start = self.target().chunk.current_offset();
        self.push_loop_context(loop_start);

        self.statement();

        self.consume(TokenKind::While, "Expect 'while' after do-while body");
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition");
        self.consume(TokenKind::Semicolon, "Expect ';' after do-while condition");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);

        self.patch_break_jumps();
    }

    /// `loop { … }`：无条件循环，只有 break 能退出
    fn loop_statement(&mut self) {
        let loop_start = self.target().chunk.current_offset();
        self.push_loop_context(loop_start);

        self.statement();
        self.emit_loop(loop_start);

        self.patch_break_jumps();
    }

    /// `for (init; cond; step)`：step 用两段跳转，continue 指向 step
    fn for_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'");
        self.expression_statement();

        let mut loop_start = self.target().chunk.current_offset();
        self.push_loop_context(loop_start);

        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.target().chunk.current_offset();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
            if let Some(context) = self.target_mut().loop_stack.last_mut() {
                context.loop_start = loop_start;
            }
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }

        self.patch_break_jumps();
    }

    /// switch：逐 case 复制主语比较，命中执行后跳到末尾；
    /// 真假两条路径都保持栈平衡
    fn switch_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'switch'");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after switch condition");
        self.consume(TokenKind::LeftBrace, "Expect '{' before switch cases");

        let mut end_jumps = Vec::new();
        let mut case_count = 0;

        while self.match_token(TokenKind::Case) {
            self.emit_op(OpCode::Dup);
            self.expression();
            self.consume(TokenKind::Colon, "Expect ':' after case value");
            self.emit_op(OpCode::Equal);
            let case_jump = self.emit_jump(OpCode::JumpIfFalse);
            self.emit_op(OpCode::Pop); // 比较结果
            self.statement();
            self.emit_op(OpCode::Pop); // 主语
            end_jumps.push(self.emit_jump(OpCode::Jump));
            self.patch_jump(case_jump);
            self.emit_op(OpCode::Pop); // 比较结果（未命中路径）
            case_count += 1;
        }

        self.emit_op(OpCode::Pop); // 主语（全部未命中路径）

        let mut has_default = false;
        if self.match_token(TokenKind::Default) {
            self.consume(TokenKind::Colon, "Expect ':' after default case");
            self.statement();
            has_default = true;
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after switch cases");

        if case_count == 0 && !has_default {
            self.error("Switch statement must have at least one case or a default case");
            return;
        }

        for jump in end_jumps {
            self.patch_jump(jump);
        }
    }

    fn break_statement(&mut self) {
        if self.target().loop_stack.is_empty() {
            self.error("Cannot use 'break' outside of loop");
            return;
        }
        let jump = self.emit_jump(OpCode::Jump);
        if let Some(context) = self.target_mut().loop_stack.last_mut() {
            context.break_jumps.push(jump);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after 'break'");
    }

    fn continue_statement(&mut self) {
        let loop_start = match self.target().loop_stack.last() {
            Some(context) => context.loop_start,
            None => {
                self.error("Cannot use 'continue' outside of loop");
                return;
            }
        };
        self.emit_loop(loop_start);
        self.consume(TokenKind::Semicolon, "Expect ';' after 'continue'");
    }

    // ==================== 函数与进程声明 ====================

    /// `def name(params) { body }`
    fn fun_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect function name");
        let name = self.previous.lexeme.clone();
        let name_index = self.identifier_constant(&name);
        self.consume(TokenKind::LeftParen, "Expect '(' after function name");

        self.targets.push(Target::function(&name));
        self.begin_scope();

        if !self.check(TokenKind::RightParen) {
            loop {
                if self.target().arity == u8::MAX {
                    self.error("Can't have more than 255 parameters");
                    break;
                }
                self.target_mut().arity += 1;
                self.consume(TokenKind::Identifier, "Expect parameter name");
                let param = self.previous.lexeme.clone();
                self.add_local(&param, true);
                self.mark_initialized();
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body");

        self.block();
        self.end_scope();

        if !self.target().saw_return {
            self.emit_op(OpCode::Nil);
            self.emit_op(OpCode::Return);
        }

        let function = match self.targets.pop() {
            Some(target) => target.finish(),
            None => return,
        };
        let fn_index = self.make_constant(Value::function(function));
        self.emit_op_u8(OpCode::Constant, fn_index);
        self.emit_op_u8(OpCode::DefineGlobal, name_index);
    }

    /// `process name(params) { body }`
    ///
    /// 与函数同形，但槽位 0/1/2 预留给 x/y/angle，体内顶层的
    /// var 编译为局部槽位，末尾发射 Halt。模板存入解释器并
    /// 绑定为全局名。
    fn proc_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect process name");
        let name = self.previous.lexeme.clone();
        let name_index = self.identifier_constant(&name);
        self.consume(TokenKind::LeftParen, "Expect '(' after process name");

        self.targets.push(Target::process(&name));
        self.begin_scope();

        if !self.check(TokenKind::RightParen) {
            loop {
                if self.target().arity == u8::MAX {
                    self.error("Can't have more than 255 parameters");
                    break;
                }
                self.target_mut().arity += 1;
                self.consume(TokenKind::Identifier, "Expect parameter name");
                let param = self.previous.lexeme.clone();
                self.add_local(&param, true);
                self.mark_initialized();
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters");
        self.consume(TokenKind::LeftBrace, "Expect '{' before process body");

        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            if self.match_token(TokenKind::Var) {
                self.var_process_declaration();
            } else {
                self.statement();
            }
            if self.panic_mode {
                self.synchronize();
            }
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block");

        self.end_scope();
        self.emit_op(OpCode::Halt);

        let function = match self.targets.pop() {
            Some(target) => target.finish(),
            None => return,
        };
        let template = Rc::new(ProcessTemplate {
            name: name.clone(),
            function,
        });
        self.interp.add_template(template.clone());
        let tpl_index = self.make_constant(Value::process(template));
        self.emit_op_u8(OpCode::Constant, tpl_index);
        self.emit_op_u8(OpCode::DefineGlobal, name_index);
    }
}
