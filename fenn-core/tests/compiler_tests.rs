//! 编译器测试：错误诊断与字节码结构不变量

mod common;
use common::Session;

use fenn_core::runtime::chunk::Chunk;
use fenn_core::runtime::opcode::OpCode;
use fenn_core::CompileError;

fn compile_err(source: &str) -> CompileError {
    Session::compile(source).expect_err("expected compile failure")
}

#[test]
fn test_break_outside_loop() {
    let err = compile_err("break;");
    assert!(matches!(err, CompileError::Syntax { .. }));
    assert!(err.to_string().contains("break"));
}

#[test]
fn test_continue_outside_loop() {
    let err = compile_err("continue;");
    assert!(err.to_string().contains("continue"));
}

#[test]
fn test_invalid_assignment_target() {
    let err = compile_err("1 = 2;");
    assert!(err.to_string().contains("Invalid assignment target"));
}

#[test]
fn test_missing_semicolon() {
    let err = compile_err("print(1)");
    assert!(matches!(err, CompileError::AtEnd { .. }));
}

#[test]
fn test_switch_without_cases() {
    let err = compile_err("switch (1) { }");
    assert!(err.to_string().contains("at least one case"));
}

#[test]
fn test_reserved_keyword_has_no_rule() {
    // class/this/len/import/program 只保留词法
    assert!(matches!(compile_err("class Foo;"), CompileError::Syntax { .. }));
    assert!(matches!(compile_err("import x;"), CompileError::Syntax { .. }));
}

#[test]
fn test_increment_is_rejected() {
    let err = compile_err("var a = 1; a++;");
    assert!(err.to_string().contains("not supported"));
}

#[test]
fn test_unterminated_string_reported() {
    let err = compile_err("print(\"abc);");
    assert!(err.to_string().contains("Unterminated string"));
}

#[test]
fn test_error_line_number() {
    let err = compile_err("var a = 1;\nvar b = ;\n");
    assert_eq!(err.line(), 2);
}

#[test]
fn test_parser_recovers_and_reports_per_statement() {
    // 第一个错误后在语句边界恢复，整体编译仍失败
    let err = compile_err("var = 1;\nprint(2);\n");
    assert!(matches!(err, CompileError::Syntax { .. }));
}

#[test]
fn test_too_many_constants() {
    let mut source = String::new();
    for i in 0..300 {
        source.push_str(&format!("print({i});\n"));
    }
    let err = compile_err(&source);
    assert!(matches!(err, CompileError::TooManyConstants { .. }));
}

#[test]
fn test_jump_too_far() {
    // while 体超过 16 位跳转范围
    let mut source = String::from("var n = 0;\nwhile (true) {\n");
    for _ in 0..9000 {
        source.push_str("n = n + 1;\n");
    }
    source.push_str("}\n");
    let err = compile_err(&source);
    assert!(matches!(err, CompileError::JumpTooFar { .. }));
}

// ==================== 字节码结构不变量 ====================

#[test]
fn test_constant_pool_entries_pairwise_unequal() {
    let session = Session::compile(
        r#"
        var a = 1;
        var b = 2;
        var s = "hello";
        print(a + b);
        print(s + "hello");
        "#,
    )
    .unwrap();
    let constants = session.interp.constants();
    for i in 0..constants.len() {
        for j in (i + 1)..constants.len() {
            assert!(
                !constants[i].equals(&constants[j]),
                "constants {i} and {j} are equal"
            );
        }
    }
}

#[test]
fn test_chunk_lines_parallel_to_code() {
    let session = Session::compile(
        r#"
        var i = 0;
        while (i < 3) { i = i + 1; }
        print(i);
        "#,
    )
    .unwrap();
    let function = session.interp.main_function().unwrap();
    assert_eq!(function.chunk.code.len(), function.chunk.lines.len());
    assert!(function.chunk.lines.iter().all(|&line| line >= 1));
}

/// 顺序走一遍字节码，核对每个跳转都落在 chunk 内
fn check_jumps(chunk: &Chunk) {
    let mut offset = 0;
    while offset < chunk.len() {
        let op = OpCode::from_byte(chunk.read(offset)).expect("valid opcode");
        match op {
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
                let target = offset + 3 + chunk.read_u16(offset + 1) as usize;
                assert!(target <= chunk.len(), "jump target {target} out of chunk");
            }
            OpCode::Loop => {
                let back = chunk.read_u16(offset + 1) as usize;
                assert!(back <= offset + 3, "loop target before chunk start");
                let target = offset + 3 - back;
                assert!(target <= offset, "loop target {target} is not backwards");
            }
            _ => {}
        }
        offset += 1 + op.operand_size();
    }
}

#[test]
fn test_jump_targets_well_formed() {
    let session = Session::compile(
        r#"
        process walker(step) {
            loop {
                x = x + step;
                if (x > 400) { x = 360; }
                frame(100);
            }
        }
        var i;
        for (i = 0; i < 3; i = i + 1) {
            switch (i) { case 0: print("a"); default: print("d"); }
        }
        do { i = i - 1; } while (i > 0);
        walker(2);
        "#,
    )
    .unwrap();
    check_jumps(&session.interp.main_function().unwrap().chunk);
    for template in session.interp.templates() {
        check_jumps(&template.function.chunk);
    }
}

#[test]
fn test_process_template_recorded() {
    let mut session = Session::compile(
        r#"
        process mover(speed) { loop { x = x + speed; frame(100); } }
        "#,
    )
    .unwrap();
    {
        let templates = session.interp.templates();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "mover");
        // 参数 1 个
        assert_eq!(templates[0].function.arity, 1);
    }
    // 顶层代码执行后模板绑定为全局名
    session.run_frames(2);
    assert!(session.interp.contains("mover"));
}

#[test]
fn test_disassemble_lists_all_chunks() {
    let session = Session::compile(
        r#"
        def helper(n) { return n; }
        process idler() { loop { frame(100); } }
        print(helper(1));
        "#,
    )
    .unwrap();
    let listing = session.interp.disassemble();
    assert!(listing.contains("_main_"));
    assert!(listing.contains("idler"));
    assert!(listing.contains("HALT"));
    assert!(listing.contains("FRAME"));
}
