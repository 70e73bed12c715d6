//! 语言端到端测试：编译后在调度器上跑到结束，核对输出

mod common;
use common::run_source;

use fenn_core::ProcessStatus;

#[test]
fn test_arithmetic_precedence() {
    let session = run_source("print(1 + 2 * 3);").unwrap();
    assert_eq!(session.output(), "7.000000\n");
}

#[test]
fn test_arithmetic_operators() {
    let session = run_source("print(10 % 3); print(2 ^ 10); print(7 / 2);").unwrap();
    assert_eq!(
        session.lines(),
        vec!["1.000000", "1024.000000", "3.500000"]
    );
}

#[test]
fn test_unary() {
    let session = run_source("print(-5); print(!true); print(not false);").unwrap();
    assert_eq!(session.lines(), vec!["-5.000000", "false", "true"]);
}

#[test]
fn test_string_concat_with_number() {
    let session = run_source("print(\"x=\" + 5);").unwrap();
    assert_eq!(session.output(), "x=5\n");
}

#[test]
fn test_string_concat() {
    let session = run_source("print(\"foo\" + \"bar\");").unwrap();
    assert_eq!(session.output(), "foobar\n");
}

#[test]
fn test_if_elif_else_ladder() {
    let session = run_source(
        r#"
        var a = 2;
        if (a == 1) print("one");
        elif (a == 2) print("two");
        else print("other");
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "two\n");
}

#[test]
fn test_else_branch() {
    let session = run_source(
        r#"
        var a = 9;
        if (a == 1) print("one");
        elif (a == 2) print("two");
        else print("other");
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "other\n");
}

#[test]
fn test_do_while_with_break() {
    let session = run_source(
        r#"
        var i = 0;
        do { i = i + 1; if (i == 3) break; } while (i < 10);
        print(i);
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "3.000000\n");
}

#[test]
fn test_while_loop() {
    let session = run_source(
        r#"
        var i = 0;
        while (i < 4) { i = i + 1; }
        print(i);
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "4.000000\n");
}

#[test]
fn test_for_loop_with_continue() {
    let session = run_source(
        r#"
        var sum = 0;
        var i;
        for (i = 0; i < 6; i = i + 1) {
            if (i == 3) continue;
            sum = sum + i;
        }
        print(sum);
        "#,
    )
    .unwrap();
    // 0+1+2+4+5
    assert_eq!(session.output(), "12.000000\n");
}

#[test]
fn test_loop_with_break() {
    let session = run_source(
        r#"
        var i = 0;
        loop { i = i + 1; if (i == 4) break; }
        print(i);
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "4.000000\n");
}

#[test]
fn test_function_recursion() {
    let session = run_source(
        r#"
        def fact(n) { if (n <= 1) return 1; return n * fact(n - 1); }
        print(fact(5));
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "120.000000\n");
}

#[test]
fn test_two_functions_share_globals() {
    let session = run_source(
        r#"
        def double(n) { return n * 2; }
        def inc(n) { return n + 1; }
        print(double(inc(3)));
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "8.000000\n");
}

#[test]
fn test_function_implicit_nil_return() {
    let session = run_source(
        r#"
        def noop(n) { n = n + 1; }
        print(noop(1));
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "nil\n");
}

#[test]
fn test_switch_default() {
    let session = run_source(
        r#"
        var n = 3;
        switch (n) { case 1: print("a"); case 2: print("b"); default: print("z"); }
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "z\n");
}

#[test]
fn test_switch_case_hit_no_fallthrough() {
    let session = run_source(
        r#"
        var n = 2;
        switch (n) { case 1: print("a"); case 2: print("b"); default: print("z"); }
        print("after");
        "#,
    )
    .unwrap();
    assert_eq!(session.lines(), vec!["b", "after"]);
}

#[test]
fn test_logical_short_circuit() {
    let session = run_source(
        r#"
        def boom() { print("boom"); return true; }
        print(false and boom());
        print(true or boom());
        "#,
    )
    .unwrap();
    assert_eq!(session.lines(), vec!["false", "true"]);
}

#[test]
fn test_xor_materializes_both() {
    let session = run_source("print(true xor false); print(1 xor 1);").unwrap();
    assert_eq!(session.lines(), vec!["true", "false"]);
}

#[test]
fn test_number_equality_epsilon() {
    // 数字相等带 0.02 容限
    let session = run_source("print(1 == 1.5); print(3 != 3);").unwrap();
    assert_eq!(session.lines(), vec!["false", "false"]);
}

#[test]
fn test_compound_assignment() {
    let session = run_source(
        r#"
        var i = 10;
        i += 5;
        i *= 2;
        i -= 6;
        i /= 4;
        print(i);
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "6.000000\n");
}

#[test]
fn test_compound_assignment_on_local() {
    let session = run_source(
        r#"
        {
            var i = 3;
            i += 4;
            print(i);
        }
        "#,
    )
    .unwrap();
    assert_eq!(session.output(), "7.000000\n");
}

#[test]
fn test_case_insensitive_identifiers() {
    let session = run_source("var Foo = 1; print(FOO);").unwrap();
    assert_eq!(session.output(), "1.000000\n");
}

#[test]
fn test_block_scope() {
    let session = run_source(
        r#"
        var a = 1;
        { var a = 10; var b = 20; print(a + b); }
        print(a);
        "#,
    )
    .unwrap();
    assert_eq!(session.lines(), vec!["30.000000", "1.000000"]);
}

#[test]
fn test_truthiness_rules() {
    let session = run_source(
        r#"
        print(!0);
        print(!"");
        print(!"x");
        print(!nil);
        "#,
    )
    .unwrap();
    assert_eq!(session.lines(), vec!["true", "true", "false", "true"]);
}

#[test]
fn test_stack_neutral_expression_statements() {
    let mut session = common::Session::compile("1 + 2 * 3; \"s\"; nil; true;").unwrap();
    session.run_frames(10);
    let main = session.interp.find_process("_main_").unwrap();
    assert_eq!(session.interp.process_stack_depth(main), Some(0));
}

#[test]
fn test_scope_discipline_leaves_stack_clean() {
    let mut session = common::Session::compile(
        r#"
        { var a = 1; var b = 2; a + b; }
        { var c = 3; }
        "#,
    )
    .unwrap();
    session.run_frames(10);
    let main = session.interp.find_process("_main_").unwrap();
    assert_eq!(session.interp.process_stack_depth(main), Some(0));
}

#[test]
fn test_undefined_global_kills_process() {
    let mut session = common::Session::compile("print(ghost);").unwrap();
    session.run_frames(10);
    assert_eq!(session.output(), "");
    let main = session.interp.find_process("_main_").unwrap();
    assert_eq!(session.interp.process_status(main), Some(ProcessStatus::Dead));
}

#[test]
fn test_type_error_kills_process_only() {
    let mut session = common::Session::compile("print(\"a\" - 1);").unwrap();
    session.run_frames(10);
    assert_eq!(session.output(), "");
    let main = session.interp.find_process("_main_").unwrap();
    assert_eq!(session.interp.process_status(main), Some(ProcessStatus::Dead));
}

#[test]
fn test_call_arity_mismatch_is_runtime_error() {
    let mut session = common::Session::compile(
        r#"
        def f(a) { return a; }
        print(f(1, 2));
        "#,
    )
    .unwrap();
    session.run_frames(10);
    assert_eq!(session.output(), "");
}

#[test]
fn test_native_math() {
    let session = run_source("print(abs(-3)); print(floor(2.9)); print(max(2, 7));").unwrap();
    assert_eq!(session.lines(), vec!["3.000000", "2.000000", "7.000000"]);
}

#[test]
fn test_native_write_writeln() {
    let session = run_source("write(\"a\", \"b\"); writeln(\"c\"); writeln(\"d\");").unwrap();
    assert_eq!(session.output(), "abc\nd\n");
}

#[test]
fn test_native_clock_and_pid() {
    let session = run_source("print(clock() >= 0); print(pid());").unwrap();
    assert_eq!(session.lines(), vec!["true", "1.000000"]);
}

#[test]
fn test_now_pushes_number() {
    let session = run_source("print(now >= 0);").unwrap();
    assert_eq!(session.output(), "true\n");
}

#[test]
fn test_nil_literal_and_equality() {
    let session = run_source("print(nil == nil); print(nil == false);").unwrap();
    assert_eq!(session.lines(), vec!["true", "false"]);
}
