//! Closure conversion integration tests.

use rucaml::alpha;
use rucaml::closure::{self, Program};
use rucaml::ir::{elim_ref, lower, InsnKind};
use rucaml::lexer::Lexer;
use rucaml::parser;
use rucaml::source::Source;
use rucaml::types::type_inference;

fn convert(code: &str) -> Program {
    let mut ast = parser::parse(Lexer::new(Source::dummy(code)))
        .unwrap_or_else(|e| panic!("parse of '{}' failed: {}", code, e));
    alpha::transform(&mut ast.root).unwrap();
    let mut env = type_inference(&ast)
        .unwrap_or_else(|e| panic!("type inference of '{}' failed: {}", code, e));
    let mut block = lower::from_ast(&ast.root, &env).unwrap();
    elim_ref::elim_refs(&mut block, &mut env);
    closure::transform(block, env)
}

fn has_fun_insn(block: &rucaml::ir::Block) -> bool {
    block.insns.iter().any(|insn| match &insn.kind {
        InsnKind::Fun { .. } => true,
        InsnKind::If {
            then_blk, else_blk, ..
        } => has_fun_insn(then_blk) || has_fun_insn(else_blk),
        _ => false,
    })
}

fn makecls_insns(block: &rucaml::ir::Block) -> Vec<(String, Vec<String>)> {
    let mut out = Vec::new();
    collect_makecls(block, &mut out);
    out
}

fn collect_makecls(block: &rucaml::ir::Block, out: &mut Vec<(String, Vec<String>)>) {
    for insn in &block.insns {
        match &insn.kind {
            InsnKind::MakeCls { fun, captures } => out.push((fun.clone(), captures.clone())),
            InsnKind::If {
                then_blk, else_blk, ..
            } => {
                collect_makecls(then_blk, out);
                collect_makecls(else_blk, out);
            }
            InsnKind::Fun { body, .. } => collect_makecls(body, out),
            _ => {}
        }
    }
}

#[test]
fn test_plain_function_is_lifted() {
    let prog = convert("let rec f x = x + x in println_int (f 42)");
    assert_eq!(prog.toplevel.len(), 1);
    let f = &prog.toplevel[0];
    assert_eq!(f.name, "f$t1");
    assert_eq!(f.params, ["x$t2"]);
    assert!(f.captures.is_empty());
    assert!(!f.is_recursive);
    assert!(!has_fun_insn(&prog.entry));
    assert!(makecls_insns(&prog.entry).is_empty());
    assert_eq!(prog.env.externals["println_int"].to_string(), "int -> ()");
}

#[test]
fn test_capturing_function_becomes_closure() {
    let prog = convert("let a = 1 in let rec add x = x + a in println_int (add 2)");
    assert_eq!(prog.toplevel.len(), 1);
    let add = &prog.toplevel[0];
    assert_eq!(add.name, "add$t2");
    assert_eq!(add.params, ["x$t3"]);
    assert_eq!(add.captures, ["a$t1"]);
    let clss = makecls_insns(&prog.entry);
    assert_eq!(clss.len(), 1);
    assert_eq!(clss[0].0, "add$t2");
    assert_eq!(clss[0].1, ["a$t1"]);
    assert!(!has_fun_insn(&prog.entry));
}

#[test]
fn test_direct_recursion_stays_plain() {
    let prog =
        convert("let rec fact n = if n <= 1 then 1 else n * fact (n - 1) in println_int (fact 5)");
    assert_eq!(prog.toplevel.len(), 1);
    let fact = &prog.toplevel[0];
    assert_eq!(fact.name, "fact$t1");
    assert!(fact.captures.is_empty());
    assert!(fact.is_recursive);
    assert!(makecls_insns(&prog.entry).is_empty());
}

#[test]
fn test_function_stored_in_tuple_escapes() {
    let prog = convert("let rec f x = x in let t = (f, 1) in println_int 0");
    assert_eq!(prog.toplevel.len(), 1);
    let clss = makecls_insns(&prog.entry);
    assert_eq!(clss.len(), 1);
    assert_eq!(clss[0].0, "f$t1");
    assert!(clss[0].1.is_empty());
}

#[test]
fn test_aliased_function_escapes() {
    // binding the function to another name is a value use, so a
    // closure is allocated even though no variable is captured
    let prog = convert("let rec f x = x + 1 in let g = f in println_int (g 1)");
    assert_eq!(prog.toplevel.len(), 1);
    let clss = makecls_insns(&prog.entry);
    assert_eq!(clss.len(), 1);
    assert_eq!(clss[0].0, "f$t1");
    assert!(clss[0].1.is_empty());
}

#[test]
fn test_nested_function_capturing_parameter() {
    let prog = convert(
        "let rec adder x = let rec add y = x + y in add in println_int ((adder 1) 2)",
    );
    // both functions are lifted; `add` captures the parameter of `adder`
    assert_eq!(prog.toplevel.len(), 2);
    let add = &prog.toplevel[0];
    assert_eq!(add.name, "add$t3");
    assert_eq!(add.captures, ["x$t2"]);
    let adder = &prog.toplevel[1];
    assert_eq!(adder.name, "adder$t1");
    assert!(adder.captures.is_empty());
    // the closure is allocated inside adder's body
    let clss = makecls_insns(&adder.body);
    assert_eq!(clss.len(), 1);
    assert_eq!(clss[0].0, "add$t3");
}

#[test]
fn test_no_free_variables_outside_captures_and_params() {
    let programs = [
        "let rec f x = x + x in println_int (f 42)",
        "let a = 1 in let b = 2 in let rec f x = x + a * b in println_int (f 3)",
        "let rec adder x = let rec add y = x + y in add in println_int ((adder 1) 2)",
        "let rec fact n = if n <= 1 then 1 else n * fact (n - 1) in println_int (fact 5)",
    ];
    for code in programs {
        let prog = convert(code);
        for f in &prog.toplevel {
            let mut bound: Vec<String> = f.params.clone();
            bound.extend(f.captures.clone());
            bound.push(f.name.clone());
            bound.extend(prog.toplevel.iter().map(|t| t.name.clone()));
            assert_free_vars_bound(&f.body, &mut bound, code);
        }
    }
}

fn assert_free_vars_bound(block: &rucaml::ir::Block, bound: &mut Vec<String>, code: &str) {
    for insn in &block.insns {
        for used in operand_names(&insn.kind) {
            assert!(
                bound.contains(&used),
                "free variable '{}' in converted body of '{}'",
                used,
                code
            );
        }
        if let InsnKind::If {
            then_blk, else_blk, ..
        } = &insn.kind
        {
            let mut inner = bound.clone();
            assert_free_vars_bound(then_blk, &mut inner, code);
            let mut inner = bound.clone();
            assert_free_vars_bound(else_blk, &mut inner, code);
        }
        bound.push(insn.ident.clone());
    }
}

fn operand_names(kind: &InsnKind) -> Vec<String> {
    match kind {
        InsnKind::Unit
        | InsnKind::Bool(_)
        | InsnKind::Int(_)
        | InsnKind::Float(_)
        | InsnKind::String(_)
        | InsnKind::XRef(_)
        | InsnKind::None => vec![],
        InsnKind::Ref(n) => vec![n.clone()],
        InsnKind::Unary { child, .. } => vec![child.clone()],
        InsnKind::Binary { left, right, .. } => vec![left.clone(), right.clone()],
        InsnKind::If { cond, .. } => vec![cond.clone()],
        InsnKind::App { callee, args } => {
            let mut v = vec![callee.clone()];
            v.extend(args.clone());
            v
        }
        InsnKind::Fun { .. } => vec![],
        InsnKind::Tuple(elems) => elems.clone(),
        InsnKind::TplLoad { tuple, .. } => vec![tuple.clone()],
        InsnKind::Array { size, elem } => vec![size.clone(), elem.clone()],
        InsnKind::ArrLen(a) => vec![a.clone()],
        InsnKind::ArrLoad { index, array } => vec![index.clone(), array.clone()],
        InsnKind::ArrStore {
            index,
            array,
            value,
        } => vec![index.clone(), array.clone(), value.clone()],
        InsnKind::Some(v) | InsnKind::IsSome(v) | InsnKind::DerefSome(v) => vec![v.clone()],
        InsnKind::MakeCls { captures, .. } => captures.clone(),
    }
}

#[test]
fn test_toplevel_order_is_innermost_first() {
    let prog = convert(
        "let rec outer x = let rec inner y = y + 1 in inner x in println_int (outer 1)",
    );
    assert_eq!(prog.toplevel.len(), 2);
    assert_eq!(prog.toplevel[0].name, "inner$t3");
    assert_eq!(prog.toplevel[1].name, "outer$t1");
}

#[test]
fn test_program_display_lists_functions_then_entry() {
    let prog = convert("let rec f x = x + x in println_int (f 42)");
    let text = prog.to_string();
    let fn_pos = text.find("FUNCTION f$t1").unwrap();
    let entry_pos = text.find("BEGIN: program").unwrap();
    assert!(fn_pos < entry_pos, "got:\n{}", text);
}
