//! Alpha transform integration tests.
//!
//! The post-conditions under test: binder names are globally unique
//! (`name$t<N>`), every bound reference shares its binder's symbol by
//! pointer identity, externals keep their written name.

use std::rc::Rc;

use rucaml::alpha;
use rucaml::ast::{Expr, Symbol, AST};
use rucaml::lexer::Lexer;
use rucaml::parser;
use rucaml::source::Source;

fn transformed(code: &str) -> AST {
    let mut ast = parser::parse(Lexer::new(Source::dummy(code)))
        .unwrap_or_else(|e| panic!("parse of '{}' failed: {}", code, e));
    alpha::transform(&mut ast.root)
        .unwrap_or_else(|e| panic!("alpha transform of '{}' failed: {}", code, e));
    ast
}

fn transform_err(code: &str) -> String {
    let mut ast = parser::parse(Lexer::new(Source::dummy(code))).unwrap();
    match alpha::transform(&mut ast.root) {
        Ok(()) => panic!("alpha transform of '{}' should fail", code),
        Err(e) => e.to_string(),
    }
}

/// Collects every `VarRef` symbol with the given unique name.
fn find_refs(e: &Expr, name: &str) -> Vec<Rc<Symbol>> {
    let mut out = Vec::new();
    collect_refs(e, name, &mut out);
    out
}

fn collect_refs(e: &Expr, name: &str, out: &mut Vec<Rc<Symbol>>) {
    if let Expr::VarRef { symbol, .. } = e {
        if symbol.name == name {
            out.push(Rc::clone(symbol));
        }
    }
    rucaml::ast::visit_children(e, &mut |child| collect_refs(child, name, out));
}

#[test]
fn test_flat_scope() {
    let ast = transformed("let test = 42 in test");
    let binder = match &ast.root {
        Expr::Let { symbol, .. } => Rc::clone(symbol),
        other => panic!("expected Let, got {:?}", other),
    };
    assert_eq!(binder.name, "test$t1");
    assert_eq!(binder.display_name, "test");
    let refs = find_refs(&ast.root, "test$t1");
    assert_eq!(refs.len(), 1);
    assert!(Rc::ptr_eq(&binder, &refs[0]));
}

#[test]
fn test_nested_shadowing() {
    let ast = transformed("let test = 42 in let test = 42 in test");
    let inner = match &ast.root {
        Expr::Let { body, .. } => match body.as_ref() {
            Expr::Let { symbol, .. } => Rc::clone(symbol),
            other => panic!("expected inner Let, got {:?}", other),
        },
        other => panic!("expected Let, got {:?}", other),
    };
    assert_eq!(inner.name, "test$t2");
    let refs = find_refs(&ast.root, "test$t2");
    assert_eq!(refs.len(), 1);
    assert!(Rc::ptr_eq(&inner, &refs[0]));
    // the outer binder is never referenced
    assert!(find_refs(&ast.root, "test$t1").is_empty());
}

#[test]
fn test_match_scoping() {
    // The some-binding shadows `a` only in the Some arm.
    let ast = transformed("let a = 42 in match Some a with Some a -> a | None -> a");
    match &ast.root {
        Expr::Let { symbol, body, .. } => {
            assert_eq!(symbol.name, "a$t1");
            match body.as_ref() {
                Expr::Match {
                    target,
                    if_some,
                    if_none,
                    some_sym,
                    ..
                } => {
                    assert_eq!(some_sym.name, "a$t2");
                    match target.as_ref() {
                        Expr::Some { child, .. } => match child.as_ref() {
                            Expr::VarRef { symbol: s, .. } => assert_eq!(s.name, "a$t1"),
                            other => panic!("expected VarRef, got {:?}", other),
                        },
                        other => panic!("expected Some, got {:?}", other),
                    }
                    match if_some.as_ref() {
                        Expr::VarRef { symbol: s, .. } => {
                            assert_eq!(s.name, "a$t2");
                            assert!(Rc::ptr_eq(s, some_sym));
                        }
                        other => panic!("expected VarRef, got {:?}", other),
                    }
                    match if_none.as_ref() {
                        Expr::VarRef { symbol: s, .. } => assert_eq!(s.name, "a$t1"),
                        other => panic!("expected VarRef, got {:?}", other),
                    }
                }
                other => panic!("expected Match, got {:?}", other),
            }
        }
        other => panic!("expected Let, got {:?}", other),
    }
}

#[test]
fn test_let_tuple() {
    let ast = transformed("let (a, b, c) = x in b");
    match &ast.root {
        Expr::LetTuple { symbols, body, .. } => {
            let names: Vec<_> = symbols.iter().map(|s| s.name.clone()).collect();
            assert_eq!(names, ["a$t1", "b$t2", "c$t3"]);
            match body.as_ref() {
                Expr::VarRef { symbol, .. } => assert!(Rc::ptr_eq(symbol, &symbols[1])),
                other => panic!("expected VarRef, got {:?}", other),
            }
        }
        other => panic!("expected LetTuple, got {:?}", other),
    }
}

#[test]
fn test_let_tuple_duplicate_binder() {
    let err = transform_err("let (a, b, b) = x in 42");
    assert!(err.contains("Duplicate"), "got: {}", err);
}

#[test]
fn test_duplicate_binder_with_tuple_bound() {
    transform_err("let (a, b, b) = (1, 2, 3) in ()");
}

#[test]
fn test_let_rec_numbers_function_before_params() {
    let ast = transformed("let rec f a b c = b in f");
    match &ast.root {
        Expr::LetRec { func, body, .. } => {
            assert_eq!(func.symbol.name, "f$t1");
            let params: Vec<_> = func.params.iter().map(|p| p.symbol.name.clone()).collect();
            assert_eq!(params, ["a$t2", "b$t3", "c$t4"]);
            match func.body.as_ref() {
                Expr::VarRef { symbol, .. } => {
                    assert!(Rc::ptr_eq(symbol, &func.params[1].symbol))
                }
                other => panic!("expected VarRef, got {:?}", other),
            }
            match body.as_ref() {
                Expr::VarRef { symbol, .. } => assert!(Rc::ptr_eq(symbol, &func.symbol)),
                other => panic!("expected VarRef, got {:?}", other),
            }
        }
        other => panic!("expected LetRec, got {:?}", other),
    }
}

#[test]
fn test_recursive_reference_resolves_to_function() {
    let ast = transformed("let rec f a = f in 42");
    match &ast.root {
        Expr::LetRec { func, .. } => match func.body.as_ref() {
            Expr::VarRef { symbol, .. } => {
                assert_eq!(symbol.name, "f$t1");
                assert!(Rc::ptr_eq(symbol, &func.symbol));
            }
            other => panic!("expected VarRef, got {:?}", other),
        },
        other => panic!("expected LetRec, got {:?}", other),
    }
}

#[test]
fn test_param_shadows_function_name() {
    let ast = transformed("let rec f f = f in f");
    match &ast.root {
        Expr::LetRec { func, body, .. } => {
            assert_eq!(func.symbol.name, "f$t1");
            assert_eq!(func.params[0].symbol.name, "f$t2");
            match func.body.as_ref() {
                Expr::VarRef { symbol, .. } => {
                    assert!(Rc::ptr_eq(symbol, &func.params[0].symbol))
                }
                other => panic!("expected VarRef, got {:?}", other),
            }
            match body.as_ref() {
                Expr::VarRef { symbol, .. } => assert!(Rc::ptr_eq(symbol, &func.symbol)),
                other => panic!("expected VarRef, got {:?}", other),
            }
        }
        other => panic!("expected LetRec, got {:?}", other),
    }
}

#[test]
fn test_duplicate_parameter() {
    let err = transform_err("let rec f a b b = 42 in 42");
    assert!(err.contains("Duplicate"), "got: {}", err);
}

#[test]
fn test_external_symbol_keeps_display_name() {
    let ast = transformed("x");
    match &ast.root {
        Expr::VarRef { symbol, .. } => {
            assert_eq!(symbol.name, symbol.display_name);
            assert_eq!(symbol.name, "x");
        }
        other => panic!("expected VarRef, got {:?}", other),
    }
}

#[test]
fn test_underscore_reference_is_rejected() {
    let err = transform_err("_");
    assert!(err.contains("Cannot refer '_' variable"), "got: {}", err);
}

#[test]
fn test_underscore_binder_is_accepted() {
    let ast = transformed("let _ = 1 in 2");
    match &ast.root {
        Expr::Let { symbol, .. } => {
            assert!(symbol.is_ignored());
            assert_eq!(symbol.name, "_$t1");
        }
        other => panic!("expected Let, got {:?}", other),
    }
}

#[test]
fn test_binder_not_in_scope_in_its_own_bound() {
    // `x` in the bound expression refers to the outer x
    let ast = transformed("let x = 1 in let x = x + 1 in x");
    match &ast.root {
        Expr::Let { body, .. } => match body.as_ref() {
            Expr::Let { bound, .. } => {
                let refs = find_refs(bound, "x$t1");
                assert_eq!(refs.len(), 1);
            }
            other => panic!("expected inner Let, got {:?}", other),
        },
        other => panic!("expected Let, got {:?}", other),
    }
}

#[test]
fn test_all_binder_names_unique() {
    let ast = transformed(
        "let a = 1 in let a = 2 in let rec f a = match Some a with Some a -> a | None -> 0 \
         in let (a, b) = (f 1, a) in b",
    );
    let mut names = Vec::new();
    collect_binders(&ast.root, &mut names);
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total, "binder names must be unique: {:?}", names);
}

fn collect_binders(e: &Expr, out: &mut Vec<String>) {
    match e {
        Expr::Let { symbol, .. } => out.push(symbol.name.clone()),
        Expr::LetRec { func, .. } => {
            out.push(func.symbol.name.clone());
            for p in &func.params {
                out.push(p.symbol.name.clone());
            }
        }
        Expr::LetTuple { symbols, .. } => {
            for s in symbols {
                out.push(s.name.clone());
            }
        }
        Expr::Match { some_sym, .. } => out.push(some_sym.name.clone()),
        _ => {}
    }
    rucaml::ast::visit_children(e, &mut |child| collect_binders(child, out));
}
