//! The compilation pipeline.
//!
//! Glues the phases together: lex → parse → alpha transform → type
//! inference → IR lowering → reference elimination → closure
//! conversion. Code generation consumes the resulting [`Program`].

use std::rc::Rc;

use anyhow::{Context, Result};

use crate::alpha;
use crate::ast::AST;
use crate::closure::{self, Program};
use crate::ir::{elim_ref, lower};
use crate::lexer::Lexer;
use crate::parser;
use crate::source::Source;
use crate::types::{self, Env};

/// A lexer over the source with errors routed to stderr.
pub fn lex(src: &Rc<Source>) -> Lexer {
    Lexer::new(Rc::clone(src)).with_error_callback(Box::new(|msg, pos| {
        eprintln!("{} at {}", msg, pos);
    }))
}

/// Parses the source into an AST.
pub fn parse_source(src: &Rc<Source>) -> Result<AST> {
    let ast = parser::parse(lex(src)).with_context(|| format!("While parsing {}", src.path))?;
    Ok(ast)
}

/// Checks scoping and types. The AST is alpha-transformed in place and
/// the resulting type environment is returned.
pub fn semantic_analysis(ast: &mut AST) -> Result<Env> {
    alpha::transform(&mut ast.root).with_context(|| {
        format!(
            "While semantic analysis (alpha transform) in {}",
            ast.file.path
        )
    })?;
    let env = types::type_inference(ast).with_context(|| {
        format!(
            "While semantic analysis (type inference) in {}",
            ast.file.path
        )
    })?;
    Ok(env)
}

/// Runs the full front-end and middle-end, producing the
/// closure-converted program.
pub fn emit_ir(src: &Rc<Source>) -> Result<Program> {
    let mut ast = parse_source(src)?;
    let mut env = semantic_analysis(&mut ast)?;
    let mut block = lower::from_ast(&ast.root, &env)
        .with_context(|| format!("While lowering to IR in {}", src.path))?;
    elim_ref::elim_refs(&mut block, &mut env);
    Ok(closure::transform(block, env))
}
