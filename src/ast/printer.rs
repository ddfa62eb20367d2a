//! Indented AST dump for debugging.

use std::io::{self, Write};

use super::{Expr, TypeExpr, AST};

pub fn println(ast: &AST) -> io::Result<()> {
    print(ast, &mut io::stdout())
}

pub fn print<W: Write>(ast: &AST, w: &mut W) -> io::Result<()> {
    writeln!(w, "AST for {}:", ast.file.path)?;
    for decl in &ast.type_decls {
        writeln!(w, "{}TypeDecl ({}) ({})", indent(1), decl.name, decl.span)?;
        print_type_expr(w, &decl.type_expr, 2)?;
    }
    print_expr(w, &ast.root, 1)
}

fn indent(depth: usize) -> String {
    "-   ".repeat(depth)
}

fn print_expr<W: Write>(w: &mut W, e: &Expr, depth: usize) -> io::Result<()> {
    use Expr::*;

    let label = match e {
        Unit { .. } => "Unit".to_string(),
        Bool { .. } => "Bool".to_string(),
        Int { .. } => "Int".to_string(),
        Float { .. } => "Float".to_string(),
        String { .. } => "String ()".to_string(),
        VarRef { symbol, .. } => format!("VarRef ({})", symbol.display_name),
        Unary { op, .. } => match op {
            super::UnaryOp::Not => "Not".to_string(),
            super::UnaryOp::Neg => "Neg".to_string(),
            super::UnaryOp::FNeg => "FNeg".to_string(),
        },
        Binary { op, .. } => binop_name(*op).to_string(),
        If { .. } => "If".to_string(),
        Let { symbol, .. } => format!("Let ({})", symbol.display_name),
        LetRec { func, .. } => {
            let mut parts = vec![func.symbol.display_name.clone()];
            parts.extend(func.params.iter().map(|p| p.symbol.display_name.clone()));
            format!("LetRec (fun {})", parts.join(" "))
        }
        LetTuple { symbols, .. } => {
            let names: Vec<_> = symbols.iter().map(|s| s.display_name.clone()).collect();
            format!("LetTuple ({})", names.join(", "))
        }
        Apply { .. } => "Apply".to_string(),
        Tuple { .. } => "Tuple".to_string(),
        ArrayCreate { .. } => "ArrayCreate".to_string(),
        ArraySize { .. } => "ArraySize".to_string(),
        Get { .. } => "Get".to_string(),
        Put { .. } => "Put".to_string(),
        Some { .. } => "Some".to_string(),
        None { .. } => "None".to_string(),
        Match { some_sym, .. } => format!("Match ({})", some_sym.display_name),
        Typed { .. } => "Typed".to_string(),
    };
    writeln!(w, "{}{} ({})", indent(depth), label, e.span())?;

    // Type annotations print before the expression children, the way
    // the nodes are laid out in source.
    match e {
        Let {
            type_ann,
            bound,
            body,
            ..
        } => {
            if let std::option::Option::Some(ann) = type_ann {
                print_type_expr(w, ann, depth + 1)?;
            }
            print_expr(w, bound, depth + 1)?;
            print_expr(w, body, depth + 1)
        }
        LetRec { func, body, .. } => {
            for p in &func.params {
                if let std::option::Option::Some(ann) = &p.type_ann {
                    print_type_expr(w, ann, depth + 1)?;
                }
            }
            if let std::option::Option::Some(ret) = &func.ret_type {
                print_type_expr(w, ret, depth + 1)?;
            }
            print_expr(w, &func.body, depth + 1)?;
            print_expr(w, body, depth + 1)
        }
        LetTuple {
            type_ann,
            bound,
            body,
            ..
        } => {
            if let std::option::Option::Some(ann) = type_ann {
                print_type_expr(w, ann, depth + 1)?;
            }
            print_expr(w, bound, depth + 1)?;
            print_expr(w, body, depth + 1)
        }
        Typed {
            child, type_expr, ..
        } => {
            print_expr(w, child, depth + 1)?;
            print_type_expr(w, type_expr, depth + 1)
        }
        _ => {
            let mut result = Ok(());
            super::visit_children(e, &mut |child| {
                if result.is_ok() {
                    result = print_expr(w, child, depth + 1);
                }
            });
            result
        }
    }
}

fn print_type_expr<W: Write>(w: &mut W, t: &TypeExpr, depth: usize) -> io::Result<()> {
    match t {
        TypeExpr::Ctor { name, args, span } => {
            if args.is_empty() {
                writeln!(w, "{}CtorType ({}) ({})", indent(depth), name, span)?;
            } else {
                writeln!(
                    w,
                    "{}CtorType ({} ({})) ({})",
                    indent(depth),
                    name,
                    args.len(),
                    span
                )?;
            }
            for a in args {
                print_type_expr(w, a, depth + 1)?;
            }
            Ok(())
        }
        TypeExpr::Tuple { elems, span } => {
            writeln!(w, "{}TupleType ({}) ({})", indent(depth), elems.len(), span)?;
            for e in elems {
                print_type_expr(w, e, depth + 1)?;
            }
            Ok(())
        }
        TypeExpr::Func { params, ret, span } => {
            writeln!(w, "{}FuncType ({})", indent(depth), span)?;
            for p in params {
                print_type_expr(w, p, depth + 1)?;
            }
            print_type_expr(w, ret, depth + 1)
        }
    }
}

fn binop_name(op: super::BinOp) -> &'static str {
    use super::BinOp::*;
    match op {
        Add => "Add",
        Sub => "Sub",
        Mul => "Mul",
        Div => "Div",
        Mod => "Mod",
        FAdd => "FAdd",
        FSub => "FSub",
        FMul => "FMul",
        FDiv => "FDiv",
        Eq => "Eq",
        NotEq => "NotEq",
        Less => "Less",
        LessEq => "LessEq",
        Greater => "Greater",
        GreaterEq => "GreaterEq",
        And => "And",
        Or => "Or",
    }
}
