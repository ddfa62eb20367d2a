//! Reference elimination.
//!
//! After lowering, a `ref` either names a binding defined somewhere in
//! the program or a free name. This pass rewrites the latter into
//! `xref` instructions and records the name and its inferred type in
//! the external symbols table, so code generation sees every external
//! linkage in one place.

use crate::types::Env;

use super::{Block, InsnKind};

pub fn elim_refs(block: &mut Block, env: &mut Env) {
    for insn in &mut block.insns {
        let external = match &insn.kind {
            InsnKind::Ref(name) if !env.table.contains_key(name) => Some(name.clone()),
            _ => None,
        };
        if let Some(name) = external {
            env.externals
                .entry(name.clone())
                .or_insert_with(|| insn.ty.clone());
            insn.kind = InsnKind::XRef(name);
            continue;
        }
        match &mut insn.kind {
            InsnKind::If {
                then_blk, else_blk, ..
            } => {
                elim_refs(then_blk, env);
                elim_refs(else_blk, env);
            }
            InsnKind::Fun { body, .. } => elim_refs(body, env),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Insn;
    use crate::types::Type;

    #[test]
    fn test_unbound_ref_becomes_xref() {
        let mut env = Env::new();
        env.table.insert("a$t1".to_string(), Type::Int);
        let mut block = Block {
            name: "program".to_string(),
            insns: vec![
                Insn {
                    ident: "$k1".to_string(),
                    kind: InsnKind::Ref("a$t1".to_string()),
                    ty: Type::Int,
                },
                Insn {
                    ident: "$k2".to_string(),
                    kind: InsnKind::Ref("x".to_string()),
                    ty: Type::Int,
                },
            ],
        };
        elim_refs(&mut block, &mut env);
        assert!(matches!(&block.insns[0].kind, InsnKind::Ref(n) if n == "a$t1"));
        assert!(matches!(&block.insns[1].kind, InsnKind::XRef(n) if n == "x"));
        assert_eq!(env.externals["x"].to_string(), "int");
    }
}
