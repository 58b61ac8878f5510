use crate::context::{CompilationContext, StateIndicatorId};
use crate::error::AnalysisError;
use crate::traverse::Pass;

/// Decide which new commitments have their preimage encrypted to the owner
pub struct EncryptionRequirements;

impl Pass for EncryptionRequirements {
    fn name(&self) -> &'static str {
        "encryption-requirements"
    }

    fn run(&self, ctx: &mut CompilationContext) -> Result<(), AnalysisError> {
        for i in 0..ctx.state_indicators().len() {
            ctx.update_encryption(StateIndicatorId(i as u32));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::context::ScopeId;
    use crate::options::AnalysisOptions;
    use crate::test_support::{analysed, analysed_with};
    use veil_ast::{AstBuilder, Decorate};

    fn restricted_increment() -> serde_json::Value {
        let mut b = AstBuilder::new();
        let admin = b.state_var("admin", "address");
        let total = b.state_var("total", "uint256").secret();
        let amount = b.param("amount", "uint256").secret();
        let sender = b.msg_sender();
        let owner = b.ident(&admin);
        let check = b.binary(sender, "==", owner);
        let check = b.require(check);
        let lhs = b.ident(&total);
        let rhs = b.ident(&amount);
        let set = b.assign_stmt(lhs, "=", rhs);
        let f = b.function("set", vec![amount], vec![check, set]);
        let c = b.contract("Registry", vec![admin.node.clone(), total.node.clone(), f]);
        b.source_unit(vec![c])
    }

    #[test]
    fn foreign_owners_get_encrypted_commitments() {
        let analysis = analysed(restricted_increment()).unwrap();
        let flags = analysis.context().requirements(ScopeId(2)).unwrap();
        assert!(flags.encryption_required);
    }

    #[test]
    fn msg_sender_owners_only_on_request() {
        let source = || {
            let mut b = AstBuilder::new();
            let balances = b.mapping_var("balances", "address", "uint256").secret();
            let amount = b.param("amount", "uint256").secret();
            let base = b.ident(&balances);
            let key = b.msg_sender();
            let lhs = b.index(base, key);
            let rhs = b.ident(&amount);
            let stmt = b.assign_stmt(lhs, "=", rhs);
            let f = b.function("set", vec![amount], vec![stmt]);
            let c = b.contract("Bank", vec![balances.node.clone(), f]);
            b.source_unit(vec![c])
        };
        let analysis = analysed(source()).unwrap();
        assert!(!analysis.context().requirements(ScopeId(2)).unwrap().encryption_required);

        let options = AnalysisOptions {
            encrypt_all_new_commitments: true,
            ..AnalysisOptions::default()
        };
        let analysis = analysed_with(source(), options).unwrap();
        assert!(analysis.context().requirements(ScopeId(2)).unwrap().encryption_required);
    }
}
