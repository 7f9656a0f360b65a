//! Nested protected scopes

use super_catch::{Fault, chain_depth, protect, trigger};

#[test]
fn test_fault_resumes_innermost_scope_only() {
    let outer = protect(|| {
        assert_eq!(chain_depth(), 1);
        let inner = protect(|| {
            assert_eq!(chain_depth(), 2);
            trigger::null_dereference();
            "inner completed"
        });
        // Back in the outer body with its checkpoint still in place.
        assert_eq!(chain_depth(), 1);
        inner.unwrap_err().kind()
    });
    assert_eq!(outer.unwrap(), Fault::InvalidMemoryAccess);
    assert_eq!(chain_depth(), 0);
}

#[test]
fn test_outer_scope_still_catches_after_inner_fault() {
    let outer = protect(|| {
        let inner = protect(trigger::illegal_instruction);
        assert_eq!(inner.unwrap_err().kind(), Fault::IllegalInstruction);
        trigger::breakpoint();
    });
    assert_eq!(outer.unwrap_err().kind(), Fault::Trap);
    assert_eq!(chain_depth(), 0);
}

#[test]
fn test_deep_nesting() {
    /// Returns the fault and the number of scopes enclosing the one that
    /// caught it.
    fn nest(levels: usize) -> Result<(), (Fault, usize)> {
        let enclosing = chain_depth();
        let result = protect(|| {
            if levels > 1 {
                nest(levels - 1)
            } else {
                trigger::divide_by_zero();
                Ok(())
            }
        });
        match result {
            Ok(inner) => inner,
            Err(e) => {
                assert_eq!(chain_depth(), enclosing);
                Err((e.kind(), enclosing))
            }
        }
    }

    assert_eq!(nest(16), Err((Fault::ArithmeticFault, 15)));
    assert_eq!(chain_depth(), 0);
}

#[test]
fn test_sibling_scopes_are_independent() {
    let outer = protect(|| {
        let first = protect(trigger::null_dereference).map_err(|e| e.kind());
        let second = protect(|| 5).map_err(|e| e.kind());
        let third = protect(trigger::breakpoint).map_err(|e| e.kind());
        (first, second, third)
    })
    .unwrap();

    assert_eq!(outer.0, Err(Fault::InvalidMemoryAccess));
    assert_eq!(outer.1, Ok(5));
    assert_eq!(outer.2, Err(Fault::Trap));
}
