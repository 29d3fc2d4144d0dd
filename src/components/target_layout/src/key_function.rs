use crate::{
    decl::{MethodRef, RecordId, TemplateKind},
    type_layout::TypeLayoutCache,
};

/// Finds the method that anchors a class's vtable: the first virtual,
/// non-pure, user-provided method in declaration order whose definition is
/// not inline in any of the ways the ABI cares about.
pub fn compute_key_function(ctx: &TypeLayoutCache, rd: RecordId) -> Option<MethodRef> {
    let record = &ctx.decls[rd];

    // A class that isn't polymorphic doesn't have a key function.
    if !record.is_polymorphic() {
        return None;
    }

    // Neither does a class that is not externally visible; assigning one
    // wouldn't affect the ABI.
    if !record.is_externally_visible {
        return None;
    }

    // Template instantiations don't have key functions, per Itanium C++ ABI
    // 5.2.6. Same behavior as GCC.
    if matches!(
        record.template_kind,
        TemplateKind::ImplicitInstantiation | TemplateKind::ExplicitInstantiationDefinition
    ) {
        return None;
    }

    let allow_inline_functions = ctx.target.can_key_function_be_inline;

    for (index, method) in record.methods.iter().enumerate() {
        if !method.is_virtual {
            continue;
        }

        if method.is_pure {
            continue;
        }

        // Implicit members are always marked inline, but they don't have a
        // body until they're defined.
        if method.is_implicit {
            continue;
        }

        if method.is_inline_specified {
            continue;
        }

        if method.has_inline_body {
            continue;
        }

        // Inline deleted or defaulted functions don't qualify either.
        if !method.is_user_provided {
            continue;
        }

        // In certain ABIs, a function whose out-of-line definition is marked
        // inline doesn't qualify.
        if !allow_inline_functions && method.has_inline_definition {
            continue;
        }

        return Some(MethodRef {
            record: rd,
            index: index as u32,
        });
    }

    None
}
