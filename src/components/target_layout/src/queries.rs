use crate::{
    decl::{RecordId, Type},
    type_layout::TypeLayoutCache,
};
use data_units::{BitUnits, ByteUnits};
use thiserror::Error;

/// Failure modes of the checked query surface.
///
/// The layout entry points assert on malformed input (an incomplete record
/// is a frontend bug by the time layout runs); these queries instead report
/// failure, for callers probing types they don't control.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("record declaration is incomplete")]
    Incomplete,
    #[error("type has no object representation")]
    Invalid,
    #[error("no field with the given name")]
    NoSuchField,
}

fn check_sized(ctx: &TypeLayoutCache, ty: &Type) -> Result<(), QueryError> {
    match ty {
        Type::Record(id) => {
            if !ctx.decls[*id].is_complete {
                return Err(QueryError::Incomplete);
            }
            Ok(())
        }
        Type::FixedArray { element, .. } => check_sized(ctx, element),
        Type::IncompleteArray(_) => Err(QueryError::Incomplete),
        _ => Ok(()),
    }
}

pub fn type_size_of(ctx: &TypeLayoutCache, ty: &Type) -> Result<ByteUnits, QueryError> {
    check_sized(ctx, ty)?;
    Ok(ctx.get(ty).width)
}

pub fn type_align_of(ctx: &TypeLayoutCache, ty: &Type) -> Result<ByteUnits, QueryError> {
    // Alignment only needs the element type, so incomplete arrays are fine.
    match ty.base_element_type() {
        Type::Record(id) if !ctx.decls[*id].is_complete => return Err(QueryError::Incomplete),
        _ => {}
    }
    Ok(ctx.get(ty).alignment)
}

/// Bit offset of a named member, looking through anonymous record members
/// the way indirect fields resolve.
pub fn offset_of_named_field(
    ctx: &TypeLayoutCache,
    record: RecordId,
    name: &str,
) -> Result<BitUnits, QueryError> {
    let decl = &ctx.decls[record];
    if !decl.is_complete {
        return Err(QueryError::Incomplete);
    }

    let layout = if decl.is_record() {
        ctx.record_layout(record)
    } else {
        ctx.objc_layout(record, None)
    };

    for (index, field) in decl.fields.iter().enumerate() {
        match &field.name {
            Some(field_name) if field_name == name => {
                return Ok(layout.field_offset(index));
            }
            None => {
                // An anonymous record member contributes its own fields.
                let Some(inner) = field.ty.as_record() else {
                    continue;
                };
                if let Ok(inner_offset) = offset_of_named_field(ctx, inner, name) {
                    return Ok(layout.field_offset(index) + inner_offset);
                }
            }
            Some(_) => {}
        }
    }

    Err(QueryError::NoSuchField)
}
