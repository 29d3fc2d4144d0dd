//! Record layout for C, C++, and Objective-C declarations.
//!
//! Given a fully elaborated record declaration and target ABI parameters,
//! computes the byte offset of every field, the offsets of direct and
//! virtual base subobjects, total size, data size, alignment, and the
//! vtable/vbtable pointer placements, under either the Itanium or the
//! Microsoft family of layout rules.

pub mod decl;
pub mod dump;
pub mod external;
pub mod key_function;
pub mod queries;
pub mod record_layout;
pub mod target;
pub mod type_layout;

#[cfg(test)]
mod unit_tests;

pub use decl::{
    AddressSpace, BaseSpecifier, DeclContext, FieldDecl, FieldRef, MethodDecl, MethodRef,
    RecordDecl, RecordDef, RecordId, TagKind, TemplateKind, Type,
};
pub use external::{ExternalLayoutSource, ExternalRecordLayout};
pub use key_function::compute_key_function;
pub use queries::{QueryError, offset_of_named_field, type_align_of, type_size_of};
pub use target::{CxxAbi, TailPaddingUse, Target};
pub use type_layout::{
    ASTRecordLayout, AlignmentRequirement, CxxRecordLayoutInfo, TypeLayout, TypeLayoutCache,
    VBaseInfo,
};
