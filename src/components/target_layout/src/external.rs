use crate::decl::RecordId;
use data_units::{BitUnits, ByteUnits};
use indexmap::IndexMap;

/// Offsets dictated by an external source (a precompiled header, a debugger,
/// an AST deserializer).
///
/// An `alignment` of zero means the source had no alignment information and
/// the builder must infer it; see the packed-inference rules in the builder.
#[derive(Clone, Debug, Default)]
pub struct ExternalRecordLayout {
    pub size: BitUnits,
    pub alignment: BitUnits,
    /// Bit offsets keyed by field declaration index.
    pub field_offsets: IndexMap<u32, BitUnits>,
    pub base_offsets: IndexMap<RecordId, ByteUnits>,
    pub vbase_offsets: IndexMap<RecordId, ByteUnits>,
}

pub trait ExternalLayoutSource {
    /// Returns the layout this source dictates for `record`, if any.
    fn layout_record(&self, record: RecordId) -> Option<ExternalRecordLayout>;
}
