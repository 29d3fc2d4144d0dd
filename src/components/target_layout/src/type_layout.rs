use crate::{
    decl::{DeclContext, FieldRef, MethodRef, RecordDecl, RecordId, Type},
    external::ExternalLayoutSource,
    key_function,
    record_layout::{
        empty_subobjects::EmptySubobjectMap, itanium::ItaniumRecordLayoutBuilder, microsoft,
    },
    target::{TailPaddingUse, Target},
};
use data_units::{BitUnits, ByteUnits};
use diagnostics::Diagnostics;
use indexmap::IndexMap;
use once_map::unsync::OnceMap;
use std::cell::RefCell;
use std::fmt::Debug;

#[derive(Copy, Clone, Debug, Default)]
pub enum AlignmentRequirement {
    #[default]
    None,
    RequiredByTypedefAttribute,
    RequiredByRecordAttribute,
}

#[derive(Copy, Clone, Debug)]
pub struct TypeLayout {
    pub width: ByteUnits,
    pub alignment: ByteUnits,
    pub unadjusted_alignment: ByteUnits,
    pub alignment_requirement: AlignmentRequirement,
}

impl TypeLayout {
    pub fn basic(size: ByteUnits) -> Self {
        Self {
            width: size,
            alignment: size,
            unadjusted_alignment: size,
            alignment_requirement: AlignmentRequirement::None,
        }
    }
}

/// Placement of one virtual base within a completed layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VBaseInfo {
    pub offset: ByteUnits,
    pub has_vtordisp: bool,
}

/// The C++-only portion of a completed record layout.
#[derive(Debug)]
pub struct CxxRecordLayoutInfo {
    /// Size without virtual bases or their padding.
    pub non_virtual_size: ByteUnits,
    pub non_virtual_alignment: ByteUnits,
    pub size_of_largest_empty_subobject: ByteUnits,
    pub primary_base: Option<RecordId>,
    pub primary_base_is_virtual: bool,
    /// The class introduces its own virtual function table pointer.
    pub has_own_vfptr: bool,
    /// A vfptr exists at offset zero (own or through the primary base).
    pub has_extendable_vfptr: bool,
    /// Microsoft only; `None` when the class has no virtual bases.
    pub vbptr_offset: Option<ByteUnits>,
    /// Microsoft only; the non-virtual base whose vbptr this class reuses.
    pub base_sharing_vbptr: Option<RecordId>,
    pub has_zero_sized_subobject: bool,
    pub leads_with_zero_sized_base: bool,
    /// Direct non-virtual bases to their offsets, in layout order.
    pub base_offsets: IndexMap<RecordId, ByteUnits>,
    /// All virtual bases to their placements, in layout order.
    pub vbase_offsets: IndexMap<RecordId, VBaseInfo>,
}

/// An immutable, completed record layout.
#[derive(Debug)]
pub struct ASTRecordLayout {
    pub size: ByteUnits,
    /// Size without tail padding.
    pub data_size: ByteUnits,
    pub alignment: ByteUnits,
    /// Maximum of the natural alignments seen, before packing adjustments.
    pub unadjusted_alignment: ByteUnits,
    /// Alignment the record must obey (used by the Microsoft ABI).
    pub required_alignment: ByteUnits,
    /// One bit offset per field, in declaration order.
    pub field_offsets: Vec<BitUnits>,
    pub cxx: Option<CxxRecordLayoutInfo>,
}

impl ASTRecordLayout {
    pub fn field_offset(&self, index: usize) -> BitUnits {
        self.field_offsets[index]
    }

    pub fn cxx(&self) -> &CxxRecordLayoutInfo {
        self.cxx.as_ref().expect("layout has C++ info")
    }

    pub fn base_class_offset(&self, base: RecordId) -> ByteUnits {
        *self
            .cxx()
            .base_offsets
            .get(&base)
            .expect("base offset exists")
    }

    pub fn vbase_class_offset(&self, base: RecordId) -> ByteUnits {
        self.cxx()
            .vbase_offsets
            .get(&base)
            .expect("virtual base offset exists")
            .offset
    }

    pub fn has_vbptr(&self) -> bool {
        self.cxx
            .as_ref()
            .map_or(false, |cxx| cxx.vbptr_offset.is_some())
    }

    /// The class carries a vbptr it did not inherit from a non-virtual base.
    pub fn has_own_vbptr(&self) -> bool {
        self.cxx
            .as_ref()
            .map_or(false, |cxx| cxx.vbptr_offset.is_some() && cxx.base_sharing_vbptr.is_none())
    }

    pub fn has_own_vfptr(&self) -> bool {
        self.cxx.as_ref().map_or(false, |cxx| cxx.has_own_vfptr)
    }

    pub fn has_extendable_vfptr(&self) -> bool {
        self.cxx
            .as_ref()
            .map_or(false, |cxx| cxx.has_extendable_vfptr)
    }

    pub fn has_zero_sized_subobject(&self) -> bool {
        self.cxx
            .as_ref()
            .map_or(false, |cxx| cxx.has_zero_sized_subobject)
    }

    pub fn leads_with_zero_sized_base(&self) -> bool {
        self.cxx
            .as_ref()
            .map_or(false, |cxx| cxx.leads_with_zero_sized_base)
    }
}

/// Does the target C++ ABI require skipping the tail padding of this record
/// when it is used as a base (or, equivalently, collapsing its data size to
/// its full size)?
fn must_skip_tail_padding(rule: TailPaddingUse, record: &RecordDecl) -> bool {
    // An empty record's storage is all tail padding, so it keeps data size
    // zero regardless of PODness.
    if record.is_empty() {
        return false;
    }

    match rule {
        TailPaddingUse::Always => false,
        // FIXME: Itanium also excludes records with over-wide bitfields from
        // POD-for-layout; we match the original and do not.
        TailPaddingUse::UnlessPod03 => record.is_pod(),
        TailPaddingUse::UnlessPod11 => record.is_trivial() && record.is_standard_layout(),
    }
}

/// Computes and memoizes type and record layouts.
///
/// Layout of a record may recursively require the layout of any base or
/// field class; the memo maps tolerate those recursive fills, and a single
/// record is never re-entered.
pub struct TypeLayoutCache<'a> {
    memo: OnceMap<Type, TypeLayout>,
    record_layouts: OnceMap<RecordId, Box<ASTRecordLayout>>,
    objc_layouts: OnceMap<(RecordId, Option<RecordId>), Box<ASTRecordLayout>>,
    key_functions: RefCell<IndexMap<RecordId, Option<MethodRef>>>,
    pub target: &'a Target,
    pub decls: &'a DeclContext,
    pub diagnostics: &'a Diagnostics<'a>,
    pub external_source: Option<&'a dyn ExternalLayoutSource>,
}

impl<'a> Debug for TypeLayoutCache<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeLayoutCache").finish_non_exhaustive()
    }
}

impl<'a> TypeLayoutCache<'a> {
    pub fn new(
        target: &'a Target,
        decls: &'a DeclContext,
        diagnostics: &'a Diagnostics<'a>,
    ) -> Self {
        Self {
            memo: OnceMap::new(),
            record_layouts: OnceMap::new(),
            objc_layouts: OnceMap::new(),
            key_functions: RefCell::new(IndexMap::new()),
            target,
            decls,
            diagnostics,
            external_source: None,
        }
    }

    pub fn with_external_source(mut self, source: &'a dyn ExternalLayoutSource) -> Self {
        self.external_source = Some(source);
        self
    }

    pub fn get(&self, ty: &Type) -> TypeLayout {
        self.memo
            .map_insert_ref(ty, |ty| ty.clone(), |key| self.get_impl(key), |_k, v| *v)
    }

    fn get_impl(&self, ty: &Type) -> TypeLayout {
        match ty {
            Type::Ptr { addr_space, .. } | Type::Reference { addr_space, .. } => {
                self.target.pointer_layout_in(*addr_space)
            }
            Type::FuncPtr => self.target.pointer_layout(),
            Type::Bool => self.target.bool_layout(),
            Type::S8 | Type::U8 => TypeLayout::basic(ByteUnits::of(1)),
            Type::S16 | Type::U16 => TypeLayout::basic(ByteUnits::of(2)),
            Type::S32 | Type::U32 => TypeLayout::basic(ByteUnits::of(4)),
            Type::S64 | Type::U64 => TypeLayout::basic(ByteUnits::of(8)),
            Type::F32 => TypeLayout::basic(ByteUnits::of(4)),
            Type::F64 => TypeLayout::basic(ByteUnits::of(8)),
            Type::Record(id) => {
                let record = &self.decls[*id];
                let layout = if record.is_record() {
                    self.record_layout(*id)
                } else {
                    self.objc_layout(*id, None)
                };

                TypeLayout {
                    width: layout.size,
                    alignment: layout.alignment,
                    unadjusted_alignment: layout.unadjusted_alignment,
                    alignment_requirement: if record.max_alignment.is_zero() {
                        AlignmentRequirement::None
                    } else {
                        AlignmentRequirement::RequiredByRecordAttribute
                    },
                }
            }
            Type::FixedArray { length, element } => {
                let element_info = self.get(element);

                TypeLayout {
                    width: element_info.width * *length,
                    alignment: element_info.alignment,
                    unadjusted_alignment: element_info.alignment,
                    alignment_requirement: element_info.alignment_requirement,
                }
            }
            Type::IncompleteArray(element) => {
                let element_info = self.get(element);

                TypeLayout {
                    width: ByteUnits::ZERO,
                    alignment: element_info.alignment,
                    unadjusted_alignment: element_info.alignment,
                    alignment_requirement: element_info.alignment_requirement,
                }
            }
        }
    }

    /// Returns the cached layout for `record`, building it on first request.
    pub fn record_layout(&self, record: RecordId) -> &ASTRecordLayout {
        self.record_layouts
            .insert(record, |_| Box::new(self.build_record_layout(record)))
    }

    /// Returns the layout of an Objective-C interface, optionally including
    /// an implementation's synthesized ivars.
    pub fn objc_layout(
        &self,
        interface: RecordId,
        implementation: Option<RecordId>,
    ) -> &ASTRecordLayout {
        let record = &self.decls[interface];
        assert!(record.kind.is_interface(), "expected an interface");
        assert!(record.is_complete, "cannot lay out incomplete interface");

        if let Some(implementation) = implementation {
            // An implementation that synthesizes no extra ivars reuses the
            // interface's entry.
            if self.decls[implementation].fields.len() == record.fields.len() {
                return self.objc_layout(interface, None);
            }
        }

        self.objc_layouts.insert((interface, implementation), |_| {
            let laid_out = implementation.unwrap_or(interface);
            let mut builder = ItaniumRecordLayoutBuilder::new(self, None);
            builder.layout_objc(laid_out);

            Box::new(ASTRecordLayout {
                size: builder.size_chars(),
                data_size: builder.data_size_chars(),
                alignment: builder.alignment,
                unadjusted_alignment: builder.unadjusted_alignment,
                required_alignment: builder.alignment,
                field_offsets: builder.field_offsets,
                cxx: None,
            })
        })
    }

    fn build_record_layout(&self, id: RecordId) -> ASTRecordLayout {
        let record = &self.decls[id];
        assert!(record.is_record(), "interfaces use objc_layout");
        assert!(record.is_complete, "cannot lay out incomplete record");

        // The Microsoft builder is only used when no external source can
        // dictate offsets.
        if self.target.cxx_abi.is_microsoft() && self.external_source.is_none() {
            return microsoft::build_record_layout(self, id);
        }

        if self.target.cplusplus {
            let empty_subobjects = EmptySubobjectMap::new(self, id);
            let mut builder = ItaniumRecordLayoutBuilder::new(self, Some(empty_subobjects));
            builder.layout_cxx(id);

            // Some ABIs let derived classes allocate into our tail padding;
            // when this record's padding must not be reused, collapse the
            // distinction.
            let skip_tail_padding = must_skip_tail_padding(self.target.tail_padding_use, record);
            let data_size = if skip_tail_padding {
                builder.size_chars()
            } else {
                builder.data_size_chars()
            };
            let non_virtual_size = if skip_tail_padding {
                data_size
            } else {
                builder.non_virtual_size
            };

            ASTRecordLayout {
                size: builder.size_chars(),
                data_size,
                alignment: builder.alignment,
                unadjusted_alignment: builder.unadjusted_alignment,
                required_alignment: builder.alignment,
                cxx: Some(CxxRecordLayoutInfo {
                    non_virtual_size,
                    non_virtual_alignment: builder.non_virtual_alignment,
                    size_of_largest_empty_subobject: builder
                        .empty_subobjects
                        .as_ref()
                        .map_or(ByteUnits::ZERO, |map| map.size_of_largest_empty_subobject),
                    primary_base: builder.primary_base,
                    primary_base_is_virtual: builder.primary_base_is_virtual,
                    has_own_vfptr: builder.has_own_vfptr,
                    has_extendable_vfptr: record.is_dynamic_class(),
                    vbptr_offset: None,
                    base_sharing_vbptr: None,
                    has_zero_sized_subobject: false,
                    leads_with_zero_sized_base: false,
                    base_offsets: builder.bases,
                    vbase_offsets: builder.vbases,
                }),
                field_offsets: builder.field_offsets,
            }
        } else {
            let mut builder = ItaniumRecordLayoutBuilder::new(self, None);
            builder.layout_record(id);

            ASTRecordLayout {
                size: builder.size_chars(),
                data_size: builder.size_chars(),
                alignment: builder.alignment,
                unadjusted_alignment: builder.unadjusted_alignment,
                required_alignment: builder.alignment,
                field_offsets: builder.field_offsets,
                cxx: None,
            }
        }
    }

    /// Bit offset of a field within its parent record's layout.
    pub fn field_offset(&self, field: FieldRef) -> BitUnits {
        let record = &self.decls[field.record];
        let layout = if record.is_record() {
            self.record_layout(field.record)
        } else {
            self.objc_layout(field.record, None)
        };
        layout.field_offset(field.index as usize)
    }

    /// Bit offset of an indirect field: the anonymous-aggregate chain's
    /// offsets summed.
    pub fn indirect_field_offset(&self, chain: &[FieldRef]) -> BitUnits {
        chain
            .iter()
            .fold(BitUnits::ZERO, |total, field| total + self.field_offset(*field))
    }

    /// Nearly empty per the Itanium ABI: a dynamic class whose non-virtual
    /// part is exactly one vtable pointer.
    pub fn is_nearly_empty(&self, id: RecordId) -> bool {
        self.decls[id].is_dynamic_class()
            && self.record_layout(id).cxx().non_virtual_size == self.target.pointer_width
    }

    pub fn key_function(&self, id: RecordId) -> Option<MethodRef> {
        if !self.target.has_key_functions {
            return None;
        }
        assert!(self.decls[id].is_complete, "key function of forward decl");

        if let Some(entry) = self.key_functions.borrow().get(&id) {
            return *entry;
        }

        let computed = key_function::compute_key_function(self, id);
        self.key_functions.borrow_mut().insert(id, computed);
        computed
    }

    /// Drops a cached key function that turned out not to qualify (its
    /// definition was later seen to be inline).
    pub fn set_non_key_function(&self, method: MethodRef) {
        let mut cache = self.key_functions.borrow_mut();
        if cache.get(&method.record) == Some(&Some(method)) {
            cache.shift_remove(&method.record);
        }
    }

    pub fn dump_record_layout(
        &self,
        record: RecordId,
        w: &mut dyn std::fmt::Write,
        simple: bool,
    ) -> std::fmt::Result {
        crate::dump::dump_record_layout(self, record, w, simple)
    }
}
