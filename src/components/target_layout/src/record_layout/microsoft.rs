//! Microsoft-compatible record layout, matching cl.exe up to the documented
//! oddities.
//!
//! The most important differences from Itanium:
//!
//! * The alignment of bitfields in unions is ignored when computing the
//!   alignment of the union.
//! * A zero-width bitfield occurring after anything other than a non-zero
//!   width bitfield is ignored.
//! * The Itanium vtable pointer is split into a vfptr (virtual function
//!   pointer) and a vbptr (virtual base pointer), each shareable with a
//!   non-virtual base. vfptrs always live at offset 0; vbptrs land after
//!   non-virtual bases but before fields.
//! * Virtual bases sometimes require a vtordisp field laid out immediately
//!   before them, used with virtual overrides during construction and
//!   destruction.
//! * Zero-sized bases are kept from aliasing by padding rules keyed on
//!   whether one side has a zero-sized subobject and the other leads with a
//!   zero-sized base.
//! * There is no distinction between data size and non-virtual size.

use crate::{
    decl::{FieldDecl, MethodRef, RecordId},
    type_layout::{ASTRecordLayout, CxxRecordLayoutInfo, TypeLayoutCache, VBaseInfo},
};
use data_units::{BitUnits, ByteUnits};
use indexmap::{IndexMap, IndexSet};

/// Size and alignment of one layout element, adjusted for `#pragma pack` and
/// alignment attributes.
#[derive(Copy, Clone, Debug, Default)]
struct ElementInfo {
    size: ByteUnits,
    alignment: ByteUnits,
}

pub fn build_record_layout(ctx: &TypeLayoutCache, id: RecordId) -> ASTRecordLayout {
    let mut builder = MicrosoftRecordLayoutBuilder::new(ctx);

    if ctx.target.cplusplus {
        builder.cxx_layout(id);

        ASTRecordLayout {
            size: builder.size,
            data_size: builder.data_size,
            alignment: builder.alignment,
            unadjusted_alignment: builder.alignment,
            required_alignment: builder.required_alignment,
            cxx: Some(CxxRecordLayoutInfo {
                non_virtual_size: builder.data_size,
                non_virtual_alignment: builder.alignment,
                size_of_largest_empty_subobject: ByteUnits::ZERO,
                primary_base: builder.primary_base,
                primary_base_is_virtual: false,
                has_own_vfptr: builder.has_own_vfptr,
                has_extendable_vfptr: builder.has_own_vfptr || builder.primary_base.is_some(),
                vbptr_offset: builder.has_vbptr.then_some(builder.vbptr_offset),
                base_sharing_vbptr: builder.shared_vbptr_base,
                has_zero_sized_subobject: builder.has_zero_sized_subobject,
                leads_with_zero_sized_base: builder.leads_with_zero_sized_base,
                base_offsets: builder.bases,
                vbase_offsets: builder.vbases,
            }),
            field_offsets: builder.field_offsets,
        }
    } else {
        builder.layout(id);

        ASTRecordLayout {
            size: builder.size,
            data_size: builder.size,
            alignment: builder.alignment,
            unadjusted_alignment: builder.alignment,
            required_alignment: builder.required_alignment,
            field_offsets: builder.field_offsets,
            cxx: None,
        }
    }
}

#[derive(Debug)]
pub struct MicrosoftRecordLayoutBuilder<'a> {
    pub ctx: &'a TypeLayoutCache<'a>,

    pub size: ByteUnits,
    pub data_size: ByteUnits,
    pub alignment: ByteUnits,
    /// Maximum allowed field alignment, set by `#pragma pack`.
    pub max_field_alignment: ByteUnits,
    /// The alignment this record must obey, imposed by alignment attributes
    /// on the record itself or one of its fields or bases.
    pub required_alignment: ByteUnits,
    /// The allocation size of the currently active bitfield; meaningless
    /// unless `last_field_is_non_zero_width_bitfield`.
    pub current_bitfield_size: ByteUnits,
    /// Offset of the virtual base table pointer, when one exists.
    pub vbptr_offset: ByteUnits,
    pointer_info: ElementInfo,
    pub primary_base: Option<RecordId>,
    /// The non-virtual base whose vbptr we share.
    pub shared_vbptr_base: Option<RecordId>,
    pub field_offsets: Vec<BitUnits>,
    pub bases: IndexMap<RecordId, ByteUnits>,
    pub vbases: IndexMap<RecordId, VBaseInfo>,
    /// Remaining bits in the current bitfield allocation; meaningless unless
    /// `last_field_is_non_zero_width_bitfield`.
    pub remaining_bits_in_field: BitUnits,
    pub is_union: bool,
    pub last_field_is_non_zero_width_bitfield: bool,
    pub has_own_vfptr: bool,
    pub has_vbptr: bool,
    pub is_64bit: bool,
    /// The class contains a zero-sized member or base, or a base with one.
    pub has_zero_sized_subobject: bool,
    /// The class is zero sized, or its first base is or has this property.
    pub leads_with_zero_sized_base: bool,
}

impl<'a> MicrosoftRecordLayoutBuilder<'a> {
    pub fn new(ctx: &'a TypeLayoutCache<'a>) -> Self {
        Self {
            ctx,
            size: ByteUnits::ZERO,
            data_size: ByteUnits::ZERO,
            alignment: ByteUnits::ONE,
            max_field_alignment: ByteUnits::ZERO,
            required_alignment: ByteUnits::ZERO,
            current_bitfield_size: ByteUnits::ZERO,
            vbptr_offset: ByteUnits::ZERO,
            pointer_info: ElementInfo::default(),
            primary_base: None,
            shared_vbptr_base: None,
            field_offsets: Vec::new(),
            bases: IndexMap::new(),
            vbases: IndexMap::new(),
            remaining_bits_in_field: BitUnits::ZERO,
            is_union: false,
            last_field_is_non_zero_width_bitfield: false,
            has_own_vfptr: false,
            has_vbptr: false,
            is_64bit: false,
            has_zero_sized_subobject: false,
            leads_with_zero_sized_base: false,
        }
    }

    pub fn layout(&mut self, rd: RecordId) {
        self.initialize_layout(rd);
        self.layout_fields(rd);
        self.size = self.size.align_to(self.alignment);
        self.data_size = self.size;
        self.finalize_layout(rd);
    }

    pub fn cxx_layout(&mut self, rd: RecordId) {
        self.initialize_layout(rd);
        self.initialize_cxx_layout(rd);
        self.layout_non_virtual_bases(rd);
        self.layout_fields(rd);
        self.inject_vptrs(rd);
        self.size = self.size.align_to(self.alignment);
        self.data_size = self.size;
        self.layout_virtual_bases(rd);
        self.finalize_layout(rd);
    }

    fn initialize_layout(&mut self, rd: RecordId) {
        let ctx = self.ctx;
        let record = &ctx.decls[rd];

        self.is_union = record.kind.is_union();
        self.is_64bit = ctx.target.is_64bit();

        self.size = ByteUnits::ZERO;
        self.alignment = ByteUnits::ONE;

        // In 64-bit mode an alignment step always runs after laying out
        // virtual bases; in 32-bit mode it only runs when the required
        // alignment ends up nonzero.
        self.required_alignment = if self.is_64bit {
            ByteUnits::ONE
        } else {
            ByteUnits::ZERO
        };
        if !record.max_alignment.is_zero() {
            self.required_alignment = self
                .required_alignment
                .max(ctx.target.to_byte_units(record.max_alignment));
        }

        self.max_field_alignment = ByteUnits::ZERO;
        // Honor the default struct packing maximum alignment flag.
        if let Some(default_max) = ctx.target.default_max_field_alignment {
            self.max_field_alignment = default_max;
        }
        // Honor the packing pragma; MSVC ignores a pack larger than the
        // pointer size.
        if let Some(pack) = record.max_field_alignment {
            if pack <= ctx.target.pointer_width {
                self.max_field_alignment = pack;
            }
        }
        // The packed attribute forces the max field alignment to one.
        if record.is_packed {
            self.max_field_alignment = ByteUnits::ONE;
        }
    }

    fn initialize_cxx_layout(&mut self, _rd: RecordId) {
        let ctx = self.ctx;

        self.has_zero_sized_subobject = false;
        self.leads_with_zero_sized_base = false;
        self.has_own_vfptr = false;
        self.has_vbptr = false;
        self.primary_base = None;
        self.shared_vbptr_base = None;
        self.vbptr_offset = ByteUnits::ZERO;

        // Pointer size and alignment, used for vfptr and vbptr injection.
        self.pointer_info = ElementInfo {
            size: ctx.target.pointer_width,
            alignment: ctx.target.pointer_width,
        };
        // Respect pragma pack.
        if !self.max_field_alignment.is_zero() {
            self.pointer_info.alignment = self.pointer_info.alignment.min(self.max_field_alignment);
        }
    }

    /// Element info for a base, respecting pack and required alignment.
    /// Updates the record alignment and zero-sized tracking as a side
    /// effect.
    fn get_adjusted_element_info(&mut self, layout: &ASTRecordLayout) -> ElementInfo {
        let mut alignment = layout.alignment;

        // Respect pragma pack.
        if !self.max_field_alignment.is_zero() {
            alignment = alignment.min(self.max_field_alignment);
        }

        // Track zero-sized subobjects here where it's already available.
        if layout.has_zero_sized_subobject() {
            self.has_zero_sized_subobject = true;
        }

        // The required alignment doesn't apply to the struct alignment at
        // this point, only the pack-adjusted alignment does.
        self.alignment = self.alignment.max(alignment);
        alignment = alignment.max(layout.required_alignment);

        ElementInfo {
            size: layout.data_size,
            alignment,
        }
    }

    /// Element info for a field, respecting pack and alignment attributes.
    /// Updates `required_alignment` as a side effect because it is most
    /// convenient to do so here.
    fn get_adjusted_field_info(&mut self, field: &FieldDecl) -> ElementInfo {
        let ctx = self.ctx;

        let field_required_alignment = if field.max_alignment.is_zero() {
            ByteUnits::ZERO
        } else {
            ctx.target.to_byte_units(field.max_alignment)
        };

        let field_class = field
            .ty
            .base_element_type()
            .as_record()
            .filter(|record| ctx.decls[*record].is_record());

        let mut info;
        if let Some(field_class) = field_class {
            let layout = ctx.record_layout(field_class);

            // Element info for a layout, respecting pack.
            info = self.get_adjusted_element_info(layout);
            // That produced the non-virtual size, which is correct for bases
            // but not for fields.
            info.size = ctx.get(&field.ty).width;
            // Capture required alignment as a side effect.
            self.required_alignment = self.required_alignment.max(layout.required_alignment);
        } else {
            let type_info = ctx.get(&field.ty);
            info = ElementInfo {
                size: type_info.width,
                alignment: type_info.alignment,
            };

            if field.is_bitfield() && !field_required_alignment.is_zero() {
                info.alignment = info.alignment.max(field_required_alignment);
            }
            // Respect pragma pack.
            if !self.max_field_alignment.is_zero() {
                info.alignment = info.alignment.min(self.max_field_alignment);
            }
        }

        // Respect the packed field attribute.
        if field.is_packed {
            info.alignment = ByteUnits::ONE;
        }

        // Alignment attributes on bitfields impact the alignment rather
        // than the required alignment.
        if !field.is_bitfield() {
            info.alignment = info.alignment.max(field_required_alignment);
            self.required_alignment = self.required_alignment.max(field_required_alignment);
        }

        // MS ignores bitfield alignment in unions when computing the
        // union's own alignment.
        if !(field.is_bitfield() && self.is_union) {
            self.alignment = self.alignment.max(info.alignment);
            if !self.max_field_alignment.is_zero() {
                self.alignment = self.alignment.min(self.max_field_alignment);
            }
        }

        info
    }

    /// Two passes over the non-virtual bases: bases that contain leading
    /// vfptrs first, which guarantees the primary base is laid out first,
    /// then the rest.
    fn layout_non_virtual_bases(&mut self, rd: RecordId) {
        let ctx = self.ctx;
        let mut previous_base_layout: Option<&'a ASTRecordLayout> = None;

        for base in &ctx.decls[rd].bases {
            let base_layout = ctx.record_layout(base.class);

            // Track required alignment for all bases in this pass.
            self.required_alignment = self.required_alignment.max(base_layout.required_alignment);

            // Mark and skip virtual bases.
            if base.is_virtual {
                self.has_vbptr = true;
                continue;
            }

            // Check for a base to share a vbptr with.
            if self.shared_vbptr_base.is_none() && base_layout.has_vbptr() {
                self.shared_vbptr_base = Some(base.class);
                self.has_vbptr = true;
            }

            // Only lay out bases with extendable vfptrs on the first pass.
            if !base_layout.has_extendable_vfptr() {
                continue;
            }

            // If we don't have a primary base yet, this one qualifies.
            if self.primary_base.is_none() {
                self.primary_base = Some(base.class);
                self.leads_with_zero_sized_base = base_layout.leads_with_zero_sized_base();
            }

            self.layout_non_virtual_base(base.class, base_layout, &mut previous_base_layout);
        }

        // Figure out if we need a fresh vfptr for this class: it must
        // declare at least one introducing virtual method.
        if self.primary_base.is_none() && ctx.decls[rd].is_dynamic_class() {
            self.has_own_vfptr = ctx.decls[rd]
                .methods
                .iter()
                .any(|method| method.is_virtual && method.overridden.is_empty());
        }

        // With no primary base, the leading object could itself lead with a
        // zero-sized object, which we track.
        let mut check_leading_layout = self.primary_base.is_none();
        for base in &ctx.decls[rd].bases {
            if base.is_virtual {
                continue;
            }

            let base_layout = ctx.record_layout(base.class);

            // Only lay out bases without extendable vfptrs on the second
            // pass.
            if base_layout.has_extendable_vfptr() {
                continue;
            }

            // If this is the first base laid out, it decides whether we lead
            // with a zero-sized object.
            if check_leading_layout {
                check_leading_layout = false;
                self.leads_with_zero_sized_base = base_layout.leads_with_zero_sized_base();
            }

            self.layout_non_virtual_base(base.class, base_layout, &mut previous_base_layout);
        }

        // Set the vbptr offset if we know it at this point.
        if self.has_vbptr {
            if let Some(shared) = self.shared_vbptr_base {
                let shared_layout = ctx.record_layout(shared);
                self.vbptr_offset = self.bases[&shared]
                    + shared_layout
                        .cxx()
                        .vbptr_offset
                        .expect("shared base has a vbptr");
            }
        }
    }

    fn layout_non_virtual_base(
        &mut self,
        base: RecordId,
        base_layout: &'a ASTRecordLayout,
        previous_base_layout: &mut Option<&'a ASTRecordLayout>,
    ) {
        // Insert padding between two bases when the left one is zero sized
        // or contains a zero-sized subobject and the right one is zero sized
        // or leads with a zero-sized base.
        if previous_base_layout.map_or(false, |prev| prev.has_zero_sized_subobject())
            && base_layout.leads_with_zero_sized_base()
        {
            self.size += ByteUnits::ONE;
        }

        let info = self.get_adjusted_element_info(base_layout);
        let base_offset = self.size.align_to(info.alignment);
        self.bases.insert(base, base_offset);
        self.size = base_offset + base_layout.data_size;
        *previous_base_layout = Some(base_layout);
        self.vbptr_offset = self.size;
    }

    fn layout_fields(&mut self, rd: RecordId) {
        let ctx = self.ctx;

        self.last_field_is_non_zero_width_bitfield = false;
        for field in &ctx.decls[rd].fields {
            self.layout_field(field);
        }
    }

    fn layout_field(&mut self, field: &FieldDecl) {
        if field.is_bitfield() {
            self.layout_bitfield(field);
            return;
        }

        self.last_field_is_non_zero_width_bitfield = false;

        let info = self.get_adjusted_field_info(field);
        if self.is_union {
            self.place_field_at_offset(ByteUnits::ZERO);
            self.size = self.size.max(info.size);
        } else {
            let field_offset = self.size.align_to(info.alignment);
            self.place_field_at_offset(field_offset);
            self.size = field_offset + info.size;
        }
    }

    fn layout_bitfield(&mut self, field: &FieldDecl) {
        let ctx = self.ctx;

        let mut width = BitUnits::of(field.bit_width.expect("field is a bitfield"));
        if width.is_zero() {
            self.layout_zero_width_bitfield(field);
            return;
        }

        let info = self.get_adjusted_field_info(field);

        // Clamp the bitfield to a containable size for the sake of being
        // able to lay it out; the frontend rejects it anyway.
        if width > ctx.target.to_bits(info.size) {
            width = ctx.target.to_bits(info.size);
        }

        // Check if this bitfield fits into the existing allocation. MSVC
        // refuses to pack bitfields of formal types with different sizes
        // into the same allocation.
        if !self.is_union
            && self.last_field_is_non_zero_width_bitfield
            && self.current_bitfield_size == info.size
            && width <= self.remaining_bits_in_field
        {
            self.place_field_at_bit_offset(
                ctx.target.to_bits(self.size) - self.remaining_bits_in_field,
            );
            self.remaining_bits_in_field -= width;
            return;
        }

        self.last_field_is_non_zero_width_bitfield = true;
        self.current_bitfield_size = info.size;

        if self.is_union {
            self.place_field_at_offset(ByteUnits::ZERO);
            self.size = self.size.max(info.size);
        } else {
            // Allocate a new block of memory and place the bitfield in it.
            let field_offset = self.size.align_to(info.alignment);
            self.place_field_at_offset(field_offset);
            self.size = field_offset + info.size;
            self.remaining_bits_in_field = ctx.target.to_bits(info.size) - width;
        }
    }

    fn layout_zero_width_bitfield(&mut self, field: &FieldDecl) {
        // Zero-width bitfields are ignored unless they follow a
        // non-zero-width bitfield.
        if !self.last_field_is_non_zero_width_bitfield {
            self.place_field_at_offset(if self.is_union {
                ByteUnits::ZERO
            } else {
                self.size
            });
            return;
        }

        self.last_field_is_non_zero_width_bitfield = false;

        let info = self.get_adjusted_field_info(field);
        if self.is_union {
            self.place_field_at_offset(ByteUnits::ZERO);
            self.size = self.size.max(info.size);
        } else {
            // Round up to the field's alignment boundary; the zero-width
            // bitfield itself takes no space.
            let field_offset = self.size.align_to(info.alignment);
            self.place_field_at_offset(field_offset);
            self.size = field_offset;
        }
    }

    fn place_field_at_offset(&mut self, offset: ByteUnits) {
        self.field_offsets.push(self.ctx.target.to_bits(offset));
    }

    fn place_field_at_bit_offset(&mut self, offset: BitUnits) {
        self.field_offsets.push(offset);
    }

    fn inject_vbptr(&mut self, _rd: RecordId) {
        if !self.has_vbptr || self.shared_vbptr_base.is_some() {
            return;
        }

        let ctx = self.ctx;

        // Inject the vbptr at the injection site,
        let injection_site = self.vbptr_offset;
        // but before we do, make sure it's properly aligned.
        self.vbptr_offset = self.vbptr_offset.align_to(self.pointer_info.alignment);
        // Determine where the first field lands after the vbptr.
        let field_start = self.vbptr_offset + self.pointer_info.size;
        // The amount fields get pushed back by must be a multiple of the
        // alignment.
        let offset = (field_start - injection_site).align_to(self.alignment);

        self.size += offset;
        for field_offset in &mut self.field_offsets {
            *field_offset += ctx.target.to_bits(offset);
        }
        for base_offset in self.bases.values_mut() {
            if *base_offset >= injection_site {
                *base_offset += offset;
            }
        }

        // The presence of a vbptr suppresses zero-sized objects that are
        // not in virtual bases.
        self.has_zero_sized_subobject = false;
    }

    fn inject_vfptr(&mut self, _rd: RecordId) {
        if !self.has_own_vfptr {
            return;
        }

        let ctx = self.ctx;

        // The amount the struct gets pushed back by must be a multiple of
        // the alignment.
        let offset = self.pointer_info.size.align_to(self.alignment);

        self.size += offset;
        for field_offset in &mut self.field_offsets {
            *field_offset += ctx.target.to_bits(offset);
        }
        if self.has_vbptr {
            self.vbptr_offset += offset;
        }
        for base_offset in self.bases.values_mut() {
            *base_offset += offset;
        }
    }

    fn inject_vptrs(&mut self, rd: RecordId) {
        if !(self.has_own_vfptr || (self.has_vbptr && self.shared_vbptr_base.is_none())) {
            return;
        }

        let ctx = self.ctx;

        if !self.is_64bit || self.required_alignment <= ByteUnits::of(8) {
            // The vbptr is injected first: it depends on the alignment of
            // the object *before* the alignment is updated by inserting a
            // pointer into the record.
            self.inject_vbptr(rd);
            self.inject_vfptr(rd);
            self.alignment = self.alignment.max(self.pointer_info.alignment);
            return;
        }

        // In 64-bit mode, structs with a required alignment greater than 8
        // get special rules, likely to avoid excessive padding around the
        // vptrs: re-lay out the struct with the vfptr and vbptr inserted as
        // if they were fields and bases.
        self.field_offsets.clear();
        self.bases.clear();
        self.size = ByteUnits::ZERO;
        self.alignment = self.alignment.max(self.pointer_info.alignment);

        if self.has_own_vfptr {
            self.size = self.pointer_info.size;
        }

        self.layout_non_virtual_bases(rd);

        if self.has_vbptr && self.shared_vbptr_base.is_none() {
            // Find the last two non-virtual bases.
            let mut penult_base: Option<RecordId> = None;
            let mut last_base: Option<RecordId> = None;
            for base in &ctx.decls[rd].bases {
                if base.is_virtual {
                    continue;
                }
                if last_base.map_or(true, |last| self.bases[&base.class] > self.bases[&last]) {
                    penult_base = last_base;
                    last_base = Some(base.class);
                }
            }
            let penult_layout = penult_base.map(|base| ctx.record_layout(base));
            let last_layout = last_base.map(|base| ctx.record_layout(base));

            // Calculate the vbptr offset. The rule differs from the general
            // layout: when the last two non-virtual bases are both zero
            // sized, the vbptr site is *before* the padding between them and
            // the vbptr potentially aliases the first of the two. We have no
            // understanding of why this differs from the general case.
            self.vbptr_offset = self.size;
            if last_layout.map_or(false, |layout| layout.data_size.is_zero()) {
                self.vbptr_offset = self.bases[&last_base.unwrap()];
                if penult_layout.map_or(false, |layout| layout.data_size.is_zero()) {
                    self.vbptr_offset = self.bases[&penult_base.unwrap()];
                }
            }

            // Once a spot is located, place the vbptr.
            self.vbptr_offset = self.vbptr_offset.align_to(self.pointer_info.alignment);
            self.size = self.vbptr_offset + self.pointer_info.size;

            if let Some(last_layout) = last_layout {
                if last_layout.data_size.is_zero() {
                    // Add the padding between zero-sized bases after the
                    // vbptr.
                    if penult_layout.map_or(false, |layout| layout.data_size.is_zero()) {
                        self.size += ByteUnits::ONE;
                    }
                    self.size = self.size.align_to(last_layout.required_alignment);
                    self.bases.insert(last_base.unwrap(), self.size);
                }
            }
        }

        self.layout_fields(rd);

        // The presence of a vbptr suppresses zero-sized objects that are
        // not in virtual bases.
        self.has_zero_sized_subobject = false;
    }

    fn layout_virtual_bases(&mut self, rd: RecordId) {
        if !self.has_vbptr {
            return;
        }

        let ctx = self.ctx;

        // Vtordisps are always 4 bytes, even in 64-bit mode.
        let vtordisp_size = ByteUnits::of(4);
        let mut vtordisp_alignment = vtordisp_size;
        // Vtordisps respect pragma pack,
        if !self.max_field_alignment.is_zero() {
            vtordisp_alignment = vtordisp_alignment.min(self.max_field_alignment);
        }
        // and align at least as much as the whole record requires, which
        // supports vtordisp injection.
        vtordisp_alignment = vtordisp_alignment.max(self.required_alignment);

        let has_vtordisp_set = self.compute_vtordisp_set(rd);

        let mut previous_base_layout: Option<&'a ASTRecordLayout> = None;
        for &base in ctx.decls[rd].virtual_bases() {
            let base_layout = ctx.record_layout(base);
            let has_vtordisp = has_vtordisp_set.contains(&base);

            // If the last field laid out was a non-zero length bitfield, add
            // some extra padding (of the bitfield's type size) for no
            // obvious reason.
            if self.last_field_is_non_zero_width_bitfield {
                self.size += self.current_bitfield_size;
            }

            // Insert padding between two bases when the left one has a
            // zero-sized subobject and the right one leads with a zero-sized
            // base. The padding between virtual bases is at least 4 bytes in
            // both 32- and 64-bit modes and rounds up to the required
            // alignment; we don't know why.
            if previous_base_layout.map_or(false, |prev| prev.has_zero_sized_subobject())
                && base_layout.leads_with_zero_sized_base()
            {
                self.size = self.size.align_to(vtordisp_alignment) + vtordisp_size;
            }

            // Insert the vtordisp.
            if has_vtordisp {
                self.size = self.size.align_to(vtordisp_alignment) + vtordisp_size;
            }

            // Insert the virtual base.
            let info = self.get_adjusted_element_info(base_layout);
            let base_offset = self.size.align_to(info.alignment);
            self.vbases.insert(
                base,
                VBaseInfo {
                    offset: base_offset,
                    has_vtordisp,
                },
            );
            self.size = base_offset + base_layout.data_size;
            previous_base_layout = Some(base_layout);
        }
    }

    fn finalize_layout(&mut self, _rd: RecordId) {
        // Respect required alignment. In 32-bit mode it may be zero, which
        // leaves the size alone.
        if !self.required_alignment.is_zero() {
            self.alignment = self.alignment.max(self.required_alignment);
            self.size = self.size.align_to(self.alignment);
        }

        // Zero-sized structures have size equal to their alignment.
        if self.size.is_zero() {
            self.has_zero_sized_subobject = true;
            self.leads_with_zero_sized_base = true;
            self.size = self.alignment;
        }
    }

    /// The set of virtual bases that require a vtordisp.
    fn compute_vtordisp_set(&self, rd: RecordId) -> IndexSet<RecordId> {
        let ctx = self.ctx;
        let record = &ctx.decls[rd];
        let mut has_vtordisp_set = IndexSet::new();

        // If any of our bases needed a vtordisp for some virtual base, so do
        // we.
        for base in &record.bases {
            let layout = ctx.record_layout(base.class);
            for (vbase, vbase_info) in &layout.cxx().vbase_offsets {
                if vbase_info.has_vtordisp {
                    has_vtordisp_set.insert(*vbase);
                }
            }
        }

        // If we define a constructor or destructor and override a function
        // defined in a virtual base's vtable, that virtual base needs a
        // vtordisp. Walk the overridden-method chains: a method with no
        // overrides lives in its parent's vtable.
        if record.has_user_declared_ctor || record.has_user_declared_dtor {
            let mut seen: IndexSet<MethodRef> = IndexSet::new();
            let mut work: Vec<MethodRef> = Vec::new();

            // Seed the working set with our non-destructor virtual methods.
            for (index, method) in record.methods.iter().enumerate() {
                if method.is_virtual && !method.is_destructor {
                    let method_ref = MethodRef {
                        record: rd,
                        index: index as u32,
                    };
                    if seen.insert(method_ref) {
                        work.push(method_ref);
                    }
                }
            }

            while let Some(method_ref) = work.pop() {
                let method = ctx.decls.method(method_ref);
                if method.overridden.is_empty() {
                    has_vtordisp_set.insert(method_ref.record);
                } else {
                    for &overridden in &method.overridden {
                        if seen.insert(overridden) {
                            work.push(overridden);
                        }
                    }
                }
            }
        }

        // Re-check all of our virtual bases, in case their non-virtual bases
        // have vtordisp requirements.
        for &vbase in record.virtual_bases() {
            if !has_vtordisp_set.contains(&vbase)
                && self.requires_vtordisp(&has_vtordisp_set, vbase)
            {
                has_vtordisp_set.insert(vbase);
            }
        }

        has_vtordisp_set
    }

    fn requires_vtordisp(&self, has_vtordisp_set: &IndexSet<RecordId>, rd: RecordId) -> bool {
        if has_vtordisp_set.contains(&rd) {
            return true;
        }

        // If any of a virtual base's non-virtual bases (recursively)
        // requires a vtordisp, so does the virtual base.
        self.ctx.decls[rd]
            .bases
            .iter()
            .any(|base| !base.is_virtual && self.requires_vtordisp(has_vtordisp_set, base.class))
    }
}
