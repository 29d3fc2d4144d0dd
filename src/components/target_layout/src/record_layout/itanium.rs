use crate::{
    decl::{FieldDecl, RecordId, Type},
    record_layout::{
        base_subobject::{BaseInfoId, BaseSubobjectGraph},
        diag::{PadAmount, PaddedFieldWarning, PaddedSizeWarning, padding_tag_index},
        empty_subobjects::EmptySubobjectMap,
    },
    external::ExternalRecordLayout,
    type_layout::{TypeLayoutCache, VBaseInfo},
};
use data_units::{BitUnits, ByteUnits};
use diagnostics::WarningDiagnostic;
use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

/// Builds record layouts for the Itanium family of ABIs, and for plain C
/// records and Objective-C interfaces on any ABI.
///
/// One-shot: construct, drive through one of the `layout_*` entry points,
/// read the result fields, discard.
#[derive(Debug)]
pub struct ItaniumRecordLayoutBuilder<'a> {
    pub ctx: &'a TypeLayoutCache<'a>,
    pub empty_subobjects: Option<EmptySubobjectMap<'a>>,

    /// The current size of the record layout, in bits.
    pub size: BitUnits,
    pub alignment: ByteUnits,
    /// The alignment the record would have if the packed attribute were
    /// ignored.
    pub unpacked_alignment: ByteUnits,
    pub unadjusted_alignment: ByteUnits,
    pub field_offsets: Vec<BitUnits>,

    pub packed: bool,
    pub is_union: bool,
    pub is_mac68k_align: bool,
    pub is_ms_struct: bool,

    /// If the last field laid out was a bitfield, the number of bits in the
    /// last storage unit that an adjacent bitfield may still use.
    pub unfilled_bits_in_last_unit: BitUnits,
    /// When ms_struct, the storage unit size of the previous field if it was
    /// a bitfield.
    pub last_bitfield_type_size: BitUnits,

    /// The maximum allowed field alignment, set by `#pragma pack`.
    pub max_field_alignment: ByteUnits,

    /// Size without tail padding, in bits.
    pub data_size: BitUnits,

    pub non_virtual_size: ByteUnits,
    pub non_virtual_alignment: ByteUnits,

    pub primary_base: Option<RecordId>,
    pub primary_base_is_virtual: bool,
    /// The class provides its own vtable pointer rather than sharing the
    /// primary base's.
    pub has_own_vfptr: bool,

    /// Direct non-virtual bases to their offsets, in layout order.
    pub bases: IndexMap<RecordId, ByteUnits>,
    /// Virtual bases to their offsets, in layout order.
    pub vbases: IndexMap<RecordId, VBaseInfo>,

    /// Virtual bases, direct or indirect, that are primary bases of some
    /// other direct or indirect base.
    indirect_primary_bases: IndexSet<RecordId>,
    /// The first nearly empty virtual base in inheritance order.
    first_nearly_empty_vbase: Option<RecordId>,
    visited_virtual_bases: IndexSet<RecordId>,

    graph: BaseSubobjectGraph,

    external: Option<ExternalRecordLayout>,
    /// Alignment must be inferred even though an external layout was
    /// provided.
    infer_alignment: bool,
}

impl<'a> ItaniumRecordLayoutBuilder<'a> {
    pub fn new(
        ctx: &'a TypeLayoutCache<'a>,
        empty_subobjects: Option<EmptySubobjectMap<'a>>,
    ) -> Self {
        Self {
            ctx,
            empty_subobjects,
            size: BitUnits::ZERO,
            alignment: ByteUnits::ONE,
            unpacked_alignment: ByteUnits::ONE,
            unadjusted_alignment: ByteUnits::ONE,
            field_offsets: Vec::new(),
            packed: false,
            is_union: false,
            is_mac68k_align: false,
            is_ms_struct: false,
            unfilled_bits_in_last_unit: BitUnits::ZERO,
            last_bitfield_type_size: BitUnits::ZERO,
            max_field_alignment: ByteUnits::ZERO,
            data_size: BitUnits::ZERO,
            non_virtual_size: ByteUnits::ZERO,
            non_virtual_alignment: ByteUnits::ONE,
            primary_base: None,
            primary_base_is_virtual: false,
            has_own_vfptr: false,
            bases: IndexMap::new(),
            vbases: IndexMap::new(),
            indirect_primary_bases: IndexSet::new(),
            first_nearly_empty_vbase: None,
            visited_virtual_bases: IndexSet::new(),
            graph: BaseSubobjectGraph::default(),
            external: None,
            infer_alignment: false,
        }
    }

    pub fn size_chars(&self) -> ByteUnits {
        self.ctx.target.to_byte_units(self.size)
    }

    pub fn data_size_chars(&self) -> ByteUnits {
        self.ctx.target.to_byte_units(self.data_size)
    }

    /// Lays out a plain (non-C++) record.
    pub fn layout_record(&mut self, rd: RecordId) {
        self.initialize_layout(rd);
        self.layout_fields(rd);
        self.finish_layout(rd);
    }

    /// Lays out a C++ class: vtable pointer, bases, fields, virtual bases.
    pub fn layout_cxx(&mut self, rd: RecordId) {
        let ctx = self.ctx;

        self.initialize_layout(rd);

        self.layout_non_virtual_bases(rd);

        self.layout_fields(rd);

        self.non_virtual_size = ctx
            .target
            .to_byte_units(self.size.align_to(ctx.target.char_align()));
        self.non_virtual_alignment = self.alignment;

        self.layout_virtual_bases(rd, rd);

        self.finish_layout(rd);

        if cfg!(debug_assertions) {
            for base in &ctx.decls[rd].bases {
                if !base.is_virtual {
                    debug_assert!(
                        self.bases.contains_key(&base.class),
                        "did not find a base offset"
                    );
                }
            }
            for vbase in ctx.decls[rd].virtual_bases() {
                debug_assert!(
                    self.vbases.contains_key(vbase),
                    "did not find a virtual base offset"
                );
            }
        }
    }

    /// Lays out an Objective-C interface: the superclass's data size is the
    /// starting point and its alignment is inherited.
    pub fn layout_objc(&mut self, rd: RecordId) {
        let ctx = self.ctx;

        if let Some(super_class) = ctx.decls[rd].super_class {
            let super_layout = ctx.objc_layout(super_class, None);

            self.update_alignment(super_layout.alignment, super_layout.alignment);

            // Ivars don't start at the end of the superclass structure, but
            // at the next byte following its last field.
            self.size = ctx.target.to_bits(super_layout.data_size);
            self.data_size = self.size;
        }

        self.initialize_layout(rd);
        self.layout_fields(rd);
        self.finish_layout(rd);
    }

    fn initialize_layout(&mut self, rd: RecordId) {
        let ctx = self.ctx;
        let record = &ctx.decls[rd];

        if record.is_record() {
            self.is_union = record.kind.is_union();
            self.is_ms_struct = record.is_ms_struct || ctx.target.ms_bitfields;
        }

        self.packed = record.is_packed;

        // Honor the default struct packing maximum alignment flag.
        if let Some(default_max) = ctx.target.default_max_field_alignment {
            self.max_field_alignment = default_max;
        }

        // mac68k alignment supersedes maximum field alignment and attribute
        // aligned, and forces all structures to 2-byte alignment.
        if record.is_mac68k_align {
            self.is_mac68k_align = true;
            self.max_field_alignment = ByteUnits::of(2);
            self.alignment = ByteUnits::of(2);
        } else {
            if let Some(max_field_alignment) = record.max_field_alignment {
                self.max_field_alignment = max_field_alignment;
            }

            if !record.max_alignment.is_zero() {
                let max_alignment = ctx.target.to_byte_units(record.max_alignment);
                self.update_alignment(max_alignment, max_alignment);
            }
        }

        // If there is an external layout source, ask it for this record.
        if record.is_record() {
            if let Some(source) = ctx.external_source {
                if let Some(external) = source.layout_record(rd) {
                    if !external.alignment.is_zero() {
                        self.alignment = ctx.target.to_byte_units(external.alignment);
                    } else {
                        // The external source had no alignment information.
                        self.infer_alignment = true;
                    }
                    self.external = Some(external);
                }
            }
        }
    }

    /// Finds the first nearly empty virtual base, recursively, in
    /// inheritance order.
    fn select_primary_vbase(&mut self, rd: RecordId) {
        let ctx = self.ctx;

        for base in &ctx.decls[rd].bases {
            if base.is_virtual && ctx.is_nearly_empty(base.class) {
                // If it's not an indirect primary base, we've found our
                // primary base.
                if !self.indirect_primary_bases.contains(&base.class) {
                    self.primary_base = Some(base.class);
                    self.primary_base_is_virtual = true;
                    return;
                }

                if self.first_nearly_empty_vbase.is_none() {
                    self.first_nearly_empty_vbase = Some(base.class);
                }
            }

            self.select_primary_vbase(base.class);
            if self.primary_base.is_some() {
                return;
            }
        }
    }

    fn add_indirect_primary_bases(&mut self, rd: RecordId) {
        let ctx = self.ctx;
        let layout = ctx.record_layout(rd);

        if layout.cxx().primary_base_is_virtual {
            self.indirect_primary_bases.insert(
                layout
                    .cxx()
                    .primary_base
                    .expect("virtual primary base exists"),
            );
        }

        for base in &ctx.decls[rd].bases {
            self.add_indirect_primary_bases(base.class);
        }
    }

    fn determine_primary_base(&mut self, rd: RecordId) {
        let ctx = self.ctx;

        // If the class isn't dynamic, it won't have a primary base.
        if !ctx.decls[rd].is_dynamic_class() {
            return;
        }

        // Compute all the primary virtual bases for all of our direct and
        // indirect bases and record them.
        for base in &ctx.decls[rd].bases {
            self.add_indirect_primary_bases(base.class);
        }

        // The primary base is the first non-virtual dynamic base class, in
        // direct base class order.
        for base in &ctx.decls[rd].bases {
            if base.is_virtual {
                continue;
            }

            if ctx.decls[base.class].is_dynamic_class() {
                self.primary_base = Some(base.class);
                self.primary_base_is_virtual = false;
                return;
            }
        }

        // Under the Itanium ABI, with no non-virtual primary base the
        // primary virtual base is the first nearly empty virtual base that
        // is not an indirect primary base, if one exists.
        if ctx.decls[rd].has_virtual_bases() {
            self.select_primary_vbase(rd);
            if self.primary_base.is_some() {
                return;
            }
        }

        // Otherwise, the first nearly empty virtual base, even if it is an
        // indirect primary base elsewhere.
        if let Some(first) = self.first_nearly_empty_vbase {
            self.primary_base = Some(first);
            self.primary_base_is_virtual = true;
        }
    }

    fn ensure_vtable_pointer_alignment(&mut self, mut unpacked_base_align: ByteUnits) {
        let mut base_align = if self.packed {
            ByteUnits::ONE
        } else {
            unpacked_base_align
        };

        // The maximum field alignment overrides base align.
        if !self.max_field_alignment.is_zero() {
            base_align = base_align.min(self.max_field_alignment);
            unpacked_base_align = unpacked_base_align.min(self.max_field_alignment);
        }

        // Round up the current record size to pointer alignment.
        self.size = self.size.align_to(self.ctx.target.to_bits(base_align));
        self.data_size = self.size;

        self.update_alignment(base_align, unpacked_base_align);
    }

    /// Determines the primary base class (if any) and lays it out, then lays
    /// out the remaining non-virtual bases in declaration order.
    fn layout_non_virtual_bases(&mut self, rd: RecordId) {
        let ctx = self.ctx;

        self.determine_primary_base(rd);
        self.graph = BaseSubobjectGraph::compute(ctx, rd);

        if let Some(primary_base) = self.primary_base {
            if self.primary_base_is_virtual {
                // A primary virtual base that was the primary virtual base
                // of some other base class has to be stolen.
                let primary_info = *self
                    .graph
                    .virtual_base_info
                    .get(&primary_base)
                    .expect("virtual base info for primary base");
                self.graph.clear_derived(primary_info);

                self.indirect_primary_bases.insert(primary_base);

                assert!(
                    !self.visited_virtual_bases.contains(&primary_base),
                    "virtual base already visited"
                );
                self.visited_virtual_bases.insert(primary_base);

                self.layout_virtual_base(primary_info);
            } else {
                let primary_info = *self
                    .graph
                    .non_virtual_base_info
                    .get(&primary_base)
                    .expect("base info for non-virtual primary base");

                self.layout_non_virtual_base(primary_info);
            }
        } else if ctx.decls[rd].is_dynamic_class() {
            // The class needs a vtable pointer and didn't get one from a
            // primary base.
            assert!(
                self.data_size.is_zero(),
                "vtable pointer must be at offset zero"
            );

            self.ensure_vtable_pointer_alignment(ctx.target.pointer_alignment);
            self.has_own_vfptr = true;
            self.size += ctx.target.to_bits(ctx.target.pointer_width);
            self.data_size = self.size;
        }

        for base in &ctx.decls[rd].bases {
            if base.is_virtual {
                continue;
            }

            // Skip the primary base: it is already laid out. The virtual
            // check matters because a non-virtual base can share the type of
            // a primary virtual base.
            if Some(base.class) == self.primary_base && !self.primary_base_is_virtual {
                continue;
            }

            let info = *self
                .graph
                .non_virtual_base_info
                .get(&base.class)
                .expect("base info for non-virtual base");

            self.layout_non_virtual_base(info);
        }
    }

    fn layout_non_virtual_base(&mut self, base: BaseInfoId) {
        let offset = self.layout_base(base);

        let class = self.graph[base].class;
        assert!(!self.bases.contains_key(&class), "base offset already exists");
        self.bases.insert(class, offset);

        self.add_primary_virtual_base_offsets(base, offset);
    }

    /// Records the offsets of every primary virtual base claimed within the
    /// subobject rooted at `info`, which was just placed at `offset`.
    fn add_primary_virtual_base_offsets(&mut self, info: BaseInfoId, offset: ByteUnits) {
        let ctx = self.ctx;
        let class = self.graph[info].class;

        // A base without virtual bases isn't interesting.
        if !ctx.decls[class].has_virtual_bases() {
            return;
        }

        if let Some(primary) = self.graph[info].primary_virtual_base {
            assert!(
                self.graph[primary].is_virtual,
                "primary virtual base is not virtual"
            );

            if self.graph[primary].derived == Some(info) {
                let primary_class = self.graph[primary].class;
                assert!(
                    !self.vbases.contains_key(&primary_class),
                    "primary virtual base offset already exists"
                );
                self.vbases.insert(
                    primary_class,
                    VBaseInfo {
                        offset,
                        has_vtordisp: false,
                    },
                );

                self.add_primary_virtual_base_offsets(primary, offset);
            }
        }

        let layout = ctx.record_layout(class);
        let children: SmallVec<[BaseInfoId; 4]> = self.graph[info].bases.clone();

        for base in children {
            if self.graph[base].is_virtual {
                continue;
            }

            let base_offset = offset + layout.base_class_offset(self.graph[base].class);
            self.add_primary_virtual_base_offsets(base, base_offset);
        }
    }

    /// Walks the hierarchy from the most-derived class in inheritance order,
    /// placing each virtual base that isn't a primary somewhere.
    fn layout_virtual_bases(&mut self, rd: RecordId, most_derived: RecordId) {
        let ctx = self.ctx;

        let (primary_base, primary_base_is_virtual) = if rd == most_derived {
            (self.primary_base, self.primary_base_is_virtual)
        } else {
            let layout = ctx.record_layout(rd);
            (
                layout.cxx().primary_base,
                layout.cxx().primary_base_is_virtual,
            )
        };

        for base in &ctx.decls[rd].bases {
            if base.is_virtual
                && (primary_base != Some(base.class) || !primary_base_is_virtual)
                && !self.indirect_primary_bases.contains(&base.class)
            {
                // Only visit virtual bases once.
                if !self.visited_virtual_bases.insert(base.class) {
                    continue;
                }

                let info = *self
                    .graph
                    .virtual_base_info
                    .get(&base.class)
                    .expect("virtual base info");
                self.layout_virtual_base(info);
            }

            if !ctx.decls[base.class].has_virtual_bases() {
                // Nothing beneath this base can be virtual.
                continue;
            }

            self.layout_virtual_bases(base.class, most_derived);
        }
    }

    fn layout_virtual_base(&mut self, base: BaseInfoId) {
        assert!(
            self.graph[base].derived.is_none(),
            "trying to lay out a claimed primary virtual base"
        );

        let offset = self.layout_base(base);

        let class = self.graph[base].class;
        assert!(
            !self.vbases.contains_key(&class),
            "virtual base offset already exists"
        );
        self.vbases.insert(
            class,
            VBaseInfo {
                offset,
                has_vtordisp: false,
            },
        );

        self.add_primary_virtual_base_offsets(base, offset);
    }

    /// Places one base subobject and returns its offset in chars.
    fn layout_base(&mut self, base: BaseInfoId) -> ByteUnits {
        let ctx = self.ctx;
        let class = self.graph[base].class;
        let is_virtual = self.graph[base].is_virtual;
        let layout = ctx.record_layout(class);

        // Query the external layout for an offset, if one is installed.
        let mut offset = ByteUnits::ZERO;
        let mut has_external_layout = false;
        if let Some(external) = &self.external {
            let known = if is_virtual {
                external.vbase_offsets.get(&class)
            } else {
                external.base_offsets.get(&class)
            };
            if let Some(&known) = known {
                offset = known;
                has_external_layout = true;
            }
        }

        let mut unpacked_base_align = layout.cxx().non_virtual_alignment;
        let mut base_align = if self.packed {
            ByteUnits::ONE
        } else {
            unpacked_base_align
        };

        // An empty base goes to offset zero whenever the empty-subobject map
        // allows it.
        if ctx.decls[class].is_empty()
            && (!has_external_layout || offset.is_zero())
            && self.can_place_base_at(base, ByteUnits::ZERO)
        {
            self.size = self.size.max(ctx.target.to_bits(layout.size));
            self.update_alignment(base_align, unpacked_base_align);

            return ByteUnits::ZERO;
        }

        // The maximum field alignment overrides base align.
        if !self.max_field_alignment.is_zero() {
            base_align = base_align.min(self.max_field_alignment);
            unpacked_base_align = unpacked_base_align.min(self.max_field_alignment);
        }

        if !has_external_layout {
            // Round up the current record size to the base's alignment
            // boundary, then keep bumping until the placement is collision
            // free.
            offset = self.data_size_chars().align_to(base_align);

            while !self.can_place_base_at(base, offset) {
                offset += base_align;
            }
        } else {
            let allowed = self.can_place_base_at(base, offset);
            assert!(allowed, "externally placed base at overlapping offset");

            if self.infer_alignment && offset < self.data_size_chars().align_to(base_align) {
                // The external base offset precedes the offset we computed.
                // Assume the structure is packed.
                self.alignment = ByteUnits::ONE;
                self.infer_alignment = false;
            }
        }

        if !ctx.decls[class].is_empty() {
            self.data_size = ctx
                .target
                .to_bits(offset + layout.cxx().non_virtual_size);
            self.size = self.size.max(self.data_size);
        } else {
            self.size = self.size.max(ctx.target.to_bits(offset + layout.size));
        }

        self.update_alignment(base_align, unpacked_base_align);

        offset
    }

    fn can_place_base_at(&mut self, base: BaseInfoId, offset: ByteUnits) -> bool {
        match &mut self.empty_subobjects {
            Some(map) => map.can_place_base_at_offset(&self.graph, base, offset),
            None => true,
        }
    }

    fn layout_fields(&mut self, rd: RecordId) {
        let ctx = self.ctx;

        for (index, field) in ctx.decls[rd].fields.iter().enumerate() {
            self.layout_field(rd, field, index);
        }
    }

    fn layout_field(&mut self, rd: RecordId, field: &FieldDecl, field_index: usize) {
        if field.is_bitfield() {
            self.layout_bitfield(rd, field, field_index);
            return;
        }

        let ctx = self.ctx;
        let unpadded_field_offset = self.data_size - self.unfilled_bits_in_last_unit;

        // Reset the bit-packing state.
        self.unfilled_bits_in_last_unit = BitUnits::ZERO;
        self.last_bitfield_type_size = BitUnits::ZERO;

        let field_packed = self.packed || field.is_packed;
        let mut field_offset = if self.is_union {
            ByteUnits::ZERO
        } else {
            self.data_size_chars()
        };

        let (field_size, mut field_align) = match &field.ty {
            Type::IncompleteArray(element) => {
                // A flexible array member has no size, but is aligned
                // appropriately for its element type.
                (ByteUnits::ZERO, ctx.get(element).alignment)
            }
            Type::Reference { addr_space, .. } => (
                ctx.target.pointer_width_in(*addr_space),
                ctx.target.pointer_align_in(*addr_space),
            ),
            ty => {
                let info = ctx.get(ty);
                let mut align = info.alignment;

                if self.is_ms_struct {
                    // MS field layout aligns a field to the width of its
                    // underlying builtin element type.
                    let base_ty = ty.base_element_type();
                    if base_ty.is_builtin_scalar() {
                        let type_size = ctx.get(base_ty).width;
                        if type_size > align {
                            align = type_size;
                        }
                    }
                }

                (info.width, align)
            }
        };

        // The alignment the field would get without the packed attribute, to
        // detect unnecessary packing.
        let mut unpacked_field_align = field_align;
        let unpacked_field_offset = field_offset;

        if field_packed {
            field_align = ByteUnits::ONE;
        }
        let max_alignment = if field.max_alignment.is_zero() {
            ByteUnits::ZERO
        } else {
            ctx.target.to_byte_units(field.max_alignment)
        };
        field_align = field_align.max(max_alignment);
        unpacked_field_align = unpacked_field_align.max(max_alignment);

        // The maximum field alignment overrides the aligned attribute.
        if !self.max_field_alignment.is_zero() {
            field_align = field_align.min(self.max_field_alignment);
            unpacked_field_align = unpacked_field_align.min(self.max_field_alignment);
        }

        // Round up to the field's alignment boundary.
        field_offset = field_offset.align_to(field_align);
        let unpacked_field_offset = unpacked_field_offset.align_to(unpacked_field_align);

        if self.external.is_some() {
            let computed = ctx.target.to_bits(field_offset);
            let external_bits = self.update_external_field_offset(field_index as u32, computed);
            field_offset = ctx.target.to_byte_units(external_bits);

            if !self.is_union {
                if let Some(map) = &mut self.empty_subobjects {
                    let allowed = map.can_place_field_at_offset(field, field_offset);
                    assert!(allowed, "externally placed field cannot be placed here");
                }
            }
        } else if !self.is_union {
            if let Some(map) = &mut self.empty_subobjects {
                while !map.can_place_field_at_offset(field, field_offset) {
                    // Couldn't place the field there; try again one
                    // alignment unit later.
                    field_offset += field_align;
                }
            }
        }

        // Place this field at the current location.
        self.field_offsets.push(ctx.target.to_bits(field_offset));

        if self.external.is_none() {
            self.check_field_padding(
                rd,
                field,
                ctx.target.to_bits(field_offset),
                unpadded_field_offset,
                ctx.target.to_bits(unpacked_field_offset),
                ctx.target.to_bits(unpacked_field_align),
                field_packed,
            );
        }

        // Reserve space for this field.
        let field_size_bits = ctx.target.to_bits(field_size);
        if self.is_union {
            self.data_size = self.data_size.max(field_size_bits);
        } else {
            self.data_size = ctx.target.to_bits(field_offset) + field_size_bits;
        }

        self.size = self.size.max(self.data_size);

        self.update_alignment(field_align, unpacked_field_align);
    }

    fn layout_bitfield(&mut self, rd: RecordId, field: &FieldDecl, field_index: usize) {
        let ctx = self.ctx;

        let field_packed = self.packed || field.is_packed;
        let field_size = BitUnits::of(field.bit_width.expect("field is a bitfield"));
        let type_info = ctx.get(&field.ty);
        let type_size = ctx.target.to_bits(type_info.width);
        let mut field_align = ctx.target.to_bits(type_info.alignment);

        if self.is_ms_struct {
            // Integer fields in ms_struct records always align to their
            // type's size.
            field_align = type_size;
            // Zero-length bitfields following non-bitfields are ignored.
            if field_size.is_zero() && self.last_bitfield_type_size.is_zero() {
                field_align = BitUnits::of(1);
            }
            // A bitfield of a different type size doesn't pack into the
            // previous unit.
            if self.last_bitfield_type_size != type_size {
                self.unfilled_bits_in_last_unit = BitUnits::ZERO;
                self.last_bitfield_type_size = BitUnits::ZERO;
            }
        }

        let unpadded_field_offset = self.data_size - self.unfilled_bits_in_last_unit;
        let mut field_offset = if self.is_union {
            BitUnits::ZERO
        } else {
            unpadded_field_offset
        };

        let mut zero_length_bitfield = false;
        if !ctx.target.use_bitfield_type_alignment
            && ctx.target.use_zero_length_bitfield_alignment
            && field_size.is_zero()
        {
            // The alignment of a zero-length bitfield affects the alignment
            // of the next member: the max of its own alignment and a
            // target-specific boundary.
            zero_length_bitfield = true;
            let boundary = ctx.target.zero_length_bitfield_boundary;
            if boundary > field_align {
                field_align = boundary;
            }
        }

        if field_size > type_size {
            self.layout_wide_bitfield(rd, field, field_size, field_packed, field_index);
            return;
        }

        let mut unpacked_field_align = field_align;
        let mut unpacked_field_offset = field_offset;
        if !ctx.target.use_bitfield_type_alignment && !zero_length_bitfield {
            unpacked_field_align = BitUnits::of(1);
        }

        if field_packed || (!ctx.target.use_bitfield_type_alignment && !zero_length_bitfield) {
            field_align = BitUnits::of(1);
        }
        field_align = field_align.max(field.max_alignment);
        unpacked_field_align = unpacked_field_align.max(field.max_alignment);

        // The maximum field alignment overrides the aligned attribute.
        if !self.max_field_alignment.is_zero() && !field_size.is_zero() {
            let max_field_alignment_bits = ctx.target.to_bits(self.max_field_alignment);
            field_align = field_align.min(max_field_alignment_bits);
            unpacked_field_align = unpacked_field_align.min(max_field_alignment_bits);
        }

        // ms_struct bitfields always start at a round alignment.
        if self.is_ms_struct && self.last_bitfield_type_size.is_zero() {
            field_offset = field_offset.align_to(field_align);
            unpacked_field_offset = unpacked_field_offset.align_to(unpacked_field_align);
        }

        // Pad if the field is zero width or would cross its storage unit
        // boundary (and no #pragma pack is in effect).
        if field_size.is_zero()
            || (self.max_field_alignment.is_zero()
                && (field_offset % field_align) + field_size > type_size)
        {
            field_offset = field_offset.align_to(field_align);
        }

        if field_size.is_zero()
            || (self.max_field_alignment.is_zero()
                && (unpacked_field_offset % unpacked_field_align) + field_size > type_size)
        {
            unpacked_field_offset = unpacked_field_offset.align_to(unpacked_field_align);
        }

        // Anonymous members don't affect the overall alignment unless
        // zero-length bitfield alignment or ms_struct is in play.
        if field.is_unnamed()
            && !ctx.target.use_zero_length_bitfield_alignment
            && !self.is_ms_struct
        {
            field_align = BitUnits::of(1);
            unpacked_field_align = BitUnits::of(1);
        }

        if self.external.is_some() {
            field_offset = self.update_external_field_offset(field_index as u32, field_offset);
        }

        // Place this field at the current location.
        self.field_offsets.push(field_offset);

        if self.external.is_none() {
            self.check_field_padding(
                rd,
                field,
                field_offset,
                unpadded_field_offset,
                unpacked_field_offset,
                unpacked_field_align,
                field_packed,
            );
        }

        // Update the data size to include the last unit containing (part of)
        // the bitfield.
        if self.is_union {
            // FIXME: I think FieldSize should be TypeSize here.
            self.data_size = self.data_size.max(field_size);
        } else if self.is_ms_struct && !field_size.is_zero() {
            // Under ms_struct a bitfield takes up space equal to the size of
            // its type; this can't be folded into the alignment computation
            // because #pragma pack may demand misaligned storage.
            if self.unfilled_bits_in_last_unit.is_zero() {
                self.data_size = field_offset + type_size;
                self.unfilled_bits_in_last_unit = type_size - field_size;
            } else if self.unfilled_bits_in_last_unit < field_size {
                self.data_size += type_size;
                self.unfilled_bits_in_last_unit = type_size - field_size;
            } else {
                self.unfilled_bits_in_last_unit -= field_size;
            }
            self.last_bitfield_type_size = type_size;
        } else {
            let new_size_in_bits = field_offset + field_size;
            self.data_size = new_size_in_bits.align_to(ctx.target.char_align());
            self.unfilled_bits_in_last_unit = self.data_size - new_size_in_bits;
            self.last_bitfield_type_size = BitUnits::ZERO;
        }

        self.size = self.size.max(self.data_size);

        self.update_alignment(
            ctx.target.to_byte_units_floor(field_align),
            ctx.target.to_byte_units_floor(unpacked_field_align),
        );
    }

    /// Itanium C++ ABI 2.4: a bitfield wider than its declared type is
    /// allocated as if it were the largest unsigned integral type no wider
    /// than the bitfield.
    fn layout_wide_bitfield(
        &mut self,
        rd: RecordId,
        field: &FieldDecl,
        field_size: BitUnits,
        field_packed: bool,
        _field_index: usize,
    ) {
        let ctx = self.ctx;
        assert!(
            ctx.target.cplusplus,
            "can only have wide bitfields in C++"
        );

        let candidates = [Type::U8, Type::U16, Type::U32, Type::U64];

        let mut chosen: Option<Type> = None;
        for candidate in candidates {
            let size = ctx.target.to_bits(ctx.get(&candidate).width);
            if size > field_size {
                break;
            }
            chosen = Some(candidate);
        }
        let chosen = chosen.expect("did not find a type for the wide bitfield");
        let type_align = ctx.target.to_bits(ctx.get(&chosen).alignment);

        // We're not going to use any of the unfilled bits in the last unit.
        self.unfilled_bits_in_last_unit = BitUnits::ZERO;
        self.last_bitfield_type_size = BitUnits::ZERO;

        let unpadded_field_offset = self.data_size - self.unfilled_bits_in_last_unit;
        let field_offset;

        if self.is_union {
            self.data_size = self.data_size.max(field_size);
            field_offset = BitUnits::ZERO;
        } else {
            // Allocate at the next offset aligned appropriately for T',
            // with length n bits.
            field_offset = self.data_size.align_to(type_align);

            let new_size_in_bits = field_offset + field_size;
            self.data_size = new_size_in_bits.align_to(ctx.target.char_align());
            self.unfilled_bits_in_last_unit = self.data_size - new_size_in_bits;
        }

        self.field_offsets.push(field_offset);

        self.check_field_padding(
            rd,
            field,
            field_offset,
            unpadded_field_offset,
            field_offset,
            type_align,
            field_packed,
        );

        self.size = self.size.max(self.data_size);

        let type_align_chars = ctx.target.to_byte_units_floor(type_align);
        self.update_alignment(type_align_chars, type_align_chars);
    }

    fn finish_layout(&mut self, rd: RecordId) {
        let ctx = self.ctx;
        let record = &ctx.decls[rd];

        // In C++, records cannot be of size zero.
        if ctx.target.cplusplus && self.size.is_zero() {
            if record.is_record() {
                // For gcc compatibility, a class that is not empty but works
                // out to size zero (zero-length arrays and the like) stays
                // size zero.
                if record.is_empty() {
                    self.size = ctx.target.to_bits(ByteUnits::ONE);
                }
            } else {
                self.size = ctx.target.to_bits(ByteUnits::ONE);
            }
        }

        let unpadded_size = self.size - self.unfilled_bits_in_last_unit;
        let unpacked_size_in_bits = self
            .size
            .align_to(ctx.target.to_bits(self.unpacked_alignment));
        let rounded_size = self.size.align_to(ctx.target.to_bits(self.alignment));

        if let Some(external) = &self.external {
            // If we're inferring alignment and the external size is smaller
            // than our rounded size, conservatively set the alignment to one
            // char.
            if self.infer_alignment && external.size < rounded_size {
                self.alignment = ByteUnits::ONE;
                self.infer_alignment = false;
            }
            self.size = external.size;
            return;
        }

        self.size = rounded_size;

        if record.is_record() {
            // Warn if padding was introduced to reach the alignment.
            if self.size > unpadded_size && ctx.diagnostics.flags().warn_padded_size {
                ctx.diagnostics.push(PaddedSizeWarning {
                    tag: padding_tag_index(record.kind),
                    record_name: record.display_name().to_string(),
                    padding: PadAmount::from_bits(
                        self.size - unpadded_size,
                        ctx.target.char_width,
                    ),
                    source: record.source,
                });
            }

            // Warn if the packing was unnecessary. One-char alignment can't
            // have alignment issues in the first place.
            if self.packed
                && ctx.diagnostics.flags().warn_unnecessary_packed
                && self.unpacked_alignment > ByteUnits::ONE
                && self.size == unpacked_size_in_bits
            {
                ctx.diagnostics.push(WarningDiagnostic::new(
                    format!(
                        "packed attribute is unnecessary for '{}'",
                        record.display_name()
                    ),
                    record.source,
                ));
            }
        }
    }

    fn update_alignment(&mut self, new_alignment: ByteUnits, unpacked_new_alignment: ByteUnits) {
        // The alignment is frozen under mac68k alignment, and when an
        // external layout supplied an overall alignment.
        if self.is_mac68k_align || (self.external.is_some() && !self.infer_alignment) {
            return;
        }

        if new_alignment > self.alignment {
            assert!(new_alignment.is_power_of_2(), "alignment not a power of 2");
            self.alignment = new_alignment;
        }

        if unpacked_new_alignment > self.unpacked_alignment {
            assert!(
                unpacked_new_alignment.is_power_of_2(),
                "alignment not a power of 2"
            );
            self.unpacked_alignment = unpacked_new_alignment;
        }

        if unpacked_new_alignment > self.unadjusted_alignment {
            self.unadjusted_alignment = unpacked_new_alignment;
        }
    }

    /// Swaps in the externally supplied offset for a field, inferring
    /// packing if it precedes the one we computed.
    fn update_external_field_offset(
        &mut self,
        field_index: u32,
        computed_offset: BitUnits,
    ) -> BitUnits {
        let external_offset = *self
            .external
            .as_ref()
            .expect("external layout is present")
            .field_offsets
            .get(&field_index)
            .expect("field has an externally supplied offset");

        if self.infer_alignment && external_offset < computed_offset {
            // The externally supplied offset is before the field offset we
            // computed. Assume that the structure is packed.
            self.alignment = ByteUnits::ONE;
            self.infer_alignment = false;
        }

        external_offset
    }

    fn check_field_padding(
        &mut self,
        rd: RecordId,
        field: &FieldDecl,
        offset: BitUnits,
        unpadded_offset: BitUnits,
        unpacked_offset: BitUnits,
        unpacked_align: BitUnits,
        field_packed: bool,
    ) {
        let ctx = self.ctx;
        let record = &ctx.decls[rd];

        // Objective-C ivars get a pass: interfaces generally aren't used for
        // padding tricks.
        if record.kind.is_interface() {
            return;
        }

        // Declarations created without a real source location (by codegen
        // and other AST clients) don't warn either.
        if field.source.is_internal() {
            return;
        }

        // Anonymous bitfields exist to introduce padding; they never warn.
        if field.is_bitfield() && field.is_unnamed() {
            return;
        }

        if !self.is_union && offset > unpadded_offset {
            let wanted = if field.is_bitfield() {
                ctx.diagnostics.flags().warn_padded_bitfield
            } else {
                ctx.diagnostics.flags().warn_padded_field
            };

            if wanted {
                ctx.diagnostics.push(PaddedFieldWarning {
                    tag: padding_tag_index(record.kind),
                    record_name: record.display_name().to_string(),
                    field_name: field.name.clone(),
                    padding: PadAmount::from_bits(offset - unpadded_offset, ctx.target.char_width),
                    source: field.source,
                });
            }
        }

        // Warn about unnecessary packing; one-char alignment never has
        // alignment issues to begin with.
        if field_packed
            && ctx.diagnostics.flags().warn_unnecessary_packed
            && unpacked_align > ctx.target.char_width
            && offset == unpacked_offset
        {
            ctx.diagnostics.push(WarningDiagnostic::new(
                format!(
                    "packed attribute is unnecessary for '{}'",
                    field.name.as_deref().unwrap_or("<anonymous>")
                ),
                field.source,
            ));
        }
    }
}
