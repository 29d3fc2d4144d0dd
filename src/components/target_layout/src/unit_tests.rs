use crate::{
    decl::{
        BaseSpecifier, DeclContext, FieldDecl, MethodDecl, MethodRef, RecordDef, RecordId,
        TagKind, TemplateKind, Type,
    },
    external::{ExternalLayoutSource, ExternalRecordLayout},
    queries::{self, QueryError},
    target::Target,
    type_layout::TypeLayoutCache,
};
use data_units::{BitUnits, ByteUnits};
use diagnostics::{DiagnosticFlags, Diagnostics};
use indexmap::IndexMap;
use source_files::{Location, Source, SourceFiles};

fn bit_offsets(values: &[u64]) -> Vec<BitUnits> {
    values.iter().copied().map(BitUnits::of).collect()
}

fn plain_struct(decls: &mut DeclContext, name: &str, fields: Vec<FieldDecl>) -> RecordId {
    decls.add(
        Some(name),
        TagKind::Struct,
        RecordDef {
            fields,
            ..Default::default()
        },
    )
}

#[test]
fn empty_struct_layout() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let empty = plain_struct(&mut decls, "Empty", vec![]);

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(empty);

    assert_eq!(layout.size, ByteUnits::of(1));
    assert_eq!(layout.data_size, ByteUnits::ZERO);
    assert_eq!(layout.alignment, ByteUnits::of(1));
    assert!(decls[empty].is_empty());
}

#[test]
fn char_then_int_struct() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let a = plain_struct(
        &mut decls,
        "A",
        vec![
            FieldDecl::named("a", Type::S8),
            FieldDecl::named("b", Type::S32),
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(a);

    assert_eq!(layout.field_offsets, bit_offsets(&[0, 32]));
    assert_eq!(layout.size, ByteUnits::of(8));
    assert_eq!(layout.data_size, ByteUnits::of(8));
    assert_eq!(layout.alignment, ByteUnits::of(4));
}

#[test]
fn empty_base_is_reused_at_offset_zero() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let empty = plain_struct(&mut decls, "Empty", vec![]);
    let b = decls.add(
        Some("B"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::direct(empty)],
            fields: vec![FieldDecl::named("x", Type::S32)],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(b);

    assert_eq!(layout.base_class_offset(empty), ByteUnits::ZERO);
    assert_eq!(layout.field_offsets, bit_offsets(&[0]));
    assert_eq!(layout.size, ByteUnits::of(4));
}

#[test]
fn polymorphic_class_gets_vtable_pointer() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let v = decls.add(
        Some("V"),
        TagKind::Class,
        RecordDef {
            fields: vec![FieldDecl::named("x", Type::S32)],
            methods: vec![MethodDecl::virtual_destructor("~V")],
            has_user_declared_dtor: true,
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(v);

    assert!(layout.cxx().has_own_vfptr);
    assert_eq!(layout.cxx().primary_base, None);
    assert_eq!(layout.field_offsets, bit_offsets(&[64]));
    assert_eq!(layout.size, ByteUnits::of(16));
    assert_eq!(layout.alignment, ByteUnits::of(8));
    assert_eq!(layout.data_size, ByteUnits::of(12));
    assert_eq!(layout.cxx().non_virtual_size, ByteUnits::of(12));
}

#[test]
fn diamond_shares_one_virtual_base() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let a = plain_struct(&mut decls, "A", vec![FieldDecl::named("x", Type::S32)]);
    let b = decls.add(
        Some("B"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::virtual_base(a)],
            ..Default::default()
        },
    );
    let c = decls.add(
        Some("C"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::virtual_base(a)],
            ..Default::default()
        },
    );
    let d = decls.add(
        Some("D"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::direct(b), BaseSpecifier::direct(c)],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    let b_layout = cache.record_layout(b);
    assert!(b_layout.cxx().has_own_vfptr);
    assert_eq!(b_layout.vbase_class_offset(a), ByteUnits::of(8));
    assert_eq!(b_layout.size, ByteUnits::of(16));

    let d_layout = cache.record_layout(d);
    assert_eq!(d_layout.cxx().primary_base, Some(b));
    assert!(!d_layout.cxx().primary_base_is_virtual);
    assert_eq!(d_layout.base_class_offset(b), ByteUnits::ZERO);
    assert_eq!(d_layout.base_class_offset(c), ByteUnits::of(8));

    // A single A subobject, shared through the virtual base map.
    assert_eq!(d_layout.cxx().vbase_offsets.len(), 1);
    assert_eq!(d_layout.vbase_class_offset(a), ByteUnits::of(16));
    assert_eq!(d_layout.cxx().non_virtual_size, ByteUnits::of(16));
    assert_eq!(d_layout.size, ByteUnits::of(24));
}

#[test]
fn bitfields_pack_into_storage_units() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let s = plain_struct(
        &mut decls,
        "S",
        vec![
            FieldDecl::bitfield(Some("a"), Type::S32, 3),
            FieldDecl::bitfield(Some("b"), Type::S32, 5),
            FieldDecl::bitfield(Some("c"), Type::S32, 24),
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(s);

    assert_eq!(layout.field_offsets, bit_offsets(&[0, 3, 8]));
    assert_eq!(layout.size, ByteUnits::of(4));
}

#[test]
fn wide_bitfield_uses_largest_fitting_unsigned_type() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let w = plain_struct(
        &mut decls,
        "W",
        vec![FieldDecl::bitfield(Some("f"), Type::S8, 40)],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(w);

    // 40 bits selects u32 as the allocation type.
    assert_eq!(layout.field_offsets, bit_offsets(&[0]));
    assert_eq!(layout.alignment, ByteUnits::of(4));
    assert_eq!(layout.size, ByteUnits::of(8));
}

#[test]
fn microsoft_union_wide_bitfield() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let u = decls.add(
        Some("U"),
        TagKind::Union,
        RecordDef {
            fields: vec![FieldDecl::bitfield(None, Type::U64, 40)],
            ..Default::default()
        },
    );

    let target = Target::x86_64_windows();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(u);

    assert_eq!(layout.field_offsets, bit_offsets(&[0]));
    assert_eq!(layout.size, ByteUnits::of(8));
}

#[test]
fn microsoft_32bit_vbptr_injection() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let empty = plain_struct(&mut decls, "Empty", vec![]);
    let q = decls.add(
        Some("Q"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::virtual_base(empty)],
            fields: vec![FieldDecl::named("c", Type::S8)],
            ..Default::default()
        },
    );

    let target = Target::i686_windows();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(q);

    // The vbptr sits at offset zero and pushes the field past it.
    assert_eq!(layout.cxx().vbptr_offset, Some(ByteUnits::ZERO));
    assert!(layout.has_own_vbptr());
    assert_eq!(layout.field_offsets, bit_offsets(&[32]));

    let vbase = layout.vbase_class_offset(empty);
    assert!(vbase >= ByteUnits::of(5));
    assert_eq!(vbase, ByteUnits::of(8));
    assert_eq!(layout.size, ByteUnits::of(8));
    assert_eq!(layout.alignment, ByteUnits::of(4));
}

#[test]
fn empty_subobjects_of_same_type_never_overlap() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let empty = plain_struct(&mut decls, "Empty", vec![]);
    let d = decls.add(
        Some("D"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::direct(empty)],
            fields: vec![FieldDecl::named("e", Type::Record(empty))],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(d);

    // The base Empty occupies offset zero, so the Empty member gets bumped.
    assert_eq!(layout.base_class_offset(empty), ByteUnits::ZERO);
    assert_eq!(layout.field_offsets, bit_offsets(&[8]));
    assert_eq!(layout.size, ByteUnits::of(2));
}

#[test]
fn nearly_empty_virtual_base_becomes_primary() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let v1 = decls.add(
        Some("V1"),
        TagKind::Class,
        RecordDef {
            methods: vec![MethodDecl::virtual_method("f")],
            ..Default::default()
        },
    );
    let d = decls.add(
        Some("D"),
        TagKind::Class,
        RecordDef {
            bases: vec![BaseSpecifier::virtual_base(v1)],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    assert!(cache.is_nearly_empty(v1));

    let layout = cache.record_layout(d);
    assert_eq!(layout.cxx().primary_base, Some(v1));
    assert!(layout.cxx().primary_base_is_virtual);
    assert_eq!(layout.vbase_class_offset(v1), ByteUnits::ZERO);
    assert_eq!(layout.size, ByteUnits::of(8));
}

#[test]
fn packed_struct_ignores_field_alignment() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let p = decls.add(
        Some("P"),
        TagKind::Struct,
        RecordDef {
            fields: vec![
                FieldDecl::named("a", Type::S8),
                FieldDecl::named("b", Type::S32),
            ],
            is_packed: true,
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(p);

    assert_eq!(layout.field_offsets, bit_offsets(&[0, 8]));
    assert_eq!(layout.size, ByteUnits::of(5));
    assert_eq!(layout.alignment, ByteUnits::of(1));
    // The natural alignment is still visible unadjusted.
    assert_eq!(layout.unadjusted_alignment, ByteUnits::of(4));
}

#[test]
fn pragma_pack_clamps_field_alignment() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let s = decls.add(
        Some("S"),
        TagKind::Struct,
        RecordDef {
            fields: vec![
                FieldDecl::named("a", Type::S8),
                FieldDecl::named("b", Type::S32),
            ],
            max_field_alignment: Some(ByteUnits::of(2)),
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(s);

    assert_eq!(layout.field_offsets, bit_offsets(&[0, 16]));
    assert_eq!(layout.size, ByteUnits::of(6));
    assert_eq!(layout.alignment, ByteUnits::of(2));
}

#[test]
fn mac68k_alignment_forces_two_bytes() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let m = decls.add(
        Some("M"),
        TagKind::Struct,
        RecordDef {
            fields: vec![FieldDecl::named("a", Type::S32)],
            is_mac68k_align: true,
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(m);

    assert_eq!(layout.field_offsets, bit_offsets(&[0]));
    assert_eq!(layout.alignment, ByteUnits::of(2));
    assert_eq!(layout.size, ByteUnits::of(4));
}

#[test]
fn flexible_array_member_contributes_alignment_only() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let f = plain_struct(
        &mut decls,
        "F",
        vec![
            FieldDecl::named("n", Type::S32),
            FieldDecl::named("tail", Type::incomplete_array(Type::S64)),
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(f);

    assert_eq!(layout.field_offsets, bit_offsets(&[0, 64]));
    assert_eq!(layout.size, ByteUnits::of(8));
    assert_eq!(layout.alignment, ByteUnits::of(8));
}

#[test]
fn ms_struct_bitfields_flush_on_type_size_change() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let s = decls.add(
        Some("S"),
        TagKind::Struct,
        RecordDef {
            fields: vec![
                FieldDecl::bitfield(Some("a"), Type::S32, 3),
                FieldDecl::bitfield(Some("b"), Type::S16, 4),
            ],
            is_ms_struct: true,
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(s);

    // The second bitfield has a different storage unit size, so it starts a
    // fresh unit instead of packing into the first.
    assert_eq!(layout.field_offsets, bit_offsets(&[0, 32]));
    assert_eq!(layout.size, ByteUnits::of(8));
    assert_eq!(layout.alignment, ByteUnits::of(4));
}

#[test]
fn c_mode_empty_struct_is_zero_sized() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let empty = plain_struct(&mut decls, "Empty", vec![]);

    let mut target = Target::x86_64_linux();
    target.cplusplus = false;
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(empty);

    assert_eq!(layout.size, ByteUnits::ZERO);
    assert_eq!(layout.alignment, ByteUnits::of(1));
    assert!(layout.cxx.is_none());
}

#[test]
fn microsoft_zero_sized_bases_get_separating_padding() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let e1 = plain_struct(&mut decls, "E1", vec![]);
    let e2 = plain_struct(&mut decls, "E2", vec![]);
    let s = decls.add(
        Some("S"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::direct(e1), BaseSpecifier::direct(e2)],
            ..Default::default()
        },
    );

    let target = Target::x86_64_windows();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(s);

    assert_eq!(layout.base_class_offset(e1), ByteUnits::ZERO);
    assert_eq!(layout.base_class_offset(e2), ByteUnits::of(1));
    assert_eq!(layout.size, ByteUnits::of(1));
    assert!(layout.has_zero_sized_subobject());
    assert!(layout.leads_with_zero_sized_base());
}

#[test]
fn microsoft_vtordisp_for_overriding_class_with_user_ctor() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let a = decls.add(
        Some("A"),
        TagKind::Class,
        RecordDef {
            fields: vec![FieldDecl::named("x", Type::S32)],
            methods: vec![MethodDecl::virtual_method("f")],
            ..Default::default()
        },
    );
    let b = decls.add(
        Some("B"),
        TagKind::Class,
        RecordDef {
            bases: vec![BaseSpecifier::virtual_base(a)],
            methods: vec![MethodDecl::virtual_method("f").overriding(MethodRef {
                record: a,
                index: 0,
            })],
            has_user_declared_ctor: true,
            ..Default::default()
        },
    );

    let target = Target::x86_64_windows();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    let a_layout = cache.record_layout(a);
    assert!(a_layout.cxx().has_own_vfptr);
    assert_eq!(a_layout.size, ByteUnits::of(16));

    let b_layout = cache.record_layout(b);
    assert_eq!(b_layout.cxx().vbptr_offset, Some(ByteUnits::ZERO));
    let vbase = b_layout.cxx().vbase_offsets[&a];
    assert!(vbase.has_vtordisp);
    assert_eq!(vbase.offset, ByteUnits::of(16));
    assert_eq!(b_layout.size, ByteUnits::of(32));
}

#[test]
fn objc_interface_starts_at_superclass_data_size() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let base = decls.add(
        Some("Base"),
        TagKind::Interface,
        RecordDef {
            fields: vec![FieldDecl::named("x", Type::S32)],
            ..Default::default()
        },
    );
    let derived = decls.add(
        Some("Derived"),
        TagKind::Interface,
        RecordDef {
            fields: vec![FieldDecl::named("c", Type::S8)],
            super_class: Some(base),
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    let base_layout = cache.objc_layout(base, None);
    assert_eq!(base_layout.size, ByteUnits::of(4));
    assert_eq!(base_layout.data_size, ByteUnits::of(4));

    let derived_layout = cache.objc_layout(derived, None);
    assert_eq!(derived_layout.field_offsets, bit_offsets(&[32]));
    assert_eq!(derived_layout.data_size, ByteUnits::of(5));
    assert_eq!(derived_layout.size, ByteUnits::of(8));
    assert_eq!(derived_layout.alignment, ByteUnits::of(4));
}

#[test]
fn objc_implementation_without_synthesized_ivars_reuses_interface_entry() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let interface = decls.add(
        Some("Thing"),
        TagKind::Interface,
        RecordDef {
            fields: vec![FieldDecl::named("x", Type::S32)],
            ..Default::default()
        },
    );
    let implementation = decls.add(
        Some("Thing"),
        TagKind::Interface,
        RecordDef {
            fields: vec![FieldDecl::named("x", Type::S32)],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    let via_interface = cache.objc_layout(interface, None) as *const _;
    let via_implementation = cache.objc_layout(interface, Some(implementation)) as *const _;
    assert_eq!(via_interface, via_implementation);
}

struct FixedSource {
    layouts: IndexMap<RecordId, ExternalRecordLayout>,
}

impl ExternalLayoutSource for FixedSource {
    fn layout_record(&self, record: RecordId) -> Option<ExternalRecordLayout> {
        self.layouts.get(&record).cloned()
    }
}

#[test]
fn external_layout_overrides_size_and_infers_alignment() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let x = plain_struct(&mut decls, "X", vec![FieldDecl::named("a", Type::S32)]);

    let mut field_offsets = IndexMap::new();
    field_offsets.insert(0u32, BitUnits::ZERO);
    let source = FixedSource {
        layouts: IndexMap::from_iter([(
            x,
            ExternalRecordLayout {
                size: BitUnits::of(64),
                alignment: BitUnits::ZERO,
                field_offsets,
                ..Default::default()
            },
        )]),
    };

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics).with_external_source(&source);
    let layout = cache.record_layout(x);

    assert_eq!(layout.field_offsets, bit_offsets(&[0]));
    // The external size wins; alignment was inferred from the fields.
    assert_eq!(layout.size, ByteUnits::of(8));
    assert_eq!(layout.alignment, ByteUnits::of(4));
}

#[test]
fn layouts_are_deterministic_across_fresh_caches() {
    let build = || {
        let mut decls = DeclContext::new();
        let empty = plain_struct(&mut decls, "Empty", vec![]);
        let s = decls.add(
            Some("S"),
            TagKind::Struct,
            RecordDef {
                bases: vec![BaseSpecifier::direct(empty)],
                fields: vec![
                    FieldDecl::named("a", Type::S8),
                    FieldDecl::bitfield(Some("b"), Type::S32, 7),
                    FieldDecl::named("e", Type::Record(empty)),
                ],
                ..Default::default()
            },
        );
        (decls, s)
    };

    let target = Target::x86_64_linux();

    let collect = |decls: &DeclContext, id: RecordId| {
        let source_files = SourceFiles::new();
        let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
        let cache = TypeLayoutCache::new(&target, decls, &diagnostics);
        let layout = cache.record_layout(id);
        (
            layout.size,
            layout.data_size,
            layout.alignment,
            layout.field_offsets.clone(),
            layout.cxx().base_offsets.clone(),
        )
    };

    let (decls_a, id_a) = build();
    let (decls_b, id_b) = build();
    assert_eq!(collect(&decls_a, id_a), collect(&decls_b, id_b));
}

#[test]
fn field_offsets_are_monotonic_for_non_unions() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let s = plain_struct(
        &mut decls,
        "S",
        vec![
            FieldDecl::named("a", Type::S8),
            FieldDecl::bitfield(Some("b"), Type::S32, 3),
            FieldDecl::bitfield(Some("c"), Type::S32, 9),
            FieldDecl::named("d", Type::S64),
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(s);

    assert!(layout.field_offsets.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!((layout.size % layout.alignment).is_zero());
    assert!(layout.data_size <= layout.size);
}

#[test]
fn union_places_every_field_at_zero() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let u = decls.add(
        Some("U"),
        TagKind::Union,
        RecordDef {
            fields: vec![
                FieldDecl::named("a", Type::S8),
                FieldDecl::named("b", Type::S64),
                FieldDecl::named("c", Type::S32),
            ],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(u);

    assert_eq!(layout.field_offsets, bit_offsets(&[0, 0, 0]));
    assert_eq!(layout.size, ByteUnits::of(8));
    assert_eq!(layout.alignment, ByteUnits::of(8));
}

#[test]
fn key_function_is_first_non_inline_virtual() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let k = decls.add(
        Some("K"),
        TagKind::Class,
        RecordDef {
            methods: vec![
                MethodDecl::virtual_method("f").inline_specified(),
                MethodDecl::virtual_method("g"),
                MethodDecl::virtual_method("h"),
            ],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    let expected = MethodRef { record: k, index: 1 };
    assert_eq!(cache.key_function(k), Some(expected));

    // Invalidation drops the cached answer; recomputation agrees.
    cache.set_non_key_function(expected);
    assert_eq!(cache.key_function(k), Some(expected));
}

#[test]
fn key_function_exclusions() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();

    let plain = plain_struct(&mut decls, "Plain", vec![FieldDecl::named("x", Type::S32)]);
    let abstract_only = decls.add(
        Some("Abstract"),
        TagKind::Class,
        RecordDef {
            methods: vec![MethodDecl::virtual_method("f").pure()],
            ..Default::default()
        },
    );
    let instantiation = decls.add(
        Some("Inst"),
        TagKind::Class,
        RecordDef {
            methods: vec![MethodDecl::virtual_method("f")],
            template_kind: TemplateKind::ImplicitInstantiation,
            ..Default::default()
        },
    );
    let inline_only = decls.add(
        Some("InlineOnly"),
        TagKind::Class,
        RecordDef {
            methods: vec![
                MethodDecl::virtual_method("f").with_inline_body(),
                MethodDecl::virtual_method("g").implicit(),
            ],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    assert_eq!(cache.key_function(plain), None);
    assert_eq!(cache.key_function(abstract_only), None);
    assert_eq!(cache.key_function(instantiation), None);
    assert_eq!(cache.key_function(inline_only), None);

    // The Microsoft ABI has no key functions at all.
    let ms_target = Target::x86_64_windows();
    let mut ms_decls = DeclContext::new();
    let ms_class = ms_decls.add(
        Some("K"),
        TagKind::Class,
        RecordDef {
            methods: vec![MethodDecl::virtual_method("f")],
            ..Default::default()
        },
    );
    let ms_cache = TypeLayoutCache::new(&ms_target, &ms_decls, &diagnostics);
    assert_eq!(ms_cache.key_function(ms_class), None);
}

#[test]
fn unnecessary_packed_warning_fires_once() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::all_collected());
    let mut decls = DeclContext::new();
    let p = decls.add(
        Some("P"),
        TagKind::Struct,
        RecordDef {
            fields: vec![FieldDecl::named("a", Type::S32)],
            is_packed: true,
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let _ = cache.record_layout(p);

    let rendered: Vec<String> = diagnostics
        .collected()
        .map(|diagnostic| {
            let mut out = String::new();
            diagnostic.show(&mut out, &source_files, None).unwrap();
            out
        })
        .collect();

    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains("packed attribute is unnecessary for 'P'"));
}

#[test]
fn padded_field_warning_reports_byte_amount() {
    let mut source_files = SourceFiles::new();
    let file = source_files.add("test.c".into(), String::new());
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::all_collected());

    let mut decls = DeclContext::new();
    let s = plain_struct(
        &mut decls,
        "S",
        vec![
            FieldDecl::named("a", Type::S8),
            FieldDecl::named("b", Type::S32).at(Source::new(file, Location::new(3, 5))),
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let _ = cache.record_layout(s);

    let rendered: Vec<String> = diagnostics
        .collected()
        .map(|diagnostic| {
            let mut out = String::new();
            diagnostic.show(&mut out, &source_files, None).unwrap();
            out
        })
        .collect();

    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains("padding struct 'S' with 3 bytes to align 'b'"));
    assert!(rendered[0].starts_with("test.c:3:5:"));
}

#[test]
fn dump_simple_mode_prints_record_line() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let a = plain_struct(
        &mut decls,
        "A",
        vec![
            FieldDecl::named("a", Type::S8),
            FieldDecl::named("b", Type::S32),
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    let mut out = String::new();
    cache.dump_record_layout(a, &mut out, true).unwrap();

    assert!(out.contains("<ASTRecordLayout"));
    assert!(out.contains("Size:64"));
    assert!(out.contains("DataSize:64"));
    assert!(out.contains("FieldOffsets: [0, 32]>"));
}

#[test]
fn dump_tree_mode_shows_vtable_pointer_and_summary() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let a = plain_struct(&mut decls, "A", vec![FieldDecl::named("x", Type::S32)]);
    let b = decls.add(
        Some("B"),
        TagKind::Class,
        RecordDef {
            bases: vec![BaseSpecifier::virtual_base(a)],
            methods: vec![MethodDecl::virtual_method("f")],
            ..Default::default()
        },
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    let mut out = String::new();
    cache.dump_record_layout(b, &mut out, false).unwrap();

    assert!(out.contains("(B vtable pointer)"));
    assert!(out.contains("A (virtual base)"));
    assert!(out.contains("[sizeof=16, dsize=12, align=8"));
    assert!(out.contains("nvsize=8, nvalign=8]"));
}

#[test]
fn field_offset_queries_resolve_indirect_fields() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let inner = decls.add(
        None,
        TagKind::Struct,
        RecordDef {
            fields: vec![FieldDecl::named("b", Type::S16)],
            ..Default::default()
        },
    );
    let outer = plain_struct(
        &mut decls,
        "S",
        vec![
            FieldDecl::named("a", Type::S32),
            FieldDecl {
                name: None,
                ty: Type::Record(inner),
                bit_width: None,
                is_packed: false,
                max_alignment: BitUnits::ZERO,
                source: Source::internal(),
            },
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    assert_eq!(
        queries::offset_of_named_field(&cache, outer, "b"),
        Ok(BitUnits::of(32))
    );
    assert_eq!(
        queries::offset_of_named_field(&cache, outer, "a"),
        Ok(BitUnits::ZERO)
    );
    assert_eq!(
        queries::offset_of_named_field(&cache, outer, "missing"),
        Err(QueryError::NoSuchField)
    );

    // The same chain through the field-reference interface.
    use crate::decl::FieldRef;
    let indirect = [
        FieldRef {
            record: outer,
            index: 1,
        },
        FieldRef {
            record: inner,
            index: 0,
        },
    ];
    assert_eq!(cache.indirect_field_offset(&indirect), BitUnits::of(32));
}

#[test]
fn size_queries_reject_incomplete_records() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let forward = decls.declare(Some("Fwd"), TagKind::Struct);

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    assert_eq!(
        queries::type_size_of(&cache, &Type::Record(forward)),
        Err(QueryError::Incomplete)
    );
    assert_eq!(
        queries::type_size_of(&cache, &Type::incomplete_array(Type::S32)),
        Err(QueryError::Incomplete)
    );
    assert_eq!(
        queries::type_align_of(&cache, &Type::incomplete_array(Type::S32)),
        Ok(ByteUnits::of(4))
    );
    assert_eq!(
        queries::type_size_of(&cache, &Type::array(3, Type::S32)),
        Ok(ByteUnits::of(12))
    );
}

#[test]
fn derived_record_classification() {
    let mut decls = DeclContext::new();
    let empty = plain_struct(&mut decls, "Empty", vec![]);
    assert!(decls[empty].is_empty());
    assert!(!decls[empty].is_dynamic_class());

    let c1 = plain_struct(&mut decls, "C1", vec![]);
    let b1 = decls.add(
        Some("B1"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::virtual_base(c1)],
            ..Default::default()
        },
    );
    let x = decls.add(
        Some("X"),
        TagKind::Struct,
        RecordDef {
            bases: vec![
                BaseSpecifier::direct(b1),
                BaseSpecifier::virtual_base(c1),
            ],
            ..Default::default()
        },
    );
    let y = decls.add(
        Some("Y"),
        TagKind::Struct,
        RecordDef {
            bases: vec![BaseSpecifier::virtual_base(b1)],
            ..Default::default()
        },
    );

    // A base's virtual bases come before the base itself.
    assert_eq!(decls[x].virtual_bases(), &[c1]);
    assert_eq!(decls[y].virtual_bases(), &[c1, b1]);

    assert!(decls[b1].is_dynamic_class());
    assert!(!decls[b1].is_polymorphic());
    assert!(!decls[b1].is_empty());
}

#[test]
fn arm_style_abi_skips_out_of_line_inline_key_functions() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let k = decls.add(
        Some("K"),
        TagKind::Class,
        RecordDef {
            methods: vec![
                MethodDecl::virtual_method("f").with_inline_definition(),
                MethodDecl::virtual_method("g"),
            ],
            ..Default::default()
        },
    );

    let arm = Target::arm64_apple();
    let arm_cache = TypeLayoutCache::new(&arm, &decls, &diagnostics);
    assert_eq!(
        arm_cache.key_function(k),
        Some(MethodRef { record: k, index: 1 })
    );

    // The generic Itanium ABI doesn't care where the definition lives.
    let generic = Target::x86_64_linux();
    let generic_cache = TypeLayoutCache::new(&generic, &decls, &diagnostics);
    assert_eq!(
        generic_cache.key_function(k),
        Some(MethodRef { record: k, index: 0 })
    );
}

#[test]
fn pointers_and_references_lay_out_as_pointer_width() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();
    let s = plain_struct(
        &mut decls,
        "S",
        vec![
            FieldDecl::named("p", Type::pointer(Type::S32)),
            FieldDecl::named("r", Type::reference(Type::S64)),
            FieldDecl::named("f", Type::FuncPtr),
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);
    let layout = cache.record_layout(s);

    assert_eq!(layout.field_offsets, bit_offsets(&[0, 64, 128]));
    assert_eq!(layout.size, ByteUnits::of(24));
    assert_eq!(layout.alignment, ByteUnits::of(8));
}

#[test]
fn field_attributes_adjust_placement() {
    let source_files = SourceFiles::new();
    let diagnostics = Diagnostics::new(&source_files, DiagnosticFlags::default());
    let mut decls = DeclContext::new();

    // An aligned attribute raises the field's alignment.
    let aligned = plain_struct(
        &mut decls,
        "Aligned",
        vec![
            FieldDecl::named("a", Type::S8),
            FieldDecl::named("b", Type::S32).aligned(BitUnits::of(64)),
        ],
    );
    // A packed attribute on one field drops its alignment to one char.
    let packed = plain_struct(
        &mut decls,
        "Packed",
        vec![
            FieldDecl::named("a", Type::S8),
            FieldDecl::named("b", Type::S32).packed(),
        ],
    );

    let target = Target::x86_64_linux();
    let cache = TypeLayoutCache::new(&target, &decls, &diagnostics);

    let aligned_layout = cache.record_layout(aligned);
    assert_eq!(aligned_layout.field_offsets, bit_offsets(&[0, 64]));
    assert_eq!(aligned_layout.size, ByteUnits::of(16));
    assert_eq!(aligned_layout.alignment, ByteUnits::of(8));

    let packed_layout = cache.record_layout(packed);
    assert_eq!(packed_layout.field_offsets, bit_offsets(&[0, 8]));
    assert_eq!(packed_layout.size, ByteUnits::of(5));
    assert_eq!(packed_layout.alignment, ByteUnits::of(1));
}
