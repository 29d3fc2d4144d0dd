use arena::{Arena, new_id};
use data_units::{BitUnits, ByteUnits};
use derive_more::IsVariant;
use smallvec::SmallVec;
use source_files::Source;
use std::ops::Index;

new_id!(RecordId, u32);

/// A method within a record, addressed by declaration index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub record: RecordId,
    pub index: u32,
}

/// A field within a record, addressed by declaration index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub record: RecordId,
    pub index: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, IsVariant)]
pub enum TagKind {
    Struct,
    Union,
    Class,
    Interface,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AddressSpace(pub u32);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    S8,
    U8,
    S16,
    U16,
    S32,
    U32,
    S64,
    U64,
    F32,
    F64,
    Ptr {
        pointee: Box<Type>,
        addr_space: AddressSpace,
    },
    FuncPtr,
    Reference {
        referent: Box<Type>,
        addr_space: AddressSpace,
    },
    Record(RecordId),
    FixedArray {
        length: u64,
        element: Box<Type>,
    },
    IncompleteArray(Box<Type>),
}

impl Type {
    pub fn pointer(pointee: Type) -> Self {
        Self::Ptr {
            pointee: Box::new(pointee),
            addr_space: AddressSpace::default(),
        }
    }

    pub fn reference(referent: Type) -> Self {
        Self::Reference {
            referent: Box::new(referent),
            addr_space: AddressSpace::default(),
        }
    }

    pub fn array(length: u64, element: Type) -> Self {
        Self::FixedArray {
            length,
            element: Box::new(element),
        }
    }

    pub fn incomplete_array(element: Type) -> Self {
        Self::IncompleteArray(Box::new(element))
    }

    /// Peels arrays down to the element type they ultimately contain.
    pub fn base_element_type(&self) -> &Type {
        match self {
            Type::FixedArray { element, .. } => element.base_element_type(),
            Type::IncompleteArray(element) => element.base_element_type(),
            other => other,
        }
    }

    pub fn as_record(&self) -> Option<RecordId> {
        match self {
            Type::Record(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_incomplete_array(&self) -> bool {
        matches!(self, Type::IncompleteArray(_))
    }

    /// Non-compound scalar types (integers, floats, bool).
    pub fn is_builtin_scalar(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::S8
                | Type::U8
                | Type::S16
                | Type::U16
                | Type::S32
                | Type::U32
                | Type::S64
                | Type::U64
                | Type::F32
                | Type::F64
        )
    }
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: Option<String>,
    pub ty: Type,
    /// Declared bit width when this field is a bitfield.
    pub bit_width: Option<u64>,
    pub is_packed: bool,
    /// Largest alignment demanded by alignment attributes, zero when absent.
    pub max_alignment: BitUnits,
    pub source: Source,
}

impl FieldDecl {
    pub fn named(name: impl ToString, ty: Type) -> Self {
        Self {
            name: Some(name.to_string()),
            ty,
            bit_width: None,
            is_packed: false,
            max_alignment: BitUnits::ZERO,
            source: Source::internal(),
        }
    }

    pub fn bitfield(name: Option<&str>, ty: Type, width: u64) -> Self {
        Self {
            name: name.map(str::to_string),
            ty,
            bit_width: Some(width),
            is_packed: false,
            max_alignment: BitUnits::ZERO,
            source: Source::internal(),
        }
    }

    pub fn packed(mut self) -> Self {
        self.is_packed = true;
        self
    }

    pub fn aligned(mut self, alignment: BitUnits) -> Self {
        self.max_alignment = alignment;
        self
    }

    pub fn at(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn is_bitfield(&self) -> bool {
        self.bit_width.is_some()
    }

    pub fn is_zero_width_bitfield(&self) -> bool {
        self.bit_width == Some(0)
    }

    pub fn is_unnamed(&self) -> bool {
        self.name.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct MethodDecl {
    pub name: String,
    pub is_virtual: bool,
    pub is_pure: bool,
    pub is_implicit: bool,
    pub is_inline_specified: bool,
    pub has_inline_body: bool,
    pub is_user_provided: bool,
    pub is_destructor: bool,
    /// Some definition of this method is marked inline, even when the
    /// declaration is not.
    pub has_inline_definition: bool,
    /// Methods of base classes this method overrides.
    pub overridden: SmallVec<[MethodRef; 1]>,
}

impl MethodDecl {
    pub fn virtual_method(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            is_virtual: true,
            is_pure: false,
            is_implicit: false,
            is_inline_specified: false,
            has_inline_body: false,
            is_user_provided: true,
            is_destructor: false,
            has_inline_definition: false,
            overridden: SmallVec::new(),
        }
    }

    pub fn virtual_destructor(name: impl ToString) -> Self {
        Self {
            is_destructor: true,
            ..Self::virtual_method(name)
        }
    }

    pub fn pure(mut self) -> Self {
        self.is_pure = true;
        self
    }

    pub fn implicit(mut self) -> Self {
        self.is_implicit = true;
        self.is_user_provided = false;
        self
    }

    pub fn inline_specified(mut self) -> Self {
        self.is_inline_specified = true;
        self
    }

    pub fn with_inline_body(mut self) -> Self {
        self.has_inline_body = true;
        self
    }

    pub fn with_inline_definition(mut self) -> Self {
        self.has_inline_definition = true;
        self
    }

    pub fn overriding(mut self, overridden: MethodRef) -> Self {
        self.overridden.push(overridden);
        self
    }
}

#[derive(Copy, Clone, Debug)]
pub struct BaseSpecifier {
    pub class: RecordId,
    pub is_virtual: bool,
}

impl BaseSpecifier {
    pub fn direct(class: RecordId) -> Self {
        Self {
            class,
            is_virtual: false,
        }
    }

    pub fn virtual_base(class: RecordId) -> Self {
        Self {
            class,
            is_virtual: true,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TemplateKind {
    #[default]
    NotTemplate,
    ImplicitInstantiation,
    ExplicitSpecialization,
    ExplicitInstantiationDeclaration,
    ExplicitInstantiationDefinition,
}

/// The definition payload handed to [`DeclContext::define`].
#[derive(Debug)]
pub struct RecordDef {
    pub fields: Vec<FieldDecl>,
    pub bases: Vec<BaseSpecifier>,
    pub methods: Vec<MethodDecl>,
    pub super_class: Option<RecordId>,
    pub is_packed: bool,
    /// `#pragma pack` ceiling, when one was in effect.
    pub max_field_alignment: Option<ByteUnits>,
    /// Alignment attribute on the record itself, zero when absent.
    pub max_alignment: BitUnits,
    pub is_ms_struct: bool,
    pub is_mac68k_align: bool,
    pub has_user_declared_ctor: bool,
    pub has_user_declared_dtor: bool,
    pub is_externally_visible: bool,
    pub template_kind: TemplateKind,
    pub source: Source,
}

impl Default for RecordDef {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            bases: Vec::new(),
            methods: Vec::new(),
            super_class: None,
            is_packed: false,
            max_field_alignment: None,
            max_alignment: BitUnits::ZERO,
            is_ms_struct: false,
            is_mac68k_align: false,
            has_user_declared_ctor: false,
            has_user_declared_dtor: false,
            is_externally_visible: true,
            template_kind: TemplateKind::NotTemplate,
            source: Source::internal(),
        }
    }
}

/// A fully elaborated record declaration.
///
/// The derived classification flags (emptiness, polymorphism, transitive
/// virtual bases, ...) are computed once when the definition is installed and
/// are read-only afterwards, so the layout engine never re-derives them.
#[derive(Debug)]
pub struct RecordDecl {
    pub name: Option<String>,
    pub kind: TagKind,
    pub fields: Vec<FieldDecl>,
    pub bases: Vec<BaseSpecifier>,
    pub methods: Vec<MethodDecl>,
    pub super_class: Option<RecordId>,
    pub is_complete: bool,
    pub is_packed: bool,
    pub max_field_alignment: Option<ByteUnits>,
    pub max_alignment: BitUnits,
    pub is_ms_struct: bool,
    pub is_mac68k_align: bool,
    pub has_user_declared_ctor: bool,
    pub has_user_declared_dtor: bool,
    pub is_externally_visible: bool,
    pub template_kind: TemplateKind,
    pub source: Source,

    empty: bool,
    polymorphic: bool,
    dynamic: bool,
    pod: bool,
    trivial: bool,
    standard_layout: bool,
    virtual_bases: Vec<RecordId>,
}

impl RecordDecl {
    fn incomplete(name: Option<&str>, kind: TagKind) -> Self {
        Self {
            name: name.map(str::to_string),
            kind,
            fields: Vec::new(),
            bases: Vec::new(),
            methods: Vec::new(),
            super_class: None,
            is_complete: false,
            is_packed: false,
            max_field_alignment: None,
            max_alignment: BitUnits::ZERO,
            is_ms_struct: false,
            is_mac68k_align: false,
            has_user_declared_ctor: false,
            has_user_declared_dtor: false,
            is_externally_visible: true,
            template_kind: TemplateKind::NotTemplate,
            source: Source::internal(),
            empty: false,
            polymorphic: false,
            dynamic: false,
            pod: false,
            trivial: false,
            standard_layout: false,
            virtual_bases: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Anything laid out as a struct/union/class, as opposed to an
    /// Objective-C interface.
    pub fn is_record(&self) -> bool {
        !self.kind.is_interface()
    }

    /// Empty in the C++ sense: no storage-requiring members anywhere.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    /// Requires a vtable: polymorphic or has virtual bases.
    pub fn is_dynamic_class(&self) -> bool {
        self.dynamic
    }

    pub fn is_pod(&self) -> bool {
        self.pod
    }

    pub fn is_trivial(&self) -> bool {
        self.trivial
    }

    pub fn is_standard_layout(&self) -> bool {
        self.standard_layout
    }

    /// All virtual bases, direct and indirect, in inheritance order.
    pub fn virtual_bases(&self) -> &[RecordId] {
        &self.virtual_bases
    }

    pub fn has_virtual_bases(&self) -> bool {
        !self.virtual_bases.is_empty()
    }
}

/// Owns every record declaration, addressed by [`RecordId`].
///
/// Records are declared (possibly incomplete) and later defined; bases and
/// field record types must be defined before the records that use them, which
/// declaration order guarantees in the languages we model.
#[derive(Debug, Default)]
pub struct DeclContext {
    records: Arena<RecordId, RecordDecl>,
}

impl DeclContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: Option<&str>, kind: TagKind) -> RecordId {
        self.records.alloc(RecordDecl::incomplete(name, kind))
    }

    pub fn define(&mut self, id: RecordId, def: RecordDef) {
        assert!(!self.records[id].is_complete, "record defined twice");

        let polymorphic = def.methods.iter().any(|method| method.is_virtual)
            || def
                .bases
                .iter()
                .any(|base| self.records[base.class].polymorphic);

        let mut virtual_bases = Vec::new();
        for base in &def.bases {
            for &vbase in self.records[base.class].virtual_bases() {
                if !virtual_bases.contains(&vbase) {
                    virtual_bases.push(vbase);
                }
            }
            if base.is_virtual && !virtual_bases.contains(&base.class) {
                virtual_bases.push(base.class);
            }
        }

        let dynamic = polymorphic || !virtual_bases.is_empty();

        let empty = !polymorphic
            && virtual_bases.is_empty()
            && def.fields.iter().all(FieldDecl::is_zero_width_bitfield)
            && def
                .bases
                .iter()
                .all(|base| !base.is_virtual && self.records[base.class].empty);

        let has_user_special_members = def.has_user_declared_ctor || def.has_user_declared_dtor;

        let pod = !polymorphic
            && !has_user_special_members
            && def.bases.is_empty()
            && virtual_bases.is_empty()
            && def.fields.iter().all(|field| self.type_is_pod(&field.ty));

        let trivial = !polymorphic
            && !has_user_special_members
            && virtual_bases.is_empty()
            && def
                .bases
                .iter()
                .all(|base| self.records[base.class].trivial)
            && def.fields.iter().all(|field| {
                field
                    .ty
                    .base_element_type()
                    .as_record()
                    .map_or(true, |record| self.records[record].trivial)
            });

        let standard_layout = !polymorphic
            && virtual_bases.is_empty()
            && def
                .bases
                .iter()
                .all(|base| self.records[base.class].standard_layout)
            && def.fields.iter().all(|field| {
                field
                    .ty
                    .base_element_type()
                    .as_record()
                    .map_or(true, |record| self.records[record].standard_layout)
            });

        let record = &mut self.records[id];
        record.fields = def.fields;
        record.bases = def.bases;
        record.methods = def.methods;
        record.super_class = def.super_class;
        record.is_complete = true;
        record.is_packed = def.is_packed;
        record.max_field_alignment = def.max_field_alignment;
        record.max_alignment = def.max_alignment;
        record.is_ms_struct = def.is_ms_struct;
        record.is_mac68k_align = def.is_mac68k_align;
        record.has_user_declared_ctor = def.has_user_declared_ctor;
        record.has_user_declared_dtor = def.has_user_declared_dtor;
        record.is_externally_visible = def.is_externally_visible;
        record.template_kind = def.template_kind;
        record.source = def.source;
        record.empty = empty;
        record.polymorphic = polymorphic;
        record.dynamic = dynamic;
        record.pod = pod;
        record.trivial = trivial;
        record.standard_layout = standard_layout;
        record.virtual_bases = virtual_bases;
    }

    pub fn add(&mut self, name: Option<&str>, kind: TagKind, def: RecordDef) -> RecordId {
        let id = self.declare(name, kind);
        self.define(id, def);
        id
    }

    pub fn method(&self, method: MethodRef) -> &MethodDecl {
        &self.records[method.record].methods[method.index as usize]
    }

    pub fn field(&self, field: FieldRef) -> &FieldDecl {
        &self.records[field.record].fields[field.index as usize]
    }

    pub fn records(&self) -> impl Iterator<Item = (RecordId, &RecordDecl)> {
        self.records.iter()
    }

    fn type_is_pod(&self, ty: &Type) -> bool {
        match ty.base_element_type() {
            Type::Record(id) => self.records[*id].pod,
            Type::Reference { .. } => false,
            _ => true,
        }
    }

    /// Renders a type for dumps and diagnostics.
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Bool => "bool".into(),
            Type::S8 => "s8".into(),
            Type::U8 => "u8".into(),
            Type::S16 => "s16".into(),
            Type::U16 => "u16".into(),
            Type::S32 => "s32".into(),
            Type::U32 => "u32".into(),
            Type::S64 => "s64".into(),
            Type::U64 => "u64".into(),
            Type::F32 => "f32".into(),
            Type::F64 => "f64".into(),
            Type::Ptr { pointee, .. } => format!("{}*", self.type_name(pointee)),
            Type::FuncPtr => "void (*)()".into(),
            Type::Reference { referent, .. } => format!("{}&", self.type_name(referent)),
            Type::Record(id) => self.records[*id].display_name().to_string(),
            Type::FixedArray { length, element } => {
                format!("{}[{}]", self.type_name(element), length)
            }
            Type::IncompleteArray(element) => format!("{}[]", self.type_name(element)),
        }
    }
}

impl Index<RecordId> for DeclContext {
    type Output = RecordDecl;

    fn index(&self, id: RecordId) -> &RecordDecl {
        &self.records[id]
    }
}
