use crate::{decl::AddressSpace, type_layout::TypeLayout};
use data_units::{BitUnits, ByteUnits};
use derive_more::IsVariant;
use indexmap::IndexMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, IsVariant)]
pub enum CxxAbi {
    Itanium,
    Microsoft,
}

/// Whether object layout may allocate derived-class members into a base
/// class's tail padding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TailPaddingUse {
    Always,
    UnlessPod03,
    UnlessPod11,
}

/// Everything the layout engine needs to know about the target.
///
/// Fields are public: exotic configurations (disabled bitfield type
/// alignment, zero-length bitfield boundaries, address-space pointer
/// overrides) are dialed in by mutating a preset.
#[derive(Clone, Debug)]
pub struct Target {
    pub char_width: BitUnits,
    pub pointer_width: ByteUnits,
    pub pointer_alignment: ByteUnits,
    /// Pointer width/alignment overrides for non-default address spaces.
    pub address_space_pointers: IndexMap<AddressSpace, (ByteUnits, ByteUnits)>,
    pub cxx_abi: CxxAbi,
    pub cplusplus: bool,
    pub tail_padding_use: TailPaddingUse,
    pub use_bitfield_type_alignment: bool,
    pub use_zero_length_bitfield_alignment: bool,
    pub zero_length_bitfield_boundary: BitUnits,
    pub can_key_function_be_inline: bool,
    pub has_key_functions: bool,
    /// `-fpack-struct`-style default maximum field alignment.
    pub default_max_field_alignment: Option<ByteUnits>,
    /// Lay out bitfields with Microsoft packing rules even under Itanium.
    pub ms_bitfields: bool,
}

impl Target {
    pub fn x86_64_linux() -> Self {
        Self {
            char_width: BitUnits::of(8),
            pointer_width: ByteUnits::of(8),
            pointer_alignment: ByteUnits::of(8),
            address_space_pointers: IndexMap::new(),
            cxx_abi: CxxAbi::Itanium,
            cplusplus: true,
            tail_padding_use: TailPaddingUse::UnlessPod03,
            use_bitfield_type_alignment: true,
            use_zero_length_bitfield_alignment: false,
            zero_length_bitfield_boundary: BitUnits::ZERO,
            can_key_function_be_inline: true,
            has_key_functions: true,
            default_max_field_alignment: None,
            ms_bitfields: false,
        }
    }

    pub fn arm64_apple() -> Self {
        Self {
            tail_padding_use: TailPaddingUse::UnlessPod11,
            can_key_function_be_inline: false,
            ..Self::x86_64_linux()
        }
    }

    pub fn x86_64_windows() -> Self {
        Self {
            cxx_abi: CxxAbi::Microsoft,
            has_key_functions: false,
            ..Self::x86_64_linux()
        }
    }

    pub fn i686_windows() -> Self {
        Self {
            pointer_width: ByteUnits::of(4),
            pointer_alignment: ByteUnits::of(4),
            ..Self::x86_64_windows()
        }
    }

    pub fn to_bits(&self, units: ByteUnits) -> BitUnits {
        BitUnits::of(units.bytes().saturating_mul(self.char_width.bits()))
    }

    pub fn to_byte_units(&self, bits: BitUnits) -> ByteUnits {
        assert!(
            (bits % self.char_width).is_zero(),
            "bit count not at char boundary"
        );
        ByteUnits::of(bits.bits() / self.char_width.bits())
    }

    /// Truncating bit-to-char conversion, for alignments that packing may
    /// have pushed below one char.
    pub fn to_byte_units_floor(&self, bits: BitUnits) -> ByteUnits {
        ByteUnits::of(bits.bits() / self.char_width.bits())
    }

    pub fn char_align(&self) -> BitUnits {
        self.char_width
    }

    pub fn is_64bit(&self) -> bool {
        self.to_bits(self.pointer_width) == BitUnits::of(64)
    }

    pub fn pointer_width_in(&self, addr_space: AddressSpace) -> ByteUnits {
        self.address_space_pointers
            .get(&addr_space)
            .map_or(self.pointer_width, |(width, _)| *width)
    }

    pub fn pointer_align_in(&self, addr_space: AddressSpace) -> ByteUnits {
        self.address_space_pointers
            .get(&addr_space)
            .map_or(self.pointer_alignment, |(_, alignment)| *alignment)
    }

    pub fn pointer_layout(&self) -> TypeLayout {
        self.pointer_layout_in(AddressSpace::default())
    }

    pub fn pointer_layout_in(&self, addr_space: AddressSpace) -> TypeLayout {
        TypeLayout {
            width: self.pointer_width_in(addr_space),
            alignment: self.pointer_align_in(addr_space),
            unadjusted_alignment: self.pointer_align_in(addr_space),
            alignment_requirement: Default::default(),
        }
    }

    pub fn bool_layout(&self) -> TypeLayout {
        TypeLayout::basic(ByteUnits::of(1))
    }
}
