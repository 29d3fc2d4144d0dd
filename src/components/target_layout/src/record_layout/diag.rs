use crate::decl::TagKind;
use data_units::BitUnits;
use diagnostics::{Diagnostic, Show, minimal_filename};
use source_files::{Source, SourceFiles};
use std::path::Path;

/// Discriminator used by padding diagnostics: 0 = struct, 1 = interface,
/// 2 = class.
pub fn padding_tag_index(kind: TagKind) -> u8 {
    match kind {
        TagKind::Struct | TagKind::Union => 0,
        TagKind::Interface => 1,
        TagKind::Class => 2,
    }
}

fn padding_tag_name(tag: u8) -> &'static str {
    match tag {
        0 => "struct",
        1 => "interface",
        _ => "class",
    }
}

/// A quantity of padding, reported in bytes when whole bytes were inserted
/// and in bits otherwise.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PadAmount {
    pub quantity: u64,
    pub in_bits: bool,
}

impl PadAmount {
    pub fn from_bits(padding: BitUnits, char_width: BitUnits) -> Self {
        if (padding % char_width).is_zero() {
            Self {
                quantity: padding.bits() / char_width.bits(),
                in_bits: false,
            }
        } else {
            Self {
                quantity: padding.bits(),
                in_bits: true,
            }
        }
    }

    pub fn is_plural(&self) -> bool {
        self.quantity != 1
    }
}

impl std::fmt::Display for PadAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match (self.in_bits, self.is_plural()) {
            (true, false) => "bit",
            (true, true) => "bits",
            (false, false) => "byte",
            (false, true) => "bytes",
        };
        write!(f, "{} {}", self.quantity, unit)
    }
}

/// Padding was inserted before a field to satisfy its alignment.
pub struct PaddedFieldWarning {
    pub tag: u8,
    pub record_name: String,
    /// `None` for anonymous members (typically unnamed bitfields).
    pub field_name: Option<String>,
    pub padding: PadAmount,
    pub source: Source,
}

impl Show for PaddedFieldWarning {
    fn show(
        &self,
        w: &mut dyn std::fmt::Write,
        source_files: &SourceFiles,
        project_root: Option<&Path>,
    ) -> std::fmt::Result {
        write!(
            w,
            "{}:{}:{}: warning: padding {} '{}' with {} to align ",
            minimal_filename(self.source, source_files, project_root),
            self.source.location.line,
            self.source.location.column,
            padding_tag_name(self.tag),
            self.record_name,
            self.padding,
        )?;

        match &self.field_name {
            Some(name) => write!(w, "'{}'", name),
            None => write!(w, "anonymous bit-field"),
        }
    }
}

impl Diagnostic for PaddedFieldWarning {}

/// Padding was added to the end of the record to reach its alignment.
pub struct PaddedSizeWarning {
    pub tag: u8,
    pub record_name: String,
    pub padding: PadAmount,
    pub source: Source,
}

impl Show for PaddedSizeWarning {
    fn show(
        &self,
        w: &mut dyn std::fmt::Write,
        source_files: &SourceFiles,
        project_root: Option<&Path>,
    ) -> std::fmt::Result {
        write!(
            w,
            "{}:{}:{}: warning: padding size of {} '{}' with {} to alignment boundary",
            minimal_filename(self.source, source_files, project_root),
            self.source.location.line,
            self.source.location.column,
            padding_tag_name(self.tag),
            self.record_name,
            self.padding,
        )
    }
}

impl Diagnostic for PaddedSizeWarning {}
