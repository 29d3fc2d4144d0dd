use crate::{decl::RecordId, type_layout::TypeLayoutCache};
use data_units::ByteUnits;
use std::fmt;

fn print_offset(
    w: &mut dyn fmt::Write,
    offset: ByteUnits,
    indent_level: usize,
) -> fmt::Result {
    write!(w, "{:4} | ", offset.bytes())?;
    write!(w, "{}", "  ".repeat(indent_level))
}

fn print_indent_no_offset(w: &mut dyn fmt::Write, indent_level: usize) -> fmt::Result {
    write!(w, "     | ")?;
    write!(w, "{}", "  ".repeat(indent_level))
}

fn dump_cxx_record_layout(
    ctx: &TypeLayoutCache,
    rd: RecordId,
    w: &mut dyn fmt::Write,
    offset: ByteUnits,
    indent_level: usize,
    description: Option<&str>,
    include_virtual_bases: bool,
) -> fmt::Result {
    let layout = ctx.record_layout(rd);
    let record = &ctx.decls[rd];
    let is_ms = ctx.target.cxx_abi.is_microsoft();

    print_offset(w, offset, indent_level)?;
    write!(w, "{}", record.display_name())?;
    if let Some(description) = description {
        write!(w, " {}", description)?;
    }
    if record.is_empty() {
        write!(w, " (empty)")?;
    }
    writeln!(w)?;

    let indent_level = indent_level + 1;

    let primary_base = layout.cxx().primary_base;

    // Vtable pointer.
    if record.is_dynamic_class() && primary_base.is_none() && !is_ms {
        print_offset(w, offset, indent_level)?;
        writeln!(w, "({} vtable pointer)", record.display_name())?;
    } else if layout.has_own_vfptr() {
        // vfptr, for the Microsoft C++ ABI.
        print_offset(w, offset, indent_level)?;
        writeln!(w, "({} vftable pointer)", record.display_name())?;
    }

    // Non-virtual bases.
    for base in &record.bases {
        if base.is_virtual {
            continue;
        }

        let base_offset = offset + layout.base_class_offset(base.class);
        let description = if primary_base == Some(base.class) {
            "(primary base)"
        } else {
            "(base)"
        };
        dump_cxx_record_layout(
            ctx,
            base.class,
            w,
            base_offset,
            indent_level,
            Some(description),
            false,
        )?;
    }

    // vbptr, for the Microsoft C++ ABI.
    if layout.has_own_vbptr() {
        print_offset(
            w,
            offset + layout.cxx().vbptr_offset.expect("vbptr offset"),
            indent_level,
        )?;
        writeln!(w, "({} vbtable pointer)", record.display_name())?;
    }

    // Fields.
    for (field_no, field) in record.fields.iter().enumerate() {
        let field_offset =
            offset + ctx.target.to_byte_units_floor(layout.field_offset(field_no));

        if let Some(field_class) = field
            .ty
            .as_record()
            .filter(|id| ctx.decls[*id].is_record())
        {
            dump_cxx_record_layout(
                ctx,
                field_class,
                w,
                field_offset,
                indent_level,
                field.name.as_deref(),
                true,
            )?;
            continue;
        }

        print_offset(w, field_offset, indent_level)?;
        writeln!(
            w,
            "{} {}",
            ctx.decls.type_name(&field.ty),
            field.name.as_deref().unwrap_or("")
        )?;
    }

    if include_virtual_bases {
        for &vbase in record.virtual_bases() {
            let vbase_info = layout.cxx().vbase_offsets[&vbase];
            let vbase_offset = offset + vbase_info.offset;

            if vbase_info.has_vtordisp {
                print_offset(w, vbase_offset - ByteUnits::of(4), indent_level)?;
                writeln!(w, "(vtordisp for vbase {})", ctx.decls[vbase].display_name())?;
            }

            let description = if primary_base == Some(vbase) {
                "(primary virtual base)"
            } else {
                "(virtual base)"
            };
            dump_cxx_record_layout(
                ctx,
                vbase,
                w,
                vbase_offset,
                indent_level,
                Some(description),
                false,
            )?;
        }

        print_indent_no_offset(w, indent_level - 1)?;
        write!(w, "[sizeof={}", layout.size.bytes())?;
        if !is_ms {
            write!(w, ", dsize={}", layout.data_size.bytes())?;
        }
        writeln!(w, ", align={}", layout.alignment.bytes())?;

        print_indent_no_offset(w, indent_level - 1)?;
        writeln!(
            w,
            " nvsize={}, nvalign={}]",
            layout.cxx().non_virtual_size.bytes(),
            layout.cxx().non_virtual_alignment.bytes()
        )?;
        writeln!(w)?;
    }

    Ok(())
}

/// Renders a completed layout as human-readable text: the indented subobject
/// tree, or the single-line `<ASTRecordLayout ...>` record in simple mode.
pub fn dump_record_layout(
    ctx: &TypeLayoutCache,
    rd: RecordId,
    w: &mut dyn fmt::Write,
    simple: bool,
) -> fmt::Result {
    let record = &ctx.decls[rd];
    let layout = if record.is_record() {
        ctx.record_layout(rd)
    } else {
        ctx.objc_layout(rd, None)
    };

    if record.is_record() && ctx.target.cplusplus && !simple {
        return dump_cxx_record_layout(ctx, rd, w, ByteUnits::ZERO, 0, None, true);
    }

    writeln!(w, "Type: {}", record.display_name())?;
    write!(w, "\nLayout: ")?;
    writeln!(w, "<ASTRecordLayout")?;
    writeln!(w, "  Size:{}", ctx.target.to_bits(layout.size).bits())?;
    if !ctx.target.cxx_abi.is_microsoft() {
        writeln!(w, "  DataSize:{}", ctx.target.to_bits(layout.data_size).bits())?;
    }
    writeln!(w, "  Alignment:{}", ctx.target.to_bits(layout.alignment).bits())?;
    write!(w, "  FieldOffsets: [")?;
    for (index, field_offset) in layout.field_offsets.iter().enumerate() {
        if index != 0 {
            write!(w, ", ")?;
        }
        write!(w, "{}", field_offset.bits())?;
    }
    writeln!(w, "]>")
}
