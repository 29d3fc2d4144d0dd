use crate::{
    decl::{FieldDecl, RecordId, Type},
    record_layout::base_subobject::{BaseInfoId, BaseSubobjectGraph},
    type_layout::{ASTRecordLayout, TypeLayoutCache},
};
use data_units::ByteUnits;
use indexmap::IndexMap;
use smallvec::SmallVec;

/// Tracks which empty subobjects exist at which offsets while laying out a
/// C++ class.
///
/// The C++ object model requires two distinct subobjects of the same type to
/// have distinct addresses; since empty bases and members occupy no storage,
/// the builder has to prove that property explicitly for them. The map is
/// purely advisory: a rejected placement makes the builder try the next
/// aligned offset.
#[derive(Debug)]
pub struct EmptySubobjectMap<'a> {
    ctx: &'a TypeLayoutCache<'a>,
    /// The class whose empty entries we're keeping track of.
    class: RecordId,
    /// Offsets to the empty classes known to live there.
    empty_class_offsets: IndexMap<ByteUnits, SmallVec<[RecordId; 1]>>,
    /// The highest offset known to contain an empty subobject.
    max_empty_class_offset: ByteUnits,
    /// Size of the largest empty base or member subobject; zero when the
    /// class being built contains no empty classes anywhere.
    pub size_of_largest_empty_subobject: ByteUnits,
}

impl<'a> EmptySubobjectMap<'a> {
    pub fn new(ctx: &'a TypeLayoutCache<'a>, class: RecordId) -> Self {
        let mut map = Self {
            ctx,
            class,
            empty_class_offsets: IndexMap::new(),
            max_empty_class_offset: ByteUnits::ZERO,
            size_of_largest_empty_subobject: ByteUnits::ZERO,
        };
        map.compute_empty_subobject_sizes();
        map
    }

    fn compute_empty_subobject_sizes(&mut self) {
        let record = &self.ctx.decls[self.class];

        for base in &record.bases {
            let layout = self.ctx.record_layout(base.class);

            let empty_size = if self.ctx.decls[base.class].is_empty() {
                layout.size
            } else {
                layout.cxx().size_of_largest_empty_subobject
            };

            if empty_size > self.size_of_largest_empty_subobject {
                self.size_of_largest_empty_subobject = empty_size;
            }
        }

        for field in &record.fields {
            let Some(member) = self.as_class(field.ty.base_element_type()) else {
                continue;
            };

            let layout = self.ctx.record_layout(member);
            let empty_size = if self.ctx.decls[member].is_empty() {
                layout.size
            } else {
                layout.cxx().size_of_largest_empty_subobject
            };

            if empty_size > self.size_of_largest_empty_subobject {
                self.size_of_largest_empty_subobject = empty_size;
            }
        }
    }

    /// Record types only; Objective-C object types are never empty-tracked.
    fn as_class(&self, ty: &Type) -> Option<RecordId> {
        ty.as_record().filter(|id| self.ctx.decls[*id].is_record())
    }

    fn any_empty_subobjects_beyond_offset(&self, offset: ByteUnits) -> bool {
        offset <= self.max_empty_class_offset
    }

    fn field_offset_in_chars(&self, layout: &ASTRecordLayout, field_no: usize) -> ByteUnits {
        self.ctx.target.to_byte_units(layout.field_offset(field_no))
    }

    fn can_place_subobject_at_offset(&self, class: RecordId, offset: ByteUnits) -> bool {
        // Only empty classes can conflict.
        if !self.ctx.decls[class].is_empty() {
            return true;
        }

        let Some(classes) = self.empty_class_offsets.get(&offset) else {
            return true;
        };

        // There must not already be an empty class of the same type here.
        !classes.contains(&class)
    }

    fn add_subobject_at_offset(&mut self, class: RecordId, offset: ByteUnits) {
        if !self.ctx.decls[class].is_empty() {
            return;
        }

        // Empty structures inside a union can legitimately share an offset;
        // just avoid recording them twice.
        let classes = self.empty_class_offsets.entry(offset).or_default();
        if classes.contains(&class) {
            return;
        }

        classes.push(class);

        if offset > self.max_empty_class_offset {
            self.max_empty_class_offset = offset;
        }
    }

    fn can_place_base_subobject_at_offset(
        &self,
        graph: &BaseSubobjectGraph,
        info: BaseInfoId,
        offset: ByteUnits,
    ) -> bool {
        // We don't have to keep looking past the maximum offset that's known
        // to contain an empty class.
        if !self.any_empty_subobjects_beyond_offset(offset) {
            return true;
        }

        let node = &graph[info];

        if !self.can_place_subobject_at_offset(node.class, offset) {
            return false;
        }

        let layout = self.ctx.record_layout(node.class);

        for &base in &node.bases {
            if graph[base].is_virtual {
                continue;
            }

            let base_offset = offset + layout.base_class_offset(graph[base].class);
            if !self.can_place_base_subobject_at_offset(graph, base, base_offset) {
                return false;
            }
        }

        if let Some(primary) = node.primary_virtual_base {
            if graph[primary].derived == Some(info)
                && !self.can_place_base_subobject_at_offset(graph, primary, offset)
            {
                return false;
            }
        }

        for (field_no, field) in self.ctx.decls[node.class].fields.iter().enumerate() {
            if field.is_bitfield() {
                continue;
            }

            let field_offset = offset + self.field_offset_in_chars(layout, field_no);
            if !self.can_place_field_subobject_at_offset(field, field_offset) {
                return false;
            }
        }

        true
    }

    fn update_empty_base_subobjects(
        &mut self,
        graph: &BaseSubobjectGraph,
        info: BaseInfoId,
        offset: ByteUnits,
        placing_empty_base: bool,
    ) {
        if !placing_empty_base && offset >= self.size_of_largest_empty_subobject {
            // The only empty subobjects that can conflict with empty
            // subobjects of non-empty bases are empty bases that can be
            // placed at offset zero, so entries past the largest empty
            // subobject never matter.
            return;
        }

        let node = &graph[info];
        self.add_subobject_at_offset(node.class, offset);

        let layout = self.ctx.record_layout(node.class);

        for &base in &node.bases {
            if graph[base].is_virtual {
                continue;
            }

            let base_offset = offset + layout.base_class_offset(graph[base].class);
            self.update_empty_base_subobjects(graph, base, base_offset, placing_empty_base);
        }

        if let Some(primary) = node.primary_virtual_base {
            if graph[primary].derived == Some(info) {
                self.update_empty_base_subobjects(graph, primary, offset, placing_empty_base);
            }
        }

        for (field_no, field) in self.ctx.decls[node.class].fields.iter().enumerate() {
            if field.is_bitfield() {
                continue;
            }

            let field_offset = offset + self.field_offset_in_chars(layout, field_no);
            self.update_empty_field_subobjects(field, field_offset);
        }
    }

    /// Returns whether the whole base subobject graph rooted at `info` can be
    /// placed at `offset` without two empty subobjects of the same type
    /// sharing an address. On success the map is updated to include the
    /// placement.
    pub fn can_place_base_at_offset(
        &mut self,
        graph: &BaseSubobjectGraph,
        info: BaseInfoId,
        offset: ByteUnits,
    ) -> bool {
        // If we know this class doesn't have any empty subobjects we don't
        // need to bother checking.
        if self.size_of_largest_empty_subobject.is_zero() {
            return true;
        }

        if !self.can_place_base_subobject_at_offset(graph, info, offset) {
            return false;
        }

        let placing_empty_base = self.ctx.decls[graph[info].class].is_empty();
        self.update_empty_base_subobjects(graph, info, offset, placing_empty_base);
        true
    }

    fn can_place_field_record_at_offset(
        &self,
        class: RecordId,
        outermost: RecordId,
        offset: ByteUnits,
    ) -> bool {
        if !self.any_empty_subobjects_beyond_offset(offset) {
            return true;
        }

        if !self.can_place_subobject_at_offset(class, offset) {
            return false;
        }

        let layout = self.ctx.record_layout(class);
        let record = &self.ctx.decls[class];

        for base in &record.bases {
            if base.is_virtual {
                continue;
            }

            let base_offset = offset + layout.base_class_offset(base.class);
            if !self.can_place_field_record_at_offset(base.class, outermost, base_offset) {
                return false;
            }
        }

        if class == outermost {
            // This is the most derived class; traverse virtual bases too.
            for &vbase in record.virtual_bases() {
                let vbase_offset = offset + layout.vbase_class_offset(vbase);
                if !self.can_place_field_record_at_offset(vbase, outermost, vbase_offset) {
                    return false;
                }
            }
        }

        for (field_no, field) in record.fields.iter().enumerate() {
            if field.is_bitfield() {
                continue;
            }

            let field_offset = offset + self.field_offset_in_chars(layout, field_no);
            if !self.can_place_field_subobject_at_offset(field, field_offset) {
                return false;
            }
        }

        true
    }

    fn can_place_field_subobject_at_offset(&self, field: &FieldDecl, offset: ByteUnits) -> bool {
        if !self.any_empty_subobjects_beyond_offset(offset) {
            return true;
        }

        if let Some(class) = self.as_class(&field.ty) {
            return self.can_place_field_record_at_offset(class, class, offset);
        }

        // Arrays get every element checked.
        if let Some((class, count)) = self.constant_array_of_classes(&field.ty) {
            let layout = self.ctx.record_layout(class);

            let mut element_offset = offset;
            for _ in 0..count {
                if !self.any_empty_subobjects_beyond_offset(element_offset) {
                    return true;
                }

                if !self.can_place_field_record_at_offset(class, class, element_offset) {
                    return false;
                }

                element_offset += layout.size;
            }
        }

        true
    }

    /// Returns whether `field` can be placed at `offset`; on success the map
    /// is updated to include the placement.
    pub fn can_place_field_at_offset(&mut self, field: &FieldDecl, offset: ByteUnits) -> bool {
        if !self.can_place_field_subobject_at_offset(field, offset) {
            return false;
        }

        self.update_empty_field_subobjects(field, offset);
        true
    }

    fn update_empty_field_record_subobjects(
        &mut self,
        class: RecordId,
        outermost: RecordId,
        offset: ByteUnits,
    ) {
        // Entries at or past the largest empty subobject can never conflict
        // with a later placement.
        if offset >= self.size_of_largest_empty_subobject {
            return;
        }

        self.add_subobject_at_offset(class, offset);

        let layout = self.ctx.record_layout(class);
        let record = &self.ctx.decls[class];

        for base in &record.bases {
            if base.is_virtual {
                continue;
            }

            let base_offset = offset + layout.base_class_offset(base.class);
            self.update_empty_field_record_subobjects(base.class, outermost, base_offset);
        }

        if class == outermost {
            for &vbase in record.virtual_bases() {
                let vbase_offset = offset + layout.vbase_class_offset(vbase);
                self.update_empty_field_record_subobjects(vbase, outermost, vbase_offset);
            }
        }

        for (field_no, field) in record.fields.iter().enumerate() {
            if field.is_bitfield() {
                continue;
            }

            let field_offset = offset + self.field_offset_in_chars(layout, field_no);
            self.update_empty_field_subobjects(field, field_offset);
        }
    }

    fn update_empty_field_subobjects(&mut self, field: &FieldDecl, offset: ByteUnits) {
        if let Some(class) = self.as_class(&field.ty) {
            self.update_empty_field_record_subobjects(class, class, offset);
            return;
        }

        if let Some((class, count)) = self.constant_array_of_classes(&field.ty) {
            let layout = self.ctx.record_layout(class);

            let mut element_offset = offset;
            for _ in 0..count {
                if element_offset >= self.size_of_largest_empty_subobject {
                    return;
                }

                self.update_empty_field_record_subobjects(class, class, element_offset);
                element_offset += layout.size;
            }
        }
    }

    /// Flattens nested constant arrays down to a record element type and the
    /// total element count.
    fn constant_array_of_classes(&self, ty: &Type) -> Option<(RecordId, u64)> {
        let mut count: u64 = 1;
        let mut current = ty;

        while let Type::FixedArray { length, element } = current {
            count = count.saturating_mul(*length);
            current = element.as_ref();
        }

        if std::ptr::eq(current, ty) {
            // Not an array at all.
            return None;
        }

        self.as_class(current).map(|class| (class, count))
    }
}
