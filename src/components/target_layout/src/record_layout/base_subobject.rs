use crate::{decl::RecordId, type_layout::TypeLayoutCache};
use arena::{Arena, new_id};
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::ops::Index;

new_id!(BaseInfoId, u32);

/// A single base subobject in a complete class.
///
/// For a hierarchy like
///
/// ```text
/// class A { };
/// class B : A { };
/// class C : A, B { };
/// ```
///
/// the graph for `C` has three nodes, one for `B` and two for `A`. A virtual
/// base gets exactly one node no matter how many paths reach it; back-edges
/// are stored as ids so the graph stays a plain arena.
#[derive(Debug)]
pub struct BaseSubobjectInfo {
    pub class: RecordId,
    pub is_virtual: bool,
    pub bases: SmallVec<[BaseInfoId; 4]>,
    /// The node for this base's primary virtual base, when it has one.
    pub primary_virtual_base: Option<BaseInfoId>,
    /// The unique subobject that has claimed this virtual-base node as its
    /// primary, when one has.
    pub derived: Option<BaseInfoId>,
}

#[derive(Debug, Default)]
pub struct BaseSubobjectGraph {
    nodes: Arena<BaseInfoId, BaseSubobjectInfo>,
    /// Every (direct or indirect) virtual base to its single node.
    pub virtual_base_info: IndexMap<RecordId, BaseInfoId>,
    /// Direct non-virtual bases to their nodes.
    pub non_virtual_base_info: IndexMap<RecordId, BaseInfoId>,
}

impl BaseSubobjectGraph {
    pub fn compute(ctx: &TypeLayoutCache, record: RecordId) -> Self {
        let mut graph = Self::default();

        for base in &ctx.decls[record].bases {
            let info = graph.compute_node(ctx, base.class, base.is_virtual);

            if base.is_virtual {
                // compute_node has already registered the node for us.
                debug_assert!(graph.virtual_base_info.contains_key(&base.class));
            } else {
                assert!(
                    !graph.non_virtual_base_info.contains_key(&base.class),
                    "non-virtual base already exists"
                );
                graph.non_virtual_base_info.insert(base.class, info);
            }
        }

        graph
    }

    fn compute_node(
        &mut self,
        ctx: &TypeLayoutCache,
        class: RecordId,
        is_virtual: bool,
    ) -> BaseInfoId {
        if is_virtual {
            if let Some(&existing) = self.virtual_base_info.get(&class) {
                debug_assert_eq!(self.nodes[existing].class, class);
                return existing;
            }
        }

        let info = self.nodes.alloc(BaseSubobjectInfo {
            class,
            is_virtual,
            bases: SmallVec::new(),
            primary_virtual_base: None,
            derived: None,
        });

        if is_virtual {
            self.virtual_base_info.insert(class, info);
        }

        // Check if this base has a primary virtual base of its own.
        let mut primary_virtual_base: Option<RecordId> = None;
        let mut primary_virtual_base_info: Option<BaseInfoId> = None;

        if ctx.decls[class].has_virtual_bases() {
            let layout = ctx.record_layout(class);
            if layout.cxx().primary_base_is_virtual {
                let primary = layout
                    .cxx()
                    .primary_base
                    .expect("virtual primary base exists");
                primary_virtual_base = Some(primary);

                if let Some(&existing) = self.virtual_base_info.get(&primary) {
                    primary_virtual_base_info = Some(existing);

                    if self.nodes[existing].derived.is_some() {
                        // Already claimed as the primary virtual base of
                        // another base.
                        primary_virtual_base = None;
                    } else {
                        self.nodes[info].primary_virtual_base = Some(existing);
                        self.nodes[existing].derived = Some(info);
                    }
                }
            }
        }

        for base in &ctx.decls[class].bases {
            let child = self.compute_node(ctx, base.class, base.is_virtual);
            self.nodes[info].bases.push(child);
        }

        if let (Some(primary), None) = (primary_virtual_base, primary_virtual_base_info) {
            // Traversing the bases must have created the node for our
            // primary virtual base; claim it now.
            let created = *self
                .virtual_base_info
                .get(&primary)
                .expect("created a node for the primary virtual base");

            self.nodes[info].primary_virtual_base = Some(created);
            self.nodes[created].derived = Some(info);
        }

        info
    }

    /// Releases a virtual-base node's claim so the class under layout can
    /// take it as its own primary base.
    pub fn clear_derived(&mut self, id: BaseInfoId) {
        self.nodes[id].derived = None;
    }
}

impl Index<BaseInfoId> for BaseSubobjectGraph {
    type Output = BaseSubobjectInfo;

    fn index(&self, id: BaseInfoId) -> &BaseSubobjectInfo {
        &self.nodes[id]
    }
}
