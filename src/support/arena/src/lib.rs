#![no_std]

/*
    =======================  support/arena/src/lib.rs  ========================
    A small index-based arena with strongly-typed ids
    ---------------------------------------------------------------------------
*/

extern crate alloc;

use alloc::vec::Vec;
use core::{
    fmt::Debug,
    marker::PhantomData,
    ops::{Index, IndexMut},
};

/// A trait for index types used in arenas.
///
/// An [`Id`] represents both the internal index in an arena and a type-level
/// distinction (so ids from different arenas cannot be mixed up).
pub trait Id: Copy + Ord + Debug {
    /// The maximum value (as a usize) this id type can represent.
    const MAX: usize;

    /// Converts a `usize` value to this id type.
    fn from_usize(idx: usize) -> Self;

    /// Converts this id type into a `usize`.
    fn into_usize(self) -> usize;
}

/// Marker for ids declared with [`new_id!`].
pub trait NewId: Id {}

impl Id for u32 {
    const MAX: usize = u32::MAX as usize;

    #[inline]
    fn from_usize(idx: usize) -> Self {
        idx as u32
    }

    #[inline]
    fn into_usize(self) -> usize {
        self as usize
    }
}

impl Id for usize {
    const MAX: usize = usize::MAX;

    #[inline]
    fn from_usize(idx: usize) -> Self {
        idx
    }

    #[inline]
    fn into_usize(self) -> usize {
        self
    }
}

/// Declares a dedicated id type backed by the given integer type.
#[macro_export]
macro_rules! new_id {
    ($name: ident, $ty: ty) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($ty);

        impl ::arena::Id for $name {
            const MAX: usize = <$ty>::MAX as usize;

            #[inline]
            fn from_usize(idx: usize) -> Self {
                ::arena::assert_fits_or_practically_impossible!(idx, $ty);
                Self(idx as $ty)
            }

            #[inline]
            fn into_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl ::arena::NewId for $name {}
    };
}

#[macro_export]
macro_rules! assert_fits_or_practically_impossible {
    ($idx: expr, $ty: ty) => {
        if const { ::core::mem::size_of::<$ty>() < ::core::mem::size_of::<u64>() }
            || cfg!(debug_assertions)
        {
            assert!($idx <= <$ty>::MAX as usize);
        }
    };
}

/// An index-based arena.
///
/// [`Arena`] allocates objects and refers to them by a strongly-typed id.
/// Elements are never removed; the arena is dropped as a whole.
pub struct Arena<K: Id, V> {
    data: Vec<V>,
    phantom: PhantomData<K>,
}

impl<K: Id, V> Arena<K, V> {
    /// Creates a new empty arena.
    ///
    /// ```
    /// # use arena::Arena;
    /// let arena: Arena<u32, i32> = Arena::new();
    /// assert!(arena.is_empty());
    /// ```
    #[inline]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            phantom: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocates an element in the arena and returns its id.
    ///
    /// ```
    /// # use arena::Arena;
    /// let mut arena: Arena<u32, &str> = Arena::new();
    /// let id = arena.alloc("hello");
    /// assert_eq!(arena[id], "hello");
    /// ```
    #[inline]
    pub fn alloc(&mut self, value: V) -> K {
        assert!(self.data.len() < K::MAX, "arena is full");
        let id = K::from_usize(self.data.len());
        self.data.push(value);
        id
    }

    #[inline]
    pub fn get(&self, id: K) -> Option<&V> {
        self.data.get(id.into_usize())
    }

    /// Returns an iterator over the ids and elements of the arena.
    ///
    /// ```
    /// # use arena::Arena;
    /// let mut arena = Arena::<u32, _>::new();
    /// let id = arena.alloc(20);
    /// assert_eq!(arena.iter().next(), Some((id, &20)));
    /// ```
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.data
            .iter()
            .enumerate()
            .map(|(idx, value)| (K::from_usize(idx), value))
    }

    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        (0..self.data.len()).map(K::from_usize)
    }
}

impl<K: Id, V> Default for Arena<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Id, V: Debug> Debug for Arena<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}

impl<K: Id, V> Index<K> for Arena<K, V> {
    type Output = V;

    #[inline]
    fn index(&self, id: K) -> &V {
        &self.data[id.into_usize()]
    }
}

impl<K: Id, V> IndexMut<K> for Arena<K, V> {
    #[inline]
    fn index_mut(&mut self, id: K) -> &mut V {
        &mut self.data[id.into_usize()]
    }
}
