use std::ops::{Add, AddAssign, Mul, Rem, Sub, SubAssign};

/// A count of storage units (bytes on every target we support).
///
/// Offsets and sizes that cross an interface boundary are always in
/// [`ByteUnits`]; [`BitUnits`] exist for bitfield layout, which is the only
/// place sub-byte precision is meaningful. Converting between the two goes
/// through the target's char width, so no conversion lives here.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ByteUnits {
    units: u64,
}

impl ByteUnits {
    pub const ZERO: Self = Self { units: 0 };
    pub const ONE: Self = Self { units: 1 };

    pub const fn of(value: u64) -> Self {
        Self { units: value }
    }

    pub const fn bytes(&self) -> u64 {
        self.units
    }
}

/// A count of bits, used only during bitfield layout.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BitUnits {
    units: u64,
}

impl BitUnits {
    pub const ZERO: Self = Self { units: 0 };

    pub const fn of(value: u64) -> Self {
        Self { units: value }
    }

    pub const fn bits(&self) -> u64 {
        self.units
    }
}

macro_rules! impl_units_from {
    ($units:ty, $ty:ty) => {
        impl From<$ty> for $units {
            fn from(value: $ty) -> Self {
                Self {
                    units: value.into(),
                }
            }
        }
    };
}

impl_units_from!(ByteUnits, u8);
impl_units_from!(ByteUnits, u16);
impl_units_from!(ByteUnits, u32);
impl_units_from!(ByteUnits, u64);

impl_units_from!(BitUnits, u8);
impl_units_from!(BitUnits, u16);
impl_units_from!(BitUnits, u32);
impl_units_from!(BitUnits, u64);

macro_rules! impl_math_for {
    ($units:ty) => {
        impl $units {
            pub fn is_zero(&self) -> bool {
                self.units == 0
            }

            /// Rounds up to the next multiple of `align`.
            ///
            /// `align` must be a non-zero power of two.
            pub fn align_to(&self, align: $units) -> $units {
                assert!(align.is_power_of_2());
                Self::of(self.units.saturating_add(align.units - 1) & !(align.units - 1))
            }

            pub fn is_power_of_2(&self) -> bool {
                self.units.is_power_of_two()
            }
        }

        impl Add<$units> for $units {
            type Output = $units;

            fn add(self, rhs: $units) -> Self::Output {
                Self {
                    units: self.units.saturating_add(rhs.units),
                }
            }
        }

        impl AddAssign<$units> for $units {
            fn add_assign(&mut self, rhs: $units) {
                *self = *self + rhs;
            }
        }

        impl Sub<$units> for $units {
            type Output = $units;

            fn sub(self, rhs: $units) -> Self::Output {
                Self {
                    units: self.units.saturating_sub(rhs.units),
                }
            }
        }

        impl SubAssign<$units> for $units {
            fn sub_assign(&mut self, rhs: $units) {
                *self = *self - rhs;
            }
        }

        impl Mul<u64> for $units {
            type Output = $units;

            fn mul(self, rhs: u64) -> Self::Output {
                Self {
                    units: self.units.saturating_mul(rhs),
                }
            }
        }

        impl Rem<$units> for $units {
            type Output = $units;

            fn rem(self, rhs: $units) -> Self::Output {
                Self {
                    units: self.units % rhs.units,
                }
            }
        }
    };
}

impl_math_for!(ByteUnits);
impl_math_for!(BitUnits);
