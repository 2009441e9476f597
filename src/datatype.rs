//! Datatype trait and type tag mapping.
//!
//! This module provides the [`Datatype`] trait, a sealed trait that maps Rust
//! primitive types to wire tags and little-endian encodings for use in generic
//! communication operations.
//!
//! # Supported Types
//!
//! | Rust Type | Tag Value | Width |
//! |-----------|-----------|-------|
//! | `f32`     | 0         | 4     |
//! | `f64`     | 1         | 8     |
//! | `i32`     | 2         | 4     |
//! | `i64`     | 3         | 8     |
//! | `u8`      | 4         | 1     |
//! | `u32`     | 5         | 4     |
//! | `u64`     | 6         | 8     |

use crate::ReduceOp;

/// Seals the trait against external implementations.
mod sealed {
    pub trait Sealed {}
}

/// Tag values carried in every message envelope.
///
/// A receive only matches payloads whose tag equals the receive buffer's
/// tag, so the discriminants double as the wire identity of each type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DatatypeTag {
    /// 32-bit floating point
    F32 = 0,
    /// 64-bit floating point
    F64 = 1,
    /// 32-bit signed integer
    I32 = 2,
    /// 64-bit signed integer
    I64 = 3,
    /// 8-bit unsigned integer
    U8 = 4,
    /// 32-bit unsigned integer
    U32 = 5,
    /// 64-bit unsigned integer
    U64 = 6,
}

impl DatatypeTag {
    /// Human-readable name of the Rust type behind this tag.
    pub fn name(self) -> &'static str {
        match self {
            DatatypeTag::F32 => "f32",
            DatatypeTag::F64 => "f64",
            DatatypeTag::I32 => "i32",
            DatatypeTag::I64 => "i64",
            DatatypeTag::U8 => "u8",
            DatatypeTag::U32 => "u32",
            DatatypeTag::U64 => "u64",
        }
    }
}

/// Trait for types that can be used in communication operations.
///
/// This is a **sealed trait**: it cannot be implemented outside this crate.
/// Supported types: [`f32`], [`f64`], [`i32`], [`i64`], [`u8`], [`u32`], [`u64`].
///
/// # Example
///
/// ```
/// use ferrocomm::{Datatype, ReduceOp};
///
/// let bytes = 7i32.to_wire();
/// assert_eq!(i32::from_wire(&bytes), 7);
/// assert_eq!(3u64.combine(4, ReduceOp::Sum), 7);
/// ```
pub trait Datatype:
    sealed::Sealed + Copy + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    /// The datatype tag carried in message envelopes.
    const TAG: DatatypeTag;

    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Additive identity, used to zero-fill window regions.
    const ZERO: Self;

    /// Little-endian encoding of this value.
    fn to_wire(self) -> Vec<u8>;

    /// Decode a value from exactly [`WIDTH`](Self::WIDTH) little-endian bytes.
    fn from_wire(bytes: &[u8]) -> Self;

    /// Combine two values with a reduction operation.
    ///
    /// Integer sums and products wrap instead of overflowing.
    fn combine(self, other: Self, op: ReduceOp) -> Self;
}

macro_rules! impl_datatype {
    ($ty:ty, $tag:expr, $zero:expr, $combine:ident) => {
        impl sealed::Sealed for $ty {}
        impl Datatype for $ty {
            const TAG: DatatypeTag = $tag;
            const WIDTH: usize = std::mem::size_of::<$ty>();
            const ZERO: Self = $zero;

            fn to_wire(self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }

            fn from_wire(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }

            fn combine(self, other: Self, op: ReduceOp) -> Self {
                $combine!(self, other, op)
            }
        }
    };
}

macro_rules! combine_int {
    ($a:expr, $b:expr, $op:expr) => {
        match $op {
            ReduceOp::Sum => $a.wrapping_add($b),
            ReduceOp::Prod => $a.wrapping_mul($b),
            ReduceOp::Max => $a.max($b),
            ReduceOp::Min => $a.min($b),
        }
    };
}

macro_rules! combine_float {
    ($a:expr, $b:expr, $op:expr) => {
        match $op {
            ReduceOp::Sum => $a + $b,
            ReduceOp::Prod => $a * $b,
            ReduceOp::Max => $a.max($b),
            ReduceOp::Min => $a.min($b),
        }
    };
}

impl_datatype!(f32, DatatypeTag::F32, 0.0, combine_float);
impl_datatype!(f64, DatatypeTag::F64, 0.0, combine_float);
impl_datatype!(i32, DatatypeTag::I32, 0, combine_int);
impl_datatype!(i64, DatatypeTag::I64, 0, combine_int);
impl_datatype!(u8, DatatypeTag::U8, 0, combine_int);
impl_datatype!(u32, DatatypeTag::U32, 0, combine_int);
impl_datatype!(u64, DatatypeTag::U64, 0, combine_int);

/// Encode a slice into one contiguous little-endian payload.
pub(crate) fn encode_slice<T: Datatype>(data: &[T]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(data.len() * T::WIDTH);
    for value in data {
        payload.extend_from_slice(&value.to_wire());
    }
    payload
}

/// Decode a payload produced by [`encode_slice`] into `out`.
///
/// `out` must hold exactly `payload.len() / T::WIDTH` elements.
pub(crate) fn decode_into<T: Datatype>(payload: &[u8], out: &mut [T]) {
    for (slot, chunk) in out.iter_mut().zip(payload.chunks_exact(T::WIDTH)) {
        *slot = T::from_wire(chunk);
    }
}

/// Decode a whole payload into a fresh vector.
pub(crate) fn decode_vec<T: Datatype>(payload: &[u8]) -> Vec<T> {
    payload.chunks_exact(T::WIDTH).map(T::from_wire).collect()
}
