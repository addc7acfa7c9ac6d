// value.rs -- Scalar element types and the tagged runtime value.
//
// Every buffer element and every intermediate expression result is one
// of four scalar types: f32, u8, u32, i32. `DType` names the type,
// `Value` carries a concrete scalar through the interpreter.
//
// PROMOTION: mixed-type arithmetic follows a small fixed lattice,
// matching the implicit C promotions the original benchmark kernels
// rely on (e.g. `(packed & 0xff) / 255.0f` evaluates in f32):
//   - anything op F32  -> F32
//   - U8 op U32        -> U32
//   - U8 op I32        -> I32
//   - U32 op I32       -> I32
// Integer arithmetic wraps (conv sums stay far from the limits in
// practice); casts use Rust `as` semantics.

use std::fmt;

/// Scalar element type of a buffer or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
    U8,
    U32,
    I32,
}

impl DType {
    /// Result type of a binary operation between `self` and `other`.
    pub fn promote(self, other: DType) -> DType {
        use DType::*;
        match (self, other) {
            (F32, _) | (_, F32) => F32,
            (I32, _) | (_, I32) => I32,
            (U32, _) | (_, U32) => U32,
            (U8, U8) => U8,
        }
    }

    /// True for the three integer types.
    pub fn is_integer(self) -> bool {
        !matches!(self, DType::F32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I32 => "i32",
        };
        write!(f, "{name}")
    }
}

/// A single scalar value, tagged with its type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    F32(f32),
    U8(u8),
    U32(u32),
    I32(i32),
}

impl Value {
    pub fn dtype(self) -> DType {
        match self {
            Value::F32(_) => DType::F32,
            Value::U8(_) => DType::U8,
            Value::U32(_) => DType::U32,
            Value::I32(_) => DType::I32,
        }
    }

    /// Zero of the given type.
    pub fn zero(dtype: DType) -> Value {
        match dtype {
            DType::F32 => Value::F32(0.0),
            DType::U8 => Value::U8(0),
            DType::U32 => Value::U32(0),
            DType::I32 => Value::I32(0),
        }
    }

    /// Widen to f32. Exact for u8 and for integers below 2^24.
    pub fn as_f32(self) -> f32 {
        match self {
            Value::F32(v) => v,
            Value::U8(v) => v as f32,
            Value::U32(v) => v as f32,
            Value::I32(v) => v as f32,
        }
    }

    /// Widen to i64 for coordinate arithmetic. `None` for floats,
    /// since coordinates must be integer-valued.
    pub fn as_index(self) -> Option<i64> {
        match self {
            Value::F32(_) => None,
            Value::U8(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
        }
    }

    /// Widen to u32 (wrapping for i32, like a C cast).
    pub fn as_u32(self) -> u32 {
        match self {
            Value::F32(v) => v as u32,
            Value::U8(v) => v as u32,
            Value::U32(v) => v,
            Value::I32(v) => v as u32,
        }
    }

    /// Widen to i32 (wrapping for u32, like a C cast).
    pub fn as_i32(self) -> i32 {
        match self {
            Value::F32(v) => v as i32,
            Value::U8(v) => v as i32,
            Value::U32(v) => v as i32,
            Value::I32(v) => v,
        }
    }

    /// Convert to `dtype` with Rust `as` semantics (float->int
    /// saturating, int->int wrapping).
    pub fn cast(self, dtype: DType) -> Value {
        match dtype {
            DType::F32 => Value::F32(self.as_f32()),
            DType::U8 => Value::U8(match self {
                Value::F32(v) => v as u8,
                Value::U8(v) => v,
                Value::U32(v) => v as u8,
                Value::I32(v) => v as u8,
            }),
            DType::U32 => Value::U32(self.as_u32()),
            DType::I32 => Value::I32(self.as_i32()),
        }
    }

    /// Nonzero test, used by `Select` conditions.
    pub fn is_truthy(self) -> bool {
        match self {
            Value::F32(v) => v != 0.0,
            Value::U8(v) => v != 0,
            Value::U32(v) => v != 0,
            Value::I32(v) => v != 0,
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::F32(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Value {
        Value::U8(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::U32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::I32(v)
    }
}
