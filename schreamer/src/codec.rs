//! Fixed-width numeric codecs.
//!
//! Every numeric kind knows its width. The byte order is not part of the kind:
//! it is picked from the scope at execution time.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde_json::{Number, Value};

/// Byte order of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F32,
    F64,
}

impl IntKind {
    pub fn width(self) -> usize {
        match self {
            IntKind::I8 | IntKind::U8 => 1,
            IntKind::I16 | IntKind::U16 => 2,
            IntKind::I32 | IntKind::U32 => 4,
            IntKind::I64 | IntKind::U64 => 8,
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, IntKind::U8 | IntKind::U16 | IntKind::U32 | IntKind::U64)
    }

    pub fn label(self) -> &'static str {
        match self {
            IntKind::I8 => "I8",
            IntKind::U8 => "U8",
            IntKind::I16 => "I16",
            IntKind::U16 => "U16",
            IntKind::I32 => "I32",
            IntKind::U32 => "U32",
            IntKind::I64 => "I64",
            IntKind::U64 => "U64",
        }
    }

    fn range(self) -> (i128, i128) {
        match self {
            IntKind::I8 => (i8::MIN.into(), i8::MAX.into()),
            IntKind::U8 => (0, u8::MAX.into()),
            IntKind::I16 => (i16::MIN.into(), i16::MAX.into()),
            IntKind::U16 => (0, u16::MAX.into()),
            IntKind::I32 => (i32::MIN.into(), i32::MAX.into()),
            IntKind::U32 => (0, u32::MAX.into()),
            IntKind::I64 => (i64::MIN.into(), i64::MAX.into()),
            IntKind::U64 => (0, u64::MAX.into()),
        }
    }

    /// Checks that `value` is an integer representable by this kind.
    pub(crate) fn check(self, value: &Value) -> Result<i128, String> {
        let n = integer_of(value)?;
        let (min, max) = self.range();
        if n < min || n > max {
            return Err(format!("{} is out of range for {}", n, self.label()));
        }
        Ok(n)
    }

    /// Encodes a value previously accepted by [`IntKind::check`].
    pub(crate) fn encode(self, endian: Endian, n: i128, out: &mut [u8]) {
        match endian {
            Endian::Big => put_int::<BigEndian>(self, n, out),
            Endian::Little => put_int::<LittleEndian>(self, n, out),
        }
    }

    pub(crate) fn decode(self, endian: Endian, bytes: &[u8]) -> Value {
        match endian {
            Endian::Big => get_int::<BigEndian>(self, bytes),
            Endian::Little => get_int::<LittleEndian>(self, bytes),
        }
    }
}

impl FloatKind {
    pub fn width(self) -> usize {
        match self {
            FloatKind::F32 => 4,
            FloatKind::F64 => 8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FloatKind::F32 => "F32",
            FloatKind::F64 => "F64",
        }
    }

    pub(crate) fn check(self, value: &Value) -> Result<f64, String> {
        let f = match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is not a float", n))?,
            other => return Err(format!("expected a number, found {}", describe(other))),
        };
        if !f.is_finite() {
            return Err("value is not finite".into());
        }
        if self == FloatKind::F32 && !(f as f32).is_finite() {
            return Err(format!("{} is out of range for F32", f));
        }
        Ok(f)
    }

    pub(crate) fn encode(self, endian: Endian, f: f64, out: &mut [u8]) {
        match (self, endian) {
            (FloatKind::F32, Endian::Big) => BigEndian::write_f32(out, f as f32),
            (FloatKind::F32, Endian::Little) => LittleEndian::write_f32(out, f as f32),
            (FloatKind::F64, Endian::Big) => BigEndian::write_f64(out, f),
            (FloatKind::F64, Endian::Little) => LittleEndian::write_f64(out, f),
        }
    }

    /// Non-finite floats have no JSON representation and decode to `null`.
    pub(crate) fn decode(self, endian: Endian, bytes: &[u8]) -> Value {
        let f = match (self, endian) {
            (FloatKind::F32, Endian::Big) => f64::from(BigEndian::read_f32(bytes)),
            (FloatKind::F32, Endian::Little) => f64::from(LittleEndian::read_f32(bytes)),
            (FloatKind::F64, Endian::Big) => BigEndian::read_f64(bytes),
            (FloatKind::F64, Endian::Little) => LittleEndian::read_f64(bytes),
        };
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn integer_of(value: &Value) -> Result<i128, String> {
    let n = match value {
        Value::Number(n) => n,
        other => return Err(format!("expected an integer, found {}", describe(other))),
    };
    if let Some(i) = n.as_i64() {
        return Ok(i.into());
    }
    if let Some(u) = n.as_u64() {
        return Ok(u.into());
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i128),
        _ => Err(format!("{} is not an integer", n)),
    }
}

pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a record",
    }
}

// Narrowing casts are fine here: `IntKind::check` bounded `n` already.
fn put_int<B: ByteOrder>(kind: IntKind, n: i128, out: &mut [u8]) {
    match kind {
        IntKind::I8 => out[0] = n as i8 as u8,
        IntKind::U8 => out[0] = n as u8,
        IntKind::I16 => B::write_i16(out, n as i16),
        IntKind::U16 => B::write_u16(out, n as u16),
        IntKind::I32 => B::write_i32(out, n as i32),
        IntKind::U32 => B::write_u32(out, n as u32),
        IntKind::I64 => B::write_i64(out, n as i64),
        IntKind::U64 => B::write_u64(out, n as u64),
    }
}

fn get_int<B: ByteOrder>(kind: IntKind, bytes: &[u8]) -> Value {
    match kind {
        IntKind::I8 => Value::from(bytes[0] as i8),
        IntKind::U8 => Value::from(bytes[0]),
        IntKind::I16 => Value::from(B::read_i16(bytes)),
        IntKind::U16 => Value::from(B::read_u16(bytes)),
        IntKind::I32 => Value::from(B::read_i32(bytes)),
        IntKind::U32 => Value::from(B::read_u32(bytes)),
        IntKind::I64 => Value::from(B::read_i64(bytes)),
        IntKind::U64 => Value::from(B::read_u64(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(kind: IntKind, endian: Endian, value: Value) -> Vec<u8> {
        let n = kind.check(&value).unwrap();
        let mut out = vec![0; kind.width()];
        kind.encode(endian, n, &mut out);
        out
    }

    #[test]
    fn magic_in_both_orders() {
        assert_eq!(
            encode(IntKind::U32, Endian::Big, json!(0x4C4F434F)),
            b"LOCO"
        );
        assert_eq!(
            encode(IntKind::U32, Endian::Little, json!(0x4C4F434F)),
            b"OCOL"
        );
        assert_eq!(encode(IntKind::U16, Endian::Big, json!(1)), [0, 1]);
        assert_eq!(encode(IntKind::U16, Endian::Little, json!(1)), [1, 0]);
    }

    #[test]
    fn signed_values_decode_back() {
        let bytes = encode(IntKind::I16, Endian::Little, json!(-2));
        assert_eq!(bytes, [0xfe, 0xff]);
        assert_eq!(IntKind::I16.decode(Endian::Little, &bytes), json!(-2));

        let bytes = encode(IntKind::I64, Endian::Big, json!(i64::MIN));
        assert_eq!(IntKind::I64.decode(Endian::Big, &bytes), json!(i64::MIN));
    }

    #[test]
    fn full_u64_range() {
        let bytes = encode(IntKind::U64, Endian::Big, json!(u64::MAX));
        assert_eq!(bytes, [0xff; 8]);
        assert_eq!(IntKind::U64.decode(Endian::Big, &bytes), json!(u64::MAX));
    }

    #[test]
    fn rejects_values_that_do_not_fit() {
        assert!(IntKind::U8.check(&json!(256)).is_err());
        assert!(IntKind::U16.check(&json!(-1)).is_err());
        assert!(IntKind::I64.check(&json!(u64::MAX)).is_err());
        assert!(IntKind::U32.check(&json!(1.5)).is_err());
        assert!(IntKind::U32.check(&json!("12")).is_err());
        assert!(IntKind::U32.check(&Value::Null).is_err());
        assert_eq!(IntKind::U32.check(&json!(12.0)).unwrap(), 12);
    }

    #[test]
    fn floats() {
        let f = FloatKind::F32.check(&json!(0.5)).unwrap();
        let mut out = [0; 4];
        FloatKind::F32.encode(Endian::Big, f, &mut out);
        assert_eq!(out, [0x3f, 0x00, 0x00, 0x00]);
        assert_eq!(FloatKind::F32.decode(Endian::Big, &out), json!(0.5));

        assert!(FloatKind::F32.check(&json!(1e300)).is_err());
        assert!(FloatKind::F64.check(&json!(1e300)).is_ok());
        assert!(FloatKind::F64.check(&json!(true)).is_err());

        let nan = f64::NAN.to_le_bytes();
        assert_eq!(FloatKind::F64.decode(Endian::Little, &nan), Value::Null);
    }
}
