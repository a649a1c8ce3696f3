//! Typed argument and return values.
//!
//! The wire carries no per-value type tags: the [`RpcDescriptor`]'s
//! interpreter lists on both peers dictate how many values follow and how
//! each is decoded. [`RpcType`] names an interpreter; [`RpcValue`] is a
//! decoded value.
//!
//! [`RpcDescriptor`]: crate::RpcDescriptor

use std::fmt;

use tether_wire::{SerialBuffer, StrEncoding, WireError};

use tether_replication::NetworkId;

/// Names one value interpreter, for descriptor declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcType {
    /// One byte, 0 or 1.
    Bool,
    /// Big-endian `i32`.
    I32,
    /// Big-endian `i64`.
    I64,
    /// IEEE-754 `f32` bit pattern.
    F32,
    /// IEEE-754 `f64` bit pattern.
    F64,
    /// Length-prefixed UTF-8 string.
    Str,
    /// A replicated entity id.
    Id,
    /// Three `f32`s.
    Vec3,
}

impl fmt::Display for RpcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcType::Bool => "bool",
            RpcType::I32 => "i32",
            RpcType::I64 => "i64",
            RpcType::F32 => "f32",
            RpcType::F64 => "f64",
            RpcType::Str => "str",
            RpcType::Id => "id",
            RpcType::Vec3 => "vec3",
        };
        write!(f, "{name}")
    }
}

/// One decoded argument or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    /// A boolean.
    Bool(bool),
    /// A 32-bit integer.
    I32(i32),
    /// A 64-bit integer.
    I64(i64),
    /// A 32-bit float.
    F32(f32),
    /// A 64-bit float.
    F64(f64),
    /// A UTF-8 string.
    Str(String),
    /// A replicated entity id.
    Id(NetworkId),
    /// A 3-vector.
    Vec3([f32; 3]),
}

impl RpcValue {
    /// The interpreter this value belongs to.
    pub fn ty(&self) -> RpcType {
        match self {
            RpcValue::Bool(_) => RpcType::Bool,
            RpcValue::I32(_) => RpcType::I32,
            RpcValue::I64(_) => RpcType::I64,
            RpcValue::F32(_) => RpcType::F32,
            RpcValue::F64(_) => RpcType::F64,
            RpcValue::Str(_) => RpcType::Str,
            RpcValue::Id(_) => RpcType::Id,
            RpcValue::Vec3(_) => RpcType::Vec3,
        }
    }

    /// Serializes the value.
    pub fn write(&self, buf: &mut SerialBuffer) -> Result<(), WireError> {
        match self {
            RpcValue::Bool(v) => buf.put_bool(*v),
            RpcValue::I32(v) => buf.put_i32(*v),
            RpcValue::I64(v) => buf.put_i64(*v),
            RpcValue::F32(v) => buf.put_f32(*v),
            RpcValue::F64(v) => buf.put_f64(*v),
            RpcValue::Str(v) => buf.put_str(v, StrEncoding::Utf8),
            RpcValue::Id(v) => buf.put_u64(v.into_inner()),
            RpcValue::Vec3(v) => {
                for c in v {
                    buf.put_f32(*c)?;
                }
                Ok(())
            }
        }
    }

    /// Deserializes a value of type `ty`.
    pub fn read(ty: RpcType, buf: &mut SerialBuffer) -> Result<RpcValue, WireError> {
        Ok(match ty {
            RpcType::Bool => RpcValue::Bool(buf.get_bool()?),
            RpcType::I32 => RpcValue::I32(buf.get_i32()?),
            RpcType::I64 => RpcValue::I64(buf.get_i64()?),
            RpcType::F32 => RpcValue::F32(buf.get_f32()?),
            RpcType::F64 => RpcValue::F64(buf.get_f64()?),
            RpcType::Str => RpcValue::Str(buf.get_str(StrEncoding::Utf8)?),
            RpcType::Id => RpcValue::Id(NetworkId(buf.get_u64()?)),
            RpcType::Vec3 => {
                let mut v = [0.0f32; 3];
                for c in &mut v {
                    *c = buf.get_f32()?;
                }
                RpcValue::Vec3(v)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_value_round_trips() {
        let values = vec![
            RpcValue::Bool(true),
            RpcValue::I32(-42),
            RpcValue::I64(1 << 40),
            RpcValue::F32(0.5),
            RpcValue::F64(-2.25),
            RpcValue::Str("ärger".into()),
            RpcValue::Id(NetworkId(77)),
            RpcValue::Vec3([1.0, -2.0, 3.5]),
        ];

        let mut buf = SerialBuffer::with_capacity(256);
        for v in &values {
            v.write(&mut buf).unwrap();
        }
        buf.flip();
        for v in &values {
            assert_eq!(&RpcValue::read(v.ty(), &mut buf).unwrap(), v);
        }
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_truncated_value_fails() {
        let mut buf = SerialBuffer::with_capacity(8);
        buf.put_u16(2).unwrap();
        buf.flip();
        assert!(RpcValue::read(RpcType::I64, &mut buf).is_err());
    }
}
