use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Impossible, Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::value::Value;

/// Represents a key in a value's map.
#[derive(Debug, Clone)]
pub enum Key<'a> {
    Bool(bool),
    I64(i64),
    String(Arc<str>),
    Str(&'a str),
}

#[derive(PartialOrd, Ord, Eq, PartialEq)]
pub(crate) enum KeyRef<'a> {
    Bool(bool),
    I64(i64),
    Str(&'a str),
}

impl<'a> Key<'a> {
    pub(crate) fn as_key_ref(&self) -> KeyRef<'_> {
        match *self {
            Key::Bool(x) => KeyRef::Bool(x),
            Key::I64(x) => KeyRef::I64(x),
            Key::String(ref x) => KeyRef::Str(x),
            Key::Str(x) => KeyRef::Str(x),
        }
    }

    /// If the key is a string, returns it.
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Key::String(ref x) => Some(x),
            Key::Str(x) => Some(x),
            _ => None,
        }
    }

}

fn non_key() -> Error {
    Error::new(ErrorKind::TypeError, "this value cannot be used as a map key")
}

impl TryFrom<Value> for Key<'static> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if value.is_bool() {
            Ok(Key::Bool(value.as_bool()))
        } else if value.is_integer() {
            Ok(Key::I64(value.as_integer()))
        } else if let Some(s) = value.as_str() {
            Ok(Key::String(Arc::from(s)))
        } else {
            Err(non_key())
        }
    }
}

impl<'a> PartialEq for Key<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.as_key_ref().eq(&other.as_key_ref())
    }
}

impl<'a> Eq for Key<'a> {}

impl<'a> PartialOrd for Key<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a> Ord for Key<'a> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_key_ref().cmp(&other.as_key_ref())
    }
}

impl<'a> fmt::Display for Key<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(val) => write!(f, "{}", if *val { "True" } else { "False" }),
            Key::I64(val) => write!(f, "{}", val),
            Key::String(val) => write!(f, "{}", val),
            Key::Str(val) => write!(f, "{}", val),
        }
    }
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(val: &'a str) -> Self {
        Key::Str(val)
    }
}

impl From<String> for Key<'static> {
    fn from(val: String) -> Self {
        Key::String(Arc::from(val))
    }
}

/// Serializer that only accepts things that make valid map keys.
pub(crate) struct KeySerializer;

macro_rules! key_from_int {
    ($name:ident, $ty:ty) => {
        fn $name(self, v: $ty) -> Result<Key<'static>, Error> {
            i64::try_from(v).map(Key::I64).map_err(|_| non_key())
        }
    };
}

impl Serializer for KeySerializer {
    type Ok = Key<'static>;
    type Error = Error;

    type SerializeSeq = Impossible<Key<'static>, Error>;
    type SerializeTuple = Impossible<Key<'static>, Error>;
    type SerializeTupleStruct = Impossible<Key<'static>, Error>;
    type SerializeTupleVariant = Impossible<Key<'static>, Error>;
    type SerializeMap = Impossible<Key<'static>, Error>;
    type SerializeStruct = Impossible<Key<'static>, Error>;
    type SerializeStructVariant = Impossible<Key<'static>, Error>;

    fn serialize_bool(self, v: bool) -> Result<Key<'static>, Error> {
        Ok(Key::Bool(v))
    }

    key_from_int!(serialize_i8, i8);
    key_from_int!(serialize_i16, i16);
    key_from_int!(serialize_i32, i32);
    key_from_int!(serialize_i64, i64);
    key_from_int!(serialize_u8, u8);
    key_from_int!(serialize_u16, u16);
    key_from_int!(serialize_u32, u32);
    key_from_int!(serialize_u64, u64);

    fn serialize_f32(self, _: f32) -> Result<Key<'static>, Error> {
        Err(non_key())
    }

    fn serialize_f64(self, _: f64) -> Result<Key<'static>, Error> {
        Err(non_key())
    }

    fn serialize_char(self, v: char) -> Result<Key<'static>, Error> {
        Ok(Key::String(Arc::from(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Key<'static>, Error> {
        Ok(Key::String(Arc::from(v)))
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<Key<'static>, Error> {
        Err(non_key())
    }

    fn serialize_none(self) -> Result<Key<'static>, Error> {
        Err(non_key())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Key<'static>, Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Key<'static>, Error> {
        Err(non_key())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Key<'static>, Error> {
        Err(non_key())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Key<'static>, Error> {
        Ok(Key::Str(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Key<'static>, Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Key<'static>, Error> {
        Err(non_key())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Err(non_key())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Error> {
        Err(non_key())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        Err(non_key())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Err(non_key())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Err(non_key())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Err(non_key())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Err(non_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![
            Key::Str("zebra"),
            Key::I64(4),
            Key::Str("ant"),
            Key::I64(-1),
            Key::Bool(true),
        ];
        keys.sort();
        assert_eq!(
            keys.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            vec!["True", "-1", "4", "ant", "zebra"]
        );
    }
}
