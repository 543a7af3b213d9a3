//! The serde bridge that converts host data into engine values.
//!
//! Arbitrary host data crosses into the engine exactly once, at the
//! context boundary, where it is serialized into the tagged
//! [`Value`](crate::value::Value) representation.  Structs become records
//! with named fields, maps keep their keys, sequences become value
//! sequences.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{self, Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::key::{Key, KeySerializer};
use crate::value::{Record, Value, ValueRepr};

impl ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::new(ErrorKind::TypeError, msg.to_string()).with_sender("serializer")
    }
}

/// A record backed by named fields collected from a serialized struct.
pub(crate) struct FieldRecord {
    name: &'static str,
    fields: BTreeMap<&'static str, Value>,
}

impl fmt::Debug for FieldRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.name);
        for (k, v) in self.fields.iter() {
            s.field(k, v);
        }
        s.finish()
    }
}

impl fmt::Display for FieldRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name)
    }
}

impl Record for FieldRecord {
    fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn fields(&self) -> Vec<&str> {
        self.fields.keys().copied().collect()
    }
}

impl Value {
    /// Creates a value from something that can be serialized.
    ///
    /// This is how arbitrary host data enters the engine: during
    /// conversion structs turn into records, maps and sequences into
    /// their engine counterparts.
    pub fn from_serializable<T: Serialize>(value: &T) -> Value {
        match value.serialize(ValueSerializer) {
            Ok(rv) => rv,
            Err(err) => {
                log::debug!("value serialization failed: {}", err);
                Value::none()
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.repr {
            ValueRepr::None => serializer.serialize_unit(),
            ValueRepr::Bool(b) => serializer.serialize_bool(*b),
            ValueRepr::I64(i) => serializer.serialize_i64(*i),
            ValueRepr::U64(u) => serializer.serialize_u64(*u),
            ValueRepr::F64(f) => serializer.serialize_f64(*f),
            ValueRepr::String(s) => serializer.serialize_str(s),
            ValueRepr::Bytes(b) => serializer.serialize_bytes(b),
            ValueRepr::Time(t) => serializer.serialize_str(&t.to_rfc3339()),
            ValueRepr::Seq(elements) => elements.serialize(serializer),
            ValueRepr::Map(entries) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries.iter() {
                    map.serialize_entry(&k.to_string(), v)?;
                }
                map.end()
            }
            ValueRepr::Record(rec) => {
                use serde::ser::SerializeMap;
                let fields = rec.fields();
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for field in fields {
                    let value = rec.get_field(field).unwrap_or_default();
                    map.serialize_entry(field, &value)?;
                }
                map.end()
            }
            ValueRepr::Callable(_) | ValueRepr::Template(_) => serializer.serialize_unit(),
        }
    }
}

struct ValueSerializer;

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SerializeSeq;
    type SerializeTuple = SerializeSeq;
    type SerializeTupleStruct = SerializeSeq;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeStruct;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_str(self, value: &str) -> Result<Value, Error> {
        Ok(Value::from(value))
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<Value, Error> {
        Ok(Value::from(value))
    }

    fn serialize_none(self) -> Result<Value, Error> {
        Ok(Value::none())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, Error> {
        Ok(Value::none())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Error> {
        Ok(Value::none())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, Error> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, Error> {
        let mut map = BTreeMap::new();
        map.insert(Key::from(variant), value.serialize(ValueSerializer)?);
        Ok(ValueRepr::Map(Arc::new(map)).into())
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len),
        })
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len),
        })
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Ok(SerializeTupleVariant {
            name: variant,
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Ok(SerializeMap {
            entries: BTreeMap::new(),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Ok(SerializeStruct {
            name,
            fields: BTreeMap::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Ok(SerializeStructVariant {
            variant,
            map: BTreeMap::new(),
        })
    }
}

struct SerializeSeq {
    elements: Vec<Value>,
}

impl ser::SerializeSeq for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.elements.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(ValueRepr::Seq(Arc::new(self.elements)).into())
    }
}

impl ser::SerializeTuple for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.elements.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(ValueRepr::Seq(Arc::new(self.elements)).into())
    }
}

impl ser::SerializeTupleStruct for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.elements.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(ValueRepr::Seq(Arc::new(self.elements)).into())
    }
}

struct SerializeTupleVariant {
    name: &'static str,
    fields: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.fields.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        let mut map = BTreeMap::new();
        map.insert(
            Key::from(self.name),
            ValueRepr::Seq(Arc::new(self.fields)).into(),
        );
        Ok(ValueRepr::Map(Arc::new(map)).into())
    }
}

struct SerializeMap {
    entries: BTreeMap<Key<'static>, Value>,
    key: Option<Key<'static>>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Error> {
        self.key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let key = self
            .key
            .take()
            .expect("serialize_value called before serialize_key");
        self.entries.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(ValueRepr::Map(Arc::new(self.entries)).into())
    }

    fn serialize_entry<K: Serialize + ?Sized, V: Serialize + ?Sized>(
        &mut self,
        key: &K,
        value: &V,
    ) -> Result<(), Error> {
        let key = key.serialize(KeySerializer)?;
        self.entries.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }
}

struct SerializeStruct {
    name: &'static str,
    fields: BTreeMap<&'static str, Value>,
}

impl ser::SerializeStruct for SerializeStruct {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        self.fields.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from_record(FieldRecord {
            name: self.name,
            fields: self.fields,
        }))
    }
}

struct SerializeStructVariant {
    variant: &'static str,
    map: BTreeMap<&'static str, Value>,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        self.map.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        let mut rv = BTreeMap::new();
        rv.insert(
            Key::from(self.variant),
            Value::from_record(FieldRecord {
                name: self.variant,
                fields: self.map,
            }),
        );
        Ok(ValueRepr::Map(Arc::new(rv)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn test_basic_conversion() {
        assert_eq!(Value::from_serializable(&42), Value::from(42));
        assert_eq!(Value::from_serializable(&"x"), Value::from("x"));
        assert_eq!(
            Value::from_serializable(&vec![1, 2, 3]),
            Value::from(vec![1, 2, 3])
        );
        assert!(Value::from_serializable(&()).is_nil());
    }

    #[test]
    fn test_json_conversion() {
        let v = Value::from_serializable(&serde_json::json!({
            "name": "Ada",
            "tags": ["a", "b"],
        }));
        assert!(v.is_map());
        assert_eq!(v.element("name"), Value::from("Ada"));
        assert_eq!(v.element("tags").len(), Some(2));
    }

    #[test]
    fn test_struct_becomes_record() {
        #[derive(serde::Serialize)]
        struct User {
            name: &'static str,
            year: u32,
        }

        let v = Value::from_serializable(&User {
            name: "Ada",
            year: 1815,
        });
        assert!(v.is_record());
        assert_eq!(v.get_item(&Value::from("name")), Value::from("Ada"));
        assert_eq!(v.get_item(&Value::from("year")), Value::from(1815));
        assert!(v.get_item(&Value::from("missing")).is_nil());
    }

    #[test]
    fn test_value_reserialization() {
        assert_eq!(serde_json::to_string(&Value::from(42)).unwrap(), "42");
        assert_eq!(
            serde_json::to_string(&Value::from_safe_string("foo".into())).unwrap(),
            "\"foo\""
        );
        assert_eq!(serde_json::to_string(&Value::none()).unwrap(), "null");
    }
}
