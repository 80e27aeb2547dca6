//! The closed set of values that can be signed.
//!
//! A [`Payload`] is a tagged union: null, boolean, integer, finite float,
//! string, ordered list, or string-keyed object. Nothing else can be wrapped,
//! canonicalized or signed. Values enter the engine either as JSON
//! (`TryFrom<serde_json::Value>`) or through [`to_payload`], a strict serde
//! serializer that rejects byte blobs, non-string map keys and non-finite
//! floats instead of coercing them.

use std::collections::BTreeMap;

use serde::ser::{self, Serialize, SerializeMap as _};

use crate::errors::{MetatrustError, MetatrustResult};

/// A canonical-serializable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Integer(i128),
    /// Must be finite; checked by [`Payload::check`] and by the canonical codec.
    Float(f64),
    String(String),
    List(Vec<Payload>),
    Object(BTreeMap<String, Payload>),
}

impl Payload {
    /// Empty object.
    pub fn object() -> Self {
        Payload::Object(BTreeMap::new())
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Null => "null",
            Payload::Bool(_) => "boolean",
            Payload::Integer(_) => "integer",
            Payload::Float(_) => "float",
            Payload::String(_) => "string",
            Payload::List(_) => "list",
            Payload::Object(_) => "object",
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Payload>> {
        match self {
            Payload::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Payload>> {
        match self {
            Payload::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Payload]> {
        match self {
            Payload::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Payload::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Look up a member of an object. Returns `None` for non-objects.
    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// Verify the value (recursively) belongs to the closed kind set.
    ///
    /// The only constraint the type system does not already enforce is float
    /// finiteness.
    pub fn check(&self) -> MetatrustResult<()> {
        match self {
            Payload::Float(f) if !f.is_finite() => Err(MetatrustError::unsupported_payload(
                format!("non-finite float {f} cannot be canonicalized"),
            )),
            Payload::List(items) => items.iter().try_for_each(Payload::check),
            Payload::Object(members) => members.values().try_for_each(Payload::check),
            _ => Ok(()),
        }
    }

    /// Convert to a `serde_json::Value` (for display and interop).
    pub fn to_json(&self) -> MetatrustResult<serde_json::Value> {
        use serde_json::Value;
        Ok(match self {
            Payload::Null => Value::Null,
            Payload::Bool(b) => Value::Bool(*b),
            Payload::Integer(i) => match i64::try_from(*i) {
                Ok(v) => Value::from(v),
                Err(_) => serde_json::from_str(&i.to_string())
                    .map_err(|e| MetatrustError::serialization(format!("integer {i}: {e}")))?,
            },
            Payload::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| {
                    MetatrustError::unsupported_payload(format!("non-finite float {f}"))
                })?,
            Payload::String(s) => Value::String(s.clone()),
            Payload::List(items) => Value::Array(
                items
                    .iter()
                    .map(Payload::to_json)
                    .collect::<MetatrustResult<_>>()?,
            ),
            Payload::Object(members) => {
                let mut out = serde_json::Map::new();
                for (k, v) in members {
                    out.insert(k.clone(), v.to_json()?);
                }
                Value::Object(out)
            }
        })
    }
}

impl TryFrom<serde_json::Value> for Payload {
    type Error = MetatrustError;

    fn try_from(v: serde_json::Value) -> MetatrustResult<Self> {
        use serde_json::Value;
        Ok(match v {
            Value::Null => Payload::Null,
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => number_to_payload(&n)?,
            Value::String(s) => Payload::String(s),
            Value::Array(items) => Payload::List(
                items
                    .into_iter()
                    .map(Payload::try_from)
                    .collect::<MetatrustResult<_>>()?,
            ),
            Value::Object(members) => Payload::Object(
                members
                    .into_iter()
                    .map(|(k, v)| Ok((k, Payload::try_from(v)?)))
                    .collect::<MetatrustResult<_>>()?,
            ),
        })
    }
}

impl TryFrom<&serde_json::Value> for Payload {
    type Error = MetatrustError;

    fn try_from(v: &serde_json::Value) -> MetatrustResult<Self> {
        Payload::try_from(v.clone())
    }
}

/// Numbers keep their source text (`arbitrary_precision`), so the integer or
/// float kind and every digit of an integer survive parsing.
fn number_to_payload(n: &serde_json::Number) -> MetatrustResult<Payload> {
    let text = n.to_string();
    if text.contains(['.', 'e', 'E']) {
        let f: f64 = text
            .parse()
            .map_err(|_| MetatrustError::unsupported_payload(format!("invalid number {text}")))?;
        if !f.is_finite() {
            return Err(MetatrustError::unsupported_payload(format!(
                "number {text} is out of the float range"
            )));
        }
        Ok(Payload::Float(f))
    } else {
        text.parse::<i128>().map(Payload::Integer).map_err(|_| {
            MetatrustError::unsupported_payload(format!(
                "integer {text} is outside the 128-bit range"
            ))
        })
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

impl From<i64> for Payload {
    fn from(i: i64) -> Self {
        Payload::Integer(i128::from(i))
    }
}

impl From<u64> for Payload {
    fn from(i: u64) -> Self {
        Payload::Integer(i128::from(i))
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::String(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::String(s)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(v: Vec<Payload>) -> Self {
        Payload::List(v)
    }
}

impl From<BTreeMap<String, Payload>> for Payload {
    fn from(m: BTreeMap<String, Payload>) -> Self {
        Payload::Object(m)
    }
}

impl Serialize for Payload {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Null => serializer.serialize_unit(),
            Payload::Bool(b) => serializer.serialize_bool(*b),
            Payload::Integer(i) => serializer.serialize_i128(*i),
            Payload::Float(f) => serializer.serialize_f64(*f),
            Payload::String(s) => serializer.serialize_str(s),
            Payload::List(items) => serializer.collect_seq(items),
            Payload::Object(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (k, v) in members {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> serde::Deserialize<'de> for Payload {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer)
            .and_then(|v| Payload::try_from(v).map_err(serde::de::Error::custom))
    }
}

/// Convert any serializable value into a [`Payload`], strictly.
///
/// Unlike `serde_json::to_value`, this never coerces: NaN and infinities,
/// byte strings and non-string map keys are rejected with
/// `UnsupportedPayload`.
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> MetatrustResult<Payload> {
    let p = value.serialize(PayloadSerializer)?;
    p.check()?;
    Ok(p)
}

struct PayloadSerializer;

type Res = MetatrustResult<Payload>;

impl ser::Serializer for PayloadSerializer {
    type Ok = Payload;
    type Error = MetatrustError;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantBuilder<SeqBuilder>;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantBuilder<MapBuilder>;

    fn serialize_bool(self, v: bool) -> Res {
        Ok(Payload::Bool(v))
    }
    fn serialize_i8(self, v: i8) -> Res {
        Ok(Payload::Integer(v.into()))
    }
    fn serialize_i16(self, v: i16) -> Res {
        Ok(Payload::Integer(v.into()))
    }
    fn serialize_i32(self, v: i32) -> Res {
        Ok(Payload::Integer(v.into()))
    }
    fn serialize_i64(self, v: i64) -> Res {
        Ok(Payload::Integer(v.into()))
    }
    fn serialize_i128(self, v: i128) -> Res {
        Ok(Payload::Integer(v))
    }
    fn serialize_u8(self, v: u8) -> Res {
        Ok(Payload::Integer(v.into()))
    }
    fn serialize_u16(self, v: u16) -> Res {
        Ok(Payload::Integer(v.into()))
    }
    fn serialize_u32(self, v: u32) -> Res {
        Ok(Payload::Integer(v.into()))
    }
    fn serialize_u64(self, v: u64) -> Res {
        Ok(Payload::Integer(v.into()))
    }
    fn serialize_u128(self, v: u128) -> Res {
        i128::try_from(v)
            .map(Payload::Integer)
            .map_err(|_| MetatrustError::unsupported_payload(format!("integer {v} is too large")))
    }
    fn serialize_f32(self, v: f32) -> Res {
        self.serialize_f64(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Res {
        if v.is_finite() {
            Ok(Payload::Float(v))
        } else {
            Err(MetatrustError::unsupported_payload(format!(
                "non-finite float {v} cannot be canonicalized"
            )))
        }
    }
    fn serialize_char(self, v: char) -> Res {
        Ok(Payload::String(v.to_string()))
    }
    fn serialize_str(self, v: &str) -> Res {
        Ok(Payload::String(v.to_string()))
    }
    fn serialize_bytes(self, _v: &[u8]) -> Res {
        Err(MetatrustError::unsupported_payload(
            "binary data is not a payload kind; encode it as a hex string",
        ))
    }
    fn serialize_none(self) -> Res {
        Ok(Payload::Null)
    }
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Res {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Res {
        Ok(Payload::Null)
    }
    fn serialize_unit_struct(self, _name: &'static str) -> Res {
        Ok(Payload::Null)
    }
    fn serialize_unit_variant(self, _name: &'static str, _idx: u32, variant: &'static str) -> Res {
        Ok(Payload::String(variant.to_string()))
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(self, _name: &'static str, value: &T) -> Res {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _idx: u32,
        variant: &'static str,
        value: &T,
    ) -> Res {
        let mut m = BTreeMap::new();
        m.insert(variant.to_string(), value.serialize(PayloadSerializer)?);
        Ok(Payload::Object(m))
    }
    fn serialize_seq(self, len: Option<usize>) -> MetatrustResult<SeqBuilder> {
        Ok(SeqBuilder(Vec::with_capacity(len.unwrap_or(0))))
    }
    fn serialize_tuple(self, len: usize) -> MetatrustResult<SeqBuilder> {
        self.serialize_seq(Some(len))
    }
    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> MetatrustResult<SeqBuilder> {
        self.serialize_seq(Some(len))
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _idx: u32,
        variant: &'static str,
        len: usize,
    ) -> MetatrustResult<VariantBuilder<SeqBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: SeqBuilder(Vec::with_capacity(len)),
        })
    }
    fn serialize_map(self, _len: Option<usize>) -> MetatrustResult<MapBuilder> {
        Ok(MapBuilder::default())
    }
    fn serialize_struct(self, _name: &'static str, _len: usize) -> MetatrustResult<MapBuilder> {
        Ok(MapBuilder::default())
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _idx: u32,
        variant: &'static str,
        _len: usize,
    ) -> MetatrustResult<VariantBuilder<MapBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: MapBuilder::default(),
        })
    }
}

struct SeqBuilder(Vec<Payload>);

impl SeqBuilder {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> MetatrustResult<()> {
        self.0.push(value.serialize(PayloadSerializer)?);
        Ok(())
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Payload;
    type Error = MetatrustError;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> MetatrustResult<()> {
        self.push(value)
    }
    fn end(self) -> Res {
        Ok(Payload::List(self.0))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Payload;
    type Error = MetatrustError;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> MetatrustResult<()> {
        self.push(value)
    }
    fn end(self) -> Res {
        Ok(Payload::List(self.0))
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Payload;
    type Error = MetatrustError;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> MetatrustResult<()> {
        self.push(value)
    }
    fn end(self) -> Res {
        Ok(Payload::List(self.0))
    }
}

#[derive(Default)]
struct MapBuilder {
    members: BTreeMap<String, Payload>,
    pending_key: Option<String>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Payload;
    type Error = MetatrustError;
    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> MetatrustResult<()> {
        match key.serialize(PayloadSerializer)? {
            Payload::String(s) => {
                self.pending_key = Some(s);
                Ok(())
            }
            other => Err(MetatrustError::unsupported_payload(format!(
                "object keys must be strings, found {}",
                other.kind_name()
            ))),
        }
    }
    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> MetatrustResult<()> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| MetatrustError::unsupported_payload("map value without a key"))?;
        self.members.insert(key, value.serialize(PayloadSerializer)?);
        Ok(())
    }
    fn end(self) -> Res {
        Ok(Payload::Object(self.members))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Payload;
    type Error = MetatrustError;
    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> MetatrustResult<()> {
        self.members
            .insert(key.to_string(), value.serialize(PayloadSerializer)?);
        Ok(())
    }
    fn end(self) -> Res {
        Ok(Payload::Object(self.members))
    }
}

struct VariantBuilder<B> {
    variant: &'static str,
    inner: B,
}

impl<B> VariantBuilder<B> {
    fn wrap(variant: &'static str, inner: Payload) -> Payload {
        let mut m = BTreeMap::new();
        m.insert(variant.to_string(), inner);
        Payload::Object(m)
    }
}

impl ser::SerializeTupleVariant for VariantBuilder<SeqBuilder> {
    type Ok = Payload;
    type Error = MetatrustError;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> MetatrustResult<()> {
        self.inner.push(value)
    }
    fn end(self) -> Res {
        Ok(Self::wrap(self.variant, Payload::List(self.inner.0)))
    }
}

impl ser::SerializeStructVariant for VariantBuilder<MapBuilder> {
    type Ok = Payload;
    type Error = MetatrustError;
    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> MetatrustResult<()> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }
    fn end(self) -> Res {
        Ok(Self::wrap(self.variant, Payload::Object(self.inner.members)))
    }
}
