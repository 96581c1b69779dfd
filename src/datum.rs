//! Structured on-chain data and its JSON detailed-schema codec
//!
//! Datums and redeemers share one representation. The codec uses the detailed
//! JSON schema understood by common ledger tooling:
//!
//! ```json
//! { "constructor": 0, "fields": [ { "int": 42 }, { "bytes": "cafe" } ] }
//! { "map": [ { "k": { "bytes": "01" }, "v": { "int": 5 } } ] }
//! { "list": [ { "int": 1 } ] }
//! ```

use crate::error::EncodingError;
use crate::ledger::{KeyHash, ScriptHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map as JsonMap, Value as Json};

/// Structured data attached to UTXOs or supplied as a redeemer
///
/// Equality is structural, so map entry order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datum {
    Constr { tag: u64, fields: Vec<Datum> },
    Map(Vec<(Datum, Datum)>),
    List(Vec<Datum>),
    Int(i128),
    Bytes(Vec<u8>),
}

impl Datum {
    #[must_use]
    pub fn constr(tag: u64, fields: Vec<Datum>) -> Self {
        Self::Constr { tag, fields }
    }

    /// The unit value: constructor 0 with no fields
    #[must_use]
    pub fn unit() -> Self {
        Self::constr(0, Vec::new())
    }

    #[must_use]
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    #[must_use]
    pub fn int(value: impl Into<i128>) -> Self {
        Self::Int(value.into())
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&[(Datum, Datum)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Datum]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_constr(&self) -> Option<(u64, &[Datum])> {
        match self {
            Self::Constr { tag, fields } => Some((*tag, fields)),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Constr { .. } => "constructor",
            Self::Map(_) => "map",
            Self::List(_) => "list",
            Self::Int(_) => "int",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Whether `i` fits the signed or unsigned 64-bit range of the JSON encoding
    #[must_use]
    pub fn int_in_range(i: i128) -> bool {
        i64::try_from(i).is_ok() || u64::try_from(i).is_ok()
    }

    /// Convert to the detailed JSON schema
    ///
    /// # Errors
    ///
    /// Returns an error if an integer does not fit in 64 bits.
    pub fn to_json(&self) -> Result<Json, EncodingError> {
        Ok(match self {
            Self::Constr { tag, fields } => {
                let fields = fields.iter().map(Self::to_json).collect::<Result<Vec<_>, _>>()?;
                json!({ "constructor": tag, "fields": fields })
            }
            Self::Map(entries) => {
                let entries = entries
                    .iter()
                    .map(|(k, v)| Ok(json!({ "k": k.to_json()?, "v": v.to_json()? })))
                    .collect::<Result<Vec<_>, EncodingError>>()?;
                json!({ "map": entries })
            }
            Self::List(items) => {
                let items = items.iter().map(Self::to_json).collect::<Result<Vec<_>, _>>()?;
                json!({ "list": items })
            }
            Self::Int(i) => {
                if let Ok(small) = i64::try_from(*i) {
                    json!({ "int": small })
                } else if let Ok(large) = u64::try_from(*i) {
                    json!({ "int": large })
                } else {
                    return Err(EncodingError::IntegerOutOfRange(*i));
                }
            }
            Self::Bytes(b) => json!({ "bytes": hex::encode(b) }),
        })
    }

    /// Parse from the detailed JSON schema
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not follow the schema.
    pub fn from_json(value: &Json) -> Result<Self, EncodingError> {
        let object = value
            .as_object()
            .ok_or_else(|| EncodingError::Malformed(format!("expected object, got {value}")))?;

        if let Some(tag) = object.get("constructor") {
            let tag = tag
                .as_u64()
                .ok_or_else(|| EncodingError::Malformed(format!("constructor tag {tag}")))?;
            let fields = array_field(object, "fields")?
                .iter()
                .map(Self::from_json)
                .collect::<Result<_, _>>()?;
            return Ok(Self::Constr { tag, fields });
        }
        if object.contains_key("map") {
            let entries = array_field(object, "map")?
                .iter()
                .map(|entry| {
                    let k = entry
                        .get("k")
                        .ok_or_else(|| EncodingError::Malformed("map entry without `k`".into()))?;
                    let v = entry
                        .get("v")
                        .ok_or_else(|| EncodingError::Malformed("map entry without `v`".into()))?;
                    Ok((Self::from_json(k)?, Self::from_json(v)?))
                })
                .collect::<Result<_, EncodingError>>()?;
            return Ok(Self::Map(entries));
        }
        if object.contains_key("list") {
            let items = array_field(object, "list")?
                .iter()
                .map(Self::from_json)
                .collect::<Result<_, _>>()?;
            return Ok(Self::List(items));
        }
        if let Some(int) = object.get("int") {
            return int
                .as_i64()
                .map(i128::from)
                .or_else(|| int.as_u64().map(i128::from))
                .map(Self::Int)
                .ok_or_else(|| EncodingError::Malformed(format!("integer {int}")));
        }
        if let Some(bytes) = object.get("bytes") {
            let hex_str = bytes
                .as_str()
                .ok_or_else(|| EncodingError::Malformed(format!("bytes {bytes}")))?;
            return hex::decode(hex_str)
                .map(Self::Bytes)
                .map_err(|e| EncodingError::InvalidHex(e.to_string()));
        }
        Err(EncodingError::Malformed(format!("unrecognised datum {value}")))
    }

    /// Encode as a JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if the datum cannot be represented (see [`Datum::to_json`]).
    pub fn encode(&self) -> Result<String, EncodingError> {
        Ok(self.to_json()?.to_string())
    }

    /// Decode from a JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid JSON or does not follow the schema.
    pub fn decode(s: &str) -> Result<Self, EncodingError> {
        let value: Json =
            serde_json::from_str(s).map_err(|e| EncodingError::Malformed(e.to_string()))?;
        Self::from_json(&value)
    }
}

fn array_field<'a>(object: &'a JsonMap<String, Json>, key: &str) -> Result<&'a Vec<Json>, EncodingError> {
    object
        .get(key)
        .and_then(Json::as_array)
        .ok_or_else(|| EncodingError::Malformed(format!("`{key}` must be an array")))
}

impl Serialize for Datum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Datum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Json::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Loosely-typed input for a datum field
///
/// Conversion into a [`Datum`] is where representability is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i128),
    UInt(u128),
    Bytes(Vec<u8>),
    /// Raw bytes given as a hex string
    Hex(String),
    /// UTF-8 text stored as its bytes
    Text(Vec<u8>),
    Datum(Datum),
}

impl FieldValue {
    #[must_use]
    pub fn hex(s: impl Into<String>) -> Self {
        Self::Hex(s.into())
    }

    /// Convert into a datum
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented in a datum or its
    /// JSON encoding.
    pub fn into_datum(self) -> Result<Datum, EncodingError> {
        match self {
            Self::Int(i) => checked_int(i),
            Self::UInt(u) => i128::try_from(u)
                .map_err(|_| EncodingError::IntegerOverflow(u))
                .and_then(checked_int),
            Self::Bytes(b) => Ok(Datum::Bytes(b)),
            Self::Hex(s) => hex::decode(&s)
                .map(Datum::Bytes)
                .map_err(|e| EncodingError::InvalidHex(format!("`{s}`: {e}"))),
            Self::Text(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Ok(Datum::Bytes(text.into_bytes())),
                Err(e) => Err(EncodingError::InvalidUtf8(e.to_string())),
            },
            Self::Datum(d) => Ok(d),
        }
    }
}

fn checked_int(i: i128) -> Result<Datum, EncodingError> {
    if Datum::int_in_range(i) {
        Ok(Datum::Int(i))
    } else {
        Err(EncodingError::IntegerOutOfRange(i))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Int(value.into())
    }
}

impl From<i128> for FieldValue {
    fn from(value: i128) -> Self {
        Self::Int(value)
    }
}

impl From<u128> for FieldValue {
    fn from(value: u128) -> Self {
        Self::UInt(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.as_bytes().to_vec())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value.into_bytes())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Datum> for FieldValue {
    fn from(value: Datum) -> Self {
        Self::Datum(value)
    }
}

impl From<KeyHash> for FieldValue {
    fn from(value: KeyHash) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<ScriptHash> for FieldValue {
    fn from(value: ScriptHash) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Datum {
        Datum::constr(
            0,
            vec![
                Datum::Map(vec![(Datum::bytes(vec![1, 2]), Datum::int(5_000_000))]),
                Datum::List(vec![Datum::int(-7), Datum::bytes(b"Payday".to_vec())]),
                Datum::unit(),
            ],
        )
    }

    #[test]
    fn test_json_shape() {
        let json = Datum::constr(1, vec![Datum::int(42), Datum::bytes(vec![0xca, 0xfe])])
            .to_json()
            .unwrap();
        assert_eq!(
            json,
            json!({ "constructor": 1, "fields": [ { "int": 42 }, { "bytes": "cafe" } ] })
        );
    }

    #[test]
    fn test_round_trip() {
        let datum = sample();
        let encoded = datum.encode().unwrap();
        assert_eq!(Datum::decode(&encoded).unwrap(), datum);
    }

    #[test]
    fn test_serde_round_trip() {
        let datum = sample();
        let encoded = serde_json::to_string(&datum).unwrap();
        let decoded: Datum = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, datum);
    }

    #[test]
    fn test_large_integers() {
        let max = Datum::int(u64::MAX);
        assert_eq!(Datum::decode(&max.encode().unwrap()).unwrap(), max);

        let too_big = Datum::Int(i128::from(u64::MAX) + 1);
        assert_eq!(
            too_big.encode(),
            Err(EncodingError::IntegerOutOfRange(i128::from(u64::MAX) + 1))
        );
    }

    #[test]
    fn test_malformed_json() {
        assert!(Datum::decode(r#"{"bytes":"zz"}"#).is_err());
        assert!(Datum::decode(r#"{"constructor":0}"#).is_err());
        assert!(Datum::decode(r#"{"map":[{"k":{"int":1}}]}"#).is_err());
        assert!(Datum::decode(r#"{"nope":1}"#).is_err());
        assert!(Datum::decode("[]").is_err());
    }

    #[test]
    fn test_field_conversions() {
        assert_eq!(
            FieldValue::from("Secret Answer").into_datum().unwrap(),
            Datum::bytes(b"Secret Answer".to_vec())
        );
        assert_eq!(
            FieldValue::hex("cafe").into_datum().unwrap(),
            Datum::bytes(vec![0xca, 0xfe])
        );
        assert_eq!(FieldValue::from(7u64).into_datum().unwrap(), Datum::int(7));
    }

    #[test]
    fn test_field_conversion_errors() {
        assert!(matches!(
            FieldValue::hex("not hex").into_datum(),
            Err(EncodingError::InvalidHex(_))
        ));
        assert!(matches!(
            FieldValue::Text(vec![0xff, 0xfe]).into_datum(),
            Err(EncodingError::InvalidUtf8(_))
        ));
        assert_eq!(
            FieldValue::from(u128::MAX).into_datum(),
            Err(EncodingError::IntegerOverflow(u128::MAX))
        );
    }

    #[test]
    fn test_field_integers_limited_to_encoding_range() {
        assert_eq!(
            FieldValue::Int(i128::MAX).into_datum(),
            Err(EncodingError::IntegerOutOfRange(i128::MAX))
        );
        assert_eq!(
            FieldValue::Int(i128::from(i64::MIN) - 1).into_datum(),
            Err(EncodingError::IntegerOutOfRange(i128::from(i64::MIN) - 1))
        );
        assert_eq!(
            FieldValue::UInt(u128::from(u64::MAX) + 1).into_datum(),
            Err(EncodingError::IntegerOutOfRange(i128::from(u64::MAX) + 1))
        );
        assert_eq!(FieldValue::UInt(u128::from(u64::MAX)).into_datum().unwrap(), Datum::int(u64::MAX));
        assert_eq!(FieldValue::Int(i128::from(i64::MIN)).into_datum().unwrap(), Datum::int(i64::MIN));
    }
}
