use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::Timestamp;
use crate::ids::DeviceId;
use crate::CoreError;

/// Scalar type tag carried alongside a parameter's raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    Boolean,
    DateTime,
    Base64,
    HexBinary,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::UnsignedInt => "unsignedInt",
            Self::Long => "long",
            Self::UnsignedLong => "unsignedLong",
            Self::Boolean => "boolean",
            Self::DateTime => "dateTime",
            Self::Base64 => "base64",
            Self::HexBinary => "hexBinary",
        }
    }

    /// Accepts the canonical name, any casing, with or without an `xsd:` prefix.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        let bare = match trimmed.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("xsd:") => &trimmed[4..],
            _ => trimmed,
        };
        match bare.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "int" => Ok(Self::Int),
            "unsignedint" => Ok(Self::UnsignedInt),
            "long" => Ok(Self::Long),
            "unsignedlong" => Ok(Self::UnsignedLong),
            "boolean" => Ok(Self::Boolean),
            "datetime" => Ok(Self::DateTime),
            "base64" => Ok(Self::Base64),
            "hexbinary" => Ok(Self::HexBinary),
            _ => Err(CoreError::InvalidData(format!("unknown value type: {s}"))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        ValueType::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub raw: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl ParameterValue {
    pub fn new(raw: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            raw: raw.into(),
            value_type,
        }
    }

    pub fn string(raw: impl Into<String>) -> Self {
        Self::new(raw, ValueType::String)
    }
}

bitflags! {
    /// Access and notification attributes of a parameter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ParameterFlags: u8 {
        const READABLE = 0b0001;
        const WRITABLE = 0b0010;
        const ACTIVE_NOTIFY = 0b0100;
        const PASSIVE_NOTIFY = 0b1000;
    }
}

const FLAG_LETTERS: [(ParameterFlags, char); 4] = [
    (ParameterFlags::READABLE, 'R'),
    (ParameterFlags::WRITABLE, 'W'),
    (ParameterFlags::ACTIVE_NOTIFY, 'A'),
    (ParameterFlags::PASSIVE_NOTIFY, 'P'),
];

impl ParameterFlags {
    /// Compact form, e.g. `"RW"`. Letters always appear in R, W, A, P order.
    pub fn to_letters(&self) -> String {
        FLAG_LETTERS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, letter)| *letter)
            .collect()
    }

    pub fn parse_letters(s: &str) -> Result<Self, CoreError> {
        let mut flags = Self::empty();
        for c in s.chars().filter(|c| !c.is_whitespace()) {
            let upper = c.to_ascii_uppercase();
            let (flag, _) = FLAG_LETTERS
                .iter()
                .find(|(_, letter)| *letter == upper)
                .ok_or_else(|| CoreError::InvalidData(format!("unknown parameter flag: {c:?}")))?;
            flags |= *flag;
        }
        Ok(flags)
    }

    pub fn from_stored(bits: i64) -> Result<Self, CoreError> {
        u8::try_from(bits)
            .ok()
            .and_then(Self::from_bits)
            .ok_or_else(|| CoreError::InvalidData(format!("invalid flag bits: {bits}")))
    }

    pub fn to_stored(&self) -> i64 {
        i64::from(self.bits())
    }
}

impl Default for ParameterFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for ParameterFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_letters())
    }
}

impl Serialize for ParameterFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_letters())
    }
}

impl<'de> Deserialize<'de> for ParameterFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        ParameterFlags::parse_letters(&s).map_err(serde::de::Error::custom)
    }
}

/// A named configuration value owned by exactly one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub owner: DeviceId,
    pub name: String,
    pub value: ParameterValue,
    pub flags: ParameterFlags,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
