//! Identifier types shared by frames and the client state.
//!
//! The chat server emits numeric identifiers while clients and stored
//! profiles sometimes carry them as strings. Both forms decode into the same
//! canonical string so that comparisons never depend on which side produced
//! the value.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Canonical user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

/// Message identifier, either assigned by the server or minted locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

macro_rules! numeric_string_id {
    ($name:ident, $expecting:literal) => {
        impl $name {
            /// Create an identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier carries no characters.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                Self(n.to_string())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                // Numeric ids go back out as numbers; the server parses them as longs.
                match self.0.parse::<u64>() {
                    Ok(n) if !self.0.starts_with('0') || self.0 == "0" => {
                        serializer.serialize_u64(n)
                    }
                    _ => serializer.serialize_str(&self.0),
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer
                    .deserialize_any(NumberOrString($expecting))
                    .map(Self)
            }
        }
    };
}

numeric_string_id!(UserId, "a user id as a string or integer");
numeric_string_id!(MessageId, "a message id as a string or number");

/// Visitor accepting JSON strings and numbers alike.
struct NumberOrString(&'static str);

impl<'de> Visitor<'de> for NumberOrString {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        // Older clients minted ids as `Date.now() + Math.random()`.
        if v.fract() == 0.0 && v.is_finite() {
            Ok(format!("{}", v as i64))
        } else {
            Ok(v.to_string())
        }
    }
}
