use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaimsError {
    #[error("claims payload is not a JSON object")]
    NotAnObject,
    #[error("invalid numeric date in '{0}'")]
    InvalidNumericDate(&'static str),
    #[error("claims do not match the registered claim set: {0}")]
    Registered(#[source] serde_json::Error),
}

/// Which claims shape a verifier decodes payloads into. Chosen once at
/// construction; every verification decodes into a fresh value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimsKind {
    /// Arbitrary key/value payload.
    Map,
    /// RFC 7519 registered claims; unknown members are ignored.
    #[default]
    Registered,
}

impl ClaimsKind {
    pub fn decode(self, payload: Value) -> Result<ClaimsShape, ClaimsError> {
        let Value::Object(map) = payload else {
            return Err(ClaimsError::NotAnObject);
        };

        match self {
            ClaimsKind::Map => {
                // Time claims must be usable before the map is accepted.
                numeric_member(&map, "exp")?;
                numeric_member(&map, "nbf")?;
                Ok(ClaimsShape::Map(map))
            }
            ClaimsKind::Registered => {
                let claims = serde_json::from_value(Value::Object(map))
                    .map_err(ClaimsError::Registered)?;
                Ok(ClaimsShape::Registered(claims))
            }
        }
    }
}

impl FromStr for ClaimsKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "map" => Ok(Self::Map),
            "registered" | "standard" => Ok(Self::Registered),
            other => Err(format!("unknown claims shape: {other}")),
        }
    }
}

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClaimsShape {
    Map(Map<String, Value>),
    Registered(RegisteredClaims),
}

impl ClaimsShape {
    pub fn kind(&self) -> ClaimsKind {
        match self {
            ClaimsShape::Map(_) => ClaimsKind::Map,
            ClaimsShape::Registered(_) => ClaimsKind::Registered,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            ClaimsShape::Map(map) => map.get("sub").and_then(Value::as_str),
            ClaimsShape::Registered(claims) => claims.sub.as_deref(),
        }
    }

    pub fn issuer(&self) -> Option<&str> {
        match self {
            ClaimsShape::Map(map) => map.get("iss").and_then(Value::as_str),
            ClaimsShape::Registered(claims) => claims.iss.as_deref(),
        }
    }

    /// `aud` as a string or list; any other shape counts as absent.
    pub fn audience(&self) -> Option<Audience> {
        match self {
            ClaimsShape::Map(map) => map
                .get("aud")
                .and_then(|aud| Audience::deserialize(aud).ok()),
            ClaimsShape::Registered(claims) => claims.aud.clone(),
        }
    }

    pub fn expires_at(&self) -> Option<i64> {
        match self {
            ClaimsShape::Map(map) => numeric_member(map, "exp").ok().flatten(),
            ClaimsShape::Registered(claims) => claims.exp,
        }
    }

    pub fn not_before(&self) -> Option<i64> {
        match self {
            ClaimsShape::Map(map) => numeric_member(map, "nbf").ok().flatten(),
            ClaimsShape::Registered(claims) => claims.nbf,
        }
    }

    /// Single claim by name, whatever the shape.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            ClaimsShape::Map(map) => map.get(name).cloned(),
            ClaimsShape::Registered(_) => self.to_value().get(name).cloned(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn numeric_member(map: &Map<String, Value>, name: &'static str) -> Result<Option<i64>, ClaimsError> {
    match map.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => number_to_seconds(n)
            .map(Some)
            .ok_or(ClaimsError::InvalidNumericDate(name)),
        Some(_) => Err(ClaimsError::InvalidNumericDate(name)),
    }
}

fn number_to_seconds(n: &serde_json::Number) -> Option<i64> {
    n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64))
}

// NumericDate per RFC 7519 may carry a fractional part.
fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    value
        .map(|n| number_to_seconds(&n).ok_or_else(|| de::Error::custom("invalid numeric date")))
        .transpose()
}
