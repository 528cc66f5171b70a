pub mod audit;
pub mod conversation;
pub mod document;
pub mod org;
pub mod token;
pub mod user;

use serde::{de, Serialize, Serializer};
use std::fmt::Formatter;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// A `timestamptz` column that (de)serializes as RFC 3339, the way the
/// mobile client and SDK expect it over JSON.
#[derive(Debug, Clone, Copy, sqlx::Type, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(transparent)]
pub struct Timestamptz(pub OffsetDateTime);

impl Timestamptz {
    pub fn now() -> Self {
        Timestamptz(OffsetDateTime::now_utc())
    }
}

impl From<OffsetDateTime> for Timestamptz {
    fn from(value: OffsetDateTime) -> Self {
        Timestamptz(value)
    }
}

impl Serialize for Timestamptz {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self.0.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.collect_str(&formatted)
    }
}

impl<'de> de::Deserialize<'de> for Timestamptz {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct StrVisitor;

        impl de::Visitor<'_> for StrVisitor {
            type Value = Timestamptz;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                f.write_str("an RFC 3339 timestamp")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                OffsetDateTime::parse(v, &Rfc3339)
                    .map(Timestamptz)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_str(StrVisitor)
    }
}
