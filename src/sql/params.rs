//! Bind values for the PostgreSQL store.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value bound to a query. Each variant reports its own PostgreSQL type.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Text(String),
    BigInt(i64),
    Json(Value),
}

impl PgBindValue {
    /// Document keys are stored in a TEXT column.
    pub fn key(key: &Value) -> Self {
        PgBindValue::Text(crate::store::key_text(key))
    }

    pub fn revision(revision: u64) -> Self {
        PgBindValue::BigInt(i64::try_from(revision).unwrap_or(i64::MAX))
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Text(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgBindValue::BigInt(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::Json(v) => <serde_json::Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Text(_) => PgTypeInfo::with_name("TEXT"),
            PgBindValue::BigInt(_) => PgTypeInfo::with_name("INT8"),
            PgBindValue::Json(_) => PgTypeInfo::with_name("JSONB"),
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
