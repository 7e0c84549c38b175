//! PostgreSQL parameter types, argument binding and row materialization.
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;

use crate::ast::{LogicalType, RowSet, Value};
use crate::error::QueryError;
use crate::language::{DbQueryType, QueryTypeSystem, SqlType};

/// Native parameter type for a generic SQL type. Every variant is listed;
/// the ones PostgreSQL has no counterpart for are configuration errors.
pub fn to_postgres_type(sql_type: SqlType) -> crate::error::Result<Type> {
    let ty = match sql_type {
        SqlType::BigInt => Type::INT8,
        SqlType::Binary | SqlType::Image | SqlType::VarBinary => Type::BYTEA,
        SqlType::Bit => Type::BOOL,
        SqlType::Char | SqlType::NChar => Type::BPCHAR,
        SqlType::Date => Type::DATE,
        SqlType::DateTime
        | SqlType::DateTime2
        | SqlType::SmallDateTime
        | SqlType::Timestamp => Type::TIMESTAMP,
        SqlType::DateTimeOffset => Type::TIMESTAMPTZ,
        SqlType::Decimal => Type::NUMERIC,
        SqlType::Float => Type::FLOAT8,
        SqlType::Int => Type::INT4,
        SqlType::Money | SqlType::SmallMoney => Type::MONEY,
        SqlType::NText | SqlType::Text | SqlType::Xml => Type::TEXT,
        SqlType::NVarChar | SqlType::VarChar => Type::VARCHAR,
        SqlType::Real => Type::FLOAT4,
        SqlType::SmallInt => Type::INT2,
        SqlType::Time => Type::TIME,
        SqlType::UniqueIdentifier => Type::UUID,
        SqlType::TinyInt | SqlType::Variant => {
            return Err(QueryError::Configuration(format!(
                "SQL type {} has no PostgreSQL parameter type",
                sql_type.sql_name()
            )))
        }
    };
    Ok(ty)
}

/// Logical type → (column type, native parameter type), resolved up front.
#[derive(Debug, Clone)]
pub struct PostgresTypeMap {
    entries: Vec<(LogicalType, DbQueryType, Type)>,
}

impl PostgresTypeMap {
    /// Map every scalar logical type through `type_system`. Fails if any of
    /// them lands on a type PostgreSQL cannot bind.
    pub fn new(type_system: &dyn QueryTypeSystem) -> crate::error::Result<Self> {
        let mut entries = Vec::with_capacity(LogicalType::SCALARS.len());
        for logical in LogicalType::SCALARS.iter() {
            let column = type_system.column_type(logical).ok_or_else(|| {
                QueryError::Configuration(format!("no column type for {}", logical))
            })?;
            let native = to_postgres_type(column.sql_type)?;
            entries.push((logical.clone(), column, native));
        }
        Ok(Self { entries })
    }

    pub fn column_type(&self, ty: &LogicalType) -> Option<&DbQueryType> {
        self.entries.iter().find(|(l, _, _)| l == ty).map(|(_, c, _)| c)
    }

    pub fn parameter_type(&self, ty: &LogicalType) -> Option<&Type> {
        self.entries.iter().find(|(l, _, _)| l == ty).map(|(_, _, t)| t)
    }
}

pub type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Convert an argument into a value `tokio_postgres` can bind as `ty`.
pub fn bind_value(value: &Value, ty: &Type) -> Result<BoxedParam> {
    if value.is_null() {
        return Ok(typed_null(ty));
    }
    let param: BoxedParam = match (value, ty) {
        (Value::Bool(b), _) => Box::new(*b),
        (Value::Int(i), &Type::INT2) => Box::new(i16::try_from(*i)?),
        (Value::Int(i), &Type::INT4) => Box::new(i32::try_from(*i)?),
        (Value::Int(i), &Type::FLOAT4) => Box::new(*i as f32),
        (Value::Int(i), &Type::FLOAT8) => Box::new(*i as f64),
        (Value::Int(i), _) => Box::new(*i),
        (Value::Float(f), &Type::FLOAT4) => Box::new(*f as f32),
        (Value::Float(f), _) => Box::new(*f),
        (Value::Text(s), _) => Box::new(s.clone()),
        (Value::Bytes(b), _) => Box::new(b.clone()),
        (Value::Date(d), _) => Box::new(*d),
        (Value::Time(t), _) => Box::new(*t),
        (Value::DateTime(dt), &Type::TIMESTAMPTZ) => Box::new(dt.and_utc()),
        (Value::DateTime(dt), _) => Box::new(*dt),
        (other, _) => bail!("cannot bind {} as a {} parameter", other.display(), ty),
    };
    Ok(param)
}

fn typed_null(ty: &Type) -> BoxedParam {
    match *ty {
        Type::BOOL => Box::new(None::<bool>),
        Type::INT2 => Box::new(None::<i16>),
        Type::INT4 => Box::new(None::<i32>),
        Type::INT8 => Box::new(None::<i64>),
        Type::FLOAT4 => Box::new(None::<f32>),
        Type::FLOAT8 => Box::new(None::<f64>),
        Type::BYTEA => Box::new(None::<Vec<u8>>),
        Type::DATE => Box::new(None::<NaiveDate>),
        Type::TIME => Box::new(None::<NaiveTime>),
        Type::TIMESTAMP => Box::new(None::<NaiveDateTime>),
        Type::TIMESTAMPTZ => Box::new(None::<DateTime<Utc>>),
        _ => Box::new(None::<String>),
    }
}

/// Read one cell. Types without a mapping come back as text when the
/// server can send them that way, NULL otherwise.
pub fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> Value {
    match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .into(),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|i| Value::Int(i64::from(i)))
            .unwrap_or(Value::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .into(),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .into(),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|f| Value::Float(f64::from(f)))
            .unwrap_or(Value::Null),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .into(),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(Value::Time)
            .unwrap_or(Value::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .ok()
            .flatten()
            .map(|dt| Value::DateTime(dt.naive_utc()))
            .unwrap_or(Value::Null),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(|j| Value::Text(j.to_string()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .into(),
    }
}

pub fn parse_rows(rows: &[Row]) -> RowSet {
    let Some(first) = rows.first() else {
        return RowSet::default();
    };
    let columns = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let rows = rows
        .iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| extract_value(row, i, col.type_()))
                .collect()
        })
        .collect();
    RowSet::new(columns, rows)
}

/// Parameter type for a logical type, or an error naming it.
pub fn require_parameter_type<'m>(map: &'m PostgresTypeMap, ty: &LogicalType) -> Result<&'m Type> {
    map.parameter_type(ty)
        .ok_or_else(|| anyhow!("{} cannot be bound as a parameter", ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::DbTypeSystem;

    #[test]
    fn test_mapping_is_total_except_unsupported() {
        for sql_type in SqlType::ALL {
            let mapped = to_postgres_type(sql_type);
            match sql_type {
                SqlType::TinyInt | SqlType::Variant => {
                    assert!(matches!(mapped, Err(QueryError::Configuration(_))))
                }
                _ => assert!(mapped.is_ok(), "{:?} unmapped", sql_type),
            }
        }
    }

    #[test]
    fn test_common_mappings() {
        assert_eq!(to_postgres_type(SqlType::BigInt).unwrap(), Type::INT8);
        assert_eq!(to_postgres_type(SqlType::Float).unwrap(), Type::FLOAT8);
        assert_eq!(to_postgres_type(SqlType::Real).unwrap(), Type::FLOAT4);
        assert_eq!(to_postgres_type(SqlType::NVarChar).unwrap(), Type::VARCHAR);
        assert_eq!(to_postgres_type(SqlType::Bit).unwrap(), Type::BOOL);
    }

    #[test]
    fn test_type_map_covers_scalars() {
        let map = PostgresTypeMap::new(&DbTypeSystem).unwrap();
        for ty in LogicalType::SCALARS.iter() {
            assert!(map.parameter_type(ty).is_some(), "{} unmapped", ty);
        }
        assert_eq!(map.parameter_type(&LogicalType::Int32), Some(&Type::INT4));
        assert_eq!(map.column_type(&LogicalType::String).unwrap().length, Some(4000));
        assert_eq!(map.parameter_type(&LogicalType::Provider), None);
    }

    struct TinyInts;

    impl QueryTypeSystem for TinyInts {
        fn column_type(&self, ty: &LogicalType) -> Option<DbQueryType> {
            match ty {
                LogicalType::Int16 => Some(DbQueryType::new(SqlType::TinyInt)),
                other => DbTypeSystem.column_type(other),
            }
        }
    }

    #[test]
    fn test_type_map_rejects_unbindable_system() {
        assert!(matches!(
            PostgresTypeMap::new(&TinyInts),
            Err(QueryError::Configuration(_))
        ));
    }

    #[test]
    fn test_bind_narrows_integers() {
        assert!(bind_value(&Value::Int(7), &Type::INT4).is_ok());
        assert!(bind_value(&Value::Int(i64::MAX), &Type::INT4).is_err());
        assert!(bind_value(&Value::Null, &Type::TEXT).is_ok());
    }

    #[test]
    fn test_bind_rejects_relational_values() {
        let err = bind_value(&Value::List(vec![]), &Type::INT8).err().unwrap();
        assert!(err.to_string().starts_with("cannot bind"));
    }

    #[test]
    fn test_parse_empty_rows() {
        let rows = parse_rows(&[]);
        assert!(rows.is_empty());
        assert!(rows.columns.is_empty());
    }
}
