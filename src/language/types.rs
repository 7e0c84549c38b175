//! Backend column types and the mapping from logical types.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::LogicalType;

/// Generic SQL column type enumeration shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    BigInt,
    Binary,
    Bit,
    Char,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Decimal,
    Float,
    Image,
    Int,
    Money,
    NChar,
    NText,
    NVarChar,
    Real,
    SmallDateTime,
    SmallInt,
    SmallMoney,
    Text,
    Time,
    Timestamp,
    TinyInt,
    UniqueIdentifier,
    VarBinary,
    VarChar,
    Variant,
    Xml,
}

impl SqlType {
    pub const ALL: [SqlType; 29] = [
        SqlType::BigInt,
        SqlType::Binary,
        SqlType::Bit,
        SqlType::Char,
        SqlType::Date,
        SqlType::DateTime,
        SqlType::DateTime2,
        SqlType::DateTimeOffset,
        SqlType::Decimal,
        SqlType::Float,
        SqlType::Image,
        SqlType::Int,
        SqlType::Money,
        SqlType::NChar,
        SqlType::NText,
        SqlType::NVarChar,
        SqlType::Real,
        SqlType::SmallDateTime,
        SqlType::SmallInt,
        SqlType::SmallMoney,
        SqlType::Text,
        SqlType::Time,
        SqlType::Timestamp,
        SqlType::TinyInt,
        SqlType::UniqueIdentifier,
        SqlType::VarBinary,
        SqlType::VarChar,
        SqlType::Variant,
        SqlType::Xml,
    ];

    /// Types whose declaration carries a length.
    pub fn has_length(self) -> bool {
        matches!(
            self,
            SqlType::Binary
                | SqlType::Char
                | SqlType::NChar
                | SqlType::NVarChar
                | SqlType::VarBinary
                | SqlType::VarChar
        )
    }

    /// Types whose declaration carries precision and scale.
    pub fn has_precision(self) -> bool {
        matches!(self, SqlType::Decimal)
    }

    pub fn sql_name(self) -> &'static str {
        match self {
            SqlType::BigInt => "BIGINT",
            SqlType::Binary => "BINARY",
            SqlType::Bit => "BIT",
            SqlType::Char => "CHAR",
            SqlType::Date => "DATE",
            SqlType::DateTime => "DATETIME",
            SqlType::DateTime2 => "DATETIME2",
            SqlType::DateTimeOffset => "DATETIMEOFFSET",
            SqlType::Decimal => "DECIMAL",
            SqlType::Float => "FLOAT",
            SqlType::Image => "IMAGE",
            SqlType::Int => "INT",
            SqlType::Money => "MONEY",
            SqlType::NChar => "NCHAR",
            SqlType::NText => "NTEXT",
            SqlType::NVarChar => "NVARCHAR",
            SqlType::Real => "REAL",
            SqlType::SmallDateTime => "SMALLDATETIME",
            SqlType::SmallInt => "SMALLINT",
            SqlType::SmallMoney => "SMALLMONEY",
            SqlType::Text => "TEXT",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TinyInt => "TINYINT",
            SqlType::UniqueIdentifier => "UNIQUEIDENTIFIER",
            SqlType::VarBinary => "VARBINARY",
            SqlType::VarChar => "VARCHAR",
            SqlType::Variant => "SQL_VARIANT",
            SqlType::Xml => "XML",
        }
    }
}

/// A backend column type with its size facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbQueryType {
    pub sql_type: SqlType,
    pub length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
}

impl DbQueryType {
    pub fn new(sql_type: SqlType) -> Self {
        Self {
            sql_type,
            length: None,
            precision: None,
            scale: None,
        }
    }

    pub fn with_length(sql_type: SqlType, length: u32) -> Self {
        Self {
            length: Some(length),
            ..Self::new(sql_type)
        }
    }

    pub fn with_precision(sql_type: SqlType, precision: u8, scale: u8) -> Self {
        Self {
            precision: Some(precision),
            scale: Some(scale),
            ..Self::new(sql_type)
        }
    }
}

impl fmt::Display for DbQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_type.sql_name())?;
        match (self.length, self.precision, self.scale) {
            (Some(len), _, _) if self.sql_type.has_length() => write!(f, "({})", len),
            (_, Some(p), Some(s)) if self.sql_type.has_precision() => write!(f, "({}, {})", p, s),
            (_, Some(p), None) if self.sql_type.has_precision() => write!(f, "({})", p),
            _ => Ok(()),
        }
    }
}

/// Maps logical types to backend column types.
pub trait QueryTypeSystem: Send + Sync {
    /// `None` for types a backend cannot store as a column (rows, sources,
    /// providers).
    fn column_type(&self, ty: &LogicalType) -> Option<DbQueryType>;

    /// Declaration text for a column of this type.
    fn declaration(&self, ty: &DbQueryType) -> String {
        ty.to_string()
    }
}

/// Default length of unbounded string parameters.
pub const STRING_LENGTH: u32 = 4000;

/// The shared logical → SQL mapping used by generic dialects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbTypeSystem;

impl QueryTypeSystem for DbTypeSystem {
    fn column_type(&self, ty: &LogicalType) -> Option<DbQueryType> {
        let mapped = match ty {
            LogicalType::Bool => DbQueryType::new(SqlType::Bit),
            LogicalType::Int16 => DbQueryType::new(SqlType::SmallInt),
            LogicalType::Int32 => DbQueryType::new(SqlType::Int),
            LogicalType::Int64 => DbQueryType::new(SqlType::BigInt),
            LogicalType::Float32 => DbQueryType::new(SqlType::Real),
            LogicalType::Float64 => DbQueryType::new(SqlType::Float),
            LogicalType::String => DbQueryType::with_length(SqlType::NVarChar, STRING_LENGTH),
            LogicalType::Bytes => DbQueryType::new(SqlType::VarBinary),
            LogicalType::Date => DbQueryType::new(SqlType::Date),
            LogicalType::Time => DbQueryType::new(SqlType::Time),
            LogicalType::DateTime => DbQueryType::new(SqlType::DateTime),
            _ => return None,
        };
        Some(mapped)
    }
}
