//! Type mapping between MSSQL and MariaDB.
//!
//! [`map_type`] is total: every input produces a usable target type, with
//! `TEXT` as the fallback for anything unrecognized.

/// Longest `VARCHAR` declared on the target. Wider columns become `TEXT` to
/// stay inside the InnoDB row-size limit for utf8mb4.
pub const MAX_VARCHAR_LENGTH: i32 = 16383;

/// Longest `CHAR` the target accepts.
pub const MAX_CHAR_LENGTH: i32 = 255;

/// Fallback for unknown types and unbounded character data.
pub const FALLBACK_TYPE: &str = "TEXT";

/// Result of mapping one column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Target type for the column definition.
    pub target_type: String,

    /// Set when the mapping loses information.
    pub warning: Option<String>,
}

impl TypeMapping {
    fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            warning: None,
        }
    }

    fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            warning: Some(warning.into()),
        }
    }
}

/// Map an MSSQL column type to a MariaDB column type.
pub fn map_type(
    source_type: &str,
    length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> String {
    map_column_type(source_type, length, precision, scale).target_type
}

/// Like [`map_type`], but reports lossy conversions.
pub fn map_column_type(
    source_type: &str,
    length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> TypeMapping {
    let length = length.filter(|l| *l > 0);

    match source_type.trim().to_lowercase().as_str() {
        "decimal" | "numeric" => match (precision, scale) {
            (Some(p), Some(s)) if p > 65 => TypeMapping::lossy(
                format!("DECIMAL(65,{})", s.min(30)),
                format!("precision {} exceeds the MariaDB maximum of 65", p),
            ),
            (Some(p), Some(s)) if p > 0 => TypeMapping::lossless(format!("DECIMAL({},{})", p, s)),
            _ => TypeMapping::lossless("DECIMAL(10,2)"),
        },

        "varchar" | "nvarchar" => match length {
            Some(l) if l <= MAX_VARCHAR_LENGTH => TypeMapping::lossless(format!("VARCHAR({})", l)),
            _ => TypeMapping::lossless(FALLBACK_TYPE),
        },

        "char" | "nchar" => match length {
            Some(l) if l <= MAX_CHAR_LENGTH => TypeMapping::lossless(format!("CHAR({})", l)),
            Some(l) => TypeMapping::lossless(format!("VARCHAR({})", l)),
            None => TypeMapping::lossless("CHAR(1)"),
        },

        // Integer types
        "int" | "integer" => TypeMapping::lossless("INT"),
        "bigint" => TypeMapping::lossless("BIGINT"),
        "smallint" => TypeMapping::lossless("SMALLINT"),
        "tinyint" => TypeMapping::lossless("TINYINT UNSIGNED"),
        "bit" => TypeMapping::lossless("BOOLEAN"),

        // Monetary
        "money" => TypeMapping::lossless("DECIMAL(19,4)"),
        "smallmoney" => TypeMapping::lossless("DECIMAL(10,4)"),

        // Floating point
        "float" => TypeMapping::lossless("DOUBLE"),
        "real" => TypeMapping::lossless("FLOAT"),

        // Date/time types
        "datetime" | "datetime2" | "smalldatetime" => TypeMapping::lossless("DATETIME"),
        "datetimeoffset" => TypeMapping::lossy(
            "DATETIME",
            "datetimeoffset is converted to UTC; the offset is dropped",
        ),
        "date" => TypeMapping::lossless("DATE"),
        "time" => TypeMapping::lossless("TIME"),

        // Large text
        "text" => TypeMapping::lossless("TEXT"),
        "ntext" => TypeMapping::lossless("LONGTEXT"),
        "xml" => TypeMapping::lossy("LONGTEXT", "XML stored as text"),

        "uniqueidentifier" => TypeMapping::lossless("VARCHAR(36)"),

        "binary" | "varbinary" | "image" => {
            TypeMapping::lossy("LONGTEXT", "binary data stored as 0x-prefixed hex text")
        }

        other => TypeMapping::lossy(
            FALLBACK_TYPE,
            format!("unrecognized type '{}' stored as text", other),
        ),
    }
}

/// Whether the mapped type is a large-text type that needs a prefix length
/// when used in a key.
pub fn is_large_text(target_type: &str) -> bool {
    matches!(
        target_type.to_uppercase().as_str(),
        "TEXT" | "MEDIUMTEXT" | "LONGTEXT"
    )
}
