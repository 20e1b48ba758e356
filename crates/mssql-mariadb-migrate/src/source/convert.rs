//! Normalization of Tiberius cells into [`SqlValue`].

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{ColumnData, ColumnType, FromSql};

use crate::core::value::SqlValue;
use crate::error::Result;

/// Convert one driver cell into the portable representation.
///
/// Fixed-point numerics keep their exact digits as text, binary becomes
/// `0x`-prefixed hex, dates and times become ISO text, and every datetime
/// flavour becomes a `Timestamp` (offsets are converted to UTC).
pub fn normalize(data: ColumnData<'static>) -> Result<SqlValue> {
    let value = match &data {
        ColumnData::U8(v) => v.map(|v| SqlValue::Integer(v as i64)).into(),
        ColumnData::I16(v) => v.map(|v| SqlValue::Integer(v as i64)).into(),
        ColumnData::I32(v) => v.map(|v| SqlValue::Integer(v as i64)).into(),
        ColumnData::I64(v) => v.map(SqlValue::Integer).into(),
        ColumnData::F32(v) => v.map(|v| SqlValue::Float(v as f64)).into(),
        ColumnData::F64(v) => v.map(SqlValue::Float).into(),
        ColumnData::Bit(v) => v.map(SqlValue::Boolean).into(),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())).into(),
        ColumnData::Guid(v) => v
            .as_ref()
            .map(|g| SqlValue::Text(g.hyphenated().to_string().to_uppercase()))
            .into(),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| SqlValue::Text(format!("0x{}", hex::encode_upper(b))))
            .into(),
        ColumnData::Numeric(_) => Decimal::from_sql(&data)?
            .map(|d| SqlValue::Text(d.to_string()))
            .into(),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| SqlValue::Text(x.as_ref().clone().into_string()))
            .into(),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?.map(SqlValue::Timestamp).into()
        }
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(&data)?
            .map(|dt| SqlValue::Timestamp(dt.naive_utc()))
            .into(),
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?
            .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
            .into(),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)?
            .map(|t| SqlValue::Text(t.format("%H:%M:%S").to_string()))
            .into(),
    };
    Ok(value)
}

/// Normalize a whole result row, in column order.
pub fn normalize_row(row: tiberius::Row) -> Result<Vec<SqlValue>> {
    row.into_iter().map(normalize).collect()
}

/// Source type name for a result-set column type, used when columns are
/// derived from probe-query metadata. Unknown codes read as `varchar`.
pub fn probe_type_name(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => "bit",
        ColumnType::Int1 => "tinyint",
        ColumnType::Int2 => "smallint",
        ColumnType::Int4 | ColumnType::Intn => "int",
        ColumnType::Int8 => "bigint",
        ColumnType::Float4 => "real",
        ColumnType::Float8 | ColumnType::Floatn => "float",
        ColumnType::Money | ColumnType::Money4 => "money",
        ColumnType::Decimaln | ColumnType::Numericn => "decimal",
        ColumnType::Datetime | ColumnType::Datetime4 | ColumnType::Datetimen => "datetime",
        ColumnType::Datetime2 => "datetime2",
        ColumnType::DatetimeOffsetn => "datetimeoffset",
        ColumnType::Daten => "date",
        ColumnType::Timen => "time",
        ColumnType::Guid => "uniqueidentifier",
        ColumnType::BigVarChar => "varchar",
        ColumnType::BigChar => "char",
        ColumnType::NVarchar => "nvarchar",
        ColumnType::NChar => "nchar",
        ColumnType::Text => "text",
        ColumnType::NText => "ntext",
        ColumnType::Xml => "xml",
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => "varbinary",
        _ => "varchar",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_scalars() {
        assert_eq!(normalize(ColumnData::U8(Some(200))).unwrap(), SqlValue::Integer(200));
        assert_eq!(normalize(ColumnData::I32(Some(-7))).unwrap(), SqlValue::Integer(-7));
        assert_eq!(normalize(ColumnData::F32(Some(1.5))).unwrap(), SqlValue::Float(1.5));
        assert_eq!(normalize(ColumnData::Bit(Some(true))).unwrap(), SqlValue::Boolean(true));
        assert_eq!(
            normalize(ColumnData::String(Some(Cow::Borrowed("abc")))).unwrap(),
            SqlValue::Text("abc".into())
        );
    }

    #[test]
    fn test_nulls_pass_through() {
        assert_eq!(normalize(ColumnData::I64(None)).unwrap(), SqlValue::Null);
        assert_eq!(normalize(ColumnData::String(None)).unwrap(), SqlValue::Null);
        assert_eq!(normalize(ColumnData::DateTime2(None)).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_binary_as_hex() {
        let data = ColumnData::Binary(Some(Cow::Owned(vec![0xde, 0xad, 0x01])));
        assert_eq!(normalize(data).unwrap(), SqlValue::Text("0xDEAD01".into()));
    }

    #[test]
    fn test_numeric_keeps_digits() {
        let n = tiberius::numeric::Numeric::new_with_scale(12345, 2);
        assert_eq!(
            normalize(ColumnData::Numeric(Some(n))).unwrap(),
            SqlValue::Text("123.45".into())
        );
    }

    #[test]
    fn test_negative_numeric_keeps_sign() {
        let cases = [(-5, 2, "-0.05"), (-105, 2, "-1.05"), (-12345, 2, "-123.45"), (-5, 3, "-0.005")];
        for (value, scale, expected) in cases {
            let n = tiberius::numeric::Numeric::new_with_scale(value, scale);
            assert_eq!(
                normalize(ColumnData::Numeric(Some(n))).unwrap(),
                SqlValue::Text(expected.into())
            );
        }
    }

    #[test]
    fn test_probe_type_names() {
        assert_eq!(probe_type_name(ColumnType::Int4), "int");
        assert_eq!(probe_type_name(ColumnType::Float8), "float");
        assert_eq!(probe_type_name(ColumnType::Datetimen), "datetime");
        assert_eq!(probe_type_name(ColumnType::NVarchar), "nvarchar");
        assert_eq!(probe_type_name(ColumnType::Udt), "varchar");
    }
}
