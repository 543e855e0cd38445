use std::error::Error;

use chrono::{DateTime, Utc};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::types::SqlValue;

/// Borrow a parameter slice in the shape `tokio-postgres` expects.
pub(crate) fn as_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            // the wire format is width-specific, so narrow to the column's declared type
            SqlValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            SqlValue::Float(f) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            SqlValue::Text(s) => s.to_sql(ty, out),
            // integer flag columns take 0/1 in the column's own width
            SqlValue::Bool(b) => match *ty {
                Type::INT2 => i16::from(*b).to_sql(ty, out),
                Type::INT4 => i32::from(*b).to_sql(ty, out),
                Type::INT8 => i64::from(*b).to_sql(ty, out),
                _ => b.to_sql(ty, out),
            },
            SqlValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMPTZ => DateTime::<Utc>::from_naive_utc_and_offset(*ts, Utc).to_sql(ty, out),
                _ => ts.to_sql(ty, out),
            },
            SqlValue::Json(v) => v.to_sql(ty, out),
            SqlValue::Blob(b) => b.to_sql(ty, out),
            SqlValue::Null => Ok(IsNull::Yes),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_narrow_to_column_width() {
        let mut buf = bytes::BytesMut::new();
        SqlValue::Int(7).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(&buf[..], &7_i32.to_be_bytes());

        let mut buf = bytes::BytesMut::new();
        SqlValue::Int(7).to_sql(&Type::INT8, &mut buf).unwrap();
        assert_eq!(&buf[..], &7_i64.to_be_bytes());

        let mut buf = bytes::BytesMut::new();
        assert!(SqlValue::Int(1 << 40).to_sql(&Type::INT4, &mut buf).is_err());
    }

    #[test]
    fn booleans_bound_to_integer_columns_use_integer_wire_format() {
        let mut buf = bytes::BytesMut::new();
        SqlValue::Bool(true).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(&buf[..], &1_i32.to_be_bytes());

        let mut buf = bytes::BytesMut::new();
        SqlValue::Bool(false).to_sql(&Type::INT2, &mut buf).unwrap();
        assert_eq!(&buf[..], &0_i16.to_be_bytes());

        let mut buf = bytes::BytesMut::new();
        SqlValue::Bool(true).to_sql(&Type::INT8, &mut buf).unwrap();
        assert_eq!(&buf[..], &1_i64.to_be_bytes());

        let mut buf = bytes::BytesMut::new();
        SqlValue::Bool(true).to_sql(&Type::BOOL, &mut buf).unwrap();
        assert_eq!(&buf[..], &[1]);
    }

    #[test]
    fn null_and_accepts() {
        let mut buf = bytes::BytesMut::new();
        assert!(matches!(
            SqlValue::Null.to_sql(&Type::TEXT, &mut buf).unwrap(),
            IsNull::Yes
        ));
        assert!(<SqlValue as ToSql>::accepts(&Type::TIMESTAMPTZ));
        assert!(!<SqlValue as ToSql>::accepts(&Type::POINT));
    }
}
