//! Total ordering of BSON values across types.
//!
//! Values of different types order by type bracket first:
//! `MinKey < Null < numbers < strings < documents < arrays < binary < ObjectId
//! < booleans < dates < timestamps < regexes < MaxKey`. Numbers compare by value
//! regardless of width, so `Int32(5) == Int64(5) == Double(5.0)`.

use bson::{Bson, Document};
use std::cmp::Ordering;

/// Type bracket used for cross-type ordering.
#[must_use]
pub const fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) | Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 12,
        Bson::MaxKey => 13,
    }
}

/// Compare two values the way an index orders them.
#[must_use]
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    let by_rank = type_rank(a).cmp(&type_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
        (Bson::Int64(x), Bson::Int64(y)) => x.cmp(y),
        (Bson::Int32(x), Bson::Int64(y)) => i64::from(*x).cmp(y),
        (Bson::Int64(x), Bson::Int32(y)) => x.cmp(&i64::from(*y)),
        (x, y) if type_rank(x) == 2 => match (as_f64(x), as_f64(y)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or_else(|| nan_order(x, y)),
            _ => Ordering::Equal,
        },
        (x, y) if type_rank(x) == 3 => string_of(x).cmp(string_of(y)),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let c = compare(l, r);
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Binary(x), Bson::Binary(y)) => x
            .bytes
            .len()
            .cmp(&y.bytes.len())
            .then_with(|| u8::from(x.subtype).cmp(&u8::from(y.subtype)))
            .then_with(|| x.bytes.cmp(&y.bytes)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => {
            (&x.pattern, &x.options).cmp(&(&y.pattern, &y.options))
        }
        _ => Ordering::Equal,
    }
}

/// Field-by-field document comparison: value type, then field name, then value.
#[must_use]
pub fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let c = type_rank(va)
            .cmp(&type_rank(vb))
            .then_with(|| ka.cmp(kb))
            .then_with(|| compare(va, vb));
        if c != Ordering::Equal {
            return c;
        }
    }
    a.len().cmp(&b.len())
}

/// Equality under [`compare`].
#[must_use]
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Ordering::Equal
}

/// True for the `MinKey`/`MaxKey` sentinels that mark an open chunk end.
#[must_use]
pub const fn is_open_bound(value: &Bson) -> bool {
    matches!(value, Bson::MinKey | Bson::MaxKey)
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

// NaN sorts below every other number.
fn nan_order(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn string_of(value: &Bson) -> &str {
    match value {
        Bson::String(s) | Bson::Symbol(s) => s,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numbers_compare_across_widths() {
        assert_eq!(compare(&Bson::Int32(5), &Bson::Int64(5)), Ordering::Equal);
        assert_eq!(compare(&Bson::Double(4.5), &Bson::Int32(5)), Ordering::Less);
        assert_eq!(compare(&Bson::Int64(6), &Bson::Double(5.9)), Ordering::Greater);
    }

    #[test]
    fn type_brackets_order_before_values() {
        assert_eq!(compare(&Bson::MinKey, &Bson::Null), Ordering::Less);
        assert_eq!(compare(&Bson::Int64(i64::MAX), &Bson::String(String::new())), Ordering::Less);
        assert_eq!(compare(&Bson::String("z".into()), &Bson::MaxKey), Ordering::Less);
    }

    #[test]
    fn documents_compare_fieldwise() {
        assert_eq!(compare_documents(&doc! { "a": 1 }, &doc! { "a": 2 }), Ordering::Less);
        assert_eq!(compare_documents(&doc! { "a": 1 }, &doc! { "a": 1, "b": 0 }), Ordering::Less);
    }
}
