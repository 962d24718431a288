//! Type string parser.
//!
//! ```text
//! Type       = Ident | Ident "(" Args ")"
//! Args       = Arg ("," Arg)*
//! Arg        = Type | Name Type | Quoted | Quoted "=" Int | Int
//! Quoted     = "'" (char | "\'" | "\\")* "'"
//! ```
use super::{
    Column,
    array::Array,
    date::{Date, Date32, DateTime, DateTime64},
    decimal::{DecimalColumn, MAX_PRECISION},
    enums::EnumColumn,
    nullable::Nullable,
    numeric::{Bool, Fixed, Float32, Float64, Int8, Int16, Int32, Int64, Int128, UInt8, UInt16, UInt32, UInt64, UInt128, Uuid},
    string::{FixedStringColumn, StringColumn},
    tuple::Tuple,
};
use crate::protocol::ProtocolError;

const MAX_DEPTH: usize = 64;

/// Parse a column type string into an empty column.
///
/// Unknown or unsupported types fail with [`ProtocolError::InvalidType`].
pub fn new_column(ty: &str) -> Result<Box<dyn Column>, ProtocolError> {
    parse(ty.trim(), 0)
}

fn parse(ty: &str, depth: usize) -> Result<Box<dyn Column>, ProtocolError> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::invalid_type(ty, "nesting too deep"));
    }

    let (name, args) = match ty.find('(') {
        Some(open) => match ty[open + 1..].strip_suffix(')') {
            Some(args) => (ty[..open].trim(), Some(args.trim())),
            None => return Err(ProtocolError::invalid_type(ty, "unbalanced parenthesis")),
        },
        None => (ty, None),
    };

    macro_rules! fixed {
        ($p:ty) => {
            Box::new(Fixed::<$p>::new(ty))
        };
    }

    let column: Box<dyn Column> = match (name, args) {
        ("Int8", None) => fixed!(Int8),
        ("Int16", None) => fixed!(Int16),
        ("Int32", None) => fixed!(Int32),
        ("Int64", None) => fixed!(Int64),
        ("Int128", None) => fixed!(Int128),
        ("UInt8", None) => fixed!(UInt8),
        ("UInt16", None) => fixed!(UInt16),
        ("UInt32", None) => fixed!(UInt32),
        ("UInt64", None) => fixed!(UInt64),
        ("UInt128", None) => fixed!(UInt128),
        ("Float32", None) => fixed!(Float32),
        ("Float64", None) => fixed!(Float64),
        ("Bool", None) => fixed!(Bool),
        ("UUID", None) => fixed!(Uuid),
        ("Date", None) => fixed!(Date),
        ("Date32", None) => fixed!(Date32),
        ("DateTime", None) => fixed!(DateTime),
        ("DateTime", Some(tz)) => {
            quoted(tz)
                .filter(|(_, rest)| rest.is_empty())
                .ok_or_else(|| ProtocolError::invalid_type(ty, "expected quoted timezone"))?;
            fixed!(DateTime)
        },
        ("DateTime64", Some(args)) => {
            let args = split(ty, args)?;
            let precision = match args.first().map(|p| p.parse::<u8>()) {
                Some(Ok(p)) if p <= 9 => p,
                _ => return Err(ProtocolError::invalid_type(ty, "precision must be 0 to 9")),
            };
            match args.get(1) {
                None => { },
                Some(tz) if args.len() == 2 && quoted(tz).is_some_and(|(_, r)| r.is_empty()) => { },
                Some(_) => return Err(ProtocolError::invalid_type(ty, "expected quoted timezone")),
            }
            Box::new(DateTime64::new(ty, precision))
        },
        ("String", None) => Box::new(StringColumn::default()),
        ("FixedString", Some(n)) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Box::new(FixedStringColumn::new(ty, n)),
            _ => return Err(ProtocolError::invalid_type(ty, "invalid fixed string length")),
        },
        ("Nullable", Some(inner)) => Box::new(Nullable::new(ty, parse(inner, depth + 1)?)),
        ("Array", Some(inner)) => Box::new(Array::new(ty, parse(inner, depth + 1)?)),
        ("Enum8", Some(args)) => Box::new(EnumColumn::new(ty, false, variants(ty, args, false)?)),
        ("Enum16", Some(args)) => Box::new(EnumColumn::new(ty, true, variants(ty, args, true)?)),
        ("Decimal", Some(args)) => {
            let args = split(ty, args)?;
            let [p, s] = args.as_slice() else {
                return Err(ProtocolError::invalid_type(ty, "expected precision and scale"));
            };
            decimal(ty, p.parse().ok(), s.parse().ok())?
        },
        ("Decimal32", Some(s)) => decimal(ty, Some(9), s.parse().ok())?,
        ("Decimal64", Some(s)) => decimal(ty, Some(18), s.parse().ok())?,
        ("Decimal128", Some(s)) => decimal(ty, Some(38), s.parse().ok())?,
        ("Tuple", Some(args)) => {
            let mut elements = vec![];
            for element in split(ty, args)? {
                elements.push(parse(unnamed(element), depth + 1)?);
            }
            Box::new(Tuple::new(ty, elements))
        },
        _ => return Err(ProtocolError::invalid_type(ty, "unsupported type")),
    };

    Ok(column)
}

fn decimal(ty: &str, precision: Option<u8>, scale: Option<u8>) -> Result<Box<dyn Column>, ProtocolError> {
    match (precision, scale) {
        (Some(p), _) if p > MAX_PRECISION => {
            Err(ProtocolError::invalid_type(ty, "precision above 38 is not supported"))
        },
        (Some(p @ 1..), Some(s)) if s <= p => Ok(Box::new(DecimalColumn::new(ty, p, s))),
        _ => Err(ProtocolError::invalid_type(ty, "invalid precision or scale")),
    }
}

fn variants(ty: &str, args: &str, wide: bool) -> Result<Vec<(String, i16)>, ProtocolError> {
    let mut variants = vec![];
    for arg in split(ty, args)? {
        let Some((name, rest)) = quoted(arg) else {
            return Err(ProtocolError::invalid_type(ty, "expected quoted enum identifier"));
        };
        let value = rest
            .trim_start()
            .strip_prefix('=')
            .and_then(|v| v.trim().parse::<i16>().ok())
            .filter(|&v| wide || i8::try_from(v).is_ok())
            .ok_or_else(|| ProtocolError::invalid_type(ty, "invalid enum value"))?;
        variants.push((name, value));
    }
    Ok(variants)
}

/// Strip the element name of a named tuple element.
fn unnamed(element: &str) -> &str {
    let space = element.find(char::is_whitespace);
    let paren = element.find('(');
    match (space, paren) {
        (Some(s), Some(p)) if s < p => element[s..].trim(),
        (Some(s), None) => element[s..].trim(),
        _ => element,
    }
}

/// Split on top level commas, outside of parenthesis and quotes.
fn split<'a>(ty: &str, args: &'a str) -> Result<Vec<&'a str>, ProtocolError> {
    let mut out = vec![];
    let mut depth = 0usize;
    let mut quote = false;
    let mut escape = false;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        match c {
            _ if escape => escape = false,
            '\\' if quote => escape = true,
            '\'' => quote = !quote,
            _ if quote => { },
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ProtocolError::invalid_type(ty, "unbalanced parenthesis"))?
            },
            ',' if depth == 0 => {
                out.push(args[start..i].trim());
                start = i + 1;
            },
            _ => { },
        }
    }

    if quote || depth != 0 {
        return Err(ProtocolError::invalid_type(ty, "unterminated argument"));
    }

    out.push(args[start..].trim());
    Ok(out)
}

/// Parse a leading single quoted string with `\'` and `\\` escapes.
///
/// Returns the unescaped string and the rest after the closing quote.
fn quoted(s: &str) -> Option<(String, &str)> {
    let body = s.strip_prefix('\'')?;
    let mut out = String::new();
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?.1),
            '\'' => return Some((out, &body[i + 1..])),
            c => out.push(c),
        }
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn type_names_are_kept() {
        for ty in [
            "Int8", "UInt128", "Float64", "Bool", "String", "UUID", "Date32",
            "FixedString(16)",
            "DateTime",
            "DateTime('Asia/Jakarta')",
            "DateTime64(3)",
            "DateTime64(9, 'UTC')",
            "Nullable(String)",
            "Array(Array(Nullable(Int8)))",
            "Enum8('a' = 1, 'b, c' = 2)",
            "Decimal(18, 4)",
            "Tuple(UInt8, Array(String))",
            "Tuple(a UInt8, b DateTime64(3, 'UTC'))",
        ] {
            let col = new_column(ty).unwrap();
            assert_eq!(col.type_name(), ty);
            assert_eq!(col.rows(), 0);
        }
    }

    #[test]
    fn invalid_types() {
        for ty in [
            "Nope",
            "Int8(1)",
            "Array(Int8",
            "Array()",
            "FixedString(0)",
            "FixedString(x)",
            "DateTime(UTC)",
            "DateTime64(10)",
            "Enum8('a' = 200)",
            "Enum8(a = 1)",
            "Enum8('a = 1)",
            "Decimal(0, 0)",
            "Decimal256(2)",
            "LowCardinality(String)",
            "Map(String, UInt8)",
        ] {
            assert!(
                matches!(new_column(ty), Err(ProtocolError::InvalidType { .. })),
                "{ty} should be rejected"
            );
        }
    }

    #[test]
    fn deep_nesting() {
        let ty = format!("{}UInt8{}", "Array(".repeat(100), ")".repeat(100));
        assert!(new_column(&ty).is_err());
    }

    #[test]
    fn quoted_escapes() {
        assert_eq!(quoted(r"'it\'s \\ ok' = 1"), Some((r"it's \ ok".to_owned(), " = 1")));
        assert_eq!(quoted("'open"), None);
        assert_eq!(quoted("bare"), None);
    }

    #[test]
    fn split_respects_nesting() {
        assert_eq!(
            split("", "a UInt8, Tuple(b, c), 'x,y' = 1").unwrap(),
            ["a UInt8", "Tuple(b, c)", "'x,y' = 1"]
        );
    }
}
