use std::cell::RefCell;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::error::FactError;

/// A reference to a `Number` cell. Array elements and named scope variables
/// share this representation so `ELEM`/`STO` can address either uniformly.
pub type NumberRef = Rc<RefCell<Number>>;

/// The tagged union backing every numeric value. Integers are arbitrary
/// precision (`num_bigint::BigInt`); floats are host `f64` (see SPEC_FULL §3:
/// the arbitrary-precision primitives are an external-library concern, and
/// `num-bigint` is the library this crate reaches for).
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Int(BigInt),
    Float(f64),
}

impl Tag {
    pub fn is_truthy(&self) -> bool {
        match self {
            Tag::Int(i) => !i.is_zero(),
            Tag::Float(f) => *f != 0.0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Tag::Int(i) => i.to_f64().unwrap_or(f64::NAN),
            Tag::Float(f) => *f,
        }
    }
}

/// A numeric cell: either a scalar (`array = None`) or an array of further
/// `Number` cells (`array = Some(cells)`), each sharing the parent's
/// `array_size` recursively (rectangularity, SPEC_FULL §3).
#[derive(Debug, Clone)]
pub struct Number {
    pub value: Tag,
    pub array: Option<Vec<NumberRef>>,
}

impl Number {
    pub fn scalar(value: Tag) -> Number {
        Number { value, array: None }
    }

    pub fn int(v: i64) -> Number {
        Number::scalar(Tag::Int(BigInt::from(v)))
    }

    pub fn float(v: f64) -> Number {
        Number::scalar(Tag::Float(v))
    }

    pub fn new_ref(value: Tag) -> NumberRef {
        Rc::new(RefCell::new(Number::scalar(value)))
    }

    pub fn array_size(&self) -> usize {
        self.array.as_ref().map(|a| a.len()).unwrap_or(0)
    }

    /// Allocate a rectangular array of the given per-dimension sizes. The
    /// innermost dimension holds scalar zero cells.
    pub fn new_array(dims: &[usize]) -> Number {
        match dims.split_first() {
            None => Number::int(0),
            Some((&size, rest)) => {
                let cells = (0..size)
                    .map(|_| Rc::new(RefCell::new(Number::new_array(rest))))
                    .collect();
                Number {
                    value: Tag::Int(BigInt::from(0)),
                    array: Some(cells),
                }
            }
        }
    }

    /// Deep-copy `src` into `self`, matching the original `mpc_set`/`STO`
    /// contract: a fresh array subtree is allocated rather than sharing cells
    /// with `src`, so later mutation of one does not alias the other.
    pub fn assign_from(&mut self, src: &Number) {
        self.value = src.value.clone();
        self.array = src.array.as_ref().map(|cells| {
            cells
                .iter()
                .map(|c| Rc::new(RefCell::new(c.borrow().clone())))
                .collect()
        });
    }

    /// Parse a base-10 or `0x`-prefixed base-16 literal, `.` selecting a
    /// float and a leading `-` a negative value (SPEC_FULL §4.1, `CONST`).
    pub fn parse_literal(lexeme: &str) -> Result<Number, FactError> {
        let (neg, rest) = match lexeme.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, lexeme),
        };
        if rest.is_empty() {
            return Err(FactError::value(format!("invalid numeric literal '{}'", lexeme)));
        }
        if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            let mut v = BigInt::parse_bytes(hex.as_bytes(), 16)
                .ok_or_else(|| FactError::value(format!("invalid hex literal '{}'", lexeme)))?;
            if neg {
                v = -v;
            }
            return Ok(Number::scalar(Tag::Int(v)));
        }
        if rest.contains('.') {
            let f: f64 = rest
                .parse()
                .map_err(|_| FactError::value(format!("invalid float literal '{}'", lexeme)))?;
            return Ok(Number::scalar(Tag::Float(if neg { -f } else { f })));
        }
        let mut v = BigInt::parse_bytes(rest.as_bytes(), 10)
            .ok_or_else(|| FactError::value(format!("invalid integer literal '{}'", lexeme)))?;
        if neg {
            v = -v;
        }
        Ok(Number::scalar(Tag::Int(v)))
    }

    /// Human-readable decimal rendering (SPEC_FULL §6).
    pub fn to_display_string(&self) -> String {
        match &self.value {
            Tag::Int(i) => i.to_string(),
            Tag::Float(f) => format!("{}", f),
        }
    }
}

fn promote(a: &Tag, b: &Tag) -> (Tag, Tag) {
    match (a, b) {
        (Tag::Float(_), _) | (_, Tag::Float(_)) => (Tag::Float(a.as_f64()), Tag::Float(b.as_f64())),
        _ => (a.clone(), b.clone()),
    }
}

pub fn add(a: &Tag, b: &Tag) -> Tag {
    match promote(a, b) {
        (Tag::Int(x), Tag::Int(y)) => Tag::Int(x + y),
        (Tag::Float(x), Tag::Float(y)) => Tag::Float(x + y),
        _ => unreachable!(),
    }
}

pub fn sub(a: &Tag, b: &Tag) -> Tag {
    match promote(a, b) {
        (Tag::Int(x), Tag::Int(y)) => Tag::Int(x - y),
        (Tag::Float(x), Tag::Float(y)) => Tag::Float(x - y),
        _ => unreachable!(),
    }
}

pub fn mul(a: &Tag, b: &Tag) -> Tag {
    match promote(a, b) {
        (Tag::Int(x), Tag::Int(y)) => Tag::Int(x * y),
        (Tag::Float(x), Tag::Float(y)) => Tag::Float(x * y),
        _ => unreachable!(),
    }
}

pub fn div(a: &Tag, b: &Tag) -> Result<Tag, FactError> {
    match promote(a, b) {
        (Tag::Int(x), Tag::Int(y)) => {
            if y.is_zero() {
                return Err(FactError::runtime("division by zero"));
            }
            Ok(Tag::Int(x / y))
        }
        (Tag::Float(x), Tag::Float(y)) => {
            if y == 0.0 {
                return Err(FactError::runtime("division by zero"));
            }
            Ok(Tag::Float(x / y))
        }
        _ => unreachable!(),
    }
}

pub fn rem(a: &Tag, b: &Tag) -> Result<Tag, FactError> {
    match (a, b) {
        (Tag::Int(x), Tag::Int(y)) => {
            if y.is_zero() {
                return Err(FactError::runtime("division by zero"));
            }
            Ok(Tag::Int(x % y))
        }
        _ => Err(FactError::ty("'%' requires two integers")),
    }
}

pub fn neg(a: &Tag) -> Tag {
    match a {
        Tag::Int(x) => Tag::Int(-x.clone()),
        Tag::Float(x) => Tag::Float(-x),
    }
}

pub fn compare(a: &Tag, b: &Tag) -> std::cmp::Ordering {
    match promote(a, b) {
        (Tag::Int(x), Tag::Int(y)) => x.cmp(&y),
        (Tag::Float(x), Tag::Float(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Less),
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex_and_float() {
        assert_eq!(Number::parse_literal("42").unwrap().value, Tag::Int(BigInt::from(42)));
        assert_eq!(Number::parse_literal("0x2A").unwrap().value, Tag::Int(BigInt::from(42)));
        assert_eq!(Number::parse_literal("-3.5").unwrap().value, Tag::Float(-3.5));
    }

    #[test]
    fn array_is_rectangular() {
        let n = Number::new_array(&[3, 2]);
        assert_eq!(n.array_size(), 3);
        for cell in n.array.as_ref().unwrap() {
            assert_eq!(cell.borrow().array_size(), 2);
            for leaf in cell.borrow().array.as_ref().unwrap() {
                assert_eq!(leaf.borrow().array_size(), 0);
            }
        }
    }

    #[test]
    fn assign_from_deep_copies_array() {
        let mut dst = Number::int(0);
        let src = Number::new_array(&[2]);
        src.array.as_ref().unwrap()[0].borrow_mut().value = Tag::Int(BigInt::from(7));
        dst.assign_from(&src);
        dst.array.as_ref().unwrap()[0].borrow_mut().value = Tag::Int(BigInt::from(9));
        assert_eq!(src.array.as_ref().unwrap()[0].borrow().value, Tag::Int(BigInt::from(7)));
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        assert!(div(&Tag::Int(BigInt::from(1)), &Tag::Int(BigInt::from(0))).is_err());
    }
}
