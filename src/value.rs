//! Runtime values and the coercion rules between them.
//!
//! A `Value` is always exactly one variant. Arrays have value semantics
//! (assignment copies); objects are shared handles, so cloning a `Value::Object`
//! only bumps a reference count.
//!
//! Operators live here as free functions so the engine and native objects
//! apply the same rules. Each one takes already-resolved operands: object
//! default members are resolved by the engine before these are called.

use crate::ast::CompareMode;
use crate::dates;
use crate::eval::EvalError;
use crate::extension::ObjectRef;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Largest element count an array may hold.
pub const MAX_ARRAY_ELEMENTS: usize = 1 << 24;

/// Largest string `Space` and `String` will build, in characters.
pub const MAX_STRING_LEN: usize = 1 << 26;

/// A (possibly multi-dimensional) array with zero lower bounds.
#[derive(Debug, Clone, Default)]
pub struct VbArray {
    /// Upper bound per dimension; empty when a dynamic array is unallocated
    bounds: Vec<i64>,
    /// Row-major element storage
    data: Vec<Value>,
    /// Declared with fixed bounds (`Dim a(3)`), so ReDim is refused
    pub fixed: bool,
}

impl VbArray {
    /// Allocate an array with the given upper bounds, elements Empty.
    pub fn new(bounds: Vec<i64>) -> Result<Self, EvalError> {
        let len = Self::element_count(&bounds)?;
        Ok(VbArray {
            bounds,
            data: vec![Value::Empty; len],
            fixed: false,
        })
    }

    /// A dynamic array with no storage (`Dim a()`).
    pub fn unallocated() -> Self {
        VbArray::default()
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        VbArray {
            bounds: vec![values.len() as i64 - 1],
            data: values,
            fixed: false,
        }
    }

    fn element_count(bounds: &[i64]) -> Result<usize, EvalError> {
        if bounds.is_empty() {
            return Ok(0);
        }
        bounds
            .iter()
            .try_fold(1usize, |count, ub| {
                let extent = usize::try_from(ub.saturating_add(1).max(0)).ok()?;
                count
                    .checked_mul(extent)
                    .filter(|n| *n <= MAX_ARRAY_ELEMENTS)
            })
            .ok_or(EvalError::OutOfMemory)
    }

    pub fn dimensions(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_allocated(&self) -> bool {
        !self.bounds.is_empty()
    }

    /// Upper bound of a 1-based dimension.
    pub fn ubound(&self, dimension: usize) -> Result<i64, EvalError> {
        if dimension == 0 {
            return Err(EvalError::SubscriptOutOfRange);
        }
        self.bounds
            .get(dimension - 1)
            .copied()
            .ok_or(EvalError::SubscriptOutOfRange)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.data
    }

    pub fn into_values(self) -> Vec<Value> {
        self.data
    }

    pub fn push(&mut self, value: Value) {
        if self.bounds.len() > 1 {
            return;
        }
        self.data.push(value);
        self.bounds = vec![self.data.len() as i64 - 1];
    }

    fn offset(&self, indices: &[i64]) -> Result<usize, EvalError> {
        if indices.len() != self.bounds.len() {
            return Err(EvalError::SubscriptOutOfRange);
        }
        let mut offset = 0usize;
        for (index, ub) in indices.iter().zip(&self.bounds) {
            if *index < 0 || index > ub {
                return Err(EvalError::SubscriptOutOfRange);
            }
            offset = offset * (*ub as usize + 1) + *index as usize;
        }
        Ok(offset)
    }

    pub fn get(&self, indices: &[i64]) -> Result<&Value, EvalError> {
        let offset = self.offset(indices)?;
        self.data.get(offset).ok_or(EvalError::SubscriptOutOfRange)
    }

    pub fn get_mut(&mut self, indices: &[i64]) -> Result<&mut Value, EvalError> {
        let offset = self.offset(indices)?;
        self.data
            .get_mut(offset)
            .ok_or(EvalError::SubscriptOutOfRange)
    }

    /// Resize to `bounds`. With `preserve`, elements whose indices are valid
    /// in both the old and new shape keep their values.
    pub fn redim(&mut self, bounds: Vec<i64>, preserve: bool) -> Result<(), EvalError> {
        if self.fixed {
            return Err(EvalError::ArrayLocked);
        }
        let mut resized = VbArray::new(bounds)?;
        if preserve && self.is_allocated() {
            if self.bounds.len() != resized.bounds.len() {
                return Err(EvalError::SubscriptOutOfRange);
            }
            let old = std::mem::take(self);
            for (offset, value) in old.data.into_iter().enumerate() {
                let indices = indices_of(&old.bounds, offset);
                if let Ok(slot) = resized.get_mut(&indices) {
                    *slot = value;
                }
            }
        }
        *self = resized;
        Ok(())
    }

    /// `Erase`: fixed arrays are cleared in place, dynamic ones deallocated.
    pub fn erase(&mut self) {
        if self.fixed {
            for slot in &mut self.data {
                *slot = Value::Empty;
            }
        } else {
            *self = VbArray::unallocated();
        }
    }
}

fn indices_of(bounds: &[i64], mut offset: usize) -> Vec<i64> {
    let mut indices = vec![0; bounds.len()];
    for (i, ub) in bounds.iter().enumerate().rev() {
        let extent = (*ub + 1).max(1) as usize;
        indices[i] = (offset % extent) as i64;
        offset /= extent;
    }
    indices
}

/// Runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Empty,
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(NaiveDateTime),
    Array(VbArray),
    Object(ObjectRef),
    Nothing,
}

/// A numeric operand after coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Integer(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(VbArray::from_values(values))
    }
}

/// Parse text the way numeric coercion does: optional sign, decimal with
/// exponent, or `&H` / `&O` radix prefixes. Surrounding whitespace is ignored.
pub fn parse_numeric(text: &str) -> Option<Number> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    let lower = t.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("&h") {
        return i64::from_str_radix(hex, 16).ok().map(Number::Int);
    }
    if let Some(oct) = lower.strip_prefix("&o") {
        return i64::from_str_radix(oct, 8).ok().map(Number::Int);
    }
    if lower == "inf" || lower == "nan" || lower.contains("infinity") {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Number::Int(i));
    }
    t.parse::<f64>().ok().map(Number::Float)
}

/// Round half to even, the rule `CInt`, `\` and `Mod` use.
pub fn round_half_even(f: f64) -> f64 {
    f.round_ties_even()
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if f == f.trunc() && f.abs() < 1e15 {
        return format!("{}", f as i64);
    }
    let abs = f.abs();
    if abs >= 1e15 || abs < 1e-4 {
        let s = format!("{:E}", f);
        return match s.split_once('E') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}E+{}", mantissa, exp),
            _ => s,
        };
    }
    format!("{}", f)
}

impl fmt::Display for Value {
    /// String conversion used by `CStr`, concatenation and `Response.Write`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty | Value::Null => Ok(()),
            Value::Boolean(b) => f.write_str(if *b { "True" } else { "False" }),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => f.write_str(&dates::format_date(d)),
            Value::Array(_) => Ok(()),
            Value::Object(obj) => f.write_str(&obj.type_name()),
            Value::Nothing => f.write_str("Nothing"),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Nothing)
    }

    /// `TypeName()`
    pub fn type_name(&self) -> String {
        match self {
            Value::Empty => "Empty".into(),
            Value::Null => "Null".into(),
            Value::Boolean(_) => "Boolean".into(),
            Value::Integer(i) if i16::try_from(*i).is_ok() => "Integer".into(),
            Value::Integer(i) if i32::try_from(*i).is_ok() => "Long".into(),
            Value::Integer(_) => "Double".into(),
            Value::Float(_) => "Double".into(),
            Value::String(_) => "String".into(),
            Value::Date(_) => "Date".into(),
            Value::Array(_) => "Variant()".into(),
            Value::Object(obj) => obj.type_name(),
            Value::Nothing => "Nothing".into(),
        }
    }

    /// `VarType()`
    pub fn var_type(&self) -> i64 {
        match self {
            Value::Empty => 0,
            Value::Null => 1,
            Value::Integer(i) if i16::try_from(*i).is_ok() => 2,
            Value::Integer(i) if i32::try_from(*i).is_ok() => 3,
            Value::Integer(_) | Value::Float(_) => 5,
            Value::Date(_) => 7,
            Value::String(_) => 8,
            Value::Object(_) | Value::Nothing => 9,
            Value::Boolean(_) => 11,
            Value::Array(_) => 8204,
        }
    }

    pub fn to_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Empty | Value::Null => Ok(false),
            Value::Boolean(b) => Ok(*b),
            Value::Integer(i) => Ok(*i != 0),
            Value::Float(f) => Ok(*f != 0.0),
            Value::Date(d) => Ok(dates::to_serial(d) != 0.0),
            Value::String(s) => {
                if s.eq_ignore_ascii_case("true") {
                    return Ok(true);
                }
                if s.eq_ignore_ascii_case("false") || s.is_empty() {
                    return Ok(false);
                }
                Ok(match parse_numeric(s) {
                    Some(n) => n.as_f64() != 0.0,
                    None => true,
                })
            }
            Value::Array(_) | Value::Object(_) | Value::Nothing => {
                Err(EvalError::TypeMismatch(self.type_name()))
            }
        }
    }

    /// Numeric coercion for arithmetic. Null is the caller's concern.
    pub fn to_number(&self) -> Result<Number, EvalError> {
        match self {
            Value::Empty => Ok(Number::Int(0)),
            Value::Null => Err(EvalError::InvalidUseOfNull),
            Value::Boolean(b) => Ok(Number::Int(if *b { -1 } else { 0 })),
            Value::Integer(i) => Ok(Number::Int(*i)),
            Value::Float(f) => Ok(Number::Float(*f)),
            Value::Date(d) => Ok(Number::Float(dates::to_serial(d))),
            Value::String(s) => {
                parse_numeric(s).ok_or_else(|| EvalError::TypeMismatch(format!("\"{}\"", s)))
            }
            Value::Array(_) | Value::Object(_) | Value::Nothing => {
                Err(EvalError::TypeMismatch(self.type_name()))
            }
        }
    }

    pub fn to_f64(&self) -> Result<f64, EvalError> {
        self.to_number().map(Number::as_f64)
    }

    /// Integer coercion with half-even rounding (`CLng`).
    pub fn to_i64(&self) -> Result<i64, EvalError> {
        match self.to_number()? {
            Number::Int(i) => Ok(i),
            Number::Float(f) => {
                let r = round_half_even(f);
                if !r.is_finite() || r.abs() > i64::MAX as f64 {
                    return Err(EvalError::Overflow(format_float(f)));
                }
                Ok(r as i64)
            }
        }
    }

    /// 32-bit integer coercion used by `\`, `Mod` and the bitwise operators.
    pub fn to_i32(&self) -> Result<i32, EvalError> {
        let i = self.to_i64()?;
        i32::try_from(i).map_err(|_| EvalError::Overflow(i.to_string()))
    }

    pub fn to_date(&self) -> Result<NaiveDateTime, EvalError> {
        match self {
            Value::Date(d) => Ok(*d),
            Value::String(s) => dates::parse_date_value(s)
                .ok_or_else(|| EvalError::TypeMismatch(format!("\"{}\"", s))),
            Value::Null => Err(EvalError::InvalidUseOfNull),
            other => {
                let serial = other.to_f64()?;
                dates::from_serial(serial).ok_or_else(|| EvalError::Overflow(serial.to_string()))
            }
        }
    }

    /// `CStr` semantics: Null cannot become a string.
    pub fn to_vb_string(&self) -> Result<String, EvalError> {
        match self {
            Value::Null => Err(EvalError::InvalidUseOfNull),
            Value::Array(_) | Value::Object(_) | Value::Nothing => {
                Err(EvalError::TypeMismatch(self.type_name()))
            }
            other => Ok(other.to_string()),
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

fn is_numeric_like(v: &Value) -> bool {
    matches!(
        v,
        Value::Empty | Value::Boolean(_) | Value::Integer(_) | Value::Float(_) | Value::Date(_)
    )
}

fn numeric_pair(a: &Value, b: &Value) -> Result<(Number, Number), EvalError> {
    Ok((a.to_number()?, b.to_number()?))
}

/// `a + b`
pub fn add(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(Value::String(format!("{}{}", x, y)));
    }
    if let (Value::Date(d), other) | (other, Value::Date(d)) = (a, b) {
        let serial = dates::to_serial(d) + other.to_f64()?;
        return date_from_serial(serial);
    }
    Ok(match numeric_pair(a, b)? {
        (Number::Int(x), Number::Int(y)) => match x.checked_add(y) {
            Some(r) => Value::Integer(r),
            None => Value::Float(x as f64 + y as f64),
        },
        (x, y) => Value::Float(x.as_f64() + y.as_f64()),
    })
}

fn date_from_serial(serial: f64) -> Result<Value, EvalError> {
    dates::from_serial(serial)
        .map(Value::Date)
        .ok_or_else(|| EvalError::Overflow(serial.to_string()))
}

/// `a - b`
pub fn subtract(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match (a, b) {
        (Value::Date(x), Value::Date(y)) => {
            return Ok(Value::Float(dates::to_serial(x) - dates::to_serial(y)));
        }
        (Value::Date(x), other) => {
            return date_from_serial(dates::to_serial(x) - other.to_f64()?);
        }
        _ => {}
    }
    Ok(match numeric_pair(a, b)? {
        (Number::Int(x), Number::Int(y)) => match x.checked_sub(y) {
            Some(r) => Value::Integer(r),
            None => Value::Float(x as f64 - y as f64),
        },
        (x, y) => Value::Float(x.as_f64() - y.as_f64()),
    })
}

/// `a * b`
pub fn multiply(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    Ok(match numeric_pair(a, b)? {
        (Number::Int(x), Number::Int(y)) => match x.checked_mul(y) {
            Some(r) => Value::Integer(r),
            None => Value::Float(x as f64 * y as f64),
        },
        (x, y) => Value::Float(x.as_f64() * y.as_f64()),
    })
}

/// `a / b`, always floating point.
pub fn divide(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = numeric_pair(a, b)?;
    if y.as_f64() == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(Value::Float(x.as_f64() / y.as_f64()))
}

/// `a \ b`
pub fn int_divide(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = (a.to_i32()?, b.to_i32()?);
    if y == 0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(Value::Integer(x.wrapping_div(y) as i64))
}

/// `a Mod b`
pub fn modulo(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = (a.to_i32()?, b.to_i32()?);
    if y == 0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(Value::Integer(x.wrapping_rem(y) as i64))
}

/// `a ^ b`
pub fn power(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = (a.to_f64()?, b.to_f64()?);
    let r = x.powf(y);
    if r.is_nan() {
        return Err(EvalError::InvalidProcedureCall("^".into()));
    }
    Ok(Value::Float(r))
}

/// `a & b`: never a type error for scalars; Null only when both are Null.
pub fn concat(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() && b.is_null() {
        return Ok(Value::Null);
    }
    let piece = |v: &Value| -> Result<String, EvalError> {
        match v {
            Value::Null => Ok(String::new()),
            Value::Array(_) | Value::Object(_) | Value::Nothing => {
                Err(EvalError::TypeMismatch(v.type_name()))
            }
            other => Ok(other.to_string()),
        }
    };
    Ok(Value::String(piece(a)? + &piece(b)?))
}

/// Unary minus
pub fn negate(a: &Value) -> Result<Value, EvalError> {
    if a.is_null() {
        return Ok(Value::Null);
    }
    Ok(match a.to_number()? {
        Number::Int(i) => match i.checked_neg() {
            Some(r) => Value::Integer(r),
            None => Value::Float(-(i as f64)),
        },
        Number::Float(f) => Value::Float(-f),
    })
}

/// Unary plus: numeric check only, strings pass through untouched.
pub fn identity(a: &Value) -> Result<Value, EvalError> {
    match a {
        Value::Array(_) | Value::Object(_) | Value::Nothing => {
            Err(EvalError::TypeMismatch(a.type_name()))
        }
        other => Ok(other.clone()),
    }
}

pub fn not(a: &Value) -> Result<Value, EvalError> {
    match a {
        Value::Null => Ok(Value::Null),
        Value::Boolean(b) => Ok(Value::Boolean(!b)),
        other => Ok(Value::Integer(!other.to_i32()? as i64)),
    }
}

#[derive(Clone, Copy)]
pub enum Logical {
    And,
    Or,
    Xor,
    Eqv,
    Imp,
}

/// `And Or Xor Eqv Imp`: Boolean when both sides are Boolean, bitwise otherwise.
pub fn logical(op: Logical, a: &Value, b: &Value) -> Result<Value, EvalError> {
    if a.is_null() || b.is_null() {
        let other = if a.is_null() { b } else { a };
        return Ok(match (op, other) {
            (Logical::And, Value::Boolean(false)) => Value::Boolean(false),
            (Logical::Or, Value::Boolean(true)) => Value::Boolean(true),
            _ => Value::Null,
        });
    }
    if let (Value::Boolean(x), Value::Boolean(y)) = (a, b) {
        let (x, y) = (*x, *y);
        return Ok(Value::Boolean(match op {
            Logical::And => x && y,
            Logical::Or => x || y,
            Logical::Xor => x ^ y,
            Logical::Eqv => x == y,
            Logical::Imp => !x || y,
        }));
    }
    let (x, y) = (a.to_i32()?, b.to_i32()?);
    let r = match op {
        Logical::And => x & y,
        Logical::Or => x | y,
        Logical::Xor => x ^ y,
        Logical::Eqv => !(x ^ y),
        Logical::Imp => !x | y,
    };
    Ok(Value::Integer(r as i64))
}

/// Compare two strings under the given mode.
pub fn compare_strings(a: &str, b: &str, mode: CompareMode) -> Ordering {
    match mode {
        CompareMode::Binary => a.cmp(b),
        CompareMode::Text => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

/// Ordering of two scalars; `None` when either side is Null.
pub fn compare(a: &Value, b: &Value, mode: CompareMode) -> Result<Option<Ordering>, EvalError> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => compare_strings(x, y, mode),
        (Value::String(s), Value::Empty) => compare_strings(s, "", mode),
        (Value::Empty, Value::String(s)) => compare_strings("", s, mode),
        (Value::String(s), n) if is_numeric_like(n) => match parse_numeric(s) {
            Some(x) => cmp_f64(x.as_f64(), n.to_f64()?),
            None => Ordering::Greater,
        },
        (n, Value::String(s)) if is_numeric_like(n) => match parse_numeric(s) {
            Some(y) => cmp_f64(n.to_f64()?, y.as_f64()),
            None => Ordering::Less,
        },
        (x, y) if is_numeric_like(x) && is_numeric_like(y) => match numeric_pair(x, y)? {
            (Number::Int(i), Number::Int(j)) => i.cmp(&j),
            (i, j) => cmp_f64(i.as_f64(), j.as_f64()),
        },
        (x, _) if !is_numeric_like(x) && !matches!(x, Value::String(_)) => {
            return Err(EvalError::TypeMismatch(x.type_name()));
        }
        (_, y) => return Err(EvalError::TypeMismatch(y.type_name())),
    };
    Ok(Some(ordering))
}

fn cmp_f64(x: f64, y: f64) -> Ordering {
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

/// Apply a relational operator, yielding Boolean or Null.
pub fn relational(
    a: &Value,
    b: &Value,
    mode: CompareMode,
    test: impl Fn(Ordering) -> bool,
) -> Result<Value, EvalError> {
    Ok(match compare(a, b, mode)? {
        Some(ord) => Value::Boolean(test(ord)),
        None => Value::Null,
    })
}

/// Strict equality used by `Select Case` and `Filter`: Null never matches.
pub fn values_equal(a: &Value, b: &Value, mode: CompareMode) -> Result<bool, EvalError> {
    Ok(compare(a, b, mode)? == Some(Ordering::Equal))
}

/// A value that can leave the request thread: Session and Application
/// contents. Objects are not storable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum StoredValue {
    Empty,
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Serial date number
    Date(f64),
    Array {
        bounds: Vec<i64>,
        items: Vec<StoredValue>,
    },
}

impl TryFrom<&Value> for StoredValue {
    type Error = EvalError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Empty => StoredValue::Empty,
            Value::Null => StoredValue::Null,
            Value::Boolean(b) => StoredValue::Boolean(*b),
            Value::Integer(i) => StoredValue::Integer(*i),
            Value::Float(f) => StoredValue::Float(*f),
            Value::String(s) => StoredValue::String(s.clone()),
            Value::Date(d) => StoredValue::Date(dates::to_serial(d)),
            Value::Array(arr) => StoredValue::Array {
                bounds: arr.bounds.clone(),
                items: arr
                    .values()
                    .iter()
                    .map(StoredValue::try_from)
                    .collect::<Result<_, _>>()?,
            },
            Value::Object(_) | Value::Nothing => {
                return Err(EvalError::TypeMismatch(format!(
                    "{} cannot be stored",
                    value.type_name()
                )))
            }
        })
    }
}

impl From<&StoredValue> for Value {
    fn from(stored: &StoredValue) -> Self {
        match stored {
            StoredValue::Empty => Value::Empty,
            StoredValue::Null => Value::Null,
            StoredValue::Boolean(b) => Value::Boolean(*b),
            StoredValue::Integer(i) => Value::Integer(*i),
            StoredValue::Float(f) => Value::Float(*f),
            StoredValue::String(s) => Value::String(s.clone()),
            StoredValue::Date(serial) => dates::from_serial(*serial)
                .map(Value::Date)
                .unwrap_or(Value::Float(*serial)),
            StoredValue::Array { bounds, items } => {
                let mut arr = VbArray::new(bounds.clone()).unwrap_or_default();
                for (slot, item) in arr.data.iter_mut().zip(items) {
                    *slot = Value::from(item);
                }
                Value::Array(arr)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::str(text)
    }

    #[test]
    fn test_add_coerces_numeric_strings() {
        assert!(matches!(add(&Value::Integer(1), &s("2")).unwrap(), Value::Integer(3)));
        assert!(matches!(add(&s("1"), &s("2")).unwrap(), Value::String(ref r) if r == "12"));
        assert!(matches!(add(&Value::Empty, &Value::Integer(4)).unwrap(), Value::Integer(4)));
        assert!(add(&Value::Integer(1), &s("abc")).unwrap_err().number() == 13);
        assert!(add(&Value::Null, &Value::Integer(1)).unwrap().is_null());
    }

    #[test]
    fn test_overflow_promotes_to_float() {
        let r = multiply(&Value::Integer(i64::MAX), &Value::Integer(2)).unwrap();
        assert!(matches!(r, Value::Float(_)));
    }

    #[test]
    fn test_concat_mixes_types() {
        let r = concat(&Value::Integer(1), &s("a")).unwrap();
        assert_eq!(r.to_string(), "1a");
        assert_eq!(concat(&Value::Null, &s("x")).unwrap().to_string(), "x");
        assert!(concat(&Value::Null, &Value::Null).unwrap().is_null());
    }

    #[test]
    fn test_integer_division_rounds_half_even() {
        assert_eq!(int_divide(&Value::Float(7.5), &Value::Integer(2)).unwrap().to_string(), "4");
        assert_eq!(modulo(&Value::Float(6.5), &Value::Integer(4)).unwrap().to_string(), "2");
        assert_eq!(divide(&Value::Integer(1), &Value::Integer(0)).unwrap_err().number(), 11);
        assert_eq!(modulo(&Value::Integer(1), &Value::Integer(0)).unwrap_err().number(), 11);
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        assert_eq!(Value::Float(1e20).to_string(), "1E+20");
        assert_eq!(Value::Boolean(true).to_string(), "True");
    }

    #[test]
    fn test_comparisons() {
        let mode = CompareMode::Binary;
        assert_eq!(compare(&Value::Integer(10), &s("9"), mode).unwrap(), Some(Ordering::Greater));
        assert_eq!(compare(&s("a"), &s("B"), mode).unwrap(), Some(Ordering::Greater));
        assert_eq!(
            compare(&s("a"), &s("A"), CompareMode::Text).unwrap(),
            Some(Ordering::Equal)
        );
        assert_eq!(compare(&Value::Null, &Value::Integer(1), mode).unwrap(), None);
        assert!(values_equal(&Value::Empty, &Value::Integer(0), mode).unwrap());
        assert!(values_equal(&Value::Empty, &s(""), mode).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let t = Value::Boolean(true);
        let f = Value::Boolean(false);
        assert!(matches!(logical(Logical::And, &t, &f).unwrap(), Value::Boolean(false)));
        assert!(matches!(logical(Logical::Imp, &f, &f).unwrap(), Value::Boolean(true)));
        assert!(matches!(
            logical(Logical::Or, &Value::Integer(12), &Value::Integer(3)).unwrap(),
            Value::Integer(15)
        ));
        assert!(matches!(logical(Logical::And, &Value::Null, &f).unwrap(), Value::Boolean(false)));
        assert!(matches!(not(&Value::Integer(0)).unwrap(), Value::Integer(-1)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Empty.to_bool().unwrap());
        assert!(!s("").to_bool().unwrap());
        assert!(!Value::Null.to_bool().unwrap());
        assert!(s("yes").to_bool().unwrap());
        assert!(!s("0").to_bool().unwrap());
        assert!(Value::Integer(-1).to_bool().unwrap());
    }

    #[test]
    fn test_redim_preserve_keeps_overlap() {
        let mut arr = VbArray::new(vec![2]).unwrap();
        for i in 0..3 {
            *arr.get_mut(&[i]).unwrap() = Value::Integer(i * 10);
        }
        arr.redim(vec![4], true).unwrap();
        assert_eq!(arr.ubound(1).unwrap(), 4);
        assert!(matches!(arr.get(&[2]).unwrap(), Value::Integer(20)));
        assert!(arr.get(&[4]).unwrap().is_empty());

        arr.redim(vec![1], true).unwrap();
        assert!(matches!(arr.get(&[1]).unwrap(), Value::Integer(10)));
        assert!(arr.get(&[2]).is_err());

        arr.redim(vec![3], false).unwrap();
        assert!(arr.get(&[0]).unwrap().is_empty());
    }

    #[test]
    fn test_multi_dimensional_preserve() {
        let mut arr = VbArray::new(vec![1, 1]).unwrap();
        *arr.get_mut(&[1, 1]).unwrap() = s("x");
        arr.redim(vec![1, 3], true).unwrap();
        assert_eq!(arr.get(&[1, 1]).unwrap().to_string(), "x");
        assert!(arr.get(&[1, 3]).unwrap().is_empty());
    }

    #[test]
    fn test_fixed_arrays_refuse_redim() {
        let mut arr = VbArray::new(vec![3]).unwrap();
        arr.fixed = true;
        assert_eq!(arr.redim(vec![5], false).unwrap_err().number(), 10);
        arr.erase();
        assert_eq!(arr.len(), 4);
    }

    #[test]
    fn test_stored_value_conversion() {
        let v: Value = vec![Value::Integer(1), s("two")].into();
        let stored = StoredValue::try_from(&v).unwrap();
        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
        assert!(matches!(Value::from(&back), Value::Array(a) if a.len() == 2));
    }
}
