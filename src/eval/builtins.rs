//! Built-in functions and constants.
//!
//! `call_builtin` returns `None` for names it does not know, so lookup can
//! fall through to the next candidate. Optional arguments that were left
//! out arrive as Empty and are treated as omitted.

use super::{Engine, EvalError};
use crate::ast::CompareMode;
use crate::dates;
use crate::extension::check_args;
use crate::value::{parse_numeric, round_half_even, Value, VbArray, MAX_STRING_LEN};
use chrono::{Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// `vb*` constants and friends.
pub(crate) fn constant(key: &str) -> Option<Value> {
    let v = match key {
        "vbcrlf" | "vbnewline" => Value::str("\r\n"),
        "vbcr" => Value::str("\r"),
        "vblf" => Value::str("\n"),
        "vbtab" => Value::str("\t"),
        "vbnullstring" => Value::str(""),
        "vbnullchar" => Value::str("\0"),
        "vbformfeed" => Value::str("\x0c"),
        "vbverticaltab" => Value::str("\x0b"),
        "vbtrue" => Value::Integer(-1),
        "vbfalse" => Value::Integer(0),
        "vbusedefault" => Value::Integer(-2),
        "vbbinarycompare" => Value::Integer(0),
        "vbtextcompare" => Value::Integer(1),
        "vbempty" => Value::Integer(0),
        "vbnull" => Value::Integer(1),
        "vbinteger" => Value::Integer(2),
        "vblong" => Value::Integer(3),
        "vbsingle" => Value::Integer(4),
        "vbdouble" => Value::Integer(5),
        "vbcurrency" => Value::Integer(6),
        "vbdate" => Value::Integer(7),
        "vbstring" => Value::Integer(8),
        "vbobject" => Value::Integer(9),
        "vberror" => Value::Integer(10),
        "vbboolean" => Value::Integer(11),
        "vbvariant" => Value::Integer(12),
        "vbdataobject" => Value::Integer(13),
        "vbbyte" => Value::Integer(17),
        "vbarray" => Value::Integer(8192),
        "vbgeneraldate" => Value::Integer(0),
        "vblongdate" => Value::Integer(1),
        "vbshortdate" => Value::Integer(2),
        "vblongtime" => Value::Integer(3),
        "vbshorttime" => Value::Integer(4),
        "vbsunday" => Value::Integer(1),
        "vbmonday" => Value::Integer(2),
        "vbtuesday" => Value::Integer(3),
        "vbwednesday" => Value::Integer(4),
        "vbthursday" => Value::Integer(5),
        "vbfriday" => Value::Integer(6),
        "vbsaturday" => Value::Integer(7),
        "vbobjecterror" => Value::Integer(-2147221504),
        _ => return None,
    };
    Some(v)
}

/// Functions that inspect their arguments as they are, objects included.
const RAW_ARGUMENTS: &[&str] = &[
    "isobject", "typename", "vartype", "isempty", "isnull", "isarray", "isnumeric", "isdate",
    "array", "lbound", "ubound", "join", "filter",
];

/// Argument `i` unless omitted.
fn opt(args: &[Value], i: usize) -> Option<&Value> {
    match args.get(i) {
        None | Some(Value::Empty) => None,
        Some(v) => Some(v),
    }
}

/// Length argument of `Space` and `String`.
fn repeat_count(key: &str, n: i64) -> Result<usize, EvalError> {
    let n = usize::try_from(n).map_err(|_| EvalError::InvalidProcedureCall(key.to_string()))?;
    if n > MAX_STRING_LEN {
        return Err(EvalError::OutOfMemory);
    }
    Ok(n)
}

/// A `firstdayofweek` argument; 0 means the system default, Sunday.
fn first_day_of_week(key: &str, first: i64) -> Result<i64, EvalError> {
    match first {
        0 => Ok(1),
        1..=7 => Ok(first),
        _ => Err(EvalError::InvalidProcedureCall(key.to_string())),
    }
}

fn int(args: &[Value], i: usize, default: i64) -> Result<i64, EvalError> {
    match opt(args, i) {
        None => Ok(default),
        Some(Value::Null) => Err(EvalError::InvalidUseOfNull),
        Some(v) => v.to_i64(),
    }
}

fn text(args: &[Value], i: usize) -> Result<String, EvalError> {
    match args.get(i) {
        None | Some(Value::Empty) => Ok(String::new()),
        Some(v) => v.to_vb_string(),
    }
}

fn any_null(args: &[Value], upto: usize) -> bool {
    args.iter().take(upto).any(Value::is_null)
}

/// Characters of `s`, folded when comparing as text.
fn fold(s: &str, mode: CompareMode) -> Vec<char> {
    match mode {
        CompareMode::Binary => s.chars().collect(),
        CompareMode::Text => s
            .chars()
            .map(|c| c.to_lowercase().next().unwrap_or(c))
            .collect(),
    }
}

fn find_from(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > hay.len() || from > hay.len() - needle.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()] == *needle)
}

fn rfind_upto(hay: &[char], needle: &[char], last_start: usize) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    let last = last_start.min(hay.len() - needle.len());
    (0..=last).rev().find(|&i| hay[i..i + needle.len()] == *needle)
}

fn date_arg(args: &[Value], i: usize) -> Result<NaiveDateTime, EvalError> {
    args.get(i).cloned().unwrap_or_default().to_date()
}

fn date_part(args: &[Value], f: impl Fn(&NaiveDateTime) -> u32) -> Result<Value, EvalError> {
    check_args("date part", args, 1, 1)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Integer(f(&date_arg(args, 0)?) as i64))
}

fn seconds_since_epoch(dt: &NaiveDateTime) -> i64 {
    dt.signed_duration_since(dates::epoch()).num_seconds()
}

fn add_months(dt: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let m = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        dt.checked_add_months(m)
    } else {
        dt.checked_sub_months(m)
    }
}

fn add_seconds(dt: NaiveDateTime, seconds: i64) -> Option<NaiveDateTime> {
    if seconds.abs() > 1_000_000_000_000 {
        return None;
    }
    dt.checked_add_signed(Duration::seconds(seconds))
}

const DAY_NAMES: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];
const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Two-digit years follow the 1930-2029 window.
fn full_year(y: i64) -> i64 {
    match y {
        0..=29 => 2000 + y,
        30..=99 => 1900 + y,
        _ => y,
    }
}

fn format_number(x: f64, digits: usize, leading: bool, parens: bool, group: bool) -> String {
    let rendered = format!("{:.*}", digits, x.abs());
    let (int_part, frac) = match rendered.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (rendered.clone(), None),
    };
    let mut grouped = String::new();
    let len = int_part.len();
    for (i, c) in int_part.chars().enumerate() {
        if group && i > 0 && (len - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if !leading && grouped == "0" {
        grouped.clear();
    }
    let body = match frac {
        Some(f) => format!("{}.{}", grouped, f),
        None => grouped,
    };
    let negative = x < 0.0 && rendered.chars().any(|c| c.is_ascii_digit() && c != '0');
    match (negative, parens) {
        (true, true) => format!("({})", body),
        (true, false) => format!("-{}", body),
        _ => body,
    }
}

fn escape(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '@' | '*' | '_' | '+' | '-' | '.' | '/' => {
                out.push(c)
            }
            c if (c as u32) < 256 => out.push_str(&format!("%{:02X}", c as u32)),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("%u{:04X}", unit));
                }
            }
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut units: Vec<u16> = Vec::new();
    let mut i = 0;
    let hex = |slice: &[char]| -> Option<u16> {
        let s: String = slice.iter().collect();
        u16::from_str_radix(&s, 16).ok()
    };
    while i < chars.len() {
        if chars[i] == '%' {
            if chars.get(i + 1) == Some(&'u') && i + 6 <= chars.len() {
                if let Some(u) = hex(&chars[i + 2..i + 6]) {
                    units.push(u);
                    i += 6;
                    continue;
                }
            }
            if i + 3 <= chars.len() {
                if let Some(u) = hex(&chars[i + 1..i + 3]) {
                    units.push(u);
                    i += 3;
                    continue;
                }
            }
        }
        let mut buf = [0u16; 2];
        units.extend_from_slice(chars[i].encode_utf16(&mut buf));
        i += 1;
    }
    String::from_utf16_lossy(&units)
}

impl Engine {
    fn compare_arg(&self, v: Option<&Value>) -> Result<CompareMode, EvalError> {
        match v {
            None => Ok(self.ctx.compare_mode),
            Some(v) => match v.to_i64()? {
                0 => Ok(CompareMode::Binary),
                1 => Ok(CompareMode::Text),
                n => Err(EvalError::InvalidProcedureCall(format!("compare mode {}", n))),
            },
        }
    }

    /// Call a built-in function by lower-cased name.
    pub(crate) fn call_builtin(
        &mut self,
        key: &str,
        args: &[Value],
    ) -> Option<Result<Value, EvalError>> {
        let resolved;
        let args = if RAW_ARGUMENTS.contains(&key) || !args.iter().any(|a| matches!(a, Value::Object(_))) {
            args
        } else {
            let scalars: Result<Vec<Value>, EvalError> = args
                .iter()
                .map(|a| match a {
                    Value::Object(_) => self.scalar(a.clone()),
                    other => Ok(other.clone()),
                })
                .collect();
            match scalars {
                Ok(v) => {
                    resolved = v;
                    &resolved[..]
                }
                Err(e) => return Some(Err(e)),
            }
        };
        let result = match key {
            // type inspection
            "isempty" => check_args(key, args, 1, 1).map(|_| Value::Boolean(args[0].is_empty())),
            "isnull" => check_args(key, args, 1, 1).map(|_| Value::Boolean(args[0].is_null())),
            "isnumeric" => check_args(key, args, 1, 1).map(|_| {
                Value::Boolean(match &args[0] {
                    Value::Empty | Value::Boolean(_) | Value::Integer(_) | Value::Float(_) => true,
                    Value::String(s) => parse_numeric(s).is_some(),
                    _ => false,
                })
            }),
            "isarray" => {
                check_args(key, args, 1, 1).map(|_| Value::Boolean(matches!(args[0], Value::Array(_))))
            }
            "isobject" => check_args(key, args, 1, 1).map(|_| Value::Boolean(args[0].is_object())),
            "isdate" => check_args(key, args, 1, 1).map(|_| {
                Value::Boolean(match &args[0] {
                    Value::Date(_) => true,
                    Value::String(s) => dates::parse_date_value(s).is_some(),
                    _ => false,
                })
            }),
            "typename" => check_args(key, args, 1, 1).map(|_| Value::String(args[0].type_name())),
            "vartype" => check_args(key, args, 1, 1).map(|_| Value::Integer(args[0].var_type())),

            // conversion
            "cstr" => check_args(key, args, 1, 1)
                .and_then(|_| args[0].to_vb_string())
                .map(Value::String),
            "cint" => self.convert_int(key, args, i16::MIN as i64, i16::MAX as i64),
            "clng" => self.convert_int(key, args, i32::MIN as i64, i32::MAX as i64),
            "cbyte" => self.convert_int(key, args, 0, 255),
            "cdbl" | "csng" => check_args(key, args, 1, 1).and_then(|_| {
                if args[0].is_null() {
                    return Err(EvalError::InvalidUseOfNull);
                }
                args[0].to_f64().map(Value::Float)
            }),
            "ccur" => check_args(key, args, 1, 1).and_then(|_| {
                let f = args[0].to_f64()?;
                Ok(Value::Float(round_half_even(f * 10_000.0) / 10_000.0))
            }),
            "cbool" => check_args(key, args, 1, 1).and_then(|_| match &args[0] {
                Value::Null => Err(EvalError::InvalidUseOfNull),
                Value::String(s)
                    if !s.eq_ignore_ascii_case("true")
                        && !s.eq_ignore_ascii_case("false")
                        && parse_numeric(s).is_none() =>
                {
                    Err(EvalError::TypeMismatch(format!("\"{}\"", s)))
                }
                v => v.to_bool().map(Value::Boolean),
            }),
            "cdate" | "datevalue" | "timevalue" => check_args(key, args, 1, 1).and_then(|_| {
                let d = args[0].to_date()?;
                Ok(Value::Date(match key {
                    "datevalue" => d.date().and_time(NaiveTime::MIN),
                    "timevalue" => dates::epoch().date().and_time(d.time()),
                    _ => d,
                }))
            }),

            // strings
            "len" => check_args(key, args, 1, 1).and_then(|_| match &args[0] {
                Value::Null => Ok(Value::Null),
                v => Ok(Value::Integer(v.to_vb_string()?.chars().count() as i64)),
            }),
            "left" | "right" => check_args(key, args, 2, 2).and_then(|_| {
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                let s = text(args, 0)?;
                let n = int(args, 1, 0)?;
                if n < 0 {
                    return Err(EvalError::InvalidProcedureCall(key.to_string()));
                }
                let count = s.chars().count();
                let n = (n as usize).min(count);
                Ok(Value::String(if key == "left" {
                    s.chars().take(n).collect()
                } else {
                    s.chars().skip(count - n).collect()
                }))
            }),
            "mid" => check_args(key, args, 2, 3).and_then(|_| {
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                let s = text(args, 0)?;
                let start = int(args, 1, 1)?;
                let len = int(args, 2, i64::MAX)?;
                if start < 1 || len < 0 {
                    return Err(EvalError::InvalidProcedureCall(key.to_string()));
                }
                Ok(Value::String(
                    s.chars().skip(start as usize - 1).take(len as usize).collect(),
                ))
            }),
            "instr" => self.instr(args),
            "instrrev" => self.instr_rev(args),
            "replace" => self.replace(args),
            "trim" | "ltrim" | "rtrim" | "lcase" | "ucase" => {
                check_args(key, args, 1, 1).and_then(|_| {
                    if args[0].is_null() {
                        return Ok(Value::Null);
                    }
                    let s = text(args, 0)?;
                    Ok(Value::String(match key {
                        "trim" => s.trim_matches(' ').to_string(),
                        "ltrim" => s.trim_start_matches(' ').to_string(),
                        "rtrim" => s.trim_end_matches(' ').to_string(),
                        "lcase" => s.to_lowercase(),
                        _ => s.to_uppercase(),
                    }))
                })
            }
            "space" => check_args(key, args, 1, 1).and_then(|_| {
                let n = repeat_count(key, int(args, 0, 0)?)?;
                Ok(Value::String(" ".repeat(n)))
            }),
            "string" => check_args(key, args, 2, 2).and_then(|_| {
                let n = repeat_count(key, int(args, 0, 0)?)?;
                let c = match &args[1] {
                    Value::String(s) => s
                        .chars()
                        .next()
                        .ok_or_else(|| EvalError::InvalidProcedureCall(key.to_string()))?,
                    v => char::from_u32((v.to_i64()? & 0xFF) as u32).unwrap_or(' '),
                };
                Ok(Value::String(c.to_string().repeat(n)))
            }),
            "strreverse" => check_args(key, args, 1, 1)
                .and_then(|_| args[0].to_vb_string())
                .map(|s| Value::String(s.chars().rev().collect())),
            "strcomp" => check_args(key, args, 2, 3).and_then(|_| {
                if any_null(args, 2) {
                    return Ok(Value::Null);
                }
                let mode = self.compare_arg(opt(args, 2))?;
                let ordering = crate::value::compare_strings(&text(args, 0)?, &text(args, 1)?, mode);
                Ok(Value::Integer(ordering as i64))
            }),
            "asc" | "ascw" => check_args(key, args, 1, 1).and_then(|_| {
                let s = text(args, 0)?;
                s.chars()
                    .next()
                    .map(|c| Value::Integer(c as i64))
                    .ok_or_else(|| EvalError::InvalidProcedureCall(key.to_string()))
            }),
            "chr" | "chrw" => check_args(key, args, 1, 1).and_then(|_| {
                let n = int(args, 0, 0)?;
                let max = if key == "chr" { 255 } else { 65535 };
                let n = if key == "chrw" && n < 0 { n + 65536 } else { n };
                if !(0..=max).contains(&n) {
                    return Err(EvalError::InvalidProcedureCall(key.to_string()));
                }
                char::from_u32(n as u32)
                    .map(|c| Value::String(c.to_string()))
                    .ok_or_else(|| EvalError::InvalidProcedureCall(key.to_string()))
            }),
            "split" => self.split(args),
            "join" => check_args(key, args, 1, 2).and_then(|_| {
                let sep = match opt(args, 1) {
                    Some(v) => v.to_vb_string()?,
                    None if args.len() > 1 => String::new(),
                    None => " ".to_string(),
                };
                match &args[0] {
                    Value::Array(array) => {
                        let parts: Vec<String> = array.values().iter().map(|v| v.to_string()).collect();
                        Ok(Value::String(parts.join(&sep)))
                    }
                    v => Err(EvalError::TypeMismatch(v.type_name())),
                }
            }),
            "filter" => self.filter(args),
            "hex" | "oct" => check_args(key, args, 1, 1).and_then(|_| {
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                let n = args[0].to_i64()?;
                let n = if n < 0 && n >= i32::MIN as i64 { (n as i32 as u32) as i64 } else { n };
                Ok(Value::String(if key == "hex" {
                    format!("{:X}", n)
                } else {
                    format!("{:o}", n)
                }))
            }),
            "escape" | "unescape" => check_args(key, args, 1, 1).and_then(|_| {
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                let s = text(args, 0)?;
                Ok(Value::String(if key == "escape" { escape(&s) } else { unescape(&s) }))
            }),

            // math
            "abs" | "int" | "fix" | "sgn" => check_args(key, args, 1, 1).and_then(|_| {
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                match args[0].to_number()? {
                    crate::value::Number::Int(i) => Ok(Value::Integer(match key {
                        "abs" => i.checked_abs().unwrap_or(i64::MAX),
                        "sgn" => i.signum(),
                        _ => i,
                    })),
                    crate::value::Number::Float(f) => Ok(match key {
                        "abs" => Value::Float(f.abs()),
                        "int" => Value::Float(f.floor()),
                        "fix" => Value::Float(f.trunc()),
                        _ => Value::Integer(if f > 0.0 {
                            1
                        } else if f < 0.0 {
                            -1
                        } else {
                            0
                        }),
                    }),
                }
            }),
            "round" => check_args(key, args, 1, 2).and_then(|_| {
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                let places = int(args, 1, 0)?;
                if places < 0 {
                    return Err(EvalError::InvalidProcedureCall(key.to_string()));
                }
                match args[0].to_number()? {
                    crate::value::Number::Int(i) => Ok(Value::Integer(i)),
                    crate::value::Number::Float(f) => {
                        let scale = 10f64.powi(places as i32);
                        Ok(Value::Float(round_half_even(f * scale) / scale))
                    }
                }
            }),
            "sqr" | "log" | "exp" | "sin" | "cos" | "tan" | "atn" => {
                check_args(key, args, 1, 1).and_then(|_| {
                    let x = args[0].to_f64()?;
                    let r = match key {
                        "sqr" if x < 0.0 => return Err(EvalError::InvalidProcedureCall(key.to_string())),
                        "sqr" => x.sqrt(),
                        "log" if x <= 0.0 => return Err(EvalError::InvalidProcedureCall(key.to_string())),
                        "log" => x.ln(),
                        "exp" => x.exp(),
                        "sin" => x.sin(),
                        "cos" => x.cos(),
                        "tan" => x.tan(),
                        _ => x.atan(),
                    };
                    if r.is_finite() {
                        Ok(Value::Float(r))
                    } else {
                        Err(EvalError::Overflow(key.to_string()))
                    }
                })
            }
            "rnd" => check_args(key, args, 0, 1).and_then(|_| {
                let n = match opt(args, 0) {
                    Some(v) => v.to_f64()?,
                    None => 1.0,
                };
                if n < 0.0 {
                    self.ctx.rng = StdRng::seed_from_u64(n.to_bits());
                }
                if n != 0.0 {
                    self.ctx.last_rnd = self.ctx.rng.gen::<f64>();
                }
                Ok(Value::Float(self.ctx.last_rnd))
            }),
            "randomize" => check_args(key, args, 0, 1).and_then(|_| {
                self.ctx.rng = match opt(args, 0) {
                    Some(v) => StdRng::seed_from_u64(v.to_f64()?.to_bits()),
                    None => StdRng::from_entropy(),
                };
                Ok(Value::Empty)
            }),

            // arrays
            "array" => Ok(Value::from(args.to_vec())),
            "lbound" | "ubound" => check_args(key, args, 1, 2).and_then(|_| {
                let dim = int(args, 1, 1)?;
                match &args[0] {
                    Value::Array(array) => {
                        let ub = array.ubound(usize::try_from(dim).unwrap_or(0))?;
                        Ok(Value::Integer(if key == "lbound" { 0 } else { ub }))
                    }
                    v => Err(EvalError::TypeMismatch(v.type_name())),
                }
            }),

            // dates
            "now" => check_args(key, args, 0, 0).map(|_| Value::Date(now())),
            "date" => check_args(key, args, 0, 0).map(|_| Value::Date(now().date().and_time(NaiveTime::MIN))),
            "time" => check_args(key, args, 0, 0).map(|_| Value::Date(dates::epoch().date().and_time(now().time()))),
            "timer" => check_args(key, args, 0, 0).map(|_| {
                let t = Local::now().naive_local().time();
                Value::Float(t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1e9)
            }),
            "year" => date_part(args, |d| d.year() as u32),
            "month" => date_part(args, |d| d.month()),
            "day" => date_part(args, |d| d.day()),
            "hour" => date_part(args, |d| d.hour()),
            "minute" => date_part(args, |d| d.minute()),
            "second" => date_part(args, |d| d.second()),
            "weekday" => check_args(key, args, 1, 2).and_then(|_| {
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                let first = first_day_of_week(key, int(args, 1, 1)?)?;
                let d = date_arg(args, 0)?;
                let from_sunday = d.weekday().num_days_from_sunday() as i64;
                Ok(Value::Integer((from_sunday + 7 - (first - 1)).rem_euclid(7) + 1))
            }),
            "weekdayname" => check_args(key, args, 1, 3).and_then(|_| {
                let n = int(args, 0, 0)?;
                let abbreviate = opt(args, 1).map(Value::to_bool).transpose()?.unwrap_or(false);
                let first = first_day_of_week(key, int(args, 2, 1)?)?;
                if !(1..=7).contains(&n) {
                    return Err(EvalError::InvalidProcedureCall(key.to_string()));
                }
                let name = DAY_NAMES[((n - 1 + first - 1).rem_euclid(7)) as usize];
                Ok(Value::str(if abbreviate { &name[..3] } else { name }))
            }),
            "monthname" => check_args(key, args, 1, 2).and_then(|_| {
                let n = int(args, 0, 0)?;
                let abbreviate = opt(args, 1).map(Value::to_bool).transpose()?.unwrap_or(false);
                if !(1..=12).contains(&n) {
                    return Err(EvalError::InvalidProcedureCall(key.to_string()));
                }
                let name = MONTH_NAMES[(n - 1) as usize];
                Ok(Value::str(if abbreviate { &name[..3] } else { name }))
            }),
            "dateadd" => self.date_add(args),
            "datediff" => self.date_diff(args),
            "datepart" => self.date_part(args),
            "dateserial" => check_args(key, args, 3, 3).and_then(|_| {
                let (y, m, d) = (int(args, 0, 0)?, int(args, 1, 0)?, int(args, 2, 0)?);
                let bad = || EvalError::InvalidProcedureCall(key.to_string());
                let year = i32::try_from(full_year(y)).map_err(|_| bad())?;
                let base = NaiveDate::from_ymd_opt(year, 1, 1)
                    .ok_or_else(bad)?
                    .and_time(NaiveTime::MIN);
                let shifted = add_months(base, m - 1).ok_or_else(bad)?;
                let shifted = add_seconds(shifted, (d - 1) * 86_400).ok_or_else(bad)?;
                Ok(Value::Date(shifted))
            }),
            "timeserial" => check_args(key, args, 3, 3).and_then(|_| {
                let secs = int(args, 0, 0)? * 3600 + int(args, 1, 0)? * 60 + int(args, 2, 0)?;
                add_seconds(dates::epoch(), secs)
                    .map(Value::Date)
                    .ok_or_else(|| EvalError::Overflow(key.to_string()))
            }),
            "formatdatetime" => check_args(key, args, 1, 2).and_then(|_| {
                if args[0].is_null() {
                    return Err(EvalError::InvalidUseOfNull);
                }
                let d = date_arg(args, 0)?;
                Ok(Value::String(match int(args, 1, 0)? {
                    0 => dates::format_date(&d),
                    1 => d.format("%A, %B %-d, %Y").to_string(),
                    2 => d.format("%-m/%-d/%Y").to_string(),
                    3 => dates::format_time(&d),
                    4 => d.format("%H:%M").to_string(),
                    n => return Err(EvalError::InvalidProcedureCall(format!("format {}", n))),
                }))
            }),

            // formatting
            "formatnumber" | "formatcurrency" | "formatpercent" => self.format_numeric(key, args),

            // dynamic code and objects
            "eval" => check_args(key, args, 1, 1).and_then(|_| {
                let source = text(args, 0)?;
                let expr = crate::parser::parse_expression(&source)?;
                self.eval(&expr)
            }),
            "execute" => check_args(key, args, 1, 1)
                .and_then(|_| self.execute(&text(args, 0)?, false)),
            "executeglobal" => check_args(key, args, 1, 1)
                .and_then(|_| self.execute(&text(args, 0)?, true)),
            "createobject" => check_args(key, args, 1, 2).and_then(|_| {
                let progid = text(args, 0)?;
                self.registry.create(&progid).map(Value::Object)
            }),
            "scriptengine" => Ok(Value::str("VBScript")),
            "scriptenginemajorversion" => Ok(Value::Integer(5)),
            "scriptengineminorversion" => Ok(Value::Integer(8)),
            "scriptenginebuildversion" => Ok(Value::Integer(18702)),
            _ => return None,
        };
        Some(result)
    }

    fn convert_int(&self, key: &str, args: &[Value], min: i64, max: i64) -> Result<Value, EvalError> {
        check_args(key, args, 1, 1)?;
        if args[0].is_null() {
            return Err(EvalError::InvalidUseOfNull);
        }
        let f = args[0].to_f64()?;
        let r = round_half_even(f);
        if r < min as f64 || r > max as f64 {
            return Err(EvalError::Overflow(key.to_string()));
        }
        Ok(Value::Integer(r as i64))
    }

    fn instr(&self, args: &[Value]) -> Result<Value, EvalError> {
        check_args("InStr", args, 2, 4)?;
        let (start, rest) = if args.len() >= 3 {
            (int(args, 0, 1)?, &args[1..])
        } else {
            (1, args)
        };
        if start < 1 {
            return Err(EvalError::InvalidProcedureCall("InStr".to_string()));
        }
        if any_null(rest, 2) {
            return Ok(Value::Null);
        }
        let mode = self.compare_arg(opt(rest, 2))?;
        let hay = fold(&text(rest, 0)?, mode);
        let needle = fold(&text(rest, 1)?, mode);
        let from = start as usize - 1;
        if from > hay.len() {
            return Ok(Value::Integer(0));
        }
        if needle.is_empty() {
            return Ok(Value::Integer(start));
        }
        Ok(Value::Integer(
            find_from(&hay, &needle, from).map_or(0, |i| i as i64 + 1),
        ))
    }

    fn instr_rev(&self, args: &[Value]) -> Result<Value, EvalError> {
        check_args("InStrRev", args, 2, 4)?;
        if any_null(args, 2) {
            return Ok(Value::Null);
        }
        let mode = self.compare_arg(opt(args, 3))?;
        let hay = fold(&text(args, 0)?, mode);
        let needle = fold(&text(args, 1)?, mode);
        let start = int(args, 2, -1)?;
        if start == 0 || start < -1 {
            return Err(EvalError::InvalidProcedureCall("InStrRev".to_string()));
        }
        let start = if start == -1 { hay.len() as i64 } else { start };
        if needle.is_empty() {
            return Ok(Value::Integer(start.min(hay.len() as i64)));
        }
        if start < needle.len() as i64 {
            return Ok(Value::Integer(0));
        }
        let last_start = (start as usize).saturating_sub(needle.len());
        Ok(Value::Integer(
            rfind_upto(&hay, &needle, last_start).map_or(0, |i| i as i64 + 1),
        ))
    }

    fn replace(&self, args: &[Value]) -> Result<Value, EvalError> {
        check_args("Replace", args, 3, 6)?;
        if any_null(args, 3) {
            return Ok(Value::Null);
        }
        let source = text(args, 0)?;
        let find = text(args, 1)?;
        let replacement = text(args, 2)?;
        let start = int(args, 3, 1)?;
        let count = int(args, 4, -1)?;
        if start < 1 || count < -1 {
            return Err(EvalError::InvalidProcedureCall("Replace".to_string()));
        }
        let mode = self.compare_arg(opt(args, 5))?;

        let original: Vec<char> = source.chars().skip(start as usize - 1).collect();
        let hay = fold(&original.iter().collect::<String>(), mode);
        let needle = fold(&find, mode);
        if needle.is_empty() || count == 0 {
            return Ok(Value::String(original.into_iter().collect()));
        }
        let mut out = String::new();
        let mut pos = 0;
        let mut done = 0;
        while let Some(i) = find_from(&hay, &needle, pos) {
            if count != -1 && done >= count {
                break;
            }
            out.extend(&original[pos..i]);
            out.push_str(&replacement);
            pos = i + needle.len();
            done += 1;
        }
        out.extend(&original[pos..]);
        Ok(Value::String(out))
    }

    fn split(&self, args: &[Value]) -> Result<Value, EvalError> {
        check_args("Split", args, 1, 4)?;
        if args[0].is_null() {
            return Err(EvalError::InvalidUseOfNull);
        }
        let source = text(args, 0)?;
        let delimiter = match opt(args, 1) {
            Some(v) => v.to_vb_string()?,
            None => " ".to_string(),
        };
        let limit = int(args, 2, -1)?;
        let mode = self.compare_arg(opt(args, 3))?;
        if source.is_empty() || limit == 0 {
            return Ok(Value::Array(VbArray::from_values(Vec::new())));
        }
        if delimiter.is_empty() {
            return Ok(Value::from(vec![Value::String(source)]));
        }
        let original: Vec<char> = source.chars().collect();
        let hay = fold(&source, mode);
        let needle = fold(&delimiter, mode);
        let mut parts = Vec::new();
        let mut pos = 0;
        while let Some(i) = find_from(&hay, &needle, pos) {
            if limit != -1 && parts.len() as i64 >= limit - 1 {
                break;
            }
            parts.push(Value::String(original[pos..i].iter().collect()));
            pos = i + needle.len();
        }
        parts.push(Value::String(original[pos..].iter().collect()));
        Ok(Value::from(parts))
    }

    fn filter(&self, args: &[Value]) -> Result<Value, EvalError> {
        check_args("Filter", args, 2, 4)?;
        let Value::Array(array) = &args[0] else {
            return Err(EvalError::TypeMismatch(args[0].type_name()));
        };
        let wanted = text(args, 1)?;
        let include = match opt(args, 2) {
            Some(v) => v.to_bool()?,
            None => true,
        };
        let mode = self.compare_arg(opt(args, 3))?;
        let needle = fold(&wanted, mode);
        let mut kept = Vec::new();
        for item in array.values() {
            let s = item.to_vb_string()?;
            let found = needle.is_empty() || find_from(&fold(&s, mode), &needle, 0).is_some();
            if found == include {
                kept.push(Value::String(s));
            }
        }
        Ok(Value::Array(VbArray::from_values(kept)))
    }

    fn date_add(&self, args: &[Value]) -> Result<Value, EvalError> {
        check_args("DateAdd", args, 3, 3)?;
        let interval = text(args, 0)?.to_ascii_lowercase();
        let n = args[1].to_i64()?;
        let d = date_arg(args, 2)?;
        let shifted = match interval.as_str() {
            "yyyy" => add_months(d, n.saturating_mul(12)),
            "q" => add_months(d, n.saturating_mul(3)),
            "m" => add_months(d, n),
            "y" | "d" | "w" => add_seconds(d, n.saturating_mul(86_400)),
            "ww" => add_seconds(d, n.saturating_mul(7 * 86_400)),
            "h" => add_seconds(d, n.saturating_mul(3600)),
            "n" => add_seconds(d, n.saturating_mul(60)),
            "s" => add_seconds(d, n),
            _ => return Err(EvalError::InvalidProcedureCall(format!("interval {}", interval))),
        };
        shifted
            .map(Value::Date)
            .ok_or_else(|| EvalError::Overflow("DateAdd".to_string()))
    }

    fn date_diff(&self, args: &[Value]) -> Result<Value, EvalError> {
        check_args("DateDiff", args, 3, 5)?;
        let interval = text(args, 0)?.to_ascii_lowercase();
        let a = date_arg(args, 1)?;
        let b = date_arg(args, 2)?;
        let months = |d: &NaiveDateTime| d.year() as i64 * 12 + d.month0() as i64;
        let days = |d: &NaiveDateTime| d.date().signed_duration_since(dates::epoch().date()).num_days();
        let boundaries = |unit: i64| {
            seconds_since_epoch(&b).div_euclid(unit) - seconds_since_epoch(&a).div_euclid(unit)
        };
        let diff = match interval.as_str() {
            "yyyy" => (b.year() - a.year()) as i64,
            "q" => (b.year() as i64 * 4 + b.month0() as i64 / 3) - (a.year() as i64 * 4 + a.month0() as i64 / 3),
            "m" => months(&b) - months(&a),
            "y" | "d" => days(&b) - days(&a),
            "w" => (days(&b) - days(&a)) / 7,
            // 1899-12-30 was a Saturday, so +1 aligns weeks to Sunday.
            "ww" => (days(&b) + 1).div_euclid(7) - (days(&a) + 1).div_euclid(7),
            "h" => boundaries(3600),
            "n" => boundaries(60),
            "s" => boundaries(1),
            _ => return Err(EvalError::InvalidProcedureCall(format!("interval {}", interval))),
        };
        Ok(Value::Integer(diff))
    }

    fn date_part(&self, args: &[Value]) -> Result<Value, EvalError> {
        check_args("DatePart", args, 2, 4)?;
        let interval = text(args, 0)?.to_ascii_lowercase();
        let d = date_arg(args, 1)?;
        let part = match interval.as_str() {
            "yyyy" => d.year() as i64,
            "q" => d.month0() as i64 / 3 + 1,
            "m" => d.month() as i64,
            "y" => d.ordinal() as i64,
            "d" => d.day() as i64,
            "w" => d.weekday().num_days_from_sunday() as i64 + 1,
            "ww" => {
                let jan1 = NaiveDate::from_ymd_opt(d.year(), 1, 1)
                    .map(|j| j.weekday().num_days_from_sunday() as i64)
                    .unwrap_or(0);
                (d.ordinal0() as i64 + jan1) / 7 + 1
            }
            "h" => d.hour() as i64,
            "n" => d.minute() as i64,
            "s" => d.second() as i64,
            _ => return Err(EvalError::InvalidProcedureCall(format!("interval {}", interval))),
        };
        Ok(Value::Integer(part))
    }

    fn format_numeric(&self, key: &str, args: &[Value]) -> Result<Value, EvalError> {
        check_args(key, args, 1, 5)?;
        if args[0].is_null() {
            return Err(EvalError::InvalidUseOfNull);
        }
        let mut x = args[0].to_f64()?;
        let digits = match int(args, 1, -1)? {
            -1 => 2,
            n if n < 0 => return Err(EvalError::InvalidProcedureCall(key.to_string())),
            n => n as usize,
        };
        // Tristate: -1 true, 0 false, -2 use default
        let flag = |i: usize, default: bool| -> Result<bool, EvalError> {
            Ok(match int(args, i, -2)? {
                -2 => default,
                0 => false,
                _ => true,
            })
        };
        let leading = flag(2, true)?;
        let parens = flag(3, false)?;
        let group = flag(4, true)?;
        if key == "formatpercent" {
            x *= 100.0;
        }
        let body = format_number(x, digits, leading, parens, group);
        Ok(Value::String(match key {
            "formatcurrency" => match body.strip_prefix('-') {
                Some(rest) => format!("-${}", rest),
                None => match body.strip_prefix('(') {
                    Some(rest) => format!("(${}", rest),
                    None => format!("${}", body),
                },
            },
            "formatpercent" => format!("{}%", body),
            _ => body,
        }))
    }

    /// `Execute` / `ExecuteGlobal`: run statements in the current (or the
    /// global) scope. Procedures and classes always become global.
    pub(crate) fn execute(&mut self, source: &str, global: bool) -> Result<Value, EvalError> {
        let program = crate::parser::parse(source)?;
        let saved = if global {
            Some(std::mem::take(&mut self.ctx.calls))
        } else {
            None
        };
        let mut seen = HashSet::new();
        let result = self
            .hoist(&program.body, &mut seen)
            .and_then(|_| self.exec_block(&program.body));
        if let Some(calls) = saved {
            self.ctx.calls = calls;
        }
        result.map(|_| Value::Empty)
    }
}

fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_grouping() {
        assert_eq!(format_number(1234567.891, 2, true, false, true), "1,234,567.89");
        assert_eq!(format_number(-0.5, 1, false, false, true), "-.5");
        assert_eq!(format_number(-12.0, 0, true, true, true), "(12)");
        assert_eq!(format_number(-0.001, 2, true, false, true), "0.00");
    }

    #[test]
    fn test_escape_round_trip_examples() {
        assert_eq!(escape("a b&c"), "a%20b%26c");
        assert_eq!(escape("\u{263A}"), "%u263A");
        assert_eq!(unescape("a%20b%u263A"), "a b\u{263A}");
    }

    #[test]
    fn test_find_helpers() {
        let hay: Vec<char> = "abcabc".chars().collect();
        let needle: Vec<char> = "bc".chars().collect();
        assert_eq!(find_from(&hay, &needle, 0), Some(1));
        assert_eq!(find_from(&hay, &needle, 2), Some(4));
        assert_eq!(find_from(&hay, &needle, 5), None);
        assert_eq!(rfind_upto(&hay, &needle, 6), Some(4));
        assert_eq!(rfind_upto(&hay, &needle, 3), Some(1));
    }

    #[test]
    fn test_constants() {
        assert!(matches!(constant("vbcrlf"), Some(Value::String(s)) if s == "\r\n"));
        assert!(constant("vbnothing").is_none());
    }
}
