//! Dynamically-typed config/parameter tree (§3, §4.A).
//!
//! A `Value` is a tagged sum over null, bool, signed/unsigned 64-bit
//! integers, a 64-bit real, a string, an ordered array, and an
//! insertion-ordered map (duplicate keys rejected). Values handed to the
//! graph runtime are frozen and become immutable; the freeze is shallow at
//! the API level but `copy()`/`equals()` always recurse.

use crate::error::ErrorKind;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("map already contains key '{0}'")]
    DuplicateKey(String),

    #[error("value is frozen and cannot be mutated")]
    Frozen,

    #[error("malformed parameter string at byte {pos}: {reason}")]
    Parse { pos: usize, reason: String },

    #[error("expected a {expected} value, found {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateKey(_) => ErrorKind::AlreadyExists,
            Error::Frozen => ErrorKind::InvalidState,
            Error::Parse { .. } => ErrorKind::InvalidArgument,
            Error::WrongKind { .. } => ErrorKind::InvalidArgument,
        }
    }
}

/// An insertion-ordered `string -> Value` map that rejects duplicate keys
/// on insert but allows `extend` to overwrite (§4.A).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueMap {
    entries: Vec<(String, Value)>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, val: Value) -> Result<(), Error> {
        let key = key.into();
        if self.entries.iter().any(|(k, _)| *k == key) {
            return Err(Error::DuplicateKey(key));
        }
        self.entries.push((key, val));
        Ok(())
    }

    /// Keys present in `other` overwrite this map's values; new keys are
    /// appended preserving `other`'s order.
    pub fn extend(&mut self, other: &ValueMap) {
        for (k, v) in &other.entries {
            if let Some(slot) = self.entries.iter_mut().find(|(ek, _)| ek == k) {
                slot.1 = v.clone();
            } else {
                self.entries.push((k.clone(), v.clone()));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Order-insensitive comparison by key set: two maps are equal if they
    /// have the same keys, each mapping to equal values, regardless of
    /// insertion order.
    fn equals(&self, other: &ValueMap) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries
            .iter()
            .all(|(k, v)| other.get(k).map(|ov| ov.equals(v)).unwrap_or(false))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    SignedInteger(i64),
    UnsignedInteger(u64),
    Real(f64),
    String(String),
    Array(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    pub fn null() -> Self {
        Value::Null
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn s64(x: i64) -> Self {
        Value::SignedInteger(x)
    }

    pub fn u64(x: u64) -> Self {
        Value::UnsignedInteger(x)
    }

    pub fn f64(x: f64) -> Self {
        Value::Real(x)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn array() -> Self {
        Value::Array(Vec::new())
    }

    pub fn map() -> Self {
        Value::Map(ValueMap::new())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::SignedInteger(_) => "signed-integer",
            Value::UnsignedInteger(_) => "unsigned-integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Value>, Error> {
        match self {
            Value::Array(a) => Ok(a),
            other => Err(Error::WrongKind {
                expected: "array",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_map_mut(&mut self) -> Result<&mut ValueMap, Error> {
        match self {
            Value::Map(m) => Ok(m),
            other => Err(Error::WrongKind {
                expected: "map",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_map(&self) -> Result<&ValueMap, Error> {
        match self {
            Value::Map(m) => Ok(m),
            other => Err(Error::WrongKind {
                expected: "map",
                found: other.kind_name(),
            }),
        }
    }

    /// Append to an array value in place (§4.A `array.append`).
    pub fn append(&mut self, v: Value) -> Result<(), Error> {
        self.as_array_mut()?.push(v);
        Ok(())
    }

    /// Insert into a map value in place (§4.A `map.insert`), failing on a
    /// duplicate key.
    pub fn insert(&mut self, key: impl Into<String>, v: Value) -> Result<(), Error> {
        self.as_map_mut()?.insert(key, v)
    }

    /// Deep copy. Frozenness is not a property of `Value` itself (only of
    /// field types, §4.B) so this is a plain structural clone.
    pub fn copy(&self) -> Value {
        self.clone()
    }

    /// Deep, order-sensitive-for-arrays / key-set-for-maps equality
    /// (§4.A).
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::SignedInteger(a), Value::SignedInteger(b)) => a == b,
            (Value::UnsignedInteger(a), Value::UnsignedInteger(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => a.equals(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::SignedInteger(x) => write!(f, "{x}"),
            Value::UnsignedInteger(x) => write!(f, "{x}"),
            Value::Real(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Parses the compact `k=v,k=v` component-parameter grammar (§4.A):
/// quoted strings, `[…]` arrays, `{…}` maps, `null`, `true`/`false`,
/// integers with an optional `0b`/`0`/`0x` base prefix and `+`/`-` sign,
/// and doubles.
pub fn parse_params(input: &str) -> Result<ValueMap, Error> {
    let mut p = Parser::new(input);
    let map = p.parse_top_level_map()?;
    p.skip_ws();
    if !p.is_at_end() {
        return Err(p.err("trailing input after parameter list"));
    }
    Ok(map)
}

/// Parses a single value in the same grammar (used recursively for array
/// and map elements, and exposed for standalone value literals).
pub fn parse_value(input: &str) -> Result<Value, Error> {
    let mut p = Parser::new(input);
    let v = p.parse_value()?;
    p.skip_ws();
    if !p.is_at_end() {
        return Err(p.err("trailing input after value"));
    }
    Ok(v)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn err(&self, reason: impl Into<String>) -> Error {
        Error::Parse {
            pos: self.pos,
            reason: reason.into(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: u8) -> Result<(), Error> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}'", c as char)))
        }
    }

    /// Top-level input has no surrounding braces: `a=1,b=2`.
    fn parse_top_level_map(&mut self) -> Result<ValueMap, Error> {
        let mut map = ValueMap::new();
        self.skip_ws();
        if self.is_at_end() {
            return Ok(map);
        }
        loop {
            self.skip_ws();
            let key = self.parse_ident()?;
            self.skip_ws();
            self.expect(b'=')?;
            self.skip_ws();
            let val = self.parse_value()?;
            map.insert(key, val).map_err(|_| {
                self.err("duplicate parameter key")
            })?;
            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            break;
        }
        Ok(map)
    }

    fn parse_ident(&mut self) -> Result<String, Error> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b'.' || c == b':')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("expected an identifier"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_value(&mut self) -> Result<Value, Error> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => self.parse_string(),
            Some(b'[') => self.parse_array(),
            Some(b'{') => self.parse_map(),
            Some(c) if c.is_ascii_digit() || c == b'+' || c == b'-' => self.parse_number(),
            Some(_) => self.parse_keyword_or_bare_string(),
            None => Err(self.err("unexpected end of input while parsing a value")),
        }
    }

    fn parse_string(&mut self) -> Result<Value, Error> {
        self.expect(b'"')?;
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => s.push('\n'),
                    Some(b't') => s.push('\t'),
                    Some(b'"') => s.push('"'),
                    Some(b'\\') => s.push('\\'),
                    Some(c) => s.push(c as char),
                    None => return Err(self.err("unterminated escape in string")),
                },
                Some(c) => s.push(c as char),
                None => return Err(self.err("unterminated string literal")),
            }
        }
        Ok(Value::String(s))
    }

    fn parse_array(&mut self) -> Result<Value, Error> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.eat(b']') {
            return Ok(Value::Array(items));
        }
        loop {
            let v = self.parse_value()?;
            items.push(v);
            self.skip_ws();
            if self.eat(b',') {
                self.skip_ws();
                continue;
            }
            break;
        }
        self.skip_ws();
        self.expect(b']')?;
        Ok(Value::Array(items))
    }

    fn parse_map(&mut self) -> Result<Value, Error> {
        self.expect(b'{')?;
        let mut map = ValueMap::new();
        self.skip_ws();
        if self.eat(b'}') {
            return Ok(Value::Map(map));
        }
        loop {
            self.skip_ws();
            let key = self.parse_ident()?;
            self.skip_ws();
            self.expect(b'=')?;
            self.skip_ws();
            let val = self.parse_value()?;
            map.insert(key, val)
                .map_err(|_| self.err("duplicate key in map literal"))?;
            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            break;
        }
        self.skip_ws();
        self.expect(b'}')?;
        Ok(Value::Map(map))
    }

    fn parse_keyword_or_bare_string(&mut self) -> Result<Value, Error> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("unexpected character"));
        }
        let word = &self.src[start..self.pos];
        Ok(match word {
            "null" => Value::Null,
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::String(other.to_string()),
        })
    }

    fn parse_number(&mut self) -> Result<Value, Error> {
        let start = self.pos;
        let negative = self.eat(b'-');
        if !negative {
            self.eat(b'+');
        }
        let digits_start = self.pos;

        // Base-prefixed integer: 0b.., 0x.., 0<octal>
        if self.peek() == Some(b'0') {
            let after_zero = self.pos + 1;
            match self.bytes.get(after_zero) {
                Some(b'b') | Some(b'B') => {
                    self.pos = after_zero + 1;
                    return self.parse_radix_int(2, negative);
                }
                Some(b'x') | Some(b'X') => {
                    self.pos = after_zero + 1;
                    return self.parse_radix_int(16, negative);
                }
                Some(c) if c.is_ascii_digit() => {
                    self.pos = after_zero;
                    return self.parse_radix_int(8, negative);
                }
                _ => {}
            }
        }

        let mut is_real = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == b'.' && !is_real {
                is_real = true;
                self.pos += 1;
            } else if (c == b'e' || c == b'E') && !is_real {
                is_real = true;
                self.pos += 1;
                if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
        if self.pos == digits_start {
            return Err(self.err("expected a number"));
        }
        let text = &self.src[start..self.pos];
        if is_real {
            let f: f64 = text
                .parse()
                .map_err(|_| self.err("malformed real literal"))?;
            Ok(Value::Real(f))
        } else if negative {
            let n: i64 = text
                .parse()
                .map_err(|_| self.err("malformed signed integer literal"))?;
            Ok(Value::SignedInteger(n))
        } else {
            let n: u64 = text
                .trim_start_matches('+')
                .parse()
                .map_err(|_| self.err("malformed unsigned integer literal"))?;
            Ok(Value::UnsignedInteger(n))
        }
    }

    fn parse_radix_int(&mut self, radix: u32, negative: bool) -> Result<Value, Error> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if (c as char).is_digit(radix)) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("expected digits after base prefix"));
        }
        let text = &self.src[start..self.pos];
        if negative {
            let n = i64::from_str_radix(text, radix)
                .map_err(|_| self.err("malformed radix-prefixed signed integer"))?;
            Ok(Value::SignedInteger(-n))
        } else {
            let n = u64::from_str_radix(text, radix)
                .map_err(|_| self.err("malformed radix-prefixed unsigned integer"))?;
            Ok(Value::UnsignedInteger(n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_constructors_and_equality() {
        assert!(Value::s64(-3).equals(&Value::s64(-3)));
        assert!(!Value::s64(-3).equals(&Value::u64(3)));
        assert!(Value::null().equals(&Value::null()));
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut v = Value::array();
        v.append(Value::u64(1)).unwrap();
        let copy = v.copy();
        v.append(Value::u64(2)).unwrap();
        assert!(!v.equals(&copy));
    }

    #[test]
    fn map_insert_rejects_duplicates() {
        let mut m = ValueMap::new();
        m.insert("a", Value::u64(1)).unwrap();
        assert!(matches!(
            m.insert("a", Value::u64(2)),
            Err(Error::DuplicateKey(_))
        ));
    }

    #[test]
    fn map_extend_overwrites_from_other() {
        let mut a = ValueMap::new();
        a.insert("x", Value::u64(1)).unwrap();
        a.insert("y", Value::u64(2)).unwrap();
        let mut b = ValueMap::new();
        b.insert("x", Value::u64(99)).unwrap();
        b.insert("z", Value::u64(3)).unwrap();
        a.extend(&b);
        assert_eq!(a.get("x"), Some(&Value::u64(99)));
        assert_eq!(a.get("y"), Some(&Value::u64(2)));
        assert_eq!(a.get("z"), Some(&Value::u64(3)));
    }

    #[test]
    fn maps_equal_regardless_of_insertion_order() {
        let mut a = ValueMap::new();
        a.insert("x", Value::u64(1)).unwrap();
        a.insert("y", Value::u64(2)).unwrap();
        let mut b = ValueMap::new();
        b.insert("y", Value::u64(2)).unwrap();
        b.insert("x", Value::u64(1)).unwrap();
        assert!(Value::Map(a).equals(&Value::Map(b)));
    }

    #[test]
    fn arrays_are_order_sensitive() {
        let a = Value::Array(vec![Value::u64(1), Value::u64(2)]);
        let b = Value::Array(vec![Value::u64(2), Value::u64(1)]);
        assert!(!a.equals(&b));
    }

    #[test]
    fn parse_basic_params() {
        let map = parse_params("inputs=[\"/a\",\"/b\"],trace-name=\"foo\",offset=-5,count=0x1F,ok=true,nothing=null")
            .unwrap();
        assert_eq!(
            map.get("inputs"),
            Some(&Value::Array(vec![
                Value::string("/a"),
                Value::string("/b")
            ]))
        );
        assert_eq!(map.get("trace-name"), Some(&Value::string("foo")));
        assert_eq!(map.get("offset"), Some(&Value::s64(-5)));
        assert_eq!(map.get("count"), Some(&Value::u64(0x1F)));
        assert_eq!(map.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(map.get("nothing"), Some(&Value::Null));
    }

    #[test]
    fn parse_nested_map_value() {
        let map = parse_params("clock={frequency=1000000000,offset-s=0}").unwrap();
        let clock = map.get("clock").unwrap().as_map().unwrap();
        assert_eq!(clock.get("frequency"), Some(&Value::u64(1_000_000_000)));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(parse_params("a=").is_err());
        assert!(parse_params("=1").is_err());
        assert!(parse_params("a=1,").is_err());
        assert!(parse_value("0x").is_err());
    }

    #[test]
    fn parse_binary_and_octal_prefixes() {
        assert_eq!(parse_value("0b101").unwrap(), Value::u64(5));
        assert_eq!(parse_value("010").unwrap(), Value::u64(8));
    }

    #[test]
    fn parse_real_numbers() {
        assert_eq!(parse_value("3.5").unwrap(), Value::f64(3.5));
        assert_eq!(parse_value("-1.5e2").unwrap(), Value::f64(-150.0));
    }
}
