use serde::{Deserialize, Serialize};
use tabula_base::{schema_err, Error, Result};
use crate::Value;

// A printf-flavoured display format for one column. Supported
// conversions are %d %s %r %f %e with optional width and precision, plus
// a trailing `m` after %f that renders a value in seconds as minutes
// (retention times are stored in seconds but read in minutes). Literal
// text before and after the conversion is kept.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Format {
    text: String,
    prefix_end: usize,
    suffix_start: usize,
    width: Option<usize>,
    precision: Option<usize>,
    conv: Conv,
    minutes: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
enum Conv {
    Int,
    Str,
    Repr,
    Fixed,
    Exp,
}

fn parse_digits(bytes: &[u8], pos: &mut usize) -> Option<usize> {
    let start = *pos;
    while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
        *pos += 1;
    }
    std::str::from_utf8(&bytes[start..*pos]).ok()?.parse().ok()
}

impl Format {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let bytes = text.as_bytes();
        let Some(prefix_end) = memchr::memchr(b'%', bytes) else {
            return Err(schema_err(format!("format {text:?} has no conversion")));
        };
        let mut pos = prefix_end + 1;
        let width = parse_digits(bytes, &mut pos);
        let mut precision = None;
        if bytes.get(pos) == Some(&b'.') {
            pos += 1;
            precision = parse_digits(bytes, &mut pos);
            if precision.is_none() {
                return Err(schema_err(format!("format {text:?} has an empty precision")));
            }
        }
        let conv = match bytes.get(pos) {
            Some(b'd') => Conv::Int,
            Some(b's') => Conv::Str,
            Some(b'r') => Conv::Repr,
            Some(b'f') => Conv::Fixed,
            Some(b'e') => Conv::Exp,
            _ => return Err(schema_err(format!("format {text:?} has an unknown conversion"))),
        };
        pos += 1;
        let minutes = conv == Conv::Fixed && bytes.get(pos) == Some(&b'm');
        if minutes {
            pos += 1;
        }
        if memchr::memchr(b'%', &bytes[pos..]).is_some() {
            return Err(schema_err(format!("format {text:?} has more than one conversion")));
        }
        Ok(Format {
            prefix_end,
            suffix_start: pos,
            width,
            precision,
            conv,
            minutes,
            text,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn render(&self, val: &Value) -> String {
        let body = match val {
            Value::Null => "-".to_string(),
            _ => self.render_body(val),
        };
        let body = match self.width {
            Some(w) => format!("{body:>w$}"),
            None => body,
        };
        let mut out = String::with_capacity(self.text.len() + body.len());
        out.push_str(&self.text[..self.prefix_end]);
        out.push_str(&body);
        if self.minutes {
            out.push('m');
        }
        out.push_str(&self.text[self.suffix_start..]);
        out
    }

    fn render_body(&self, val: &Value) -> String {
        match (self.conv, val) {
            (Conv::Int, v) if v.is_numeric() => match v.as_i64() {
                Some(i) => i.to_string(),
                None => format!("{:.0}", v.as_f64().unwrap_or(f64::NAN)),
            },
            (Conv::Fixed, v) if v.is_numeric() => {
                let mut x = v.as_f64().unwrap_or(f64::NAN);
                if self.minutes {
                    x /= 60.0;
                }
                let p = self.precision.unwrap_or(6);
                format!("{x:.p$}")
            }
            (Conv::Exp, v) if v.is_numeric() => {
                let x = v.as_f64().unwrap_or(f64::NAN);
                let p = self.precision.unwrap_or(6);
                format!("{x:.p$e}")
            }
            (Conv::Repr, Value::Str(s)) => format!("{s:?}"),
            (Conv::Str, Value::Str(s)) => match self.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            },
            (_, v) => v.to_string(),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = Error;
    fn try_from(s: String) -> Result<Self> {
        Format::new(s)
    }
}

impl TryFrom<&str> for Format {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self> {
        Format::new(s)
    }
}

impl From<Format> for String {
    fn from(f: Format) -> String {
        f.text
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
