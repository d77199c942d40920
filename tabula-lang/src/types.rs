use serde::{Deserialize, Serialize};
use crate::Value;

// The closed set of cell types a column can have. The first three are
// "primitive": they fit in one 8-byte word and live inline in a stored
// row. Everything else is stored out of line through a per-type store
// and referenced by an object id.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Bool,
    Int,
    Float,
    Str,
    Object,
    TimeSeries,
    PeakMap,
}

impl TypeTag {
    pub const ALL: [TypeTag; 7] = [
        TypeTag::Bool,
        TypeTag::Int,
        TypeTag::Float,
        TypeTag::Str,
        TypeTag::Object,
        TypeTag::TimeSeries,
        TypeTag::PeakMap,
    ];

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeTag::Bool | TypeTag::Int | TypeTag::Float)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_primitive()
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::Object => "object",
            TypeTag::TimeSeries => "timeseries",
            TypeTag::PeakMap => "peakmap",
        }
    }

    pub fn from_name(name: &str) -> Option<TypeTag> {
        TypeTag::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn of(val: &Value) -> Option<TypeTag> {
        match val {
            Value::Null => None,
            Value::Bool(_) => Some(TypeTag::Bool),
            Value::Int(_) => Some(TypeTag::Int),
            Value::Float(_) => Some(TypeTag::Float),
            Value::Str(_) => Some(TypeTag::Str),
            Value::Object(_) => Some(TypeTag::Object),
            Value::TimeSeries(_) => Some(TypeTag::TimeSeries),
            Value::PeakMap(_) => Some(TypeTag::PeakMap),
        }
    }

    // Null fits anywhere; ints widen into float columns.
    pub fn accepts(&self, val: &Value) -> bool {
        match TypeTag::of(val) {
            None => true,
            Some(t) if t == *self => true,
            Some(TypeTag::Int) | Some(TypeTag::Bool) => *self == TypeTag::Float,
            _ => false,
        }
    }

    // Converts an accepted value to this column type's own representation.
    pub fn conform(&self, val: Value) -> Value {
        match (self, val) {
            (TypeTag::Float, Value::Int(i)) => Value::Float(i as f64),
            (TypeTag::Float, Value::Bool(b)) => Value::Float(if b { 1.0 } else { 0.0 }),
            (_, v) => v,
        }
    }

    // Result type of arithmetic on two numeric operands.
    pub fn promote_numeric(a: TypeTag, b: TypeTag) -> Option<TypeTag> {
        match (a, b) {
            (TypeTag::Float, x) | (x, TypeTag::Float) if x.is_numeric() => Some(TypeTag::Float),
            (TypeTag::Int | TypeTag::Bool, TypeTag::Int | TypeTag::Bool) => Some(TypeTag::Int),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
