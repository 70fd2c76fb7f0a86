use crate::cell::CellRef;
use crate::message::Blob;

/// A heterogeneous value as it crosses cell boundaries.
///
/// `Int` and `Num` are distinct variants: integers are width-packed on the
/// wire (0/1/2/4 bytes by magnitude) while `Num` always travels as an 8-byte
/// float, and each decodes back to its own variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  Nil,
  Bool(bool),
  Int(i32),
  Num(f64),
  /// A pointer-sized opaque payload. Only meaningful within the process that
  /// produced it.
  Opaque(u64),
  Str(Blob),
  Table(Table),
  /// A counted reference to another cell. Cloning grabs the target; dropping
  /// releases it.
  Cell(CellRef),
}

impl Value {
  /// Convenience constructor for string values.
  pub fn str(s: impl Into<Blob>) -> Self {
    Value::Str(s.into())
  }

  pub fn is_nil(&self) -> bool {
    matches!(self, Value::Nil)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i32> for Value {
  fn from(i: i32) -> Self {
    Value::Int(i)
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Value::Num(n)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Str(Blob::from(s))
  }
}

impl From<CellRef> for Value {
  fn from(r: CellRef) -> Self {
    Value::Cell(r)
  }
}

impl From<Table> for Value {
  fn from(t: Table) -> Self {
    Value::Table(t)
  }
}

/// An ordered-plus-associative container.
///
/// `seq` is the run-length-prefixed sequential portion; `hash` holds the
/// remaining key/value pairs in insertion order. Keys are plain values, so
/// no hashing constraint is imposed on `f64` keys; lookups are linear and
/// the container is intended as a transport shape, not a map implementation.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Table {
  pub seq: Vec<Value>,
  pub hash: Vec<(Value, Value)>,
}

impl Table {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds a purely sequential table.
  pub fn from_seq(seq: Vec<Value>) -> Self {
    Self { seq, hash: Vec::new() }
  }

  /// Appends a non-sequential entry.
  pub fn insert(&mut self, key: Value, value: Value) {
    self.hash.push((key, value));
  }

  /// Total number of entries, sequential and associative.
  pub fn len(&self) -> usize {
    self.seq.len() + self.hash.len()
  }

  pub fn is_empty(&self) -> bool {
    self.seq.is_empty() && self.hash.is_empty()
  }
}
