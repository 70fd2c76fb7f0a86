// src/codec/encode.rs

use crate::codec::buffer::{BlockWriter, Payload};
use crate::codec::{combine_type, MAX_COOKIE, MAX_DEPTH};
use crate::codec::{TYPE_BOOLEAN, TYPE_CELL, TYPE_LONG_STRING, TYPE_NIL, TYPE_NUMBER, TYPE_OPAQUE, TYPE_SHORT_STRING, TYPE_TABLE};
use crate::error::ApiaryError;
use crate::message::{Blob, Table, Value};

/// Serializes a tuple of values into a fresh linked-block buffer.
///
/// Encoding a [`Value::Cell`] grabs the target: the returned payload carries
/// that reference count until it is decoded (transfer) or dropped (release).
/// On failure all partial state (blocks and grabbed references) is freed
/// before the error is returned.
pub fn encode(values: &[Value]) -> Result<Payload, ApiaryError> {
  let mut w = BlockWriter::new();
  for value in values {
    encode_value(&mut w, value, 0)?;
  }
  Ok(w.finish())
}

fn encode_value(w: &mut BlockWriter, value: &Value, depth: usize) -> Result<(), ApiaryError> {
  match value {
    Value::Nil => w.push_bytes(&[combine_type(TYPE_NIL, 0)]),
    Value::Bool(b) => w.push_bytes(&[combine_type(TYPE_BOOLEAN, *b as u8)]),
    Value::Int(v) => encode_int(w, *v),
    Value::Num(n) => {
      w.push_bytes(&[combine_type(TYPE_NUMBER, 8)]);
      w.push_bytes(&n.to_le_bytes());
    }
    Value::Opaque(p) => {
      w.push_bytes(&[combine_type(TYPE_OPAQUE, 0)]);
      w.push_bytes(&p.to_le_bytes());
    }
    Value::Str(blob) => encode_str(w, blob)?,
    Value::Table(table) => encode_table(w, table, depth)?,
    Value::Cell(r) => {
      w.push_bytes(&[combine_type(TYPE_CELL, 0)]);
      w.push_bytes(&r.id().to_raw().to_le_bytes());
      // The buffer owns one count on the target until decode or drop.
      w.hold_ref(r.clone());
    }
  }
  Ok(())
}

/// Integers are width-packed by magnitude; negatives always take the full
/// four bytes.
fn encode_int(w: &mut BlockWriter, v: i32) {
  if v == 0 {
    w.push_bytes(&[combine_type(TYPE_NUMBER, 0)]);
  } else if v < 0 {
    w.push_bytes(&[combine_type(TYPE_NUMBER, 4)]);
    w.push_bytes(&v.to_le_bytes());
  } else if v < 0x100 {
    w.push_bytes(&[combine_type(TYPE_NUMBER, 1)]);
    w.push_bytes(&[v as u8]);
  } else if v < 0x10000 {
    w.push_bytes(&[combine_type(TYPE_NUMBER, 2)]);
    w.push_bytes(&(v as u16).to_le_bytes());
  } else {
    w.push_bytes(&[combine_type(TYPE_NUMBER, 4)]);
    w.push_bytes(&v.to_le_bytes());
  }
}

fn encode_str(w: &mut BlockWriter, blob: &Blob) -> Result<(), ApiaryError> {
  let len = blob.size();
  if len < MAX_COOKIE as usize {
    w.push_bytes(&[combine_type(TYPE_SHORT_STRING, len as u8)]);
    if len > 0 {
      w.push_bytes(blob);
    }
  } else if len < 0x10000 {
    w.push_bytes(&[combine_type(TYPE_LONG_STRING, 2)]);
    w.push_bytes(&(len as u16).to_le_bytes());
    w.push_bytes(blob);
  } else if len <= u32::MAX as usize {
    w.push_bytes(&[combine_type(TYPE_LONG_STRING, 4)]);
    w.push_bytes(&(len as u32).to_le_bytes());
    w.push_bytes(blob);
  } else {
    return Err(ApiaryError::protocol("string exceeds 4 GiB"));
  }
  Ok(())
}

fn encode_table(w: &mut BlockWriter, table: &Table, depth: usize) -> Result<(), ApiaryError> {
  let depth = depth + 1;
  if depth > MAX_DEPTH {
    return Err(ApiaryError::protocol(format!(
      "container nesting exceeds depth {MAX_DEPTH}"
    )));
  }

  let seq_len = table.seq.len();
  if seq_len >= (MAX_COOKIE - 1) as usize {
    if seq_len > i32::MAX as usize {
      return Err(ApiaryError::protocol("container sequential run too long"));
    }
    w.push_bytes(&[combine_type(TYPE_TABLE, MAX_COOKIE - 1)]);
    encode_int(w, seq_len as i32);
  } else {
    w.push_bytes(&[combine_type(TYPE_TABLE, seq_len as u8)]);
  }

  for v in &table.seq {
    encode_value(w, v, depth)?;
  }
  for (k, v) in &table.hash {
    // A nil key would forge the pair terminator below.
    if k.is_nil() {
      return Err(ApiaryError::protocol("container key may not be nil"));
    }
    encode_value(w, k, depth)?;
    encode_value(w, v, depth)?;
  }
  w.push_bytes(&[combine_type(TYPE_NIL, 0)]);
  Ok(())
}
