// src/codec/decode.rs

use crate::cell::CellId;
use crate::codec::buffer::{BlockReader, Payload};
use crate::codec::{MAX_COOKIE, MAX_DEPTH};
use crate::codec::{TYPE_BOOLEAN, TYPE_CELL, TYPE_LONG_STRING, TYPE_NIL, TYPE_NUMBER, TYPE_OPAQUE, TYPE_SHORT_STRING, TYPE_TABLE};
use crate::context::Context;
use crate::error::ApiaryError;
use crate::message::{Blob, Table, Value};

/// Deserializes a buffer back into its value tuple, consuming it.
///
/// Each cell reference in the stream is resolved through the context's cell
/// table into a fresh counted proxy; an id whose slot has been reused or
/// destroyed fails with [`ApiaryError::StaleReference`]. The counts the
/// encoder grabbed are released only after the whole stream has decoded, so
/// referenced cells stay alive across the handoff.
///
/// On failure every partially decoded value (including any already-resolved
/// proxies) and all unread blocks are released before the error is returned.
pub fn decode(payload: Payload, ctx: &Context) -> Result<Vec<Value>, ApiaryError> {
  let Payload { head, len: _, refs } = payload;
  let Some(head) = head else {
    return Err(ApiaryError::protocol("empty buffer"));
  };
  let mut reader = BlockReader::new(head)?;

  let mut values = Vec::new();
  while !reader.is_empty() {
    values.push(decode_value(&mut reader, ctx, 0)?);
  }
  // Count transfer complete: the proxies in `values` hold their own grabs.
  drop(refs);
  Ok(values)
}

fn decode_value(r: &mut BlockReader, ctx: &Context, depth: usize) -> Result<Value, ApiaryError> {
  let tag = r.read_u8()?;
  let (t, cookie) = (tag & 0x7, tag >> 3);
  match t {
    TYPE_NIL => Ok(Value::Nil),
    TYPE_BOOLEAN => Ok(Value::Bool(cookie != 0)),
    TYPE_NUMBER => decode_number(r, cookie),
    TYPE_OPAQUE => Ok(Value::Opaque(r.read_u64()?)),
    TYPE_SHORT_STRING => {
      let bytes = r.read_vec(cookie as usize)?;
      Ok(Value::Str(Blob::from(bytes)))
    }
    TYPE_LONG_STRING => {
      let len = match cookie {
        2 => r.read_u16()? as usize,
        4 => r.read_u32()? as usize,
        other => {
          return Err(ApiaryError::protocol(format!(
            "invalid string length width {other}"
          )))
        }
      };
      Ok(Value::Str(Blob::from(r.read_vec(len)?)))
    }
    TYPE_TABLE => decode_table(r, ctx, cookie, depth),
    TYPE_CELL => {
      let id = CellId::from_raw(r.read_u64()?);
      ctx
        .lookup_ref(id)
        .map(Value::Cell)
        .ok_or_else(|| ApiaryError::StaleReference(format!("{id:?}")))
    }
    _ => unreachable!("tag type is three bits"),
  }
}

fn decode_number(r: &mut BlockReader, cookie: u8) -> Result<Value, ApiaryError> {
  match cookie {
    0 => Ok(Value::Int(0)),
    1 => Ok(Value::Int(r.read_u8()? as i32)),
    2 => Ok(Value::Int(r.read_u16()? as i32)),
    4 => Ok(Value::Int(r.read_i32()?)),
    8 => Ok(Value::Num(r.read_f64()?)),
    other => Err(ApiaryError::protocol(format!(
      "invalid number width {other}"
    ))),
  }
}

fn decode_table(r: &mut BlockReader, ctx: &Context, cookie: u8, depth: usize) -> Result<Value, ApiaryError> {
  let depth = depth + 1;
  if depth > MAX_DEPTH {
    return Err(ApiaryError::protocol(format!(
      "container nesting exceeds depth {MAX_DEPTH}"
    )));
  }

  let seq_len = if cookie == MAX_COOKIE - 1 {
    match decode_value(r, ctx, depth)? {
      Value::Int(n) if n >= 0 => n as usize,
      _ => return Err(ApiaryError::protocol("invalid container run length")),
    }
  } else {
    cookie as usize
  };

  // Clamp the pre-allocation; a lying count is caught by the reads below.
  let mut table = Table {
    seq: Vec::with_capacity(seq_len.min(4096)),
    hash: Vec::new(),
  };
  for _ in 0..seq_len {
    table.seq.push(decode_value(r, ctx, depth)?);
  }
  loop {
    let key = decode_value(r, ctx, depth)?;
    if key.is_nil() {
      break;
    }
    let value = decode_value(r, ctx, depth)?;
    table.hash.push((key, value));
  }
  Ok(Value::Table(table))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cell::{Behavior, BehaviorFactory, CellEnv};
  use crate::codec::buffer::BlockWriter;
  use crate::codec::combine_type;
  use crate::config::RuntimeOptions;
  use std::sync::Arc;

  struct Idle;
  impl Behavior for Idle {
    fn handle(&mut self, _port: i32, _payload: Vec<Value>) -> Result<(), ApiaryError> {
      Ok(())
    }
  }

  struct IdleFactory;
  impl BehaviorFactory for IdleFactory {
    fn create(&self, _source: &str, _env: CellEnv) -> Result<Box<dyn Behavior>, ApiaryError> {
      Ok(Box::new(Idle))
    }
  }

  fn test_context() -> Context {
    Context::new(RuntimeOptions::default(), Arc::new(IdleFactory))
  }

  fn decode_raw(build: impl FnOnce(&mut BlockWriter)) -> Result<Vec<Value>, ApiaryError> {
    let mut w = BlockWriter::new();
    build(&mut w);
    decode(w.finish(), &test_context())
  }

  #[test]
  fn truncated_value_is_a_protocol_error() {
    // A long-string header that promises more bytes than the stream holds.
    let result = decode_raw(|w| {
      w.push_bytes(&[combine_type(TYPE_LONG_STRING, 2)]);
      w.push_bytes(&1000u16.to_le_bytes());
      w.push_bytes(&[0u8; 10]);
    });
    assert!(matches!(result, Err(ApiaryError::Protocol(_))));
  }

  #[test]
  fn invalid_number_width_is_a_protocol_error() {
    let result = decode_raw(|w| {
      w.push_bytes(&[combine_type(TYPE_NUMBER, 3)]);
      w.push_bytes(&[0u8; 3]);
    });
    assert!(matches!(result, Err(ApiaryError::Protocol(_))));
  }

  #[test]
  fn over_deep_stream_is_a_protocol_error() {
    // A synthetic stream of 33 nested single-element tables.
    let result = decode_raw(|w| {
      for _ in 0..33 {
        w.push_bytes(&[combine_type(TYPE_TABLE, 1)]);
      }
      w.push_bytes(&[combine_type(TYPE_NIL, 0)]);
      for _ in 0..33 {
        w.push_bytes(&[combine_type(TYPE_NIL, 0)]);
      }
    });
    assert!(matches!(result, Err(ApiaryError::Protocol(_))));
  }

  #[test]
  fn unknown_cell_id_is_a_stale_reference() {
    let result = decode_raw(|w| {
      w.push_bytes(&[combine_type(TYPE_CELL, 0)]);
      w.push_bytes(&0xdead_beef_u64.to_le_bytes());
    });
    assert!(matches!(result, Err(ApiaryError::StaleReference(_))));
  }
}
