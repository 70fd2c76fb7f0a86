// benches/codec_throughput.rs

use apiary::{
  decode, encode, ApiaryError, Behavior, BehaviorFactory, CellEnv, Context, RuntimeOptions, Table,
  Value,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
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

fn mixed_tuple() -> Vec<Value> {
  let mut table = Table::from_seq((0..16).map(Value::Int).collect());
  table.insert(Value::str("name"), Value::str("bench"));
  table.insert(Value::Int(7), Value::Num(0.125));
  vec![
    Value::Int(42),
    Value::str("a short string"),
    Value::Str("x".repeat(200).into()),
    Value::Num(3.5),
    Value::Table(table),
  ]
}

fn codec_benches(c: &mut Criterion) {
  let values = mixed_tuple();

  c.bench_function("encode_mixed_tuple", |b| {
    b.iter(|| encode(black_box(&values)).unwrap())
  });

  let ctx = Context::new(RuntimeOptions::default(), Arc::new(IdleFactory));
  c.bench_function("encode_decode_mixed_tuple", |b| {
    b.iter(|| decode(encode(black_box(&values)).unwrap(), &ctx).unwrap())
  });
}

criterion_group!(benches, codec_benches);
criterion_main!(benches);
