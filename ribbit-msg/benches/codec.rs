use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use ribbit_msg::*;

struct Input {
  tkl: usize,
  n_opts: usize,
  opt_size: usize,
  payload_size: usize,
}

impl Input {
  fn message(&self) -> Message {
    let mut msg = Message::new(Type::Non, Code::new(2, 5));
    msg.id = Id(1);
    msg.token = Token::try_from_slice(&vec![1u8; self.tkl]).unwrap();
    (0..self.n_opts).for_each(|_| msg.add_uri_query(&"q".repeat(self.opt_size)).unwrap());
    msg.payload = Payload(vec![1u8; self.payload_size]);
    msg
  }
}

fn inputs() -> Vec<Input> {
  [(0, 0, 0, 0),
   (4, 4, 8, 16),
   (4, 8, 32, 16),
   (8, 8, 64, 128),
   (8, 16, 64, 512),
   (8, 32, 128, 2048),
   (8, 32, 255, 4096)].into_iter()
                      .map(|(tkl, n_opts, opt_size, payload_size)| Input { tkl,
                                                                           n_opts,
                                                                           opt_size,
                                                                           payload_size })
                      .collect()
}

fn encode(c: &mut Criterion) {
  let mut group = c.benchmark_group("msg/encode");
  group.measurement_time(std::time::Duration::from_secs(5));

  for inp in inputs() {
    let msg = inp.message();
    let bytes = (&msg).try_into_bytes().unwrap();

    group.bench_with_input(BenchmarkId::new("ribbit_msg/rfc7252/size", bytes.len()),
                           &msg,
                           |b, msg| b.iter(|| SpecVersion::Rfc7252.encode(msg).unwrap()));

    group.bench_with_input(BenchmarkId::new("ribbit_msg/draft12/size", bytes.len()),
                           &msg,
                           |b, msg| b.iter(|| SpecVersion::Draft12.encode(msg).unwrap()));

    let packet = coap_lite::Packet::from_bytes(&bytes).unwrap();
    group.bench_with_input(BenchmarkId::new("coap_lite/size", bytes.len()),
                           &packet,
                           |b, packet| b.iter(|| packet.to_bytes()));
  }
  group.finish();
}

fn decode(c: &mut Criterion) {
  let mut group = c.benchmark_group("msg/decode");
  group.measurement_time(std::time::Duration::from_secs(5));

  for inp in inputs() {
    let msg = inp.message();
    let bytes = (&msg).try_into_bytes().unwrap();

    group.bench_with_input(BenchmarkId::new("ribbit_msg/rfc7252/size", bytes.len()),
                           &bytes,
                           |b, bytes| {
                             b.iter_batched(|| bytes.clone(),
                                            |bytes| Message::try_from_bytes(bytes).unwrap(),
                                            BatchSize::SmallInput)
                           });

    group.bench_with_input(BenchmarkId::new("coap_lite/size", bytes.len()),
                           &bytes,
                           |b, bytes| b.iter(|| coap_lite::Packet::from_bytes(bytes)));
  }
  group.finish();
}

criterion_group!(benches, encode, decode);
criterion_main!(benches);
