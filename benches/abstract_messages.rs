//! Benchmark: abstraction of generated messages against a small symbol set (one by one and
//! as a parallel batch), and specialization of the same symbols.
//! Messages are produced by specialization with a fixed seed, so runs are comparable.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use protodomain::{abstract_batch, parse, Engine, Memory, Presets, Symbol};
use rand::rngs::StdRng;
use rand::SeedableRng;

const FORMAT: &str = r#"
symbol Hello {
    magic: ascii("HELO");
    len: size(name) uint8;
    name: ascii(1..32);
    crc: crc32(magic, len, name);
}

symbol Data {
    kind: alt { raw(0x55cd); raw(0x58cf); };
    count: uint8(0..8);
    items: repeat(count) { uint16 };
    checksum: inet_checksum(kind, count, items);
}

symbol Bye {
    magic: ascii("BYE");
    reason: ascii(0..16);
}
"#;

fn generate(engine: &Engine, symbols: &[Symbol], n: usize) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(7);
    let presets = Presets::new();
    let mut memory = Memory::new();
    (0..n)
        .map(|i| {
            let s = &symbols[i % symbols.len()];
            engine
                .specialize_with_rng(s, &presets, &mut memory, &mut rng)
                .expect("specialize")
                .into_bytes()
        })
        .collect()
}

fn bench_abstract_messages(c: &mut Criterion) {
    let symbols = parse(FORMAT).expect("parse format");
    let engine = Engine::default();
    let messages = generate(&engine, &symbols, 300);
    let total_bytes: usize = messages.iter().map(|m| m.len()).sum();
    eprintln!("abstract_messages: {} messages, {} bytes", messages.len(), total_bytes);

    c.bench_function("abstract_message_sequential", |b| {
        b.iter(|| {
            let mut matched = 0usize;
            for m in &messages {
                let mut memory = Memory::new();
                if engine.abstract_message(black_box(m), &symbols, &mut memory).is_ok() {
                    matched += 1;
                }
            }
            black_box(matched)
        });
    });

    c.bench_function("abstract_batch_parallel", |b| {
        let memory = Memory::new();
        b.iter(|| {
            let report = abstract_batch(&engine, black_box(&messages), &symbols, &memory);
            black_box(report.matched.len())
        });
    });

    c.bench_function("specialize_all_symbols", |b| {
        let presets = Presets::new();
        let mut rng = StdRng::seed_from_u64(11);
        b.iter(|| {
            let mut memory = Memory::new();
            for s in &symbols {
                let bits = engine
                    .specialize_with_rng(s, &presets, &mut memory, &mut rng)
                    .expect("specialize");
                black_box(bits);
            }
        });
    });
}

criterion_group!(benches, bench_abstract_messages);
criterion_main!(benches);
