use protodomain::{parse, Bits, Engine, Memory, Presets};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

fn setup_logger() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", concat!(env!("CARGO_PKG_NAME"), "=info"));
    }
    pretty_env_logger::init_timed();
}

fn main() -> anyhow::Result<()> {
    setup_logger();

    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let mut count: usize = 1;
    let mut seed: Option<u64> = None;
    let mut memory_path: Option<PathBuf> = None;
    let mut presets = Presets::new();
    let mut positional = Vec::new();
    let mut it = raw_args.drain(..);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--count" | "-n" => {
                let v = it.next().ok_or_else(|| anyhow::anyhow!("--count needs a value"))?;
                count = v.parse()?;
            }
            "--seed" => {
                let v = it.next().ok_or_else(|| anyhow::anyhow!("--seed needs a value"))?;
                seed = Some(v.parse()?);
            }
            "--memory" => {
                memory_path = Some(PathBuf::from(it.next().ok_or_else(|| anyhow::anyhow!("--memory needs a file"))?));
            }
            "--set" => {
                let v = it.next().ok_or_else(|| anyhow::anyhow!("--set needs name=hex"))?;
                let (name, hex) = v
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("--set expects name=hex, got {}", v))?;
                presets.insert(name.to_string(), Bits::from_hex(hex)?);
            }
            _ => positional.push(arg),
        }
    }
    let [dsl_path, symbol_name] = positional.as_slice() else {
        anyhow::bail!("usage: specialize <format.dsl> <symbol> [--count N] [--seed S] [--set name=hex] [--memory FILE]");
    };

    let src = std::fs::read_to_string(dsl_path)?;
    let symbols = parse(&src).map_err(|e| anyhow::anyhow!(e))?;
    let symbol = symbols
        .iter()
        .find(|s| &s.name == symbol_name)
        .ok_or_else(|| anyhow::anyhow!("{}: no symbol named {}", dsl_path, symbol_name))?;
    let mut memory = match &memory_path {
        Some(p) if p.exists() => Memory::load(p)?,
        _ => Memory::new(),
    };
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let engine = Engine::default();
    for _ in 0..count {
        let bits = engine.specialize_with_rng(symbol, &presets, &mut memory, &mut rng)?;
        println!("{}", bits.to_hex());
    }
    if let Some(p) = &memory_path {
        memory.save(p)?;
        log::info!("memory saved to {} ({} entries)", p.display(), memory.len());
    }
    Ok(())
}
