use protodomain::dump::{failure_to_dump, message_to_dump};
use protodomain::{abstract_batch, abstract_session, parse_with_defaults, Engine, EngineConfig, Memory, Symbol};
use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned, PcapError};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

fn setup_logger() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", concat!(env!("CARGO_PKG_NAME"), "=info"));
    }
    pretty_env_logger::init_timed();
}

fn take_value(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.remove(pos);
    if pos < args.len() {
        Some(args.remove(pos))
    } else {
        None
    }
}

fn main() -> anyhow::Result<()> {
    setup_logger();

    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = if let Some(pos) = raw_args.iter().position(|a| a == "--verbose" || a == "-v") {
        raw_args.remove(pos);
        true
    } else {
        false
    };
    let config_path = take_value(&mut raw_args, "--config").map(PathBuf::from);
    let memory_path = take_value(&mut raw_args, "--memory").map(PathBuf::from);

    let mut args = raw_args.into_iter();
    let (Some(pcap_path), Some(dsl_path)) = (args.next().map(PathBuf::from), args.next().map(PathBuf::from)) else {
        anyhow::bail!("usage: abstract_pcap <capture> <format.dsl> [--verbose] [--config FILE] [--memory FILE]");
    };

    let config = match &config_path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    let src = std::fs::read_to_string(&dsl_path)?;
    let symbols = parse_with_defaults(&src, &config.type_defaults).map_err(|e| anyhow::anyhow!(e))?;
    if symbols.is_empty() {
        anyhow::bail!("{}: no symbol defined", dsl_path.display());
    }
    let mut memory = match &memory_path {
        Some(p) if p.exists() => Memory::load(p)?,
        _ => Memory::new(),
    };
    let engine = Engine::new(config);

    // Probe file type (pcap vs pcapng) using the magic at start of file.
    let mut probe = [0u8; 4];
    {
        let mut f = File::open(&pcap_path)?;
        f.read_exact(&mut probe)?;
    }
    let file = File::open(&pcap_path)?;
    let mut pkt_count: u64 = 0;
    let payloads = if probe == [0x0a, 0x0d, 0x0d, 0x0a] {
        read_pcapng(file, &mut pkt_count)?
    } else {
        read_legacy_pcap(file, &mut pkt_count)?
    };

    // With a memory file, payloads are abstracted in capture order so session values carry over.
    let report = if memory_path.is_some() {
        abstract_session(&engine, &payloads, &symbols, &mut memory)
    } else {
        abstract_batch(&engine, &payloads, &symbols, &memory)
    };
    if verbose {
        for m in &report.matched {
            if let Some(symbol) = symbols.iter().find(|s| s.name == m.message.symbol) {
                println!("=== payload {} ===", m.index);
                println!("{}", message_to_dump(symbol, &m.message));
            }
        }
    }
    for f in &report.failed {
        println!("{}", failure_to_dump(f));
    }
    if let Some(p) = &memory_path {
        memory.save(p)?;
    }

    eprintln!("capture: {}", pcap_path.display());
    eprintln!("format:  {}", dsl_path.display());
    eprintln!("packets: {}", pkt_count);
    eprintln!("udp payloads: {}", payloads.len());
    eprintln!("matched: {}", report.matched.len());
    eprintln!("unmatched: {}", report.failed.len());
    print_symbol_summary(&symbols, &report.counts());
    Ok(())
}

fn print_symbol_summary(symbols: &[Symbol], counts: &[(String, usize)]) {
    eprintln!("symbols:");
    for s in symbols {
        let n = counts.iter().find(|(name, _)| *name == s.name).map_or(0, |(_, c)| *c);
        eprintln!("  {}: {}", s.name, n);
    }
}

fn read_legacy_pcap<R: Read>(file: R, pkt_count: &mut u64) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut reader = pcap_parser::pcap::LegacyPcapReader::new(1 << 20, file)?;
    let mut linktype: Option<Linktype> = None;
    let mut out = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(h) => linktype = Some(h.network),
                    PcapBlockOwned::Legacy(b) => {
                        *pkt_count += 1;
                        let lt = linktype.unwrap_or(Linktype(1));
                        if let Some(udp_payload) = udp_payload_from_linktype(lt, b.data) {
                            out.push(udp_payload.to_vec());
                        }
                    }
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("pcap refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcap read error: {:?}", e)),
        }
    }
    Ok(out)
}

fn read_pcapng<R: Read>(file: R, pkt_count: &mut u64) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut reader = pcap_parser::pcapng::PcapNGReader::new(1 << 20, file)?;
    let mut if_linktypes: Vec<Linktype> = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::NG(b) = block {
                    let packet = match &b {
                        PcapNgBlock::InterfaceDescription(idb) => {
                            if_linktypes.push(idb.linktype);
                            None
                        }
                        PcapNgBlock::EnhancedPacket(epb) => {
                            let lt = if_linktypes.get(epb.if_id as usize).copied().unwrap_or(Linktype(1));
                            Some((lt, epb.packet_data()))
                        }
                        PcapNgBlock::SimplePacket(spb) => {
                            let lt = if_linktypes.first().copied().unwrap_or(Linktype(1));
                            Some((lt, spb.packet_data()))
                        }
                        _ => None,
                    };
                    if let Some((lt, frame)) = packet {
                        *pkt_count += 1;
                        if let Some(udp_payload) = udp_payload_from_linktype(lt, frame) {
                            out.push(udp_payload.to_vec());
                        }
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("pcapng refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcapng read error: {:?}", e)),
        }
    }
    Ok(out)
}

fn udp_payload_from_linktype(linktype: Linktype, frame: &[u8]) -> Option<&[u8]> {
    let l3 = match linktype.0 {
        1 => ethernet_l3(frame)?,    // DLT_EN10MB
        101 => frame,                // DLT_RAW
        113 => linux_sll_l3(frame)?, // DLT_LINUX_SLL
        _ => return None,
    };
    ipv4_udp_payload(l3)
}

fn ethernet_l3(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 14 {
        return None;
    }
    let mut off = 12usize;
    let mut ethertype = u16::from_be_bytes([frame[off], frame[off + 1]]);
    off += 2;
    // 802.1Q / 802.1ad tags
    while ethertype == 0x8100 || ethertype == 0x88a8 {
        if frame.len() < off + 4 {
            return None;
        }
        ethertype = u16::from_be_bytes([frame[off + 2], frame[off + 3]]);
        off += 4;
    }
    match ethertype {
        0x0800 => Some(&frame[off..]),
        _ => None,
    }
}

fn linux_sll_l3(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 16 {
        return None;
    }
    match u16::from_be_bytes([frame[14], frame[15]]) {
        0x0800 => Some(&frame[16..]),
        _ => None,
    }
}

fn ipv4_udp_payload(l3: &[u8]) -> Option<&[u8]> {
    if l3.len() < 20 || l3[0] >> 4 != 4 {
        return None;
    }
    let ihl = (l3[0] & 0x0f) as usize * 4;
    let total_len = u16::from_be_bytes([l3[2], l3[3]]) as usize;
    if ihl < 20 || l3.len() < ihl || total_len < ihl {
        return None;
    }
    let l3 = if total_len <= l3.len() { &l3[..total_len] } else { l3 };
    if l3.len() < ihl + 8 || l3[9] != 17 {
        return None;
    }
    let udp = &l3[ihl..];
    let udp_len = u16::from_be_bytes([udp[4], udp[5]]) as usize;
    if udp_len < 8 || udp.len() < udp_len {
        return None;
    }
    Some(&udp[8..udp_len])
}
