//! Parse format DSL source into symbols using PEST.
//!
//! ```text
//! symbol Echo {
//!     kind: alt { raw(0x55cd); raw(0x58cf); };
//!     len: size(payload) uint8;
//!     payload: ascii(1..10) session;
//!     crc: crc32(kind, len, payload, crc) le;
//!     items: repeat(1..4, delimiter = 0x2c) { raw(2) };
//!     hdr: agg { a: uint16(5); b: ascii(3); };
//! }
//! ```
//!
//! Type arguments: a literal is the fixed value (`0x..` bytes, `"text"`, `0b..` bits, an
//! integer or a dotted quad); an integer or `a..b` range is a length for raw / ascii / hex /
//! bits (bytes, characters, bytes, bits) and a value interval for integers. Options are
//! `key = value` pairs: `epoch`, `unity`, `unit` for timestamps, `network` for ipv4.

use crate::memory::Scope;
use crate::relation::RelationKind;
use crate::symbol::{Field, Symbol};
use crate::timestamp::{Epoch, Unity};
use crate::types::{parse_int, Endianness, Sign, TypeDefaults, TypeDescriptor, UnitSize};
use crate::value::Bits;
use crate::variable::{Dependency, RepeatCount, Variable};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::net::Ipv4Addr;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct FormatParser;

/// Parse format source into symbols, big endian unsigned bytes by default.
pub fn parse(source: &str) -> Result<Vec<Symbol>, String> {
    parse_with_defaults(source, &TypeDefaults::default())
}

/// Parse with format-wide defaults: byte order of every type without `le`/`be`, and unit
/// size / sign of bare `integer` types.
pub fn parse_with_defaults(source: &str, defaults: &TypeDefaults) -> Result<Vec<Symbol>, String> {
    let pairs = FormatParser::parse(Rule::format, source).map_err(|e| format!("Parse error: {}", e))?;
    let pair = pairs.into_iter().next().ok_or("Empty parse")?;
    let mut symbols = Vec::new();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::symbol_def {
            symbols.push(build_symbol(inner, defaults)?);
        }
    }
    Ok(symbols)
}

fn build_symbol(pair: Pair<Rule>, defaults: &TypeDefaults) -> Result<Symbol, String> {
    let mut it = pair.into_inner();
    let name = it.next().ok_or("symbol: missing name")?.as_str().to_string();
    let mut fields = Vec::new();
    for f in it {
        let mut parts = f.into_inner();
        let field_name = parts.next().ok_or("field: missing name")?.as_str();
        let domain = parts.next().ok_or("field: missing domain")?;
        fields.push(Field::new(field_name, build_domain(domain, field_name, defaults)?));
    }
    Symbol::new(&name, fields).map_err(|e| format!("symbol {}: {}", name, e))
}

fn build_domain(pair: Pair<Rule>, name: &str, defaults: &TypeDefaults) -> Result<Variable, String> {
    let mut it = pair.into_inner();
    let node = it.next().ok_or("domain: missing node")?;
    let mut var = match node.as_rule() {
        Rule::alt_node => Variable::alt(name, build_members(node, defaults)?),
        Rule::agg_node => Variable::agg(name, build_members(node, defaults)?),
        Rule::repeat_node => build_repeat(node, name, defaults)?,
        Rule::relation_node => build_relation(node, name, defaults)?,
        Rule::data_node => Variable::data(name, build_type(node, defaults)?),
        r => return Err(format!("unexpected node: {:?}", r)),
    };
    let mut endianness = None;
    for m in it {
        match m.as_str() {
            "constant" => var = var.with_scope(Scope::Constant),
            "session" => var = var.with_scope(Scope::Session),
            "message" => var = var.with_scope(Scope::Message),
            "none" => var = var.with_scope(Scope::None),
            "le" => endianness = Some(Endianness::Little),
            "be" => endianness = Some(Endianness::Big),
            "mutable" => var = var.mutable(),
            other => return Err(format!("unknown modifier: {}", other)),
        }
    }
    Ok(var.with_endianness(endianness.unwrap_or(defaults.endianness)))
}

fn build_members(pair: Pair<Rule>, defaults: &TypeDefaults) -> Result<Vec<Variable>, String> {
    let mut out = Vec::new();
    for m in pair.into_inner() {
        out.push(build_member(m, defaults)?);
    }
    Ok(out)
}

/// `[name:] domain`; unnamed members are named after their parent by `Symbol::new`.
fn build_member(pair: Pair<Rule>, defaults: &TypeDefaults) -> Result<Variable, String> {
    let mut name = "";
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str(),
            Rule::domain => return build_domain(inner, name, defaults),
            _ => {}
        }
    }
    Err("member: missing domain".to_string())
}

fn build_repeat(pair: Pair<Rule>, name: &str, defaults: &TypeDefaults) -> Result<Variable, String> {
    let mut count = None;
    let mut delimiter = None;
    let mut child = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::range => {
                let (a, b) = parse_range(inner)?;
                count = Some(RepeatCount::Range(a, b));
            }
            Rule::integer => count = Some(RepeatCount::Fixed(parse_usize(inner.as_str())?)),
            Rule::ident => count = Some(RepeatCount::Field(Dependency::new(inner.as_str()))),
            Rule::option => {
                let (key, value) = parse_option(inner)?;
                match key.as_str() {
                    "delimiter" => delimiter = Some(literal_bits(&value)?),
                    other => return Err(format!("repeat {}: unknown option {}", name, other)),
                }
            }
            Rule::repeat_body => child = Some(build_member(inner, defaults)?),
            _ => {}
        }
    }
    let count = count.ok_or_else(|| format!("repeat {}: missing count", name))?;
    let child = child.ok_or_else(|| format!("repeat {}: missing body", name))?;
    let mut var = Variable::repeat(name, child, count);
    if let Some(d) = delimiter {
        var = var.with_delimiter(d);
    }
    Ok(var)
}

fn build_relation(pair: Pair<Rule>, name: &str, defaults: &TypeDefaults) -> Result<Variable, String> {
    let mut kind = "";
    let mut deps: Vec<&str> = Vec::new();
    let mut options = Vec::new();
    let mut output = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::relation_kind => kind = inner.as_str(),
            Rule::ident => deps.push(inner.as_str()),
            Rule::option => options.push(parse_option(inner)?),
            Rule::data_node => output = Some(build_type(inner, defaults)?),
            _ => {}
        }
    }
    if deps.is_empty() {
        return Err(format!("relation {}: no dependency", name));
    }
    let mut var = match kind {
        "size" => {
            let mut v = Variable::size(name, &deps);
            for (key, value) in &options {
                let x: f64 = value
                    .parse()
                    .map_err(|_| format!("size {}: {} is not a number: {}", name, key, value))?;
                match key.as_str() {
                    "factor" => v = v.with_factor(x),
                    "offset" => v = v.with_offset(x),
                    other => return Err(format!("size {}: unknown option {}", name, other)),
                }
            }
            v
        }
        "crc32" => Variable::crc32(name, &deps),
        "inet_checksum" => Variable::inet_checksum(name, &deps),
        "value" => {
            if deps.len() != 1 {
                return Err(format!("value {}: exactly one dependency expected", name));
            }
            let t = output.take().ok_or_else(|| format!("value {}: missing output type", name))?;
            Variable::relation(name, RelationKind::Value, &deps, t)
        }
        other => return Err(format!("unknown relation: {}", other)),
    };
    if kind != "size" && !options.is_empty() {
        return Err(format!("{} {}: unexpected options", kind, name));
    }
    if let Some(t) = output {
        var = var.with_output(t);
    }
    Ok(var)
}

fn build_type(pair: Pair<Rule>, defaults: &TypeDefaults) -> Result<TypeDescriptor, String> {
    let mut it = pair.into_inner();
    let type_name = it.next().ok_or("type: missing name")?.as_str().to_string();
    let mut literal: Option<(Rule, String)> = None;
    let mut range: Option<(usize, Option<usize>)> = None;
    let mut options = Vec::new();
    for arg in it {
        match arg.as_rule() {
            Rule::range => range = Some(parse_range(arg)?),
            Rule::option => options.push(parse_option(arg)?),
            r => literal = Some((r, arg.as_str().to_string())),
        }
    }
    let err = |e: crate::error::DomainError| format!("{}: {}", type_name, e);

    let t = match type_name.as_str() {
        "raw" | "ascii" | "hex" | "bits" => {
            // A bare integer is a length.
            let (fixed, range) = match literal {
                Some((Rule::integer, s)) => {
                    let n = parse_usize(&s)?;
                    (None, Some((n, Some(n))))
                }
                other => (other, range),
            };
            match (type_name.as_str(), fixed, range) {
                ("raw", Some((Rule::hex_lit, s)), _) => TypeDescriptor::raw_value(Bits::from_hex(&s).map_err(err)?.as_bytes()),
                ("raw", Some((Rule::string_lit, s)), _) => TypeDescriptor::raw_value(&unescape(&s)?),
                ("ascii", Some((Rule::string_lit, s)), _) => {
                    let bytes = unescape(&s)?;
                    TypeDescriptor::ascii_value(&String::from_utf8_lossy(&bytes))
                }
                ("hex", Some((Rule::hex_lit, s)), _) => TypeDescriptor::hex_value(&s).map_err(err)?,
                ("hex", Some((Rule::string_lit, s)), _) => TypeDescriptor::hex_value(strip_quotes(&s)).map_err(err)?,
                ("bits", Some((Rule::bit_lit, s)), _) => {
                    let b = Bits::from_bit_str(&s[2..]).ok_or_else(|| format!("bits: bad literal {}", s))?;
                    TypeDescriptor::bits_value(b)
                }
                (_, Some((_, s)), _) => return Err(format!("{}: unexpected literal {}", type_name, s)),
                (kind, None, Some((min, max))) => sized(kind, min, max)?,
                (kind, None, None) => match kind {
                    "raw" => TypeDescriptor::raw_any(),
                    "ascii" => TypeDescriptor::ascii_any(),
                    "hex" => sized("hex", 0, None)?,
                    _ => sized("bits", 0, None)?,
                },
            }
        }
        "ipv4" => {
            let mut t = match literal {
                Some((Rule::ip_net, s)) => TypeDescriptor::ipv4_value(parse_ipv4(&s)?),
                Some((_, s)) => return Err(format!("ipv4: unexpected literal {}", s)),
                None => TypeDescriptor::ipv4(),
            };
            for (key, value) in &options {
                match key.as_str() {
                    "network" => {
                        let (addr, prefix) = value.split_once('/').unwrap_or((value.as_str(), "32"));
                        let prefix: u8 = prefix.parse().map_err(|_| format!("ipv4: bad prefix {}", value))?;
                        t = t.with_network(parse_ipv4(addr)?, prefix);
                    }
                    other => return Err(format!("ipv4: unknown option {}", other)),
                }
            }
            return Ok(t);
        }
        "timestamp" => {
            let mut epoch = Epoch::Unix;
            let mut unity = Unity::Second;
            let mut unit = UnitSize::U32;
            for (key, value) in &options {
                match key.as_str() {
                    "epoch" => epoch = Epoch::from_name(value).ok_or_else(|| format!("unknown epoch {}", value))?,
                    "unity" => unity = Unity::from_name(value).ok_or_else(|| format!("unknown unity {}", value))?,
                    "unit" => {
                        unit = UnitSize::from_bits(parse_usize(value)?)
                            .ok_or_else(|| format!("timestamp: bad unit size {}", value))?
                    }
                    other => return Err(format!("timestamp: unknown option {}", other)),
                }
            }
            TypeDescriptor::timestamp(epoch, unity, unit)
        }
        int => {
            let (unit, sign) = integer_shape(int, defaults)?;
            let mut t = TypeDescriptor::integer(unit, sign);
            if let Some((min, max)) = range {
                t = t.with_interval(min as i128, max.map_or(i128::MAX, |m| m as i128));
            }
            match literal {
                Some((Rule::integer | Rule::hex_lit, s)) => {
                    let v = parse_int(&s).ok_or_else(|| format!("{}: bad integer {}", int, s))?;
                    let mut fixed = TypeDescriptor::integer_value(v, unit, sign).map_err(err)?;
                    fixed.interval = t.interval;
                    fixed
                }
                Some((_, s)) => return Err(format!("{}: unexpected literal {}", int, s)),
                None => t,
            }
        }
    };
    if let Some((key, _)) = options.first() {
        if !matches!(type_name.as_str(), "timestamp") {
            return Err(format!("{}: unknown option {}", type_name, key));
        }
    }
    Ok(t)
}

fn sized(kind: &str, min: usize, max: Option<usize>) -> Result<TypeDescriptor, String> {
    let scale = if kind == "bits" { 1 } else { 8 };
    let to_bits = |n: usize| n.checked_mul(scale).ok_or_else(|| format!("{}: length {} too large", kind, n));
    let min_bits = to_bits(min)?;
    let max_bits = max.map(to_bits).transpose()?;
    let mut t = match kind {
        "raw" => TypeDescriptor::raw_any(),
        "ascii" => TypeDescriptor::ascii_any(),
        "hex" => TypeDescriptor::hex_bytes(0, 0),
        _ => TypeDescriptor::bits(0, 0),
    };
    t.min_bits = Some(min_bits);
    t.max_bits = max_bits;
    Ok(t)
}

fn integer_shape(name: &str, defaults: &TypeDefaults) -> Result<(UnitSize, Sign), String> {
    if name == "integer" {
        return Ok((defaults.unit_size, defaults.sign));
    }
    let (sign, digits) = match name.strip_prefix("uint") {
        Some(d) => (Sign::Unsigned, d),
        None => (Sign::Signed, name.trim_start_matches("int")),
    };
    let unit = UnitSize::from_bits(parse_usize(digits)?).ok_or_else(|| format!("unknown type {}", name))?;
    Ok((unit, sign))
}

fn parse_range(pair: Pair<Rule>) -> Result<(usize, Option<usize>), String> {
    let mut it = pair.into_inner();
    let min = parse_usize(it.next().ok_or("range: missing lower bound")?.as_str())?;
    let max = match it.next() {
        Some(p) => Some(parse_usize(p.as_str())?),
        None => None,
    };
    if max.is_some_and(|m| m < min) {
        return Err(format!("range {}..{:?} is empty", min, max));
    }
    Ok((min, max))
}

fn parse_option(pair: Pair<Rule>) -> Result<(String, String), String> {
    let mut it = pair.into_inner();
    let key = it.next().ok_or("option: missing key")?.as_str().to_string();
    let value = it.next().ok_or("option: missing value")?.as_str().to_string();
    Ok((key, value))
}

fn parse_usize(s: &str) -> Result<usize, String> {
    s.trim().parse().map_err(|_| format!("not a count: {}", s))
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, String> {
    s.parse().map_err(|_| format!("not an IPv4 address: {}", s))
}

/// Delimiter and other free-standing literals.
fn literal_bits(s: &str) -> Result<Bits, String> {
    if let Some(b) = s.strip_prefix("0b") {
        return Bits::from_bit_str(b).ok_or_else(|| format!("bad bit literal {}", s));
    }
    if s.starts_with("0x") {
        return Bits::from_hex(s).map_err(|e| e.to_string());
    }
    if s.starts_with('"') {
        return Ok(Bits::from_bytes(&unescape(s)?));
    }
    Err(format!("expected a hex, bit or string literal, got {}", s))
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

/// String literal bytes; supports `\n \r \t \0 \\ \" \xHH`.
fn unescape(s: &str) -> Result<Vec<u8>, String> {
    let inner = strip_quotes(s);
    let mut out = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('"') => out.push(b'"'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let b = u8::from_str_radix(&hex, 16).map_err(|_| format!("bad escape \\x{} in {}", hex, s))?;
                out.push(b);
            }
            other => return Err(format!("bad escape {:?} in {}", other, s)),
        }
    }
    Ok(out)
}
