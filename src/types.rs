//! Type descriptors: primitive encodings of leaf values.
//!
//! A [`TypeDescriptor`] says how many bits a leaf may occupy and which bit patterns are
//! legal for it. It is the only place where the engine knows about concrete encodings:
//!
//! | Kind | Granularity | Content constraint |
//! |------|-------------|--------------------|
//! | `Raw` | 8 bits | none |
//! | `Ascii` | 8 bits | printable ASCII, tab, CR, LF |
//! | `HexString` | 8 bits | none on the wire; hex digits in the textual form |
//! | `Integer` | unit size | value inside the optional interval |
//! | `Timestamp` | unit size | decodes to a calendar date (year <= 9999) |
//! | `Ipv4` | 32 bits | inside the optional network |
//! | `BitArray` | 1 bit | none |
//!
//! Descriptors are built once and never mutated afterwards; [`TypeDescriptor::validate`]
//! is called by [`Symbol::new`](crate::symbol::Symbol::new) so malformed descriptors are
//! rejected before any parsing or generation happens.

use crate::error::DomainError;
use crate::timestamp::{self, Epoch, Unity};
use crate::value::Bits;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Raw,
    Ascii,
    Integer,
    Timestamp,
    HexString,
    Ipv4,
    BitArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSize {
    U8,
    U16,
    U32,
    U64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Unsigned,
    Signed,
}

impl UnitSize {
    pub fn bits(self) -> usize {
        match self {
            UnitSize::U8 => 8,
            UnitSize::U16 => 16,
            UnitSize::U32 => 32,
            UnitSize::U64 => 64,
        }
    }

    pub fn from_bits(bits: usize) -> Option<UnitSize> {
        match bits {
            8 => Some(UnitSize::U8),
            16 => Some(UnitSize::U16),
            32 => Some(UnitSize::U32),
            64 => Some(UnitSize::U64),
            _ => None,
        }
    }
}

/// Encoding defaults applied when a format does not say otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefaults {
    pub unit_size: UnitSize,
    pub endianness: Endianness,
    pub sign: Sign,
}

impl Default for TypeDefaults {
    fn default() -> Self {
        TypeDefaults {
            unit_size: UnitSize::U8,
            endianness: Endianness::Big,
            sign: Sign::Unsigned,
        }
    }
}

/// Primitive encoding of a leaf: bit-length interval plus kind-specific constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    /// Lower bound in bits (`None` = 0).
    pub min_bits: Option<usize>,
    /// Upper bound in bits (`None` = unbounded).
    pub max_bits: Option<usize>,
    pub unit_size: UnitSize,
    pub endianness: Endianness,
    pub sign: Sign,
    pub fixed: Option<Bits>,
    /// Numeric interval for integers (inclusive).
    pub interval: Option<(i128, i128)>,
    pub epoch: Epoch,
    pub unity: Unity,
    /// IPv4 network (address, prefix length) values must belong to.
    pub network: Option<(Ipv4Addr, u8)>,
}

impl TypeDescriptor {
    fn base(kind: TypeKind, min_bits: Option<usize>, max_bits: Option<usize>) -> Self {
        let defaults = TypeDefaults::default();
        TypeDescriptor {
            kind,
            min_bits,
            max_bits,
            unit_size: defaults.unit_size,
            endianness: defaults.endianness,
            sign: defaults.sign,
            fixed: None,
            interval: None,
            epoch: Epoch::Unix,
            unity: Unity::Second,
            network: None,
        }
    }

    fn fixed_bits(kind: TypeKind, value: Bits) -> Self {
        let n = value.len();
        let mut t = TypeDescriptor::base(kind, Some(n), Some(n));
        t.fixed = Some(value);
        t
    }

    /// Raw bytes with a constant value.
    pub fn raw_value(bytes: &[u8]) -> Self {
        TypeDescriptor::fixed_bits(TypeKind::Raw, Bits::from_bytes(bytes))
    }

    /// Raw bytes, length in bytes within `[min, max]`.
    pub fn raw_bytes(min: usize, max: usize) -> Self {
        TypeDescriptor::base(TypeKind::Raw, Some(min * 8), Some(max * 8))
    }

    /// Raw bytes of any length.
    pub fn raw_any() -> Self {
        TypeDescriptor::base(TypeKind::Raw, None, None)
    }

    pub fn ascii_value(s: &str) -> Self {
        TypeDescriptor::fixed_bits(TypeKind::Ascii, Bits::from_bytes(s.as_bytes()))
    }

    /// ASCII text, length in characters within `[min, max]`.
    pub fn ascii_chars(min: usize, max: usize) -> Self {
        TypeDescriptor::base(TypeKind::Ascii, Some(min * 8), Some(max * 8))
    }

    pub fn ascii_any() -> Self {
        TypeDescriptor::base(TypeKind::Ascii, None, None)
    }

    /// Hex string given as digits; an odd digit count is an alignment error.
    pub fn hex_value(digits: &str) -> Result<Self, DomainError> {
        Ok(TypeDescriptor::fixed_bits(TypeKind::HexString, Bits::from_hex(digits)?))
    }

    /// Hex string, length in bytes within `[min, max]`.
    pub fn hex_bytes(min: usize, max: usize) -> Self {
        TypeDescriptor::base(TypeKind::HexString, Some(min * 8), Some(max * 8))
    }

    pub fn bits_value(value: Bits) -> Self {
        TypeDescriptor::fixed_bits(TypeKind::BitArray, value)
    }

    /// Bit array, length in bits within `[min, max]`.
    pub fn bits(min: usize, max: usize) -> Self {
        TypeDescriptor::base(TypeKind::BitArray, Some(min), Some(max))
    }

    pub fn integer(unit_size: UnitSize, sign: Sign) -> Self {
        let n = unit_size.bits();
        let mut t = TypeDescriptor::base(TypeKind::Integer, Some(n), Some(n));
        t.unit_size = unit_size;
        t.sign = sign;
        t
    }

    pub fn uint8() -> Self {
        TypeDescriptor::integer(UnitSize::U8, Sign::Unsigned)
    }

    pub fn uint16() -> Self {
        TypeDescriptor::integer(UnitSize::U16, Sign::Unsigned)
    }

    pub fn uint32() -> Self {
        TypeDescriptor::integer(UnitSize::U32, Sign::Unsigned)
    }

    /// Integer with a constant value (big endian unless changed with [`Self::with_endianness`]).
    pub fn integer_value(value: i128, unit_size: UnitSize, sign: Sign) -> Result<Self, DomainError> {
        let mut t = TypeDescriptor::integer(unit_size, sign);
        t.fixed = Some(t.encode_integer(value)?);
        Ok(t)
    }

    pub fn timestamp(epoch: Epoch, unity: Unity, unit_size: UnitSize) -> Self {
        let n = unit_size.bits();
        let mut t = TypeDescriptor::base(TypeKind::Timestamp, Some(n), Some(n));
        t.unit_size = unit_size;
        t.epoch = epoch;
        t.unity = unity;
        t
    }

    pub fn ipv4() -> Self {
        TypeDescriptor::base(TypeKind::Ipv4, Some(32), Some(32))
    }

    pub fn ipv4_value(addr: Ipv4Addr) -> Self {
        TypeDescriptor::fixed_bits(TypeKind::Ipv4, Bits::from_bytes(&addr.octets()))
    }

    /// Change the byte order; a fixed integer value is re-encoded accordingly.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        if self.endianness != endianness && self.fixed.is_some() && self.is_numeric() {
            if let Some(v) = self.fixed.as_ref().and_then(|f| self.integer_of(f)) {
                self.endianness = endianness;
                if let Ok(bits) = self.encode_integer(v) {
                    self.fixed = Some(bits);
                }
                return self;
            }
        }
        self.endianness = endianness;
        self
    }

    pub fn with_interval(mut self, min: i128, max: i128) -> Self {
        self.interval = Some((min, max));
        self
    }

    pub fn with_network(mut self, addr: Ipv4Addr, prefix: u8) -> Self {
        self.network = Some((addr, prefix));
        self
    }

    fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Integer | TypeKind::Timestamp)
    }

    /// Parsing granularity in bits.
    pub fn step(&self) -> usize {
        match self.kind {
            TypeKind::BitArray => 1,
            _ => 8,
        }
    }

    pub fn min_len(&self) -> usize {
        self.min_bits.unwrap_or(0)
    }

    /// Check construction invariants.
    pub fn validate(&self) -> Result<(), DomainError> {
        let step = self.step();
        if let (Some(min), Some(max)) = (self.min_bits, self.max_bits) {
            if min > max {
                return Err(DomainError::MalformedDescriptor(format!(
                    "{:?}: min length {} bits above max {} bits",
                    self.kind, min, max
                )));
            }
        }
        for bound in [self.min_bits, self.max_bits].into_iter().flatten() {
            if bound % step != 0 {
                return Err(DomainError::Alignment(format!(
                    "{:?}: length {} bits is not a multiple of {}",
                    self.kind, bound, step
                )));
            }
        }
        if let Some(fixed) = &self.fixed {
            if self.min_bits != Some(fixed.len()) || self.max_bits != Some(fixed.len()) {
                return Err(DomainError::MalformedDescriptor(format!(
                    "{:?}: fixed value of {} bits outside length bounds {:?}..{:?}",
                    self.kind,
                    fixed.len(),
                    self.min_bits,
                    self.max_bits
                )));
            }
        }
        if self.is_numeric() && self.max_bits != Some(self.unit_size.bits()) {
            return Err(DomainError::MalformedDescriptor(format!(
                "{:?}: length must equal unit size {}",
                self.kind,
                self.unit_size.bits()
            )));
        }
        Ok(())
    }

    /// Whether `bits` is a legal value of this type. Lengths that are not a multiple of the
    /// granularity are an error rather than a mismatch.
    pub fn can_parse(&self, bits: &Bits) -> Result<bool, DomainError> {
        let step = self.step();
        if bits.len() % step != 0 {
            return Err(DomainError::Alignment(format!(
                "{:?}: {} bits is not a multiple of {}",
                self.kind,
                bits.len(),
                step
            )));
        }
        if let Some(fixed) = &self.fixed {
            return Ok(fixed == bits);
        }
        if bits.len() < self.min_len() || self.max_bits.is_some_and(|m| bits.len() > m) {
            return Ok(false);
        }
        let ok = match self.kind {
            TypeKind::Raw | TypeKind::HexString | TypeKind::BitArray => true,
            TypeKind::Ascii => bits.as_bytes().iter().all(|&b| is_printable(b)),
            TypeKind::Integer => match self.integer_of(bits) {
                Some(v) => self.in_interval(v),
                None => false,
            },
            TypeKind::Timestamp => match self.integer_of(bits) {
                Some(v) if v >= 0 => {
                    self.in_interval(v)
                        && timestamp::to_datetime(v as u64, self.epoch, self.unity).is_some()
                }
                _ => false,
            },
            TypeKind::Ipv4 => bits.len() == 32 && self.in_network(bits),
        };
        Ok(ok)
    }

    /// Produce a legal value: the fixed value, or a random one under the constraints.
    /// `max_generated_bits` caps unbounded lengths.
    pub fn generate(&self, rng: &mut dyn RngCore, max_generated_bits: usize) -> Result<Bits, DomainError> {
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }
        match self.kind {
            TypeKind::Integer => {
                let (lo, hi) = self.value_range();
                let v = rng.gen_range(lo..=hi);
                self.encode_integer(v)
            }
            TypeKind::Timestamp => {
                let now = chrono::Utc::now().naive_utc();
                let raw = timestamp::from_datetime(now, self.epoch, self.unity).unwrap_or(0);
                Ok(self.encode_unsigned(raw))
            }
            TypeKind::Ipv4 => {
                let v = match self.network {
                    Some((addr, prefix)) => {
                        let mask = prefix_mask(prefix);
                        (u32::from(addr) & mask) | (rng.next_u32() & !mask)
                    }
                    None => rng.next_u32(),
                };
                Ok(Bits::from_bytes(&v.to_be_bytes()))
            }
            _ => {
                let step = self.step();
                let min = self.min_len();
                let max = self.max_bits.unwrap_or(max_generated_bits.max(min));
                let units = rng.gen_range(min / step..=max / step);
                Ok(self.random_content(rng, units * step))
            }
        }
    }

    fn random_content(&self, rng: &mut dyn RngCore, len: usize) -> Bits {
        match self.kind {
            TypeKind::Ascii => {
                let text: Vec<u8> = (0..len / 8).map(|_| rng.sample(Alphanumeric)).collect();
                Bits::from_bytes(&text)
            }
            TypeKind::BitArray => {
                let mut out = Bits::new();
                for _ in 0..len {
                    out.push(rng.gen_bool(0.5));
                }
                out
            }
            _ => {
                let mut bytes = vec![0u8; len / 8];
                rng.fill_bytes(&mut bytes);
                Bits::from_bytes(&bytes)
            }
        }
    }

    /// Human-readable form of a wire value.
    pub fn decode(&self, bits: &Bits) -> Result<String, DomainError> {
        match self.kind {
            TypeKind::Raw | TypeKind::HexString => {
                self.require_aligned(bits)?;
                Ok(bits.to_hex())
            }
            TypeKind::Ascii => {
                self.require_aligned(bits)?;
                Ok(String::from_utf8_lossy(bits.as_bytes()).into_owned())
            }
            TypeKind::Integer => self
                .integer_of(bits)
                .map(|v| v.to_string())
                .ok_or_else(|| self.length_error(bits)),
            TypeKind::Timestamp => {
                let raw = self.integer_of(bits).ok_or_else(|| self.length_error(bits))?;
                let dt = u64::try_from(raw)
                    .ok()
                    .and_then(|r| timestamp::to_datetime(r, self.epoch, self.unity))
                    .ok_or_else(|| {
                        DomainError::MalformedDescriptor(format!("timestamp {} out of calendar range", raw))
                    })?;
                Ok(dt.format(timestamp::DATE_FORMAT).to_string())
            }
            TypeKind::Ipv4 => {
                if bits.len() != 32 {
                    return Err(self.length_error(bits));
                }
                let b = bits.as_bytes();
                Ok(Ipv4Addr::new(b[0], b[1], b[2], b[3]).to_string())
            }
            TypeKind::BitArray => Ok(bits.to_bit_string()),
        }
    }

    /// Wire value of a human-readable form (inverse of [`Self::decode`]).
    pub fn encode(&self, text: &str) -> Result<Bits, DomainError> {
        match self.kind {
            TypeKind::Raw | TypeKind::HexString => Bits::from_hex(text),
            TypeKind::Ascii => Ok(Bits::from_bytes(text.as_bytes())),
            TypeKind::Integer => {
                let v = parse_int(text).ok_or_else(|| {
                    DomainError::MalformedDescriptor(format!("not an integer: {:?}", text))
                })?;
                self.encode_integer(v)
            }
            TypeKind::Timestamp => {
                let raw = timestamp::parse_datetime(text)
                    .and_then(|dt| timestamp::from_datetime(dt, self.epoch, self.unity))
                    .ok_or_else(|| DomainError::MalformedDescriptor(format!("not a date: {:?}", text)))?;
                self.encode_integer(raw as i128)
            }
            TypeKind::Ipv4 => {
                let addr: Ipv4Addr = text.trim().parse().map_err(|_| {
                    DomainError::MalformedDescriptor(format!("not an IPv4 address: {:?}", text))
                })?;
                Ok(Bits::from_bytes(&addr.octets()))
            }
            TypeKind::BitArray => Bits::from_bit_str(text.trim()).ok_or_else(|| {
                DomainError::MalformedDescriptor(format!("not a bit string: {:?}", text))
            }),
        }
    }

    /// Encode an integer on the unit size with this type's sign and byte order.
    pub fn encode_integer(&self, value: i128) -> Result<Bits, DomainError> {
        let (lo, hi) = self.full_range();
        if value < lo || value > hi {
            return Err(DomainError::MalformedDescriptor(format!(
                "integer {} does not fit {} bits ({:?})",
                value,
                self.unit_size.bits(),
                self.sign
            )));
        }
        let n = self.unit_size.bits() / 8;
        let mut buf = vec![0u8; n];
        match (self.sign, self.endianness) {
            (Sign::Unsigned, Endianness::Big) => BigEndian::write_uint(&mut buf, value as u64, n),
            (Sign::Unsigned, Endianness::Little) => LittleEndian::write_uint(&mut buf, value as u64, n),
            (Sign::Signed, Endianness::Big) => BigEndian::write_int(&mut buf, value as i64, n),
            (Sign::Signed, Endianness::Little) => LittleEndian::write_int(&mut buf, value as i64, n),
        }
        Ok(Bits::from_bytes(&buf))
    }

    /// Encode a non-negative count for a relation output: integers use the unit size and
    /// byte order, other kinds are big endian. The result is fitted to the declared length
    /// (leading zeros added or leading bits dropped).
    pub fn encode_unsigned(&self, value: u64) -> Bits {
        let len = self.max_bits.unwrap_or(64);
        if self.is_numeric() {
            let unit = self.unit_size.bits();
            let masked = if unit >= 64 { value } else { value & ((1u64 << unit) - 1) };
            let n = unit / 8;
            let mut buf = vec![0u8; n];
            match self.endianness {
                Endianness::Big => BigEndian::write_uint(&mut buf, masked, n),
                Endianness::Little => LittleEndian::write_uint(&mut buf, masked, n),
            }
            Bits::from_bytes(&buf).fit(len)
        } else {
            Bits::from_u64(value, len)
        }
    }

    /// Integer value of `bits` per unit size, sign and byte order.
    pub fn integer_of(&self, bits: &Bits) -> Option<i128> {
        if !bits.is_byte_aligned() || bits.is_empty() || bits.len() > 64 {
            return None;
        }
        let buf = bits.as_bytes();
        let n = buf.len();
        let v = match (self.sign, self.endianness) {
            (Sign::Unsigned, Endianness::Big) => BigEndian::read_uint(buf, n) as i128,
            (Sign::Unsigned, Endianness::Little) => LittleEndian::read_uint(buf, n) as i128,
            (Sign::Signed, Endianness::Big) => BigEndian::read_int(buf, n) as i128,
            (Sign::Signed, Endianness::Little) => LittleEndian::read_int(buf, n) as i128,
        };
        Some(v)
    }

    fn full_range(&self) -> (i128, i128) {
        let n = self.unit_size.bits() as u32;
        match self.sign {
            Sign::Unsigned => (0, (1i128 << n) - 1),
            Sign::Signed => (-(1i128 << (n - 1)), (1i128 << (n - 1)) - 1),
        }
    }

    fn value_range(&self) -> (i128, i128) {
        let (lo, hi) = self.full_range();
        match self.interval {
            Some((a, b)) => (a.max(lo), b.min(hi).max(a.max(lo))),
            None => (lo, hi),
        }
    }

    fn in_interval(&self, v: i128) -> bool {
        self.interval.map_or(true, |(lo, hi)| v >= lo && v <= hi)
    }

    fn in_network(&self, bits: &Bits) -> bool {
        match self.network {
            Some((addr, prefix)) => {
                let b = bits.as_bytes();
                let v = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
                let mask = prefix_mask(prefix);
                v & mask == u32::from(addr) & mask
            }
            None => true,
        }
    }

    fn require_aligned(&self, bits: &Bits) -> Result<(), DomainError> {
        if bits.is_byte_aligned() {
            Ok(())
        } else {
            Err(DomainError::Alignment(format!(
                "{:?}: {} bits is not a multiple of 8",
                self.kind,
                bits.len()
            )))
        }
    }

    fn length_error(&self, bits: &Bits) -> DomainError {
        DomainError::MalformedDescriptor(format!("{:?}: unexpected length {} bits", self.kind, bits.len()))
    }
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7e).contains(&b) || b == b'\t' || b == b'\r' || b == b'\n'
}

fn prefix_mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - p),
    }
}

/// Decimal (optionally negative) or `0x` hexadecimal integer.
pub fn parse_int(text: &str) -> Option<i128> {
    let t = text.trim();
    if let Some(h) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i128::from_str_radix(h, 16).ok()
    } else {
        t.parse().ok()
    }
}
