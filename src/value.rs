//! Bit vectors: the wire representation every domain parses from and specializes to.
//!
//! Protocol fields are not always byte aligned (flags, nibbles, bit arrays), so the engine
//! works on [`Bits`] rather than on `Vec<u8>`. Bits are stored MSB first; the unused low
//! bits of the last byte are kept at zero so that equality and hashing are structural.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// MSB-first bit string of arbitrary length.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "BitsRepr", into = "BitsRepr")]
pub struct Bits {
    bytes: Vec<u8>,
    len: usize,
}

/// Serialized form: hex of the padded bytes plus the exact bit length.
#[derive(Serialize, Deserialize)]
struct BitsRepr {
    hex: String,
    len: usize,
}

impl From<Bits> for BitsRepr {
    fn from(b: Bits) -> Self {
        BitsRepr {
            hex: b.to_hex(),
            len: b.len,
        }
    }
}

impl TryFrom<BitsRepr> for Bits {
    type Error = DomainError;

    fn try_from(r: BitsRepr) -> Result<Self, Self::Error> {
        let bytes = Bits::from_hex(&r.hex)?;
        if r.len > bytes.len() || bytes.len() - r.len >= 8 {
            return Err(DomainError::Alignment(format!(
                "bit length {} does not match {} hex digits",
                r.len,
                r.hex.len()
            )));
        }
        Ok(bytes.slice(0, r.len))
    }
}

impl Bits {
    pub fn new() -> Self {
        Bits::default()
    }

    pub fn from_bytes(b: &[u8]) -> Self {
        Bits {
            bytes: b.to_vec(),
            len: b.len() * 8,
        }
    }

    pub fn zeros(len: usize) -> Self {
        Bits {
            bytes: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Parse a string of `0`/`1` characters.
    pub fn from_bit_str(s: &str) -> Option<Self> {
        let mut out = Bits::new();
        for c in s.chars() {
            match c {
                '0' => out.push(false),
                '1' => out.push(true),
                _ => return None,
            }
        }
        Some(out)
    }

    /// Parse hex digits into bytes. An odd number of digits is an alignment error, never
    /// silently padded.
    pub fn from_hex(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() % 2 != 0 {
            return Err(DomainError::Alignment(format!(
                "hex string {:?} has an odd number of digits ({})",
                s,
                s.len()
            )));
        }
        let mut bytes = Vec::with_capacity(s.len() / 2);
        let digits = s.as_bytes();
        for pair in digits.chunks(2) {
            let hi = hex_nibble(pair[0]);
            let lo = hex_nibble(pair[1]);
            match (hi, lo) {
                (Some(h), Some(l)) => bytes.push((h << 4) | l),
                _ => {
                    return Err(DomainError::MalformedDescriptor(format!(
                        "invalid hex digit in {:?}",
                        s
                    )))
                }
            }
        }
        Ok(Bits::from_bytes(&bytes))
    }

    /// Low `len` bits of `v`, most significant first. Bits above 64 are zero.
    pub fn from_u64(v: u64, len: usize) -> Self {
        let mut out = Bits::new();
        for i in (0..len).rev() {
            out.push(i < 64 && (v >> i) & 1 == 1);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.len % 8 == 0
    }

    pub fn get(&self, i: usize) -> bool {
        i < self.len && (self.bytes[i / 8] >> (7 - i % 8)) & 1 == 1
    }

    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            self.bytes[self.len / 8] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    pub fn extend(&mut self, other: &Bits) {
        if self.len % 8 == 0 {
            self.bytes.extend_from_slice(&other.bytes);
            self.len += other.len;
        } else {
            for i in 0..other.len {
                self.push(other.get(i));
            }
        }
    }

    pub fn concat<'a, I: IntoIterator<Item = &'a Bits>>(parts: I) -> Bits {
        let mut out = Bits::new();
        for p in parts {
            out.extend(p);
        }
        out
    }

    /// Bits in `[start, end)`; bounds are clamped to the vector length.
    pub fn slice(&self, start: usize, end: usize) -> Bits {
        let end = end.min(self.len);
        let start = start.min(end);
        let len = end - start;
        let byte_off = start / 8;
        let shift = start % 8;
        let mut bytes = Vec::with_capacity(len.div_ceil(8));
        for i in 0..len.div_ceil(8) {
            let hi = self.bytes[byte_off + i];
            let b = if shift == 0 {
                hi
            } else {
                let lo = self.bytes.get(byte_off + i + 1).copied().unwrap_or(0);
                (hi << shift) | (lo >> (8 - shift))
            };
            bytes.push(b);
        }
        let mut out = Bits { bytes, len };
        out.clear_tail();
        out
    }

    pub fn starts_with(&self, prefix: &Bits) -> bool {
        prefix.len <= self.len && self.slice(0, prefix.len) == *prefix
    }

    /// Fit to exactly `len` bits: leading zero padding when short, leading bits dropped when long.
    pub fn fit(&self, len: usize) -> Bits {
        if self.len >= len {
            self.slice(self.len - len, self.len)
        } else {
            let mut out = Bits::zeros(len - self.len);
            out.extend(self);
            out
        }
    }

    /// Big-endian unsigned value; `None` beyond 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.len > 64 {
            return None;
        }
        let mut v = 0u64;
        for i in 0..self.len {
            v = (v << 1) | self.get(i) as u64;
        }
        Some(v)
    }

    /// Underlying bytes; a partial last byte is padded with zero bits on the right.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex_string(&self.bytes)
    }

    pub fn to_bit_string(&self) -> String {
        (0..self.len).map(|i| if self.get(i) { '1' } else { '0' }).collect()
    }

    fn clear_tail(&mut self) {
        self.bytes.truncate(self.len.div_ceil(8));
        let rem = self.len % 8;
        if rem != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= 0xffu8 << (8 - rem);
            }
        }
    }
}

impl From<&[u8]> for Bits {
    fn from(b: &[u8]) -> Self {
        Bits::from_bytes(b)
    }
}

impl From<Vec<u8>> for Bits {
    fn from(bytes: Vec<u8>) -> Self {
        let len = bytes.len() * 8;
        Bits { bytes, len }
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_byte_aligned() {
            write!(f, "Bits({})", self.to_hex())
        } else {
            write!(f, "Bits({}b:{})", self.len, self.to_bit_string())
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

pub fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect()
}
