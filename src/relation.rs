//! Relation leaves: values computed from other variables (size, checksums, copies).
//!
//! A relation is evaluated against the bindings of one [`Path`]. When a dependency is not
//! bound yet the evaluation yields `None` and the caller defers it through the path's
//! callback queue; the relation itself never blocks or errors on a missing dependency.
//!
//! A relation may depend on itself (directly, or through an aggregate that contains it):
//! its own segments then read as zero bits of its output length.

use crate::error::DomainError;
use crate::path::{DepState, Path};
use crate::types::{Endianness, TypeDescriptor};
use crate::value::Bits;
use crate::variable::{Dependency, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// IEEE CRC-32 (reflected polynomial 0xEDB88320), as used by Ethernet and zlib.
    Crc32,
    /// RFC 1071 one's-complement sum of 16-bit words (IP, ICMP, UDP, TCP).
    Internet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind {
    /// `round(factor * total_bits + offset)`.
    Size { factor: f64, offset: f64 },
    Checksum(ChecksumAlgorithm),
    /// Copy of the single dependency's value.
    Value,
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    pub deps: Vec<Dependency>,
    /// Encoding of the relation's own value; must have a bounded length.
    pub output: TypeDescriptor,
}

impl ChecksumAlgorithm {
    pub fn output_bits(self) -> usize {
        match self {
            ChecksumAlgorithm::Crc32 => 32,
            ChecksumAlgorithm::Internet => 16,
        }
    }

    pub fn compute(self, data: &[u8]) -> u32 {
        match self {
            ChecksumAlgorithm::Crc32 => crc32fast::hash(data),
            ChecksumAlgorithm::Internet => internet_checksum(data) as u32,
        }
    }
}

impl Relation {
    /// Length in bits of the relation's value on the wire.
    pub fn output_len(&self) -> usize {
        self.output.max_bits.unwrap_or(0)
    }

    /// Dependencies that keep the relation from being evaluated in `path` right now.
    pub fn unresolved<'a>(&'a self, self_id: VarId, path: &Path) -> Vec<&'a Dependency> {
        let needs_value = !matches!(self.kind, RelationKind::Size { .. });
        self.deps
            .iter()
            .filter(|d| match path.dep_state(d.id, self_id) {
                DepState::Value(_) => false,
                DepState::Pending(_) => needs_value,
                DepState::Unbound => true,
            })
            .collect()
    }

    /// Expected value given the bindings of `path`, or `None` while a dependency is missing.
    pub fn compute(&self, self_id: VarId, path: &Path) -> Result<Option<Bits>, DomainError> {
        let states: Vec<DepState> = self.deps.iter().map(|d| path.dep_state(d.id, self_id)).collect();
        match &self.kind {
            RelationKind::Size { factor, offset } => {
                let mut total = 0usize;
                for st in &states {
                    match st {
                        DepState::Value(b) => total += b.len(),
                        // Relation placeholders have a declared length even before their value is known.
                        DepState::Pending(n) => total += n,
                        DepState::Unbound => return Ok(None),
                    }
                }
                let size = (factor * total as f64 + offset).round();
                let size = if size <= 0.0 { 0 } else { size as u64 };
                Ok(Some(self.output.encode_unsigned(size)))
            }
            RelationKind::Checksum(alg) => {
                let mut data = Bits::new();
                for st in &states {
                    match st {
                        DepState::Value(b) => data.extend(b),
                        _ => return Ok(None),
                    }
                }
                let sum = alg.compute(data.as_bytes());
                let bytes = match alg.output_bits() {
                    16 => match self.output.endianness {
                        Endianness::Big => (sum as u16).to_be_bytes().to_vec(),
                        Endianness::Little => (sum as u16).to_le_bytes().to_vec(),
                    },
                    _ => match self.output.endianness {
                        Endianness::Big => sum.to_be_bytes().to_vec(),
                        Endianness::Little => sum.to_le_bytes().to_vec(),
                    },
                };
                Ok(Some(Bits::from_bytes(&bytes).fit(self.output_len())))
            }
            RelationKind::Value => match states.first() {
                Some(DepState::Value(b)) => Ok(Some(b.fit(self.output_len()))),
                Some(_) => Ok(None),
                None => Err(DomainError::MalformedDescriptor(
                    "value relation without a dependency".to_string(),
                )),
            },
        }
    }
}

/// RFC 1071 checksum; an odd trailing byte is padded with zero.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in data.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum += word as u32;
        sum = (sum & 0xffff) + (sum >> 16);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
