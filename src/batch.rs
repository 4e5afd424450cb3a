//! Batch abstraction: match many captured messages against a set of symbols.
//!
//! Messages that match no symbol are reported with the symbols that were tried, the reason
//! and a truncated hex dump, and the batch carries on with the next message.

use crate::engine::{AbstractedMessage, Engine};
use crate::error::{truncated_hex, DomainError};
use crate::memory::Memory;
use crate::symbol::Symbol;
use rayon::prelude::*;

/// Result of a batch: matched and failed messages, both ordered by message index.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub matched: Vec<MatchedMessage>,
    pub failed: Vec<FailedMessage>,
}

#[derive(Debug)]
pub struct MatchedMessage {
    pub index: usize,
    pub message: AbstractedMessage,
}

#[derive(Debug)]
pub struct FailedMessage {
    pub index: usize,
    pub tried: Vec<String>,
    pub reason: String,
    /// Hex of the message, truncated to `MAX_DUMP_BYTES` bytes.
    pub dump: String,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.matched.len() + self.failed.len()
    }

    /// Matched messages per symbol name, in first-seen order.
    pub fn counts(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = Vec::new();
        for m in &self.matched {
            match out.iter_mut().find(|(n, _)| *n == m.message.symbol) {
                Some((_, c)) => *c += 1,
                None => out.push((m.message.symbol.clone(), 1)),
            }
        }
        out
    }

    fn push(&mut self, index: usize, bytes: &[u8], symbols: &[Symbol], result: Result<AbstractedMessage, DomainError>) {
        match result {
            Ok(message) => self.matched.push(MatchedMessage { index, message }),
            Err(e) => {
                log::debug!("message {}: {}", index, e);
                self.failed.push(FailedMessage {
                    index,
                    tried: symbols.iter().map(|s| s.name.clone()).collect(),
                    reason: e.to_string(),
                    dump: truncated_hex(bytes),
                });
            }
        }
    }
}

/// Abstract messages in parallel. Each message sees its own copy of `memory`, so
/// nothing learnt from one message affects another.
pub fn abstract_batch<M>(engine: &Engine, messages: &[M], symbols: &[Symbol], memory: &Memory) -> BatchReport
where
    M: AsRef<[u8]> + Sync,
{
    let results: Vec<Result<AbstractedMessage, DomainError>> = messages
        .par_iter()
        .map(|m| {
            let mut local = memory.clone();
            engine.abstract_message(m.as_ref(), symbols, &mut local)
        })
        .collect();
    let mut report = BatchReport::default();
    for (index, (m, result)) in messages.iter().zip(results).enumerate() {
        report.push(index, m.as_ref(), symbols, result);
    }
    report
}

/// Abstract messages in order, threading `memory` from one message to the next (session
/// values learnt early constrain later messages).
pub fn abstract_session<M>(engine: &Engine, messages: &[M], symbols: &[Symbol], memory: &mut Memory) -> BatchReport
where
    M: AsRef<[u8]>,
{
    let mut report = BatchReport::default();
    for (index, m) in messages.iter().enumerate() {
        let result = engine.abstract_message(m.as_ref(), symbols, memory);
        report.push(index, m.as_ref(), symbols, result);
    }
    report
}
