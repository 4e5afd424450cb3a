//! Format abstracted messages for display (dump text). Uses the symbol's type descriptors to
//! render leaves in their human-readable form.

use crate::batch::FailedMessage;
use crate::engine::AbstractedMessage;
use crate::symbol::Symbol;
use crate::types::TypeKind;
use crate::value::Bits;
use crate::variable::{Variable, VariableKind};

fn spaced_hex(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// One leaf value: decoded form plus wire hex, or hex alone for opaque kinds.
pub fn format_leaf(var: &Variable, bits: &Bits) -> String {
    let Some(t) = var.descriptor() else {
        return format!("hex({})", spaced_hex(bits.as_bytes()));
    };
    match t.kind {
        TypeKind::Raw | TypeKind::HexString => format!("hex({})", spaced_hex(bits.as_bytes())),
        TypeKind::BitArray => format!("bits({})", bits.to_bit_string()),
        _ => match t.decode(bits) {
            Ok(text) if t.kind == TypeKind::Ascii => format!("{:?} ({})", text, spaced_hex(bits.as_bytes())),
            Ok(text) => format!("{} ({})", text, spaced_hex(bits.as_bytes())),
            Err(_) => format!("hex({})", spaced_hex(bits.as_bytes())),
        },
    }
}

/// Format the value of `var` in `msg`; composites list their bound children.
pub fn value_to_dump(msg: &AbstractedMessage, var: &Variable, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let Some(bits) = msg.variable(&var.name) else {
        return format!("{}<unbound>", pad);
    };
    match &var.kind {
        VariableKind::Data(_) | VariableKind::Relation(_) => format!("{}{}", pad, format_leaf(var, bits)),
        VariableKind::Repeat(_) => format!("{}[{}]", pad, spaced_hex(bits.as_bytes())),
        VariableKind::Alt { children, .. } | VariableKind::Agg(children) => {
            let bound: Vec<&Variable> = children.iter().filter(|c| msg.variable(&c.name).is_some()).collect();
            if let [only] = bound.as_slice() {
                if matches!(var.kind, VariableKind::Alt { .. }) {
                    return value_to_dump(msg, only, indent);
                }
            }
            let mut lines: Vec<String> = vec![format!("{}{{", pad)];
            for c in bound {
                let sub = value_to_dump(msg, c, indent + 1);
                lines.push(format!("{}  {}: {}", pad, c.name, sub.trim_start()));
            }
            lines.push(format!("{}}}", pad));
            lines.join("\n")
        }
    }
}

/// First line of value_to_dump (for one-line summaries).
pub fn value_summary_line(msg: &AbstractedMessage, var: &Variable) -> String {
    let full = value_to_dump(msg, var, 0);
    full.lines().next().map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Every field of a message, one `name: value` per field.
pub fn message_to_dump(symbol: &Symbol, msg: &AbstractedMessage) -> String {
    let mut lines = vec![format!("{} ({} bits)", msg.symbol, msg.data.len())];
    for field in symbol.fields() {
        let sub = value_to_dump(msg, field, 1);
        lines.push(format!("  {}: {}", field.name, sub.trim_start()));
    }
    lines.join("\n")
}

pub fn failure_to_dump(f: &FailedMessage) -> String {
    format!(
        "message {}: {}\n  tried: {}\n  data: {}",
        f.index,
        f.reason,
        f.tried.join(", "),
        f.dump
    )
}
