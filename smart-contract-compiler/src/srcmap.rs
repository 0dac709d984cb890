//! Compressed source-map decoding and instruction counting.
//!
//! Source maps use the compact `s:l:f:j:m` encoding with one segment per
//! bytecode instruction; missing trailing fields inherit from the
//! previous segment.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceMapEntry {
    pub start: i64,
    pub length: i64,
    pub file: i64,
    pub jump: char,
    pub modifier_depth: i64,
}

impl Default for SourceMapEntry {
    fn default() -> Self {
        Self {
            start: -1,
            length: -1,
            file: -1,
            jump: '-',
            modifier_depth: 0,
        }
    }
}

/// Expands a compressed source map into one entry per instruction.
pub fn decompress(srcmap: &str) -> Vec<SourceMapEntry> {
    if srcmap.is_empty() {
        return Vec::new();
    }
    let mut entries: Vec<SourceMapEntry> = Vec::new();
    for segment in srcmap.split(';') {
        let mut entry = entries.last().cloned().unwrap_or_default();
        let fields: Vec<&str> = segment.split(':').collect();
        if let Some(value) = field(&fields, 0) {
            entry.start = value;
        }
        if let Some(value) = field(&fields, 1) {
            entry.length = value;
        }
        if let Some(value) = field(&fields, 2) {
            entry.file = value;
        }
        if let Some(jump) = fields.get(3).filter(|f| !f.is_empty()) {
            entry.jump = jump.chars().next().unwrap_or('-');
        }
        if let Some(value) = field(&fields, 4) {
            entry.modifier_depth = value;
        }
        entries.push(entry);
    }
    entries
}

fn field(fields: &[&str], index: usize) -> Option<i64> {
    fields.get(index).filter(|f| !f.is_empty())?.parse().ok()
}

/// Number of EVM instructions in a hex bytecode string. PUSH1..PUSH32
/// immediates are skipped; trailing partial bytes are ignored.
pub fn instruction_count(bytecode: &str) -> usize {
    let hex_str = bytecode.strip_prefix("0x").unwrap_or(bytecode);
    let Ok(bytes) = hex::decode(hex_str) else {
        return 0;
    };
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        let opcode = bytes[i];
        count += 1;
        i += 1;
        if (0x60..=0x7f).contains(&opcode) {
            i += (opcode - 0x5f) as usize;
        }
    }
    count
}
