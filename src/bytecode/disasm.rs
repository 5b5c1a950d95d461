use crate::bytecode::Op;
use crate::lang::dictionary::Dictionary;
use crate::lang::word::{WordId, WordKind};

/// Disassembly of every user-defined word, in definition order.
pub fn disassemble_user_words(dict: &Dictionary) -> String {
    let mut out = String::new();

    for (id, word) in dict.iter() {
        if id == Dictionary::idle() || !matches!(word.kind, WordKind::Compiled(_)) {
            continue;
        }
        out.push_str(&disassemble_word(dict, id));
        out.push('\n');
    }

    out
}

const BANNER: &str = "════════════════════════════════════════\n";

/// Header plus one line per instruction for a single word.
pub fn disassemble_word(dict: &Dictionary, id: WordId) -> String {
    let Some(word) = dict.get(id) else {
        return format!("<no word {}>\n", id);
    };

    let summary = match &word.kind {
        WordKind::Native(builtin) => format!("native `{}`", builtin.name()),
        WordKind::Compiled(ops) => format!("{} instructions", ops.len()),
    };

    let mut out = String::new();
    out.push_str(BANNER);
    out.push_str(&format!(" {} ({})\n", word.name, id));
    out.push_str(&format!(" {}\n", summary));
    out.push_str(BANNER);
    out.push_str(&disassemble_ops(dict, word.body()));
    out
}

/// Disassemble a slice of ops, marking jump targets.
pub fn disassemble_ops(dict: &Dictionary, ops: &[Op]) -> String {
    let jump_targets = collect_jump_targets(ops);
    let mut out = String::new();

    for (ip, op) in ops.iter().enumerate() {
        let marker = if jump_targets.contains(&ip) { "►" } else { " " };
        out.push_str(&format!("{:04} {} {}\n", ip, marker, format_op(dict, op, ip)));
    }

    out
}

fn collect_jump_targets(ops: &[Op]) -> Vec<usize> {
    let mut targets = Vec::new();

    for (ip, op) in ops.iter().enumerate() {
        if let Op::Jump(offset) = op {
            let target = ip as i64 + *offset as i64;
            if target >= 0 && !targets.contains(&(target as usize)) {
                targets.push(target as usize);
            }
        }
    }

    targets
}

fn format_op(dict: &Dictionary, op: &Op, ip: usize) -> String {
    match op {
        Op::Call(target) => format!(
            "{:<11} {:<6} ; {}",
            op.mnemonic(),
            target.to_string(),
            dict.name_of(*target)
        ),
        Op::Jump(offset) => {
            let target = ip as i64 + *offset as i64;
            format!("{:<11} {:<6} ; -> {:04}", op.mnemonic(), offset, target)
        }
        Op::PushNum(n) => format!("{:<11} {}", op.mnemonic(), n),
        Op::Prompt | Op::Read | Op::Return => op.mnemonic().to_string(),
    }
}
