//! Structural checks over built function bodies.

use super::*;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanityIssue {
    MissingTerminator { block: BlockId },
    TerminatorNotLast { block: BlockId, index: usize },
    SuccessorCount { block: BlockId, expected: usize, found: usize },
    EdgeMismatch { from: BlockId, to: BlockId },
    PhiArity { block: BlockId, edges: usize, preds: usize },
    NoPredecessors { block: BlockId },
    DuplicateResult { reg: Reg },
}

#[derive(Debug, Clone, Default)]
pub struct SanityReport {
    pub issues: Vec<SanityIssue>,
    /// Non-entry blocks without predecessors.
    pub unreachable: Vec<BlockId>,
}

impl SanityReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Blocks reachable from the entry, or from the recover block when present.
pub fn reachable_blocks(body: &FunctionBody) -> HashSet<BlockId> {
    let mut seen = HashSet::new();
    let mut work: Vec<BlockId> = vec![0];
    work.extend(body.recover);
    while let Some(b) = work.pop() {
        if b >= body.blocks.len() || !seen.insert(b) {
            continue;
        }
        work.extend(body.blocks[b].succs.iter().copied());
    }
    seen
}

pub fn check_function(func: &Function) -> SanityReport {
    let mut report = SanityReport::default();
    let Some(body) = func.body() else {
        return report;
    };
    let mut defined = HashSet::new();
    let roots: HashSet<BlockId> = std::iter::once(0).chain(body.recover).collect();

    for block in &body.blocks {
        let id = block.index;
        match block.instrs.last() {
            Some(last) if last.kind.is_terminator() => {
                if let Some(expected) = last.kind.successor_count() {
                    if expected != block.succs.len() {
                        report.issues.push(SanityIssue::SuccessorCount {
                            block: id,
                            expected,
                            found: block.succs.len(),
                        });
                    }
                }
            }
            _ => report.issues.push(SanityIssue::MissingTerminator { block: id }),
        }
        for (index, instr) in block.instrs.iter().enumerate() {
            if instr.kind.is_terminator() && index + 1 != block.instrs.len() {
                report
                    .issues
                    .push(SanityIssue::TerminatorNotLast { block: id, index });
            }
            if let Some(reg) = instr.result {
                if !defined.insert(reg) {
                    report.issues.push(SanityIssue::DuplicateResult { reg });
                }
            }
        }
        for phi in block.phis() {
            if let InstrKind::Phi { edges, .. } = &phi.kind {
                if edges.len() != block.preds.len() {
                    report.issues.push(SanityIssue::PhiArity {
                        block: id,
                        edges: edges.len(),
                        preds: block.preds.len(),
                    });
                }
            }
        }
        for &succ in &block.succs {
            let mirrored = body
                .blocks
                .get(succ)
                .map(|s| s.preds.contains(&id))
                .unwrap_or(false);
            if !mirrored {
                report.issues.push(SanityIssue::EdgeMismatch { from: id, to: succ });
            }
        }
        for &pred in &block.preds {
            let mirrored = body
                .blocks
                .get(pred)
                .map(|p| p.succs.contains(&id))
                .unwrap_or(false);
            if !mirrored {
                report.issues.push(SanityIssue::EdgeMismatch { from: pred, to: id });
            }
        }
        if !roots.contains(&id) && block.preds.is_empty() {
            report.unreachable.push(id);
        }
    }

    let reachable = reachable_blocks(body);
    for block in &body.blocks {
        if reachable.contains(&block.index) && !roots.contains(&block.index) && block.preds.is_empty() {
            report
                .issues
                .push(SanityIssue::NoPredecessors { block: block.index });
        }
    }
    report
}
