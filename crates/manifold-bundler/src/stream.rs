//! Append-only diagnostic stream shared by every target of one invocation.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::diagnostics::Diagnostic;

#[derive(Debug, Default)]
struct StreamState {
    /// (target index, sequence within that target, diagnostic)
    reported: Vec<(usize, usize, Diagnostic)>,
    next_seq: Vec<usize>,
    suppressed: IndexMap<String, usize>,
}

/// Collects reported diagnostics and suppression counts.
///
/// Targets append concurrently; `finish` orders the result by target
/// declaration order, then by emission order within each target, so the
/// report does not depend on which task finished first.
#[derive(Debug)]
pub struct DiagnosticStream {
    state: Mutex<StreamState>,
}

impl DiagnosticStream {
    pub fn new(targets: usize) -> Self {
        Self {
            state: Mutex::new(StreamState {
                next_seq: vec![0; targets],
                ..Default::default()
            }),
        }
    }

    pub fn report(&self, target_index: usize, diagnostic: Diagnostic) {
        let mut state = self.state.lock();
        if state.next_seq.len() <= target_index {
            state.next_seq.resize(target_index + 1, 0);
        }
        let seq = state.next_seq[target_index];
        state.next_seq[target_index] += 1;
        state.reported.push((target_index, seq, diagnostic));
    }

    pub fn suppress(&self, rule: &str) {
        *self.state.lock().suppressed.entry(rule.to_string()).or_insert(0) += 1;
    }

    /// Drain the stream: reported diagnostics in report order, plus
    /// suppression counts per rule.
    pub fn finish(&self) -> (Vec<Diagnostic>, IndexMap<String, usize>) {
        let mut state = std::mem::take(&mut *self.state.lock());
        state.reported.sort_by_key(|(target, seq, _)| (*target, *seq));
        state.suppressed.sort_keys();
        let diagnostics = state.reported.into_iter().map(|(_, _, d)| d).collect();
        (diagnostics, state.suppressed)
    }
}
