//! In-memory representation of a recorded key-value workload.
//!
//! A workload is an ordered list of [`QueryDescriptor`]s, each wrapping one
//! [`Operation`]. Workloads are produced by [`loader::load`] and are read-only
//! afterwards, so the same workload can be replayed any number of times.

pub mod error;
pub mod loader;

use std::fmt;
use std::path::{Path, PathBuf};

pub use error::WorkloadError;
pub use loader::{load, parse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    RangeDelete,
    Lookup,
    RangeLookup,
}

impl OperationKind {
    pub fn from_opcode(opcode: char) -> Option<Self> {
        match opcode {
            'I' => Some(OperationKind::Insert),
            'U' => Some(OperationKind::Update),
            'D' => Some(OperationKind::Delete),
            'R' => Some(OperationKind::RangeDelete),
            'Q' => Some(OperationKind::Lookup),
            'S' => Some(OperationKind::RangeLookup),
            _ => None,
        }
    }

    pub fn opcode(self) -> char {
        match self {
            OperationKind::Insert => 'I',
            OperationKind::Update => 'U',
            OperationKind::Delete => 'D',
            OperationKind::RangeDelete => 'R',
            OperationKind::Lookup => 'Q',
            OperationKind::RangeLookup => 'S',
        }
    }

    /// Number of whitespace separated arguments following the opcode.
    pub fn arity(self) -> usize {
        match self {
            OperationKind::Delete | OperationKind::Lookup => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "point delete",
            OperationKind::RangeDelete => "range delete",
            OperationKind::Lookup => "point lookup",
            OperationKind::RangeLookup => "range lookup",
        };
        f.write_str(name)
    }
}

/// One unit of replay work. Each variant owns its payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert { key: String, value: String },
    Update { key: String, value: String },
    Delete { key: String },
    RangeDelete { start: String, end: String },
    Lookup { key: String },
    RangeLookup { start: String, end: String },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Insert { .. } => OperationKind::Insert,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::RangeDelete { .. } => OperationKind::RangeDelete,
            Operation::Lookup { .. } => OperationKind::Lookup,
            Operation::RangeLookup { .. } => OperationKind::RangeLookup,
        }
    }

    // args must hold at least `kind.arity()` tokens
    fn from_args(kind: OperationKind, args: &[&str]) -> Self {
        let first = args[0].to_string();
        match kind {
            OperationKind::Insert => Operation::Insert {
                key: first,
                value: args[1].to_string(),
            },
            OperationKind::Update => Operation::Update {
                key: first,
                value: args[1].to_string(),
            },
            OperationKind::Delete => Operation::Delete { key: first },
            OperationKind::RangeDelete => Operation::RangeDelete {
                start: first,
                end: args[1].to_string(),
            },
            OperationKind::Lookup => Operation::Lookup { key: first },
            OperationKind::RangeLookup => Operation::RangeLookup {
                start: first,
                end: args[1].to_string(),
            },
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opcode = self.kind().opcode();
        match self {
            Operation::Insert { key, value } | Operation::Update { key, value } => {
                write!(f, "{} {} {}", opcode, key, value)
            }
            Operation::Delete { key } | Operation::Lookup { key } => write!(f, "{} {}", opcode, key),
            Operation::RangeDelete { start, end } | Operation::RangeLookup { start, end } => {
                write!(f, "{} {} {}", opcode, start, end)
            }
        }
    }
}

/// An operation together with its 1-based position in the workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub seq: u64,
    pub op: Operation,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadCounts {
    pub insert_num: u64,
    pub update_num: u64,
    pub pdelete_num: u64,
    pub rdelete_num: u64,
    pub plookup_num: u64,
    pub rlookup_num: u64,
    pub total_num: u64,
}

impl WorkloadCounts {
    fn count(&mut self, kind: OperationKind) {
        match kind {
            OperationKind::Insert => self.insert_num += 1,
            OperationKind::Update => self.update_num += 1,
            OperationKind::Delete => self.pdelete_num += 1,
            OperationKind::RangeDelete => self.rdelete_num += 1,
            OperationKind::Lookup => self.plookup_num += 1,
            OperationKind::RangeLookup => self.rlookup_num += 1,
        }
        self.total_num += 1;
    }

    /// Operations that mutate the store.
    pub fn ingestion_num(&self) -> u64 {
        self.insert_num + self.update_num + self.pdelete_num + self.rdelete_num
    }
}

#[derive(Debug, Default, Clone)]
pub struct Workload {
    path: Option<PathBuf>,
    queries: Vec<QueryDescriptor>,
    counts: WorkloadCounts,
    actual_insert_num: u64,
    actual_total_num: u64,
}

impl Workload {
    pub fn from_operations<I>(operations: I) -> Self
    where
        I: IntoIterator<Item = Operation>,
    {
        let mut workload = Workload::default();
        for op in operations {
            workload.push(op);
        }
        workload.seal();
        workload
    }

    pub(crate) fn push(&mut self, op: Operation) {
        self.counts.count(op.kind());
        let seq = self.queries.len() as u64 + 1;
        self.queries.push(QueryDescriptor { seq, op });
    }

    // fixes the replay ceilings once parsing is done
    pub(crate) fn seal(&mut self) {
        self.actual_insert_num = self.counts.insert_num;
        self.actual_total_num = self.counts.total_num;
    }

    pub(crate) fn set_path(&mut self, path: &Path) {
        self.path = Some(path.to_path_buf());
    }

    /// Caps the number of inserts executed during replay. Inserts beyond the
    /// cap are skipped, which turns later lookups of those keys into
    /// zero-result lookups.
    pub fn with_insert_cap(mut self, cap: u64) -> Self {
        self.actual_insert_num = cap;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn queries(&self) -> &[QueryDescriptor] {
        &self.queries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryDescriptor> {
        self.queries.iter()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn counts(&self) -> &WorkloadCounts {
        &self.counts
    }

    pub fn total_num(&self) -> u64 {
        self.counts.total_num
    }

    pub fn actual_insert_num(&self) -> u64 {
        self.actual_insert_num
    }

    pub fn actual_total_num(&self) -> u64 {
        self.actual_total_num
    }
}

impl<'a> IntoIterator for &'a Workload {
    type Item = &'a QueryDescriptor;
    type IntoIter = std::slice::Iter<'a, QueryDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.queries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops() -> Vec<Operation> {
        vec![
            Operation::Insert {
                key: "k1".to_string(),
                value: "v1".to_string(),
            },
            Operation::Lookup {
                key: "k1".to_string(),
            },
            Operation::RangeLookup {
                start: "a".to_string(),
                end: "z".to_string(),
            },
        ]
    }

    #[test]
    fn test_from_operations_numbers_sequentially() {
        let workload = Workload::from_operations(ops());

        let seqs: Vec<u64> = workload.iter().map(|qd| qd.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        for (idx, qd) in workload.iter().enumerate() {
            assert_eq!(qd.seq, idx as u64 + 1);
        }
    }

    #[test]
    fn test_counts_sum_to_total() {
        let workload = Workload::from_operations(ops());
        let counts = workload.counts();

        assert_eq!(counts.insert_num, 1);
        assert_eq!(counts.plookup_num, 1);
        assert_eq!(counts.rlookup_num, 1);
        assert_eq!(counts.ingestion_num(), 1);
        assert_eq!(
            counts.insert_num
                + counts.update_num
                + counts.pdelete_num
                + counts.rdelete_num
                + counts.plookup_num
                + counts.rlookup_num,
            counts.total_num
        );
        assert_eq!(counts.total_num as usize, workload.len());
    }

    #[test]
    fn test_insert_cap_defaults_to_insert_num() {
        let workload = Workload::from_operations(ops());
        assert_eq!(workload.actual_insert_num(), 1);
        assert_eq!(workload.actual_total_num(), 3);

        let capped = workload.with_insert_cap(0);
        assert_eq!(capped.actual_insert_num(), 0);
        assert_eq!(capped.counts().insert_num, 1);
    }

    #[test]
    fn test_display_renders_workload_line() {
        let rendered: Vec<String> = ops().iter().map(|op| op.to_string()).collect();
        assert_eq!(rendered, vec!["I k1 v1", "Q k1", "S a z"]);
    }

    #[test]
    fn test_opcode_mapping() {
        for opcode in ['I', 'U', 'D', 'R', 'Q', 'S'] {
            let kind = OperationKind::from_opcode(opcode).unwrap();
            assert_eq!(kind.opcode(), opcode);
        }
        assert_eq!(OperationKind::from_opcode('X'), None);
        assert_eq!(OperationKind::Delete.arity(), 1);
        assert_eq!(OperationKind::RangeLookup.arity(), 2);
    }
}
