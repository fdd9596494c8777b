use crate::profile::{ProfileEntry, TargetLayout};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One copy operation: `source` from the extraction directory to `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOp {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Copy and delete operations that move the target folders to the selected state.
///
/// `copies` holds at most one operation per destination and never shares a destination
/// with `deletes`.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub copies: Vec<CopyOp>,
    pub deletes: BTreeSet<PathBuf>,
    /// Offered entries with no target directory for the enabled applications.
    pub unplaceable: Vec<ProfileEntry>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty() && self.deletes.is_empty()
    }

    pub fn copy_destinations(&self) -> BTreeSet<&Path> {
        self.copies.iter().map(|op| op.destination.as_path()).collect()
    }
}

/// Ordered map from destination to copy source; a later insert for the same destination
/// replaces the source but keeps the original position.
#[derive(Debug, Default)]
struct CopyTable {
    ops: Vec<CopyOp>,
    index: HashMap<PathBuf, usize>,
}

impl CopyTable {
    fn insert(&mut self, source: PathBuf, destination: PathBuf) {
        match self.index.get(&destination) {
            Some(&i) => {
                debug!(destination = %destination.display(), "duplicate destination, last selected entry wins");
                self.ops[i].source = source;
            }
            None => {
                self.index.insert(destination.clone(), self.ops.len());
                self.ops.push(CopyOp {
                    source,
                    destination,
                });
            }
        }
    }

    fn into_ops(self) -> Vec<CopyOp> {
        self.ops
    }
}

pub struct ReconciliationPlanner {
    layout: TargetLayout,
}

impl ReconciliationPlanner {
    pub fn new(layout: TargetLayout) -> Self {
        Self { layout }
    }

    /// Build a plan from the offered entries and a selection predicate.
    ///
    /// Only destinations that were offered, not selected, and exist as regular files are
    /// deleted. The plan has no memory of earlier runs.
    pub fn plan<F>(&self, offered: &[ProfileEntry], is_selected: F) -> Plan
    where
        F: Fn(&ProfileEntry) -> bool,
    {
        let mut known_destinations: BTreeSet<PathBuf> = BTreeSet::new();
        let mut selected_destinations: BTreeSet<PathBuf> = BTreeSet::new();
        let mut copies = CopyTable::default();
        let mut unplaceable = Vec::new();

        for entry in offered {
            let destination = match self.layout.destination_for(entry) {
                Some(dest) => dest,
                None => {
                    debug!(
                        application = %entry.application,
                        category = entry.category_label(),
                        file = %entry.file_name,
                        "no target directory, entry skipped"
                    );
                    unplaceable.push(entry.clone());
                    continue;
                }
            };

            known_destinations.insert(destination.clone());

            if is_selected(entry) {
                selected_destinations.insert(destination.clone());
                copies.insert(entry.source_path.clone(), destination);
            }
        }

        let deletes = known_destinations
            .difference(&selected_destinations)
            .filter(|path| path.is_file())
            .cloned()
            .collect();

        Plan {
            copies: copies.into_ops(),
            deletes,
            unplaceable,
        }
    }
}
