use std::path::{Path, PathBuf};

use acs_storage::{SqliteStorage, StorageError};
use tempfile::TempDir;

use crate::node::TestNode;

/// Several independent engine instances, each with its own connection to the
/// same on-disk database.
pub struct TestFleet {
    _dir: TempDir,
    path: PathBuf,
    nodes: Vec<TestNode>,
}

impl TestFleet {
    pub fn new(size: usize) -> Result<Self, StorageError> {
        let dir = tempfile::tempdir()
            .map_err(|e| StorageError::Unavailable(format!("tempdir: {e}")))?;
        let path = dir.path().join("acs.db");
        let mut fleet = Self {
            _dir: dir,
            path,
            nodes: Vec::with_capacity(size),
        };
        for _ in 0..size {
            fleet.add_node()?;
        }
        Ok(fleet)
    }

    pub fn add_node(&mut self) -> Result<usize, StorageError> {
        let node = TestNode::with_storage(SqliteStorage::open(&self.path)?);
        let index = self.nodes.len();
        self.nodes.push(node);
        Ok(index)
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[TestNode] {
        &self.nodes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
