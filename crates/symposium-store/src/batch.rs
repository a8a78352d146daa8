//! Atomic multi-document write batches.
//!
//! A batch is the store's only atomicity primitive: the ops inside one batch
//! are applied all-or-nothing at commit.  A batch may touch documents in any
//! number of collections; ops apply in insertion order, so a later op sees
//! the staged effect of an earlier op on the same document.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::document::{to_object, FieldOp};
use crate::error::Result;

#[derive(Debug, Clone)]
pub(crate) enum BatchOp {
    Create {
        collection: String,
        id: String,
        data: Map<String, Value>,
    },
    Set {
        collection: String,
        id: String,
        data: Map<String, Value>,
        merge: bool,
    },
    Update {
        collection: String,
        id: String,
        fields: Vec<(String, FieldOp)>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// A buffered set of writes committed atomically via [`DocStore::commit`].
///
/// [`DocStore::commit`]: crate::DocStore::commit
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-if-absent: the commit fails with `AlreadyExists` when the id
    /// is already taken.
    pub fn create<T: Serialize>(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self> {
        self.ops.push(BatchOp::Create {
            collection: collection.into(),
            id: id.into(),
            data: to_object(value)?,
        });
        Ok(self)
    }

    /// Unconditional overwrite (upsert).
    pub fn set<T: Serialize>(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self> {
        self.ops.push(BatchOp::Set {
            collection: collection.into(),
            id: id.into(),
            data: to_object(value)?,
            merge: false,
        });
        Ok(self)
    }

    /// Shallow merge into the existing document (creating it if absent).
    pub fn set_merge<T: Serialize>(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self> {
        self.ops.push(BatchOp::Set {
            collection: collection.into(),
            id: id.into(),
            data: to_object(value)?,
            merge: true,
        });
        Ok(self)
    }

    /// Apply field transforms to an existing document; the commit fails with
    /// `NotFound` when the document is absent at commit time.
    pub fn update(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Vec<(String, FieldOp)>,
    ) -> &mut Self {
        self.ops.push(BatchOp::Update {
            collection: collection.into(),
            id: id.into(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}
