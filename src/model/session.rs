use slotmap::SlotMap;
use tracing::info;

use crate::error::{Result, SessionError};

use super::{Color, Slice, Structure};

slotmap::new_key_type! {
    /// Unique identifier for a structure in the editing session.
    pub struct StructureId;
}

/// Where an accepted result is written.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTarget {
    /// Merge in place: every result slice replaces the target's slice at the
    /// same position; result slices that came out empty clear it.
    Existing(StructureId),
    /// Create a new structure with a caller-chosen name and colour.
    New { name: String, color: Color },
}

/// Owns every structure being edited.
///
/// Jobs read [`Session::snapshot`] copies; the stored structures change only
/// through [`Session::accept`] or direct edits.
#[derive(Debug, Default)]
pub struct Session {
    structures: SlotMap<StructureId, Structure>,
}

impl Session {
    /// Creates a new, empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a structure and returns its ID.
    pub fn add(&mut self, structure: Structure) -> StructureId {
        self.structures.insert(structure)
    }

    /// Removes and returns a structure.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StructureNotFound` if the ID is stale.
    pub fn remove(&mut self, id: StructureId) -> Result<Structure> {
        self.structures
            .remove(id)
            .ok_or_else(|| SessionError::StructureNotFound(format!("{id:?}")).into())
    }

    /// # Errors
    ///
    /// Returns `SessionError::StructureNotFound` if the ID is stale.
    pub fn get(&self, id: StructureId) -> Result<&Structure> {
        self.structures
            .get(id)
            .ok_or_else(|| SessionError::StructureNotFound(format!("{id:?}")).into())
    }

    /// # Errors
    ///
    /// Returns `SessionError::StructureNotFound` if the ID is stale.
    pub fn get_mut(&mut self, id: StructureId) -> Result<&mut Structure> {
        self.structures
            .get_mut(id)
            .ok_or_else(|| SessionError::StructureNotFound(format!("{id:?}")).into())
    }

    /// Deep copy of a structure, used as the immutable input of one job.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StructureNotFound` if the ID is stale.
    pub fn snapshot(&self, id: StructureId) -> Result<Structure> {
        self.get(id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StructureId, &Structure)> {
        self.structures.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Writes an operation result into the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StructureNotFound` when merging into a stale ID.
    pub fn accept(&mut self, slices: Vec<Slice>, target: OutputTarget) -> Result<StructureId> {
        match target {
            OutputTarget::Existing(id) => {
                let structure = self.get_mut(id)?;
                let count = slices.len();
                for slice in slices {
                    structure.set_slice(slice);
                }
                info!(name = %structure.name, slices = count, "merged result into structure");
                Ok(id)
            }
            OutputTarget::New { name, color } => {
                let structure = Structure::new(name, color).with_slices(slices);
                info!(name = %structure.name, "created structure from result");
                Ok(self.add(structure))
            }
        }
    }
}
