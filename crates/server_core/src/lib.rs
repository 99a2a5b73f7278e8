//! Server-side active-object bookkeeping.
//!
//! The simulation owns one [`ActiveObjectMgr`]; it composes the owning
//! [`ObjectTable`] with the cell-bucketed [`SpatialMap`] and mediates every
//! structural change through both. Queries (box, radius, visibility diff)
//! are reentrant: their callbacks may register, remove, or move objects on
//! the same manager mid-traversal.

pub mod active_object_mgr;
pub mod object_table;
pub mod spatial_map;
pub mod telemetry;

pub use active_object_mgr::ActiveObjectMgr;
pub use object_table::{ObjectHandle, ObjectTable};
pub use spatial_map::{CELL_SIZE, SpatialKey, SpatialMap};
