//! labrack core -- equipment slots, lab equipment and per-vessel lookup caches.
//!
//! This crate models the installable equipment racks of a space-station lab
//! and the experiments that run inside them. The host simulation drives it
//! synchronously from a single thread: every operation is a plain state
//! transition, and failures are rejected and logged rather than aborted.
//!
//! # Install Flow
//!
//! Installing equipment carried in a container into a lab walks down the
//! ownership chain, each level validating its own precondition:
//!
//! ```rust,ignore
//! let equipment = container.take().unwrap();
//! lab.install_lab_equipment(equipment)?;   // Lab: is there a slot of this type?
//! // -> EquipmentSlot::install            // Slot: does the type match?
//! // -> Equipment::install                // registers a Generator with the lab
//! ```
//!
//! # Capacity Queries
//!
//! "Which labs on this vessel have a free FIR slot" must be answerable every
//! frame. [`cache::VesselComponentCache`] indexes a vessel's components and
//! only rescans when the vessel identity or part count changes;
//! [`cache::FreeListCache`] adds an occupancy-driven free list on top.
//!
//! # Key Types
//!
//! - [`equipment_type::EquipmentType`] -- Closed set of rack types.
//! - [`registry::Registry`] -- Frozen catalog of equipment templates.
//! - [`equipment::Equipment`] -- One rack, with an optional experiment and
//!   an optional installation in a lab.
//! - [`slot::EquipmentSlot`] -- Fixed-type receptacle holding one rack.
//! - [`lab::Lab`] -- Generic lab parameterized by its slot signature.
//! - [`container::EquipmentContainer`] -- Transport holder for one rack.
//! - [`cache::VesselCaches`] -- The explicitly owned per-vessel caches.
//! - [`node::ConfigNode`] -- Hierarchical save record.

pub mod cache;
pub mod container;
pub mod equipment;
pub mod equipment_type;
pub mod experiment;
pub mod host;
pub mod id;
pub mod lab;
pub mod migration;
pub mod node;
pub mod registry;
pub mod resource;
pub mod slot;
pub mod snapshot;
pub mod vessel;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
