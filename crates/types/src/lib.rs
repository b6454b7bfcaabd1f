//! Shared value model for Viewforge.
//!
//! This crate defines the two sides of a projection: the source side
//! ([`Entity`], [`SourceValue`], [`LazyReference`]) and the view side
//! ([`ViewHandle`], [`ViewValue`]), plus the declared field shapes
//! ([`FieldKind`]) and caller roles ([`RoleSet`]) the engine reasons about.

mod entity;
mod kind;
mod roles;
mod view;

pub use entity::{Entity, EntityKey, EntityLoader, EntityRecord, EntityType, LazyReference, SourceValue};
pub use kind::{FieldKind, ValueKind};
pub use roles::RoleSet;
pub use view::{ViewData, ViewHandle, ViewTypeId, ViewValue};
