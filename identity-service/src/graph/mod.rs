//! In-memory, id-indexed views of the tenant and role tables.
//!
//! Entities are held by id and relations walked through explicit lookups, so
//! traversal depth is bounded by the visited set even if stored data ever
//! contains a cycle.

pub mod roles;
pub mod tenants;

pub use roles::RoleIndex;
pub use tenants::TenantIndex;
