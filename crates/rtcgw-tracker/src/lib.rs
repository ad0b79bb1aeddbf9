//! Client and wire types for the DHIS2-style tracker registry.
//!
//! This crate covers the registry side of the sync engine:
//!
//! - [`client`]: the [`RegistryClient`] trait and its reqwest-backed
//!   implementation [`HttpRegistryClient`]
//! - [`payload`]: create/update payloads sent to the registry
//! - [`response`]: the nested import-summary tree returned by the registry and
//!   the traversal that extracts references and conflicts from it
//!
//! Nothing here touches local state; callers own the ledger.

pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod response;

pub use client::{HttpRegistryClient, RegistryClient, RegistryResponse, TrackedEntitySearch};
pub use config::{AuthMethod, RegistryConfig, api_root};
pub use error::TrackerError;
pub use payload::{
    Attribute, DataValue, EnrollmentPayload, EventCreatePayload, EventUpdatePayload,
    EventsEnvelope, NestedEnrollment, NestedEvent, NestedTrackedEntity, TrackedEntityCreatePayload,
    TrackedEntityUpdatePayload, TrackerStatus,
};
pub use response::{
    Conflict, EventReferences, ImportResponse, ImportSummary, RootResponse, TrackedEntity,
    TrackedEntityAttribute, render_conflicts,
};
