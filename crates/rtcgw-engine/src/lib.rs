//! Reconciliation engine.
//!
//! Turns inbound client registrations and lab results into registry writes
//! while keeping the sync ledger consistent:
//!
//! - [`mapping`]: static field-role tables and the configured name → registry ID map
//! - [`builder`]: nested create/update payloads
//! - [`diagnosis`]: lab code → result label and diagnosis
//! - [`registration`]: idempotent client creation
//! - [`results`]: primary result updates and the laboratory program branch
//! - [`handlers`]: queue task handlers wrapping the reconcilers
//!
//! Work for the same external ID is serialized through [`KeyedLocks`]; the
//! ledger's unique key is the second line of defence against duplicates.

pub mod builder;
pub mod config;
pub mod context;
pub mod diagnosis;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod mapping;
pub mod records;
pub mod registration;
pub mod results;

pub use builder::{PayloadBuilder, Program};
pub use config::ProgramConfig;
pub use context::{ElementUpdate, SyncContext};
pub use diagnosis::{Diagnosed, Diagnosis, derive_diagnosis};
pub use error::EngineError;
pub use handlers::{ClientTaskHandler, ResultsTaskHandler, client_task, results_task};
pub use locks::{KeyedGuard, KeyedLocks};
pub use mapping::{FieldMapper, FieldRole, FieldSpec, MappedRecord, MappingTable};
pub use records::{ClientRegistration, LabResult, ValidationErrors};
pub use registration::{RegistrationOutcome, RegistrationReconciler, UpdateReport};
pub use results::{LabOutcome, ResultOutcome, ResultReconciler, ResultReport};
