//! Readiness tracking for a policy controller.
//!
//! Before the controller enforces policy it must have observed every policy
//! object that already existed in the cluster when it started. The tracker
//! keeps a ledger per kind:
//!
//! - An [`ExpectationSet`] records which objects of a kind are expected and
//!   whether each has been observed. It is populated once the kind has been
//!   listed and satisfied once every expected object has been observed.
//! - A [`KindRegistrar`] maps governing objects (constraint templates, the
//!   `Config` resource) to the kinds they require, creating and retiring
//!   expectation sets as kinds come and go.
//! - The [`Tracker`] lists every registered kind at startup, keeps listing
//!   kinds as they are registered, and aggregates all sets into a single
//!   verdict.
//!
//! ```text
//! [ ConstraintTemplate ] -> [ constraint kind ] -> [ ExpectationSet ]
//! [ Config ]             -> [ synced kinds ]    -> [ ExpectationSet ]
//! ```

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod expectations;
mod gvk;
pub mod metrics;
pub mod registrar;
pub mod tracker;

pub use self::{
    expectations::{ExpectationSet, Stats},
    gvk::{Gvk, ObjectId},
    registrar::{KindRegistrar, SourceId},
    tracker::{
        Category, Error, KindReport, Listed, Lister, SharedTracker, TrackedKinds, Tracker,
    },
};
