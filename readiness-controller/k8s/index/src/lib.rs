//! Kubernetes bindings for the readiness tracker.
//!
//! - [`KubeLister`] performs the bootstrap listing of each tracked kind.
//! - The typed indexes ([`templates`], [`config`], [`providers`]) are fed by
//!   `kubert::index` watches on the governing resources. They register the
//!   kinds each resource requires and report the resources themselves as
//!   observed.
//! - [`DynamicWatches`] follows the kinds registered in a tracker category,
//!   running a watch for each one and feeding a [`KindCache`], which reports
//!   objects as observed as they are applied.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
mod dynamic;
pub mod kinds;
mod lister;
pub mod providers;
pub mod templates;

pub use self::{
    dynamic::{DynamicWatches, KindCache},
    lister::KubeLister,
};
