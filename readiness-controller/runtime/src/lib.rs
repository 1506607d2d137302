#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use readiness_controller_core as core;
pub use readiness_controller_k8s_api as k8s;
pub use readiness_controller_k8s_index as index;

mod args;
mod probe;

pub use self::args::Args;
