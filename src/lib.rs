#[macro_use]
extern crate tracing;

pub mod api;
pub mod config;
pub mod helm;
pub mod kube_probe;
pub mod logging;
pub mod recovery;
pub mod store;
pub mod worker;
