//! Cucumber BDD scenarios for fanpoll-core
//!
//! Step definitions live under [`features::steps`]; the `.feature` files
//! are in the crate's `features/` directory and run through the
//! `scenarios` test target.

pub mod features;
