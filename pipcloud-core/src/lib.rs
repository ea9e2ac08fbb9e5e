#![doc = "pipcloud-core: core logic library for pipcloud."]

//! This crate contains the index maintenance and upload coordination logic for
//! pipcloud: the object-store contract, the persisted package manifest, the
//! HTML index renderer and the release pipeline that ties them together.
//! The concrete network client and all CLI glue live in the `pipcloud` binary
//! crate.
//!
//! # Usage
//! Add this as a dependency for anything that needs to publish artifacts or
//! maintain the package index against an [`store::ObjectStore`] implementation.

pub mod index;
pub mod release;
pub mod render;
pub mod store;
