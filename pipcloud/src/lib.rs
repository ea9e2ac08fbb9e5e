//! pipcloud binary crate: CLI glue, the external build step and the concrete
//! S3 object-store client. All index and upload logic lives in
//! `pipcloud-core`.

pub mod cli;
pub mod dist;
pub mod s3;
