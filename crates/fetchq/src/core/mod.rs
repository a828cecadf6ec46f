//! Pure transformations and policy decisions for queued fetching.
//!
//! Nothing in this module performs I/O: configuration validation, the
//! admission and retry predicates, transport selection and the default body
//! decoder are all plain functions of their inputs.

mod decode;
mod policy;
mod transport;
mod validation;

pub use decode::{decode_body, is_json_content_type};
pub use policy::{can_admit, should_retry};
pub use transport::{TransportSelector, url_scheme};
pub use validation::validate_job_config;
