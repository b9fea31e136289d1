//! Endpoint and API specifications assembled from directory trees.
//!
//! Specification fragments (`spec.json` / `spec.yaml`) are deep-merged along
//! a directory path, turned into [`Endpoint`]s and [`Api`]s, and aggregated
//! into Swagger documents that API Gateway can import.

pub mod api;
pub mod document;
pub mod endpoint;
pub mod error;
pub mod loader;
pub mod merger;
pub mod method;
pub mod view;

pub use api::{Api, ApiState, RemoteApi};
pub use document::{deep_merge, Document};
pub use endpoint::{Endpoint, EndpointKey};
pub use error::SpecError;
pub use loader::{load_apis, load_endpoints};
pub use merger::{load_merged, read_fragment};
pub use method::HttpMethod;
pub use view::SpecView;

/// Key of the application extension block in every specification.
pub const EXTENSION_KEY: &str = "x-gantry";
