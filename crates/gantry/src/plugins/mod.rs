//! Built-in plugins.

mod cors;

pub use cors::{add_preflight_endpoints, CorsPlugin, CorsSettings};

use crate::hooks::Plugin;

/// Names accepted in the manifest's `plugins` list.
pub const BUILTIN: &[&str] = &["cors"];

/// Look up a built-in plugin by name.
pub fn builtin(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        "cors" => Some(Box::new(CorsPlugin)),
        _ => None,
    }
}
