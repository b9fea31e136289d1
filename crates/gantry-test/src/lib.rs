//! Test harnesses for gantry.
//!
//! Provides `ProjectFixture` for on-disk projects and in-memory doubles of
//! the AWS providers for end-to-end pipeline tests.

#[cfg(test)]
pub mod cli;
pub mod fixture;
pub mod mocks;
#[cfg(test)]
pub mod pipeline;

pub use fixture::{FixtureError, ProjectFixture};
pub use mocks::{MockApiGateway, MockFunctions, StaticRoles};
