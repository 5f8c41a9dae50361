pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{ProjectFixture, seeded_bytes};
