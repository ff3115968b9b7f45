//! Cart Fixtures

use serde::Deserialize;

/// Cart fixture from YAML: one gallery key per unit, in the order they are added.
#[derive(Debug, Deserialize)]
pub struct CartFixture {
    /// Gallery keys
    pub items: Vec<String>,
}
