use serde::{Deserialize, Serialize};

/// What the dose tolerance is a percentage of.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Percentage of the maximum reference dose.
    #[default]
    Global,
    /// Percentage of the reference dose interpolated at the probe position.
    Local,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    Sequential,
    #[default]
    Parallel,
}
