use serde::{
    Deserialize,
    Serialize,
};
use strum::{
    Display,
    EnumIter,
    EnumString,
};

/// How a view combines the observations recorded during an interval.
#[derive(Debug, Default, Clone, Copy, Display, EnumIter, EnumString, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AggregationKind {
    /// The most recent observation wins.
    #[default]
    LastValue,
    /// Observations are added up.
    Sum,
    /// Observations are counted, their values ignored.
    Count,
}
