use std::collections::BTreeSet;

/// A subscribed topic and the partitions known for it.
///
/// The group leader hands these to the [`Assignor`](crate::client::assignor::Assignor)
/// when computing the plan for the generation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Topic {
    /// The name of this topic.
    pub name: String,

    /// Partition indexes
    pub partitions: BTreeSet<i32>,
}

impl Topic {
    pub fn new(name: impl Into<String>, partitions: impl IntoIterator<Item = i32>) -> Self {
        Self {
            name: name.into(),
            partitions: partitions.into_iter().collect(),
        }
    }
}
