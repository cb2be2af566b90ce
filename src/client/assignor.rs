//! Partition assignment, computed by the group leader.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::client::error::{Error, Result};
use crate::protocol::messages::{
    ConsumerGroupMemberAssignment, JoinGroupResponseMember, PartitionAssignment,
    SyncGroupRequestAssignment,
};
use crate::topic::Topic;

/// Partition assignments keyed by member id.
pub type AssignmentPlan = BTreeMap<String, Vec<PartitionAssignment>>;

/// Strategy distributing partitions over the members of a generation.
///
/// Only the member elected leader calls [`assign`](Self::assign), once per
/// generation, before syncing the group.
pub trait Assignor: Debug + Send + Sync {
    /// Protocol name announced when joining, e.g. `range`.
    fn name(&self) -> &str;

    /// Assigns the partitions of `topics` to `members`.
    ///
    /// Members left out of the plan receive no partitions.
    fn assign(&self, topics: &[Topic], members: &[JoinGroupResponseMember])
        -> Result<AssignmentPlan>;
}

/// Checks a plan against the members of the generation and turns it into the
/// assignments sent with the sync request, one per member.
pub(crate) fn validate_plan(
    plan: AssignmentPlan,
    members: &[JoinGroupResponseMember],
) -> Result<Vec<SyncGroupRequestAssignment>> {
    let known: BTreeSet<_> = members.iter().map(|m| m.member_id.as_str()).collect();

    if let Some(unknown) = plan.keys().find(|id| !known.contains(id.as_str())) {
        return Err(Error::InvalidAssignment(format!(
            "member {unknown} is not part of the generation"
        )));
    }

    let mut assigned = BTreeSet::new();
    for (member_id, topics) in &plan {
        for topic in topics {
            for partition in &topic.partitions {
                if !assigned.insert((topic.topic.as_str(), *partition)) {
                    return Err(Error::InvalidAssignment(format!(
                        "{}/{partition} assigned twice, last to {member_id}",
                        topic.topic
                    )));
                }
            }
        }
    }

    let mut plan = plan;
    Ok(members
        .iter()
        .map(|member| SyncGroupRequestAssignment {
            member_id: member.member_id.clone(),
            assignment: ConsumerGroupMemberAssignment::new(
                plan.remove(&member.member_id).unwrap_or_default(),
            ),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn member(id: &str) -> JoinGroupResponseMember {
        JoinGroupResponseMember {
            member_id: id.to_string(),
            group_instance_id: None,
            metadata: Default::default(),
        }
    }

    fn partitions(topic: &str, partitions: &[i32]) -> PartitionAssignment {
        PartitionAssignment {
            topic: topic.to_string(),
            partitions: partitions.to_vec(),
        }
    }

    #[test]
    fn omitted_members_get_nothing() {
        let members = [member("m1"), member("m2")];
        let plan = AssignmentPlan::from([("m2".to_string(), vec![partitions("t", &[0, 1])])]);

        let assignments = validate_plan(plan, &members).unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].member_id, "m1");
        assert_eq!(assignments[0].assignment.partition_count(), 0);
        assert_eq!(assignments[1].member_id, "m2");
        assert_eq!(assignments[1].assignment.topics, vec![partitions("t", &[0, 1])]);
    }

    #[test]
    fn rejects_unknown_member() {
        let plan = AssignmentPlan::from([("m9".to_string(), vec![partitions("t", &[0])])]);
        assert_matches!(
            validate_plan(plan, &[member("m1")]),
            Err(Error::InvalidAssignment(_))
        );
    }

    #[test]
    fn rejects_double_assignment() {
        let plan = AssignmentPlan::from([
            ("m1".to_string(), vec![partitions("t", &[0, 1])]),
            ("m2".to_string(), vec![partitions("t", &[1])]),
        ]);
        assert_matches!(
            validate_plan(plan, &[member("m1"), member("m2")]),
            Err(Error::InvalidAssignment(_))
        );

        // the same partition number of another topic is fine
        let plan = AssignmentPlan::from([
            ("m1".to_string(), vec![partitions("t", &[0])]),
            ("m2".to_string(), vec![partitions("u", &[0])]),
        ]);
        validate_plan(plan, &[member("m1"), member("m2")]).unwrap();
    }
}
