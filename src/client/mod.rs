use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub mod assignor;
pub mod consumer_group;
pub mod error;
mod heartbeat;
pub mod instrumentation;
pub mod membership;
pub mod offsets;

use crate::client::assignor::Assignor;
use crate::client::consumer_group::ConsumerGroup;
use crate::client::instrumentation::{Instrumentation, TracingInstrumentation};
use crate::connection::CoordinatorLink;
use crate::topic::Topic;
use crate::BackoffConfig;
use error::{Error, Result};

/// DEFAULT_SESSION_TIMEOUT_MS contains the default interval the coordinator will wait
/// for a heartbeat before marking a consumer as dead.
pub const DEFAULT_SESSION_TIMEOUT_MS: i32 = 30 * 1000;

/// DEFAULT_REBALANCE_TIMEOUT_MS contains the amount of time the coordinator will wait
/// for consumers to issue a join group once a rebalance has been requested.
pub const DEFAULT_REBALANCE_TIMEOUT_MS: i32 = 60 * 1000;

/// DEFAULT_HEARTBEAT_INTERVAL_MS is the expected time between heartbeats, it
/// should be no more than a third of the session timeout.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: i32 = 3 * 1000;

/// Number of failed join attempts after which a rejoin gives up.
pub const DEFAULT_MAX_REJOIN_ATTEMPTS: usize = 5;

/// Settings of one consumer group, validated.
#[derive(Debug, Clone)]
pub(crate) struct GroupConfig {
    pub(crate) group_id: String,
    pub(crate) group_instance_id: Option<String>,
    pub(crate) session_timeout: Duration,
    pub(crate) rebalance_timeout: Duration,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) backoff: BackoffConfig,
}

impl GroupConfig {
    pub(crate) fn session_timeout_ms(&self) -> i32 {
        duration_ms(self.session_timeout).unwrap_or(DEFAULT_SESSION_TIMEOUT_MS)
    }

    pub(crate) fn rebalance_timeout_ms(&self) -> i32 {
        duration_ms(self.rebalance_timeout).unwrap_or(DEFAULT_REBALANCE_TIMEOUT_MS)
    }
}

fn duration_ms(d: Duration) -> Option<i32> {
    i32::try_from(d.as_millis()).ok()
}

/// Builder for [`ConsumerGroup`].
#[derive(Debug)]
pub struct ConsumerGroupBuilder {
    group_id: String,
    topics: Vec<Topic>,
    group_instance_id: Option<String>,
    session_timeout: Duration,
    rebalance_timeout: Duration,
    heartbeat_interval: Duration,
    backoff: BackoffConfig,
    instrumentation: Arc<dyn Instrumentation>,
}

impl ConsumerGroupBuilder {
    /// Create a new [`ConsumerGroupBuilder`] for `group_id` subscribing `topics`.
    pub fn new(group_id: impl Into<String>, topics: Vec<Topic>) -> Self {
        Self {
            group_id: group_id.into(),
            topics,
            group_instance_id: None,
            session_timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS as u64),
            rebalance_timeout: Duration::from_millis(DEFAULT_REBALANCE_TIMEOUT_MS as u64),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS as u64),
            backoff: BackoffConfig {
                max_attempts: Some(DEFAULT_MAX_REJOIN_ATTEMPTS),
                ..Default::default()
            },
            instrumentation: Arc::new(TracingInstrumentation),
        }
    }

    /// Makes this a static member.
    ///
    /// The coordinator keeps the registration of a static member when it
    /// disconnects, so restarting it with the same id does not cause a
    /// rebalance. Static members never send a leave request.
    pub fn group_instance_id(mut self, group_instance_id: impl Into<String>) -> Self {
        self.group_instance_id = Some(group_instance_id.into());
        self
    }

    pub fn session_timeout(mut self, session_timeout: Duration) -> Self {
        self.session_timeout = session_timeout;
        self
    }

    pub fn rebalance_timeout(mut self, rebalance_timeout: Duration) -> Self {
        self.rebalance_timeout = rebalance_timeout;
        self
    }

    pub fn heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Backoff between join attempts while rejoining.
    ///
    /// `max_attempts` bounds how often a rejoin is tried before the group is
    /// considered lost.
    pub fn backoff_config(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// Build [`ConsumerGroup`]. Nothing is sent before [`ConsumerGroup::join`].
    pub fn build<L>(self, link: L, assignor: Arc<dyn Assignor>) -> Result<ConsumerGroup<L>>
    where
        L: CoordinatorLink + 'static,
    {
        self.validate()?;

        let config = GroupConfig {
            group_id: self.group_id,
            group_instance_id: self.group_instance_id,
            session_timeout: self.session_timeout,
            rebalance_timeout: self.rebalance_timeout,
            heartbeat_interval: self.heartbeat_interval,
            backoff: self.backoff,
        };

        Ok(ConsumerGroup::new(
            link,
            config,
            self.topics,
            assignor,
            self.instrumentation,
        ))
    }

    fn validate(&self) -> Result<()> {
        if self.group_id.is_empty() {
            return Err(Error::InvalidConfig("group id must not be empty".to_string()));
        }

        validate_topics(&self.topics)?;

        if matches!(&self.group_instance_id, Some(id) if id.is_empty()) {
            return Err(Error::InvalidConfig(
                "group instance id must not be empty".to_string(),
            ));
        }

        for (name, timeout) in [
            ("session timeout", self.session_timeout),
            ("rebalance timeout", self.rebalance_timeout),
        ] {
            if duration_ms(timeout).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "{name} of {timeout:?} is too large"
                )));
            }
        }

        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= self.session_timeout {
            return Err(Error::InvalidConfig(format!(
                "heartbeat interval {:?} must be positive and below the session timeout {:?}",
                self.heartbeat_interval, self.session_timeout
            )));
        }

        if self.backoff.init_backoff.is_zero() || self.backoff.base <= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "backoff needs a positive initial backoff and a base above 1, got {:?}",
                self.backoff
            )));
        }

        Ok(())
    }
}

/// Subscriptions need at least one topic, each named once.
pub(crate) fn validate_topics(topics: &[Topic]) -> Result<()> {
    if topics.is_empty() {
        return Err(Error::InvalidConfig(
            "at least one topic is required".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for topic in topics {
        if topic.name.is_empty() {
            return Err(Error::InvalidConfig("topic name must not be empty".to_string()));
        }
        if !seen.insert(topic.name.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "topic {} is subscribed twice",
                topic.name
            )));
        }
    }

    Ok(())
}
