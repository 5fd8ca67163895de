use std::convert::TryFrom;
use tokio::time::Duration;

/// Tuning knobs for a partition replica. Anything left as `None` gets a default.
#[derive(Clone, Debug, Default)]
pub struct RaftOptions {
    pub leader_heartbeat_duration: Option<Duration>,
    pub follower_min_timeout: Option<Duration>,
    pub follower_max_timeout: Option<Duration>,
    pub leader_append_timeout: Option<Duration>,
    /// How often the replica looks at its clock. All timeouts are only as precise as this.
    pub tick_interval: Option<Duration>,
    /// Max log entries per AppendRequest.
    pub max_append_batch: Option<usize>,
    pub actor_queue_size: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct RaftOptionsValidated {
    pub leader_heartbeat_duration: Duration,
    pub follower_min_timeout: Duration,
    pub follower_max_timeout: Duration,
    pub leader_append_timeout: Duration,
    pub tick_interval: Duration,
    pub max_append_batch: usize,
    pub actor_queue_size: usize,
}

impl RaftOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.leader_heartbeat_duration >= self.follower_min_timeout {
            return Err("Follower minimum timeout must be greater than leader's heartbeat");
        }
        if self.follower_min_timeout >= self.follower_max_timeout {
            return Err("Follower minimum timeout must be less than maximum timeout");
        }
        if self.leader_append_timeout >= self.follower_min_timeout {
            return Err("Leader's append timeout must be less than the follower's minimum timeout");
        }
        if self.tick_interval.as_nanos() == 0 || self.tick_interval > self.leader_heartbeat_duration {
            return Err("Tick interval must be positive and no greater than leader's heartbeat");
        }
        if self.max_append_batch == 0 {
            return Err("Append batch size must be at least 1");
        }
        if self.actor_queue_size == 0 {
            return Err("Actor queue size must be at least 1");
        }

        Ok(())
    }
}

impl TryFrom<RaftOptions> for RaftOptionsValidated {
    type Error = &'static str;

    fn try_from(options: RaftOptions) -> Result<Self, Self::Error> {
        let values = RaftOptionsValidated {
            leader_heartbeat_duration: options.leader_heartbeat_duration.unwrap_or(Duration::from_millis(100)),
            follower_min_timeout: options.follower_min_timeout.unwrap_or(Duration::from_millis(500)),
            follower_max_timeout: options.follower_max_timeout.unwrap_or(Duration::from_millis(1500)),
            leader_append_timeout: options.leader_append_timeout.unwrap_or(Duration::from_millis(300)),
            tick_interval: options.tick_interval.unwrap_or(Duration::from_millis(20)),
            max_append_batch: options.max_append_batch.unwrap_or(64),
            actor_queue_size: options.actor_queue_size.unwrap_or(1024),
        };

        values.validate()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let validated = RaftOptionsValidated::try_from(RaftOptions::default()).unwrap();
        assert_eq!(validated.tick_interval, Duration::from_millis(20));
        assert_eq!(validated.max_append_batch, 64);
    }

    #[test]
    fn rejects_inconsistent_timeouts() {
        let heartbeat_too_slow = RaftOptions {
            leader_heartbeat_duration: Some(Duration::from_millis(600)),
            ..RaftOptions::default()
        };
        assert!(RaftOptionsValidated::try_from(heartbeat_too_slow).is_err());

        let inverted_range = RaftOptions {
            follower_min_timeout: Some(Duration::from_millis(900)),
            follower_max_timeout: Some(Duration::from_millis(800)),
            ..RaftOptions::default()
        };
        assert!(RaftOptionsValidated::try_from(inverted_range).is_err());

        let coarse_ticks = RaftOptions {
            tick_interval: Some(Duration::from_millis(150)),
            ..RaftOptions::default()
        };
        assert!(RaftOptionsValidated::try_from(coarse_ticks).is_err());

        let empty_batches = RaftOptions {
            max_append_batch: Some(0),
            ..RaftOptions::default()
        };
        assert!(RaftOptionsValidated::try_from(empty_batches).is_err());
    }
}
