//! Timestamp perturbation of transmit events.
//!
//! On the first insert of a branch, a single symbolic delay is bound. The
//! `first_perturbed`-th eligible transmit event and the ones after it, up to
//! `max_perturbed_events`, are delayed by that amount before they reach the
//! queue. A delay above `max_bound` ends the branch.

use std::collections::HashSet;

use kairos_types::EventUid;
use tracing::{debug, warn};

use super::{ExplorationHook, SYMBOLIC_DELAY};
use crate::{Event, PerturbationConfig, SchedError};

/// Reason reported to the hook when the symbolic delay is out of bounds.
pub const OUT_OF_RANGE: &str = "Out of range";

/// Per-branch perturbation state.
#[derive(Debug, Clone, Default)]
pub struct Perturber {
    config: PerturbationConfig,
    delay: Option<u64>,
    eligible_seen: u32,
    perturbed: HashSet<EventUid>,
    terminated: Option<String>,
}

impl Perturber {
    pub fn new(config: PerturbationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The bound symbolic delay, once the first insert happened.
    pub fn delay(&self) -> Option<u64> {
        self.delay
    }

    /// True if `uid` had its timestamp shifted.
    pub fn is_perturbed(&self, uid: EventUid) -> bool {
        self.perturbed.contains(&uid)
    }

    pub fn perturbed_count(&self) -> usize {
        self.perturbed.len()
    }

    /// Reason the branch ended, if it did.
    pub fn terminated(&self) -> Option<&str> {
        self.terminated.as_deref()
    }

    /// Applies perturbation to an event about to be inserted.
    pub fn apply(
        &mut self,
        event: &mut Event,
        hook: &mut dyn ExplorationHook,
    ) -> Result<(), SchedError> {
        if !self.config.enabled {
            return Ok(());
        }
        if let Some(reason) = &self.terminated {
            return Err(SchedError::BranchTerminated {
                reason: reason.clone(),
            });
        }

        let delay = self.bind(hook)?;

        let Some(transmit) = event.transmit else {
            return Ok(());
        };
        if transmit.packet_size <= self.config.min_packet_size {
            return Ok(());
        }
        self.eligible_seen += 1;
        if self.eligible_seen < self.config.first_perturbed
            || self.perturbed.len() >= self.config.max_perturbed_events as usize
        {
            return Ok(());
        }

        hook.enable_forking();
        let original = event.key.ts;
        event.key.ts = original.saturating_add(delay);
        self.perturbed.insert(event.key.uid);
        hook.diagnostic(&format!(
            "Setting event id {} to symbolic",
            event.key.uid
        ));
        hook.expression("perturbed_ts", event.key.ts.as_u64());
        debug!(
            uid = %event.key.uid,
            from = %original,
            to = %event.key.ts,
            packet_size = transmit.packet_size,
            "perturbed transmit event"
        );
        Ok(())
    }

    fn bind(&mut self, hook: &mut dyn ExplorationHook) -> Result<u64, SchedError> {
        if let Some(delay) = self.delay
            && hook.is_symbolic(SYMBOLIC_DELAY)
        {
            return Ok(delay);
        }

        let delay = hook.make_symbolic(SYMBOLIC_DELAY, 0);
        self.delay = Some(delay);
        if delay > self.config.max_bound {
            warn!(
                delay,
                max_bound = self.config.max_bound,
                "symbolic delay out of range, terminating branch"
            );
            hook.terminate_branch(OUT_OF_RANGE);
            self.terminated = Some(OUT_OF_RANGE.to_string());
            return Err(SchedError::BranchTerminated {
                reason: OUT_OF_RANGE.to_string(),
            });
        }
        Ok(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explore::SeededHook;
    use kairos_types::{Context, EventKey, EventKind, Timestamp, TransmitInfo};
    use test_case::test_case;

    fn transmit(ts: u64, uid: u64, size: u32) -> Event {
        Event::new(
            EventKey::new(Timestamp::new(ts), EventUid::new(uid), Context::node(0)),
            EventKind::Undefined,
        )
        .with_transmit(TransmitInfo::new(size))
    }

    fn hook(delay: u64) -> SeededHook {
        SeededHook::with_bindings(0, 2000, &[(SYMBOLIC_DELAY, delay)])
    }

    #[test]
    fn disabled_leaves_events_alone() {
        let mut perturber = Perturber::new(PerturbationConfig::default());
        let mut hook = hook(5);
        let mut event = transmit(10, 4, 100);
        perturber.apply(&mut event, &mut hook).unwrap();
        assert_eq!(event.key.ts, Timestamp::new(10));
        assert_eq!(perturber.delay(), None);
    }

    #[test]
    fn first_eligible_transmit_is_delayed() {
        let mut perturber = Perturber::new(PerturbationConfig::bounded(1200));
        let mut hook = hook(30);

        let mut small = transmit(10, 4, 58);
        perturber.apply(&mut small, &mut hook).unwrap();
        assert_eq!(small.key.ts, Timestamp::new(10));

        let mut big = transmit(10, 5, 59);
        perturber.apply(&mut big, &mut hook).unwrap();
        assert_eq!(big.key.ts, Timestamp::new(40));
        assert!(perturber.is_perturbed(big.key.uid));

        let mut next = transmit(20, 6, 1000);
        perturber.apply(&mut next, &mut hook).unwrap();
        assert_eq!(next.key.ts, Timestamp::new(20));

        assert_eq!(hook.recorded().forks, 1);
    }

    #[test_case(1, 2 => vec![true, true, false]; "first two")]
    #[test_case(2, 1 => vec![false, true, false]; "second only")]
    #[test_case(3, 5 => vec![false, false, true]; "third onwards")]
    fn eligible_window(first: u32, max: u32) -> Vec<bool> {
        let config = PerturbationConfig {
            first_perturbed: first,
            max_perturbed_events: max,
            ..PerturbationConfig::bounded(1200)
        };
        let mut perturber = Perturber::new(config);
        let mut hook = hook(1);
        (0..3)
            .map(|i| {
                let mut event = transmit(10, 4 + i, 500);
                perturber.apply(&mut event, &mut hook).unwrap();
                perturber.is_perturbed(event.key.uid)
            })
            .collect()
    }

    #[test]
    fn out_of_range_terminates_branch() {
        let mut perturber = Perturber::new(PerturbationConfig::bounded(100));
        let mut hook = hook(101);
        let mut event = transmit(10, 4, 500);

        let err = perturber.apply(&mut event, &mut hook).unwrap_err();
        assert_eq!(
            err,
            SchedError::BranchTerminated {
                reason: OUT_OF_RANGE.to_string()
            }
        );
        assert_eq!(hook.recorded().terminated.as_deref(), Some(OUT_OF_RANGE));

        // Every later insert on this branch is refused.
        let mut later = transmit(10, 5, 10);
        assert!(perturber.apply(&mut later, &mut hook).is_err());
    }
}
