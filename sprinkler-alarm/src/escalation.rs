//! Notification escalation ladder.
//!
//! An alarm session notifies in four rungs:
//!
//! ```text
//!  elapsed:  0s        60s        120s              200s   260s   320s ...
//!            FIRST     SECOND     THIRD             REPEAT REPEAT REPEAT
//!            primary   primary    primary+secondary ───── primary+secondary ──
//! ```
//!
//! The first three rungs fire once each, in order. After the third the
//! ladder enters the recurring phase and repeats every period until the
//! session ends. The scheduler never looks at delivery outcomes.

use std::fmt;
use std::sync::Arc;

use strum::Display;

use crate::clock::{WallClock, format_timestamp};
use crate::config::ConfigError;

/// A phone number or other transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contact(String);

impl Contact {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rung of the ladder. The label appears in the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum StepKind {
    First,
    Second,
    Third,
    Repeat,
}

/// Thresholds, wording and recipients of the ladder.
#[derive(Debug, Clone)]
pub struct EscalationPlan {
    /// Elapsed seconds before the second notification.
    pub second_after_secs: u64,
    /// Elapsed seconds before the third notification.
    pub third_after_secs: u64,
    /// Elapsed seconds of the first recurring notification.
    pub recurring_after_secs: u64,
    /// Seconds between recurring notifications.
    pub recurring_period_secs: u64,
    pub message_prefix: String,
    /// Notified from the first rung on.
    pub primary: Vec<Contact>,
    /// Added to the recipients from the third rung on.
    pub secondary: Vec<Contact>,
}

impl Default for EscalationPlan {
    fn default() -> Self {
        Self {
            second_after_secs: 60,
            third_after_secs: 120,
            recurring_after_secs: 200,
            recurring_period_secs: 60,
            message_prefix: "ALARM: fire sprinkler".to_string(),
            primary: Vec::new(),
            secondary: Vec::new(),
        }
    }
}

impl EscalationPlan {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            0,
            self.second_after_secs,
            self.third_after_secs,
            self.recurring_after_secs,
        ];
        if !thresholds.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError::Invalid(format!(
                "escalation thresholds must be strictly increasing, got {:?}",
                &thresholds[1..]
            )));
        }
        if self.recurring_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "recurring period must be non-zero".into(),
            ));
        }
        if self.primary.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one primary contact is required".into(),
            ));
        }
        Ok(())
    }

    /// Build the four rungs.
    ///
    /// Rungs 2 and 3 are notified on the primary contacts followed by any
    /// secondary contacts not already listed, so their recipients are always
    /// a superset of the earlier rungs'.
    pub fn steps(&self) -> [NotificationStep; 4] {
        let primary: Arc<[Contact]> = self.primary.iter().cloned().collect();

        let mut widened = self.primary.clone();
        for contact in &self.secondary {
            if !widened.contains(contact) {
                widened.push(contact.clone());
            }
        }
        let widened: Arc<[Contact]> = widened.into();

        [
            NotificationStep::new(0, StepKind::First, 0, Arc::clone(&primary)),
            NotificationStep::new(1, StepKind::Second, self.second_after_secs, primary),
            NotificationStep::new(
                2,
                StepKind::Third,
                self.third_after_secs,
                Arc::clone(&widened),
            ),
            NotificationStep::new(3, StepKind::Repeat, self.recurring_after_secs, widened),
        ]
    }
}

/// One rung of the ladder.
#[derive(Debug, Clone)]
pub struct NotificationStep {
    pub index: usize,
    pub kind: StepKind,
    pub threshold_secs: u64,
    pub recipients: Arc<[Contact]>,
}

impl NotificationStep {
    fn new(index: usize, kind: StepKind, threshold_secs: u64, recipients: Arc<[Contact]>) -> Self {
        Self {
            index,
            kind,
            threshold_secs,
            recipients,
        }
    }
}

/// A notification the scheduler decided to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub kind: StepKind,
    /// Session time the event fired at.
    pub elapsed_secs: u64,
    pub message: String,
    pub recipients: Arc<[Contact]>,
}

/// Maps elapsed session time to notification events.
pub struct EscalationScheduler {
    steps: [NotificationStep; 4],
    recurring_period_secs: u64,
    message_prefix: String,
    clock: Arc<dyn WallClock>,
    next_step_index: usize,
    /// Set once the third rung has fired: the next recurring slot.
    recurring_due_secs: Option<u64>,
}

impl EscalationScheduler {
    pub fn new(plan: &EscalationPlan, clock: Arc<dyn WallClock>) -> Self {
        Self {
            steps: plan.steps(),
            recurring_period_secs: plan.recurring_period_secs.max(1),
            message_prefix: plan.message_prefix.clone(),
            clock,
            next_step_index: 0,
            recurring_due_secs: None,
        }
    }

    /// Decide what, if anything, to send this tick.
    ///
    /// Conditions are checked in ladder order and at most one event is
    /// returned, so a late tick that satisfies several thresholds still
    /// climbs one rung at a time.
    pub fn on_tick(&mut self, elapsed_secs: u64) -> Option<NotificationEvent> {
        let step_index = match (self.next_step_index, self.recurring_due_secs) {
            (0, _) => {
                self.next_step_index = 1;
                0
            }
            (1, _) if elapsed_secs >= self.steps[1].threshold_secs => {
                self.next_step_index = 2;
                1
            }
            (2, _) if elapsed_secs >= self.steps[2].threshold_secs => {
                self.next_step_index = 3;
                self.recurring_due_secs = Some(self.steps[3].threshold_secs);
                2
            }
            (3, Some(due)) if elapsed_secs >= due => {
                self.recurring_due_secs = Some(self.next_slot_after(due, elapsed_secs));
                3
            }
            _ => return None,
        };

        Some(self.compose(step_index, elapsed_secs))
    }

    /// Whether the one-shot rungs are exhausted.
    pub fn in_recurring_phase(&self) -> bool {
        self.recurring_due_secs.is_some()
    }

    /// First slot on the `due + k * period` grid strictly after `elapsed`.
    /// A tick that arrives late (slow transport) fires one catch-up event,
    /// not a burst. A slot past the end of `u64` is never reached.
    fn next_slot_after(&self, due: u64, elapsed_secs: u64) -> u64 {
        let periods_missed = elapsed_secs.saturating_sub(due) / self.recurring_period_secs;
        periods_missed
            .checked_add(1)
            .and_then(|slots| slots.checked_mul(self.recurring_period_secs))
            .and_then(|offset| due.checked_add(offset))
            .unwrap_or(u64::MAX)
    }

    fn compose(&self, step_index: usize, elapsed_secs: u64) -> NotificationEvent {
        let step = &self.steps[step_index];
        let timestamp = format_timestamp(self.clock.now());
        NotificationEvent {
            kind: step.kind,
            elapsed_secs,
            message: format!("{} -- {} text: {}", self.message_prefix, step.kind, timestamp),
            recipients: Arc::clone(&step.recipients),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use time::macros::datetime;
    use time::OffsetDateTime;

    use super::*;

    struct FixedClock(OffsetDateTime);

    impl WallClock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            self.0
        }
    }

    fn plan() -> EscalationPlan {
        EscalationPlan {
            primary: vec![Contact::new("A")],
            secondary: vec![Contact::new("B")],
            ..EscalationPlan::default()
        }
    }

    fn scheduler() -> EscalationScheduler {
        EscalationScheduler::new(
            &plan(),
            Arc::new(FixedClock(datetime!(2022-02-08 14:03:07 UTC))),
        )
    }

    /// Feed one tick per elapsed second (ten ticks per second, like the
    /// 100 ms poll) and collect what fires.
    fn run(scheduler: &mut EscalationScheduler, secs: u64) -> Vec<NotificationEvent> {
        (0..secs * 10)
            .filter_map(|tick| scheduler.on_tick(tick / 10))
            .collect()
    }

    fn names(recipients: &[Contact]) -> Vec<&str> {
        recipients.iter().map(Contact::as_str).collect()
    }

    #[test]
    fn first_fires_on_first_tick_regardless_of_elapsed() {
        let mut s = scheduler();
        let event = s.on_tick(0).unwrap();
        assert_eq!(event.kind, StepKind::First);
        assert!(s.on_tick(0).is_none());
    }

    #[test]
    fn ladder_timeline() {
        let mut s = scheduler();
        let events = run(&mut s, 330);

        let timeline: Vec<_> = events
            .iter()
            .map(|e| (e.elapsed_secs, e.kind, names(&e.recipients)))
            .collect();
        assert_eq!(
            timeline,
            vec![
                (0, StepKind::First, vec!["A"]),
                (60, StepKind::Second, vec!["A"]),
                (120, StepKind::Third, vec!["A", "B"]),
                (200, StepKind::Repeat, vec!["A", "B"]),
                (260, StepKind::Repeat, vec!["A", "B"]),
                (320, StepKind::Repeat, vec!["A", "B"]),
            ]
        );
    }

    #[test]
    fn one_event_per_tick_when_thresholds_pile_up() {
        let mut s = scheduler();
        // A single very late tick after the first: every threshold is met.
        assert_eq!(s.on_tick(0).unwrap().kind, StepKind::First);
        assert_eq!(s.on_tick(500).unwrap().kind, StepKind::Second);
        assert_eq!(s.on_tick(500).unwrap().kind, StepKind::Third);
        assert!(s.in_recurring_phase());
        assert_eq!(s.on_tick(500).unwrap().kind, StepKind::Repeat);
        assert!(s.on_tick(500).is_none());
    }

    #[test]
    fn repeat_after_stall_realigns_to_grid() {
        let mut s = scheduler();
        for secs in [0, 60, 120, 200] {
            s.on_tick(secs).unwrap();
        }
        // Transport hung from 250s to 385s: one catch-up, then back on grid.
        assert!(s.on_tick(250).is_none());
        assert_eq!(s.on_tick(385).unwrap().kind, StepKind::Repeat);
        assert!(s.on_tick(410).is_none());
        assert_eq!(s.on_tick(440).unwrap().elapsed_secs, 440);
    }

    #[test]
    fn huge_period_never_repeats() {
        let mut s = EscalationScheduler::new(
            &EscalationPlan {
                recurring_period_secs: u64::MAX,
                ..plan()
            },
            Arc::new(FixedClock(datetime!(2022-02-08 14:03:07 UTC))),
        );
        for secs in [0, 60, 120, 200] {
            s.on_tick(secs).unwrap();
        }
        assert!((201..=210).all(|secs| s.on_tick(secs).is_none()));
        assert!(s.on_tick(u64::MAX - 1).is_none());
    }

    #[test_case(59, false; "just before second")]
    #[test_case(60, true; "at second threshold")]
    fn second_waits_for_threshold(elapsed: u64, fires: bool) {
        let mut s = scheduler();
        s.on_tick(0);
        assert_eq!(s.on_tick(elapsed).is_some(), fires);
    }

    #[test]
    fn third_recipients_are_superset_of_second() {
        let plan = EscalationPlan {
            primary: vec![Contact::new("A"), Contact::new("B")],
            secondary: vec![Contact::new("B"), Contact::new("C")],
            ..EscalationPlan::default()
        };
        let [_, second, third, repeat] = plan.steps();

        assert_eq!(names(&second.recipients), ["A", "B"]);
        assert_eq!(names(&third.recipients), ["A", "B", "C"]);
        assert_eq!(repeat.recipients, third.recipients);
    }

    #[test]
    fn message_embeds_label_and_timestamp() {
        let mut s = scheduler();
        let event = s.on_tick(0).unwrap();
        assert_eq!(event.message, "ALARM: fire sprinkler -- FIRST text: 14:03:07");

        let events = run(&mut s, 210);
        assert_eq!(
            events.last().unwrap().message,
            "ALARM: fire sprinkler -- REPEAT text: 14:03:07"
        );
    }

    #[test_case(60, 60, 200, 60; "second equals third")]
    #[test_case(60, 120, 120, 60; "recurring equals third")]
    #[test_case(0, 120, 200, 60; "second at zero")]
    #[test_case(60, 120, 200, 0; "zero period")]
    fn invalid_plans(second: u64, third: u64, recurring: u64, period: u64) {
        let plan = EscalationPlan {
            second_after_secs: second,
            third_after_secs: third,
            recurring_after_secs: recurring,
            recurring_period_secs: period,
            ..plan()
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn default_thresholds_validate_with_contacts() {
        assert!(plan().validate().is_ok());
        assert!(EscalationPlan::default().validate().is_err());
    }
}
