//! Trigger handlers — one state machine per live signal.
//!
//! A handler pairs a persisted [`Signal`] with its resolved [`Automation`]
//! and produces a lazy, possibly-infinite stream of fire events. Handlers
//! are rebuilt wholesale on every reschedule cycle; dropping the previous
//! cycle's streams releases their timers and subscriptions with no further
//! firing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::stream::{self, BoxStream, StreamExt};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use mindhub_domain::automation::Automation;
use mindhub_domain::id::SignalId;
use mindhub_domain::signal::{Signal, TriggerPayload};

use crate::ports::StateObserver;

/// A trigger has activated: the pair the execute stage consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct FireEvent {
    pub signal: Signal,
    pub automation: Automation,
}

/// Human-readable handler summary, published for the "pending automations"
/// view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDescription {
    pub signal_id: SignalId,
    pub automation_hash: String,
    pub is_valid: bool,
    pub description: String,
}

/// Runtime pairing of a signal and its automation.
///
/// Invalid handlers (bad cron, bad regex, past-due instant) never fire but
/// stay visible with a human-readable reason.
pub struct TriggerHandler {
    pub signal: Signal,
    pub automation: Automation,
    pub is_valid: bool,
    pub description: String,
    kind: HandlerKind,
}

enum HandlerKind {
    /// Construction-time validation failed; never fires.
    Invalid,
    Cron(Box<Schedule>),
    Offset(Duration),
    Time(DateTime<Utc>),
    State { entity_ids: Vec<String>, regex: Regex },
}

impl TriggerHandler {
    /// Build a handler from one signal and its resolved automation.
    ///
    /// Validation failures are absorbed into the handler (`is_valid =
    /// false`) so one bad signal never prevents the rest of the batch from
    /// being built.
    #[must_use]
    pub fn build(signal: Signal, automation: Automation) -> Self {
        let (kind, is_valid, description) = match &signal.payload {
            TriggerPayload::Cron { cron } => match cron.parse::<Schedule>() {
                Ok(schedule) => (
                    HandlerKind::Cron(Box::new(schedule)),
                    true,
                    format!("Runs on cron schedule '{cron}'"),
                ),
                Err(err) => {
                    tracing::warn!(%err, cron, "cron expression failed to parse");
                    (HandlerKind::Invalid, false, "Invalid cron expression".to_string())
                }
            },
            TriggerPayload::Offset { offset_in_seconds } => {
                let delay = Duration::try_from_secs_f64(offset_in_seconds.max(0.0))
                    .unwrap_or(Duration::ZERO);
                (
                    HandlerKind::Offset(delay),
                    true,
                    format!("Fires once, {offset_in_seconds} seconds after scheduling"),
                )
            }
            TriggerPayload::Time { iso8601_time } => {
                match DateTime::parse_from_rfc3339(iso8601_time) {
                    Ok(target) => {
                        let target = target.to_utc();
                        if target <= Utc::now() {
                            (
                                HandlerKind::Invalid,
                                false,
                                format!("Fires once at {iso8601_time} (Past due)"),
                            )
                        } else {
                            (
                                HandlerKind::Time(target),
                                true,
                                format!("Fires once at {iso8601_time}"),
                            )
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, iso8601_time, "absolute time failed to parse");
                        (HandlerKind::Invalid, false, "Invalid absolute time".to_string())
                    }
                }
            }
            TriggerPayload::State { entity_ids, regex } => {
                match RegexBuilder::new(regex).case_insensitive(true).build() {
                    Ok(compiled) => (
                        HandlerKind::State {
                            entity_ids: entity_ids.clone(),
                            regex: compiled,
                        },
                        true,
                        format!(
                            "Fires when any of [{}] matches /{regex}/i",
                            entity_ids.join(", ")
                        ),
                    ),
                    Err(err) => {
                        tracing::warn!(%err, regex, "state regex failed to compile");
                        (HandlerKind::Invalid, false, "Invalid state regex".to_string())
                    }
                }
            }
        };

        Self {
            signal,
            automation,
            is_valid,
            description,
            kind,
        }
    }

    /// The handler's published summary.
    #[must_use]
    pub fn describe(&self) -> TriggerDescription {
        TriggerDescription {
            signal_id: self.signal.id,
            automation_hash: self.signal.automation_hash.clone(),
            is_valid: self.is_valid,
            description: self.description.clone(),
        }
    }

    /// The handler's lazy fire-event stream.
    ///
    /// Invalid handlers yield an empty stream. Dropping the stream cancels
    /// any pending timer or observer subscription.
    #[must_use]
    pub fn fire_stream(&self, observer: &Arc<dyn StateObserver>) -> BoxStream<'static, FireEvent> {
        let fire = FireEvent {
            signal: self.signal.clone(),
            automation: self.automation.clone(),
        };

        match &self.kind {
            HandlerKind::Invalid => stream::empty().boxed(),
            HandlerKind::Cron(schedule) => {
                let schedule = schedule.as_ref().clone();
                stream::unfold(schedule, move |schedule| async move {
                    let next = schedule.upcoming(Utc).next()?;
                    sleep_until(next).await;
                    Some(((), schedule))
                })
                .map(move |()| fire.clone())
                .boxed()
            }
            HandlerKind::Offset(delay) => {
                let delay = *delay;
                stream::once(async move {
                    tokio::time::sleep(delay).await;
                    fire
                })
                .boxed()
            }
            HandlerKind::Time(target) => {
                let target = *target;
                stream::once(async move {
                    sleep_until(target).await;
                    fire
                })
                .boxed()
            }
            HandlerKind::State { entity_ids, regex } => {
                let regex = regex.clone();
                observer
                    .observe(entity_ids)
                    .filter_map(move |change| {
                        let matched = regex.is_match(&change.new_state);
                        let fire = fire.clone();
                        async move { matched.then_some(fire) }
                    })
                    .boxed()
            }
        }
    }
}

async fn sleep_until(target: DateTime<Utc>) {
    let delay = (target - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use mindhub_domain::state::StateChange;
    use tokio::time::timeout;

    struct ScriptedObserver {
        changes: Vec<StateChange>,
    }

    impl StateObserver for ScriptedObserver {
        fn observe(&self, entity_ids: &[String]) -> BoxStream<'static, StateChange> {
            let ids: Vec<String> = entity_ids.to_vec();
            let changes: Vec<StateChange> = self
                .changes
                .iter()
                .filter(|c| ids.contains(&c.entity_id))
                .cloned()
                .collect();
            stream::iter(changes).chain(stream::pending()).boxed()
        }
    }

    fn signal_with(payload: TriggerPayload) -> Signal {
        Signal {
            id: SignalId::new(),
            created_at: mindhub_domain::time::now(),
            automation_hash: "hash".to_string(),
            payload,
            is_dead: false,
        }
    }

    fn automation() -> Automation {
        Automation::from_contents("Water the plants.", "a.md")
    }

    fn null_observer() -> Arc<dyn StateObserver> {
        Arc::new(ScriptedObserver { changes: vec![] })
    }

    #[test]
    fn should_mark_invalid_cron_expression() {
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::Cron {
                cron: "not a cron".to_string(),
            }),
            automation(),
        );
        assert!(!handler.is_valid);
        assert_eq!(handler.description, "Invalid cron expression");
    }

    #[tokio::test]
    async fn should_never_fire_for_invalid_cron() {
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::Cron {
                cron: "61 * * * * *".to_string(),
            }),
            automation(),
        );
        let mut stream = handler.fire_stream(&null_observer());
        let fired = timeout(Duration::from_millis(50), stream.next()).await;
        assert!(fired.is_err(), "invalid handler must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn should_fire_on_each_cron_occurrence() {
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::Cron {
                cron: "* * * * * *".to_string(),
            }),
            automation(),
        );
        assert!(handler.is_valid);
        let mut stream = handler.fire_stream(&null_observer());
        let fire = stream.next().await.expect("cron stream should fire");
        assert_eq!(fire.automation.contents, "Water the plants.");
        assert!(stream.next().await.is_some(), "cron fires repeatedly");
    }

    #[tokio::test(start_paused = true)]
    async fn should_fire_offset_exactly_once() {
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::Offset {
                offset_in_seconds: 30.0,
            }),
            automation(),
        );
        assert!(handler.is_valid);
        let mut stream = handler.fire_stream(&null_observer());
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none(), "offset is one-shot");
    }

    #[test]
    fn should_clamp_negative_offset_to_zero() {
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::Offset {
                offset_in_seconds: -5.0,
            }),
            automation(),
        );
        assert!(handler.is_valid);
    }

    #[test]
    fn should_mark_past_due_absolute_time() {
        let past = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::Time {
                iso8601_time: past,
            }),
            automation(),
        );
        assert!(!handler.is_valid);
        assert!(handler.description.ends_with("(Past due)"));
    }

    #[test]
    fn should_mark_unparseable_absolute_time_invalid() {
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::Time {
                iso8601_time: "tomorrow-ish".to_string(),
            }),
            automation(),
        );
        assert!(!handler.is_valid);
    }

    #[tokio::test(start_paused = true)]
    async fn should_fire_absolute_time_exactly_once() {
        let target = (Utc::now() + chrono::Duration::seconds(10)).to_rfc3339();
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::Time {
                iso8601_time: target,
            }),
            automation(),
        );
        assert!(handler.is_valid);
        let mut stream = handler.fire_stream(&null_observer());
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn should_mark_invalid_state_regex() {
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::State {
                entity_ids: vec!["light.kitchen".to_string()],
                regex: "(unclosed".to_string(),
            }),
            automation(),
        );
        assert!(!handler.is_valid);
        assert_eq!(handler.description, "Invalid state regex");
    }

    #[tokio::test]
    async fn should_fire_on_matching_state_case_insensitively() {
        let observer: Arc<dyn StateObserver> = Arc::new(ScriptedObserver {
            changes: vec![
                StateChange::new("light.kitchen", "off"),
                StateChange::new("light.kitchen", "ON"),
                StateChange::new("light.hall", "on"),
            ],
        });
        let handler = TriggerHandler::build(
            signal_with(TriggerPayload::State {
                entity_ids: vec!["light.kitchen".to_string()],
                regex: "^on$".to_string(),
            }),
            automation(),
        );
        let mut stream = handler.fire_stream(&observer);

        // Only the kitchen "ON" change matches: "off" fails the regex and
        // the hall entity is not watched.
        let fire = timeout(Duration::from_millis(100), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fire.signal.automation_hash, "hash");
        let second = timeout(Duration::from_millis(50), stream.next()).await;
        assert!(second.is_err());
    }

    #[test]
    fn should_describe_handler_for_pending_view() {
        let signal = signal_with(TriggerPayload::Cron {
            cron: "0 0 8 * * *".to_string(),
        });
        let id = signal.id;
        let handler = TriggerHandler::build(signal, automation());
        let desc = handler.describe();
        assert_eq!(desc.signal_id, id);
        assert_eq!(desc.automation_hash, "hash");
        assert!(desc.is_valid);
        assert_eq!(desc.description, "Runs on cron schedule '0 0 8 * * *'");
    }
}
