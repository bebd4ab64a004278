//! Outcome of one bounded computation.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kman_core::ManagerError;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TaskError;

/// Immutable result of a finished task: either a value or an error, plus the
/// instants the computation started and finished.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult<V> {
    outcome: Result<V, TaskError>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl<V> TaskResult<V> {
    pub fn builder() -> TaskResultBuilder<V> {
        TaskResultBuilder::default()
    }

    /// Run `computation` between two timestamps.
    ///
    /// Failures are captured into the result, except transport failures
    /// which are returned as `Err` so callers can tell "the cluster said no"
    /// apart from "the cluster could not be asked".
    pub async fn capture<F>(computation: F) -> Result<Self, ManagerError>
    where
        F: Future<Output = Result<V, ManagerError>>,
    {
        let started_at = Utc::now();
        let outcome = computation.await;
        let finished_at = Utc::now().max(started_at);
        match outcome {
            Err(err) if err.is_transport() => Err(err),
            outcome => Ok(Self {
                outcome: outcome.map_err(TaskError::from),
                started_at,
                finished_at,
            }),
        }
    }

    /// Error result that started at `started_at` and finishes now.
    pub fn failed_since(started_at: DateTime<Utc>, error: impl Into<TaskError>) -> Self {
        Self {
            outcome: Err(error.into()),
            started_at,
            finished_at: Utc::now().max(started_at),
        }
    }

    pub fn value(&self) -> Option<&V> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }

    pub fn outcome(&self) -> Result<&V, &TaskError> {
        self.outcome.as_ref()
    }

    pub fn is_successful(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The value, or the captured error as a domain error.
    pub fn into_value(self) -> Result<V, ManagerError> {
        self.outcome.map_err(ManagerError::from)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at).to_std().unwrap_or_default()
    }

    /// Elapsed time as `HH:MM:SS.mmm`.
    pub fn elapsed_hms(&self) -> String {
        let ms = self.elapsed().as_millis();
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            ms / 3_600_000,
            ms / 60_000 % 60,
            ms / 1_000 % 60,
            ms % 1_000
        )
    }

    /// A result stays actual while `elapsed × ratio` exceeds the time passed
    /// since it finished: slow computations are reused for longer.
    pub fn is_actual_at(&self, ratio: f64, now: DateTime<Utc>) -> bool {
        let since_finish = (now - self.finished_at).to_std().unwrap_or_default();
        self.elapsed().as_secs_f64() * ratio > since_finish.as_secs_f64()
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> TaskResult<U> {
        TaskResult {
            outcome: self.outcome.map(f),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

// ── Builder ───────────────────────────────────────────────────

pub struct TaskResultBuilder<V> {
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    value: Option<V>,
    error: Option<TaskError>,
}

impl<V> Default for TaskResultBuilder<V> {
    fn default() -> Self {
        Self {
            started_at: None,
            finished_at: None,
            value: None,
            error: None,
        }
    }
}

impl<V> TaskResultBuilder<V> {
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn started_at_now(self) -> Self {
        self.started_at(Utc::now())
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    pub fn finished_at_now(self) -> Self {
        self.finished_at(Utc::now())
    }

    pub fn started_and_finished_at_now(self) -> Self {
        let now = Utc::now();
        self.started_at(now).finished_at(now)
    }

    pub fn value(mut self, value: V) -> Self {
        self.value = Some(value);
        self
    }

    pub fn error(mut self, error: impl Into<TaskError>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn build(self) -> Result<TaskResult<V>, ManagerError> {
        assemble(self.value, self.error, self.started_at, self.finished_at)
    }
}

fn assemble<V>(
    value: Option<V>,
    error: Option<TaskError>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> Result<TaskResult<V>, ManagerError> {
    let started_at =
        started_at.ok_or_else(|| ManagerError::invalid_argument("task result has no start time"))?;
    let finished_at =
        finished_at.ok_or_else(|| ManagerError::invalid_argument("task result has no finish time"))?;
    if finished_at < started_at {
        return Err(ManagerError::invalid_argument(format!(
            "task result finished at {} before it started at {}",
            finished_at, started_at
        )));
    }
    let outcome = match (value, error) {
        (Some(value), None) => Ok(value),
        (None, Some(error)) => Err(error),
        (Some(_), Some(_)) => {
            return Err(ManagerError::invalid_argument(
                "task result has both a value and an error",
            ))
        }
        (None, None) => {
            return Err(ManagerError::invalid_argument(
                "task result has neither a value nor an error",
            ))
        }
    };
    Ok(TaskResult {
        outcome,
        started_at,
        finished_at,
    })
}

// ── Wire format ───────────────────────────────────────────────

impl<V: Serialize> Serialize for TaskResult<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("TaskResult", 3)?;
        match &self.outcome {
            Ok(value) => {
                s.serialize_field("value", value)?;
                s.skip_field("error")?;
            }
            Err(error) => {
                s.skip_field("value")?;
                s.serialize_field("error", error)?;
            }
        }
        s.serialize_field("startedAt", &self.started_at)?;
        s.serialize_field("finishedAt", &self.finished_at)?;
        s.end()
    }
}

/// A present `value` field is the value even when it is `null`, so unit and
/// optional outputs survive the trip; failed results carry no `value` field.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "V: Deserialize<'de>"))]
struct TaskResultWire<V> {
    #[serde(default = "none", deserialize_with = "present")]
    value: Option<V>,
    #[serde(default)]
    error: Option<TaskError>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

fn none<V>() -> Option<V> {
    None
}

fn present<'de, D, V>(deserializer: D) -> Result<Option<V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    V::deserialize(deserializer).map(Some)
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for TaskResult<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = TaskResultWire::<V>::deserialize(deserializer)?;
        assemble(wire.value, wire.error, wire.started_at, wire.finished_at)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskErrorKind;
    use chrono::TimeDelta;

    #[test]
    fn builder_requires_exactly_one_outcome() {
        assert!(TaskResult::<i64>::builder()
            .started_and_finished_at_now()
            .build()
            .is_err());

        let both = TaskResult::builder()
            .started_and_finished_at_now()
            .value(1)
            .error(TaskError::failed("boom"))
            .build();
        assert!(both.is_err());

        let ok = TaskResult::builder().started_and_finished_at_now().value(1).build().unwrap();
        assert_eq!(ok.value(), Some(&1));
        assert!(ok.error().is_none());
    }

    #[test]
    fn builder_rejects_inverted_timestamps() {
        let now = Utc::now();
        let err = TaskResult::builder()
            .started_at(now)
            .finished_at(now - TimeDelta::seconds(1))
            .value(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn capture_keeps_domain_errors() {
        let result = TaskResult::<i64>::capture(async {
            Err(ManagerError::not_found("Topic 'orders' doesn't exist"))
        })
        .await
        .unwrap();
        assert!(!result.is_successful());
        assert_eq!(result.error().unwrap().kind, TaskErrorKind::NotFound);
        assert!(result.finished_at() >= result.started_at());
    }

    #[tokio::test]
    async fn capture_rethrows_transport() {
        let err = TaskResult::<i64>::capture(async { Err(ManagerError::transport("refused")) })
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn elapsed_formatting() {
        let start = Utc::now();
        let result = TaskResult::builder()
            .started_at(start)
            .finished_at(start + TimeDelta::milliseconds(3_723_045))
            .value(())
            .build()
            .unwrap();
        assert_eq!(result.elapsed_hms(), "01:02:03.045");
    }

    #[test]
    fn actuality_scales_with_elapsed() {
        let start = Utc::now();
        let result = TaskResult::builder()
            .started_at(start)
            .finished_at(start + TimeDelta::seconds(2))
            .value(7)
            .build()
            .unwrap();
        let finished = result.finished_at();
        assert!(result.is_actual_at(20.0, finished + TimeDelta::seconds(39)));
        assert!(!result.is_actual_at(20.0, finished + TimeDelta::seconds(41)));
    }

    #[test]
    fn json_round_trip_and_validation() {
        let result = TaskResult::builder().started_and_finished_at_now().value(42_i64).build().unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["value"], 42);
        assert!(json["error"].is_null());
        let back: TaskResult<i64> = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);

        let both = serde_json::json!({
            "value": 1,
            "error": { "kind": "FAILED", "message": "x" },
            "startedAt": "2024-03-01T10:00:00Z",
            "finishedAt": "2024-03-01T10:00:01Z",
        });
        assert!(serde_json::from_value::<TaskResult<i64>>(both).is_err());

        let inverted = serde_json::json!({
            "value": 1,
            "startedAt": "2024-03-01T10:00:01Z",
            "finishedAt": "2024-03-01T10:00:00Z",
        });
        assert!(serde_json::from_value::<TaskResult<i64>>(inverted).is_err());
    }

    #[test]
    fn null_values_survive_the_wire() {
        let unit = TaskResult::builder().started_and_finished_at_now().value(()).build().unwrap();
        let json = serde_json::to_value(&unit).unwrap();
        assert!(json.as_object().unwrap().contains_key("value"));
        let back: TaskResult<()> = serde_json::from_value(json).unwrap();
        assert!(back.is_successful());

        let nothing = TaskResult::builder()
            .started_and_finished_at_now()
            .value(None::<i64>)
            .build()
            .unwrap();
        let back: TaskResult<Option<i64>> = serde_json::from_value(serde_json::to_value(&nothing).unwrap()).unwrap();
        assert_eq!(back.value(), Some(&None));

        let failed = TaskResult::<()>::failed_since(Utc::now(), TaskError::new(TaskErrorKind::NotFound, "gone"));
        let json = serde_json::to_value(&failed).unwrap();
        assert!(!json.as_object().unwrap().contains_key("value"));
        let back: TaskResult<()> = serde_json::from_value(json).unwrap();
        assert_eq!(back.error().unwrap().kind, TaskErrorKind::NotFound);
    }
}
