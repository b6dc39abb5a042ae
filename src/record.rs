use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Field set of a [`Point`]. Always carries [`TIME_FIELD`] once buffered.
pub type ValueSet = BTreeMap<String, Value>;

/// Tag set of a [`Point`].
pub type TagSet = BTreeMap<String, String>;

/// Key under which the processing time (ns since the Unix epoch) is stored
/// in [`Point::values`].
pub const TIME_FIELD: &str = "time";

/// A single log call as handed over by the producer.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    /// Opaque metadata. The default extractors look at its `values` and
    /// `tags` keys.
    pub metadata: Value,
}

impl LogRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>, metadata: Value) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            metadata,
        }
    }
}

/// One time-series record ready to be written into the measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub values: ValueSet,
    pub tags: TagSet,
}

impl Point {
    /// Build a point stamped with `time`. Any `time` key produced by the
    /// extractors is overwritten.
    pub fn stamped(mut values: ValueSet, tags: TagSet, time: DateTime<Utc>) -> Self {
        let nanos = time
            .timestamp_nanos_opt()
            .unwrap_or_else(|| time.timestamp_micros().saturating_mul(1_000));
        values.insert(TIME_FIELD.to_string(), Value::from(nanos));
        Self { values, tags }
    }

    /// Processing time in nanoseconds, if the point has been stamped.
    pub fn time_nanos(&self) -> Option<i64> {
        self.values.get(TIME_FIELD).and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn stamped_overwrites_time_from_extractors() {
        let mut values = ValueSet::new();
        values.insert("time".into(), json!("yesterday"));
        values.insert("count".into(), json!(3));

        let time = Utc.timestamp_opt(1_700_000_000, 5).unwrap();
        let point = Point::stamped(values, TagSet::new(), time);

        assert_eq!(point.time_nanos(), Some(1_700_000_000_000_000_005));
        assert_eq!(point.values.get("count"), Some(&json!(3)));
    }
}
