//! Derivation of a point's values and tags from a [`LogRecord`].
//!
//! Both extractors are asynchronous and can be replaced independently when
//! the sink is built. Plain closures work too:
//!
//! ```ignore
//! let sink = InfluxSink::builder(client)
//!     .build_tags(|record: &LogRecord| {
//!         let mut tags = TagSet::new();
//!         tags.insert("level".into(), record.level.clone());
//!         Ok(tags)
//!     })
//!     .spawn()?;
//! ```

use crate::error::ExtractError;
use crate::record::{LogRecord, TagSet, ValueSet};
use async_trait::async_trait;
use serde_json::Value;

/// Produces the field set of a point.
#[async_trait]
pub trait BuildValues: Send + Sync {
    async fn build_values(&self, record: &LogRecord) -> Result<ValueSet, ExtractError>;
}

/// Produces the tag set of a point.
#[async_trait]
pub trait BuildTags: Send + Sync {
    async fn build_tags(&self, record: &LogRecord) -> Result<TagSet, ExtractError>;
}

#[async_trait]
impl<F> BuildValues for F
where
    F: Fn(&LogRecord) -> Result<ValueSet, ExtractError> + Send + Sync,
{
    async fn build_values(&self, record: &LogRecord) -> Result<ValueSet, ExtractError> {
        self(record)
    }
}

#[async_trait]
impl<F> BuildTags for F
where
    F: Fn(&LogRecord) -> Result<TagSet, ExtractError> + Send + Sync,
{
    async fn build_tags(&self, record: &LogRecord) -> Result<TagSet, ExtractError> {
        self(record)
    }
}

/// Default value extractor: returns `metadata.values`, or an empty set.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataValues;

/// Default tag extractor: returns `metadata.tags`, or an empty set.
///
/// Non-string scalars are stringified; nested objects and arrays are
/// rejected since tags are flat strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataTags;

#[async_trait]
impl BuildValues for MetadataValues {
    async fn build_values(&self, record: &LogRecord) -> Result<ValueSet, ExtractError> {
        match record.metadata.get("values") {
            None | Some(Value::Null) => Ok(ValueSet::new()),
            Some(Value::Object(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Some(other) => Err(invalid("values", other)),
        }
    }
}

#[async_trait]
impl BuildTags for MetadataTags {
    async fn build_tags(&self, record: &LogRecord) -> Result<TagSet, ExtractError> {
        let map = match record.metadata.get("tags") {
            None | Some(Value::Null) => return Ok(TagSet::new()),
            Some(Value::Object(map)) => map,
            Some(other) => return Err(invalid("tags", other)),
        };

        let mut tags = TagSet::new();
        for (key, value) in map {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Bool(_) | Value::Number(_) => value.to_string(),
                Value::Null => continue,
                Value::Array(_) | Value::Object(_) => {
                    return Err(ExtractError::InvalidMetadata {
                        field: format!("tags.{}", key),
                        reason: "tag values must be scalars".to_string(),
                    })
                }
            };
            tags.insert(key.clone(), value);
        }
        Ok(tags)
    }
}

fn invalid(field: &str, value: &Value) -> ExtractError {
    ExtractError::InvalidMetadata {
        field: field.to_string(),
        reason: format!("expected an object, got {}", type_name(value)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(metadata: Value) -> LogRecord {
        LogRecord::new("info", "hello", metadata)
    }

    #[tokio::test]
    async fn defaults_pass_metadata_through() {
        let rec = record(json!({
            "values": { "latency_ms": 12.5, "ok": true },
            "tags": { "host": "a", "shard": 3 }
        }));

        let values = MetadataValues.build_values(&rec).await.unwrap();
        assert_eq!(values.get("latency_ms"), Some(&json!(12.5)));
        assert_eq!(values.get("ok"), Some(&json!(true)));

        let tags = MetadataTags.build_tags(&rec).await.unwrap();
        assert_eq!(tags.get("host").map(String::as_str), Some("a"));
        assert_eq!(tags.get("shard").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn defaults_substitute_empty_sets() {
        let rec = record(Value::Null);
        assert!(MetadataValues.build_values(&rec).await.unwrap().is_empty());
        assert!(MetadataTags.build_tags(&rec).await.unwrap().is_empty());

        let rec = record(json!({ "other": 1 }));
        assert!(MetadataValues.build_values(&rec).await.unwrap().is_empty());
        assert!(MetadataTags.build_tags(&rec).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_object_metadata_is_rejected() {
        let rec = record(json!({ "values": [1, 2], "tags": "host=a" }));

        let err = MetadataValues.build_values(&rec).await.unwrap_err();
        assert!(matches!(err, ExtractError::InvalidMetadata { ref field, .. } if field == "values"));

        let err = MetadataTags.build_tags(&rec).await.unwrap_err();
        assert!(matches!(err, ExtractError::InvalidMetadata { ref field, .. } if field == "tags"));
    }

    #[tokio::test]
    async fn nested_tag_value_is_rejected() {
        let rec = record(json!({ "tags": { "nested": { "a": 1 } } }));
        let err = MetadataTags.build_tags(&rec).await.unwrap_err();
        assert_eq!(
            err,
            ExtractError::InvalidMetadata {
                field: "tags.nested".into(),
                reason: "tag values must be scalars".into(),
            }
        );
    }

    #[tokio::test]
    async fn closures_act_as_extractors() {
        let level_tag = |rec: &LogRecord| -> Result<TagSet, ExtractError> {
            let mut tags = TagSet::new();
            tags.insert("level".into(), rec.level.clone());
            Ok(tags)
        };
        let tags = level_tag.build_tags(&record(Value::Null)).await.unwrap();
        assert_eq!(tags.get("level").map(String::as_str), Some("info"));
    }
}
