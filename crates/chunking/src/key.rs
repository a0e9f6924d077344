//! Metadata key derivation

use contracts::{ChunkKeySpec, EventTime, MetadataKey, Record, Variables};
use serde_json::Value;

/// Compute the metadata key of one event
///
/// Pure: identical `(tag, time, record)` always yields an identical key.
/// Time buckets are aligned to the epoch, `floor(time / w) * w`. A variable
/// field missing from the record becomes `null` instead of an error.
pub fn derive_key(spec: &ChunkKeySpec, tag: &str, time: EventTime, record: &Record) -> MetadataKey {
    let timekey = spec.timekey_range().map(|w| time_bucket(time.sec(), w));

    let tag = spec.tag().then(|| tag.to_string());

    let variables = (!spec.variables().is_empty()).then(|| {
        Variables::new(
            spec.variables()
                .iter()
                .map(|name| (name.clone(), record.get(name).cloned().unwrap_or(Value::Null)))
                .collect(),
        )
    });

    MetadataKey::new(timekey, tag, variables)
}

/// Start of the epoch-aligned bucket holding `sec`
///
/// `w > 0` is guaranteed by `ChunkKeySpec` validation. Buckets below
/// `i64::MIN` are clamped to it.
fn time_bucket(sec: i64, w: i64) -> i64 {
    sec.div_euclid(w).checked_mul(w).unwrap_or(i64::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_time_bucket_floor() {
        let spec = ChunkKeySpec::new(Some(60), false, vec![]).unwrap();
        let r = Record::new();

        // 2016-04-21 17:19:13 -0700
        let key = derive_key(&spec, "t", EventTime::from_secs(1461284353), &r);
        assert_eq!(key.timekey, Some(1461284340));

        let key = derive_key(&spec, "t", EventTime::new(1461284399, 999_999_999), &r);
        assert_eq!(key.timekey, Some(1461284340));
    }

    #[test]
    fn test_time_bucket_at_i64_extremes() {
        let spec = ChunkKeySpec::new(Some(60), false, vec![]).unwrap();
        let r = Record::new();

        let key = derive_key(&spec, "t", EventTime::from_secs(i64::MIN), &r);
        assert_eq!(key.timekey, Some(i64::MIN));

        let key = derive_key(&spec, "t", EventTime::from_secs(i64::MAX), &r);
        assert_eq!(key.timekey, Some(i64::MAX - i64::MAX % 60));

        // lowest bucket that is still representable
        let lowest = (i64::MIN.div_euclid(60) + 1) * 60;
        let key = derive_key(&spec, "t", EventTime::from_secs(lowest), &r);
        assert_eq!(key.timekey, Some(lowest));

        let key = derive_key(&spec, "t", EventTime::from_secs_f64(-1e300), &r);
        assert_eq!(key.timekey, Some(i64::MIN));
    }

    #[test]
    fn test_time_bucket_before_epoch() {
        let spec = ChunkKeySpec::new(Some(60), false, vec![]).unwrap();
        let key = derive_key(&spec, "t", EventTime::from_secs(-1), &Record::new());
        assert_eq!(key.timekey, Some(-60));
    }

    #[test]
    fn test_tag_is_literal() {
        let spec = ChunkKeySpec::new(None, true, vec![]).unwrap();
        let key = derive_key(&spec, "app.Access ", EventTime::from_secs(0), &Record::new());
        assert_eq!(key.tag.as_deref(), Some("app.Access "));
        assert_eq!(key.timekey, None);
        assert_eq!(key.variables, None);
    }

    #[test]
    fn test_variables_in_configured_order() {
        let spec = ChunkKeySpec::new(None, false, vec!["name".into(), "key".into()]).unwrap();
        let key = derive_key(
            &spec,
            "t",
            EventTime::from_secs(0),
            &record(json!({"key": "my value", "name": "moris1", "message": "hello!"})),
        );
        let vars = key.variables.unwrap();
        let names: Vec<_> = vars.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["name", "key"]);
        assert_eq!(vars.get("key"), Some(&json!("my value")));
    }

    #[test]
    fn test_missing_field_is_null() {
        let spec = ChunkKeySpec::new(None, false, vec!["host".into()]).unwrap();
        let a = derive_key(&spec, "t", EventTime::from_secs(0), &record(json!({"x": 1})));
        let b = derive_key(&spec, "t", EventTime::from_secs(5), &record(json!({"y": 2})));
        assert_eq!(a, b);
        assert_eq!(a.variables.unwrap().get("host"), Some(&Value::Null));
    }

    #[test]
    fn test_no_dimension_is_empty_key() {
        let key = derive_key(
            &ChunkKeySpec::none(),
            "t",
            EventTime::from_secs(42),
            &record(json!({"a": 1})),
        );
        assert!(key.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let spec = ChunkKeySpec::parse("time,tag,name", Some(3600)).unwrap();
        let r = record(json!({"name": "moris2", "n": [1, 2.5]}));
        let t = EventTime::new(1461284353, 123);
        assert_eq!(derive_key(&spec, "a.b", t, &r), derive_key(&spec, "a.b", t, &r));
    }
}
