//! Chunking engine implementation.

use bytes::Bytes;
use std::collections::HashMap;

use contracts::{
    Buffer, ChunkKeySpec, EventStream, FormatMode, Formatter, MetadataKey, OutputError,
};
use tracing::{debug, instrument};

use crate::encode::MsgpackStream;
use crate::key::derive_key;

/// Result of one chunking call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkingOutcome {
    /// Distinct metadata keys, one buffer call each
    pub groups: usize,
    /// Events appended across all groups
    pub events: usize,
}

/// Insertion-ordered grouping by metadata key
struct Groups<G> {
    index: HashMap<MetadataKey, usize>,
    groups: Vec<(MetadataKey, G)>,
}

impl<G: Default> Groups<G> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn entry(&mut self, key: MetadataKey) -> &mut G {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.groups.len();
                self.index.insert(key.clone(), idx);
                self.groups.push((key, G::default()));
                idx
            }
        };
        &mut self.groups[idx].1
    }

    fn into_ordered(self) -> Vec<(MetadataKey, G)> {
        self.groups
    }
}

/// Partitions event streams into per-key groups and appends them to a buffer
///
/// Configuration is fixed at construction. The engine holds no mutable
/// state, so concurrent calls share one instance freely.
#[derive(Debug, Clone)]
pub struct ChunkingEngine {
    spec: ChunkKeySpec,
    mode: FormatMode,
    time_as_integer: bool,
}

impl ChunkingEngine {
    pub fn new(spec: ChunkKeySpec, mode: FormatMode, time_as_integer: bool) -> Self {
        Self {
            spec,
            mode,
            time_as_integer,
        }
    }

    pub fn spec(&self) -> &ChunkKeySpec {
        &self.spec
    }

    pub fn mode(&self) -> &FormatMode {
        &self.mode
    }

    pub fn time_as_integer(&self) -> bool {
        self.time_as_integer
    }

    /// Group `stream` by metadata key and append every group to `buffer`
    ///
    /// Buffer calls happen after the whole stream is consumed, once per
    /// distinct key, in first-seen key order. An empty stream makes no call.
    ///
    /// # Errors
    /// A formatter failure aborts before any buffer call. A buffer error is
    /// returned unchanged; groups appended before it stay in the buffer.
    #[instrument(
        name = "chunking_execute",
        skip(self, stream, buffer),
        fields(events = stream.len(), bulk = self.mode.is_bulk())
    )]
    pub fn execute_chunking(
        &self,
        tag: &str,
        stream: &EventStream,
        buffer: &dyn Buffer,
    ) -> Result<ChunkingOutcome, OutputError> {
        if stream.is_empty() {
            return Ok(ChunkingOutcome::default());
        }

        let outcome = match &self.mode {
            FormatMode::Bulk => self.chunk_bulk(tag, stream, buffer)?,
            FormatMode::Custom(formatter) => {
                self.chunk_custom(tag, stream, formatter.as_ref(), buffer)?
            }
        };

        debug!(
            groups = outcome.groups,
            events = outcome.events,
            "Chunking complete"
        );
        Ok(outcome)
    }

    fn chunk_bulk(
        &self,
        tag: &str,
        stream: &EventStream,
        buffer: &dyn Buffer,
    ) -> Result<ChunkingOutcome, OutputError> {
        let mut groups: Groups<MsgpackStream> = Groups::new();

        for (time, record) in stream {
            let key = derive_key(&self.spec, tag, time, record);
            groups
                .entry(key)
                .push(time.to_timestamp(self.time_as_integer), record)?;
        }

        let mut outcome = ChunkingOutcome::default();
        for (key, group) in groups.into_ordered() {
            let (data, count) = group.finish();
            buffer.emit_bulk(key, data, count)?;
            outcome.groups += 1;
            outcome.events += count;
        }
        Ok(outcome)
    }

    fn chunk_custom(
        &self,
        tag: &str,
        stream: &EventStream,
        formatter: &dyn Formatter,
        buffer: &dyn Buffer,
    ) -> Result<ChunkingOutcome, OutputError> {
        let mut groups: Groups<Vec<Bytes>> = Groups::new();

        for (time, record) in stream {
            let key = derive_key(&self.spec, tag, time, record);
            let item = formatter
                .format(tag, time.to_timestamp(self.time_as_integer), record)
                .map_err(|e| OutputError::formatter(tag, e))?;
            groups.entry(key).push(item);
        }

        let mut outcome = ChunkingOutcome::default();
        for (key, items) in groups.into_ordered() {
            let count = items.len();
            buffer.emit(key, items)?;
            outcome.groups += 1;
            outcome.events += count;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::tests::{decode_event_stream, decode_int_stream};
    use contracts::{BufferError, EventTime, FormatError, Record, Timestamp};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Bulk {
            key: MetadataKey,
            data: Bytes,
            count: usize,
        },
        Items {
            key: MetadataKey,
            items: Vec<Bytes>,
        },
    }

    /// Records every append in call order
    #[derive(Default)]
    struct RecordingBuffer {
        calls: Mutex<Vec<Call>>,
        fail_after: Option<usize>,
    }

    impl RecordingBuffer {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn check_fail(&self) -> Result<(), BufferError> {
            match self.fail_after {
                Some(n) if self.calls.lock().len() >= n => Err(BufferError::Overflow {
                    queued: n,
                    limit: n,
                }),
                _ => Ok(()),
            }
        }
    }

    impl Buffer for RecordingBuffer {
        fn emit_bulk(&self, key: MetadataKey, data: Bytes, count: usize) -> Result<(), BufferError> {
            self.check_fail()?;
            self.calls.lock().push(Call::Bulk { key, data, count });
            Ok(())
        }

        fn emit(&self, key: MetadataKey, items: Vec<Bytes>) -> Result<(), BufferError> {
            self.check_fail()?;
            self.calls.lock().push(Call::Items { key, items });
            Ok(())
        }
    }

    fn record(name: &str) -> Record {
        json!({"name": name, "key": "my value", "message": "hello!"})
            .as_object()
            .cloned()
            .unwrap()
    }

    // 2016-04-21 17:19:00 -0700
    const T0: i64 = 1461284340;

    /// Six events between 17:19 and 17:21, the second one from moris2
    fn reference_stream() -> EventStream {
        let mut es = EventStream::new();
        es.add(EventTime::from_secs(T0), record("moris1"));
        es.add(EventTime::from_secs(T0 + 13), record("moris2"));
        es.add(EventTime::from_secs(T0 + 25), record("moris1"));
        es.add(EventTime::from_secs(T0 + 61), record("moris1"));
        es.add(EventTime::from_secs(T0 + 73), record("moris1"));
        es.add(EventTime::from_secs(T0 + 152), record("moris1"));
        es
    }

    /// Sub-second nanoseconds of each reference event
    const NANOS: [u32; 6] = [0, 123_456_789, 999_999_999, 1, 500_000_000, 42];

    /// Reference stream with sub-second times
    fn rich_reference_stream() -> EventStream {
        let base = reference_stream();
        let rich: EventStream = base
            .iter()
            .zip(NANOS)
            .map(|((time, record), nsec)| {
                contracts::Event::new(EventTime::new(time.sec(), nsec), record.clone())
            })
            .collect();
        rich
    }

    fn bulk_data(call: &Call) -> &Bytes {
        match call {
            Call::Bulk { data, .. } => data,
            Call::Items { .. } => panic!("expected bulk call"),
        }
    }

    fn json_array_mode() -> FormatMode {
        FormatMode::custom(
            |_tag: &str, time: Timestamp, record: &Record| -> Result<Bytes, FormatError> {
                Ok(Bytes::from(serde_json::to_vec(&(time, record))?))
            },
        )
    }

    fn counts(calls: &[Call]) -> Vec<usize> {
        calls
            .iter()
            .map(|c| match c {
                Call::Bulk { count, .. } => *count,
                Call::Items { items, .. } => items.len(),
            })
            .collect()
    }

    #[test]
    fn test_time_buckets_three_calls_in_order() {
        let spec = ChunkKeySpec::parse("time", Some(60)).unwrap();
        let engine = ChunkingEngine::new(spec, FormatMode::Bulk, true);
        let buffer = RecordingBuffer::default();

        let outcome = engine
            .execute_chunking("test.tag", &reference_stream(), &buffer)
            .unwrap();

        let calls = buffer.calls();
        assert_eq!(counts(&calls), vec![3, 2, 1]);
        assert_eq!(outcome, ChunkingOutcome { groups: 3, events: 6 });

        let timekeys: Vec<_> = calls
            .iter()
            .map(|c| match c {
                Call::Bulk { key, .. } => key.timekey.unwrap(),
                Call::Items { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(timekeys, vec![T0, T0 + 60, T0 + 120]);
    }

    #[test]
    fn test_variable_keys_group_non_contiguous() {
        let spec = ChunkKeySpec::parse("key,name", None).unwrap();
        let engine = ChunkingEngine::new(spec, FormatMode::Bulk, true);
        let buffer = RecordingBuffer::default();

        engine
            .execute_chunking("test.tag", &reference_stream(), &buffer)
            .unwrap();

        let calls = buffer.calls();
        assert_eq!(counts(&calls), vec![5, 1]);

        let Call::Bulk { key, data, .. } = &calls[0] else {
            panic!("expected bulk call");
        };
        let vars = key.variables.as_ref().unwrap();
        assert_eq!(vars.get("name"), Some(&json!("moris1")));
        assert_eq!(vars.get("key"), Some(&json!("my value")));

        // relative order kept inside the group
        let times: Vec<_> = decode_int_stream(data).into_iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![T0, T0 + 25, T0 + 61, T0 + 73, T0 + 152]);
    }

    #[test]
    fn test_custom_formatter_no_keys_single_emit() {
        let mode = FormatMode::custom(
            |_tag: &str, time: Timestamp, record: &Record| -> Result<Bytes, FormatError> {
                Ok(Bytes::from(serde_json::to_vec(&(time, record))?))
            },
        );
        let engine = ChunkingEngine::new(ChunkKeySpec::none(), mode, true);
        let buffer = RecordingBuffer::default();

        engine
            .execute_chunking("test.tag", &reference_stream(), &buffer)
            .unwrap();

        let calls = buffer.calls();
        assert_eq!(calls.len(), 1);
        let Call::Items { key, items } = &calls[0] else {
            panic!("expected item call");
        };
        assert!(key.is_empty());
        assert_eq!(items.len(), 6);
        assert!(items[0].starts_with(format!("[{T0},").as_bytes()));
        assert!(std::str::from_utf8(&items[1]).unwrap().contains("moris2"));
        assert!(items[5].starts_with(format!("[{},", T0 + 152).as_bytes()));
    }

    #[test]
    fn test_empty_stream_makes_no_calls() {
        let engine = ChunkingEngine::new(ChunkKeySpec::none(), FormatMode::Bulk, false);
        let buffer = RecordingBuffer::default();

        let outcome = engine
            .execute_chunking("t", &EventStream::new(), &buffer)
            .unwrap();
        assert_eq!(outcome, ChunkingOutcome::default());
        assert!(buffer.calls().is_empty());
    }

    #[test]
    fn test_single_event_single_call() {
        let spec = ChunkKeySpec::parse("time,tag", Some(3600)).unwrap();
        let engine = ChunkingEngine::new(spec, FormatMode::Bulk, false);
        let buffer = RecordingBuffer::default();

        let es = EventStream::one(EventTime::new(T0, 5), record("moris1"));
        engine.execute_chunking("t", &es, &buffer).unwrap();

        let calls = buffer.calls();
        assert_eq!(counts(&calls), vec![1]);
    }

    #[test]
    fn test_no_dimension_collapses_to_one_group() {
        let engine = ChunkingEngine::new(ChunkKeySpec::none(), FormatMode::Bulk, true);
        let buffer = RecordingBuffer::default();

        engine
            .execute_chunking("t", &reference_stream(), &buffer)
            .unwrap();

        let calls = buffer.calls();
        assert_eq!(counts(&calls), vec![6]);
        let Call::Bulk { data, .. } = &calls[0] else {
            panic!("expected bulk call");
        };
        assert_eq!(decode_int_stream(data).len(), 6);
    }

    #[test]
    fn test_partition_is_complete_and_deterministic() {
        let spec = ChunkKeySpec::parse("time,name", Some(60)).unwrap();
        let engine = ChunkingEngine::new(spec, FormatMode::Bulk, true);

        let first = RecordingBuffer::default();
        let second = RecordingBuffer::default();
        engine
            .execute_chunking("t", &reference_stream(), &first)
            .unwrap();
        engine
            .execute_chunking("t", &reference_stream(), &second)
            .unwrap();

        assert_eq!(first.calls(), second.calls());
        assert_eq!(counts(&first.calls()).iter().sum::<usize>(), 6);

        let keys: Vec<_> = first
            .calls()
            .into_iter()
            .map(|c| match c {
                Call::Bulk { key, .. } => key,
                Call::Items { key, .. } => key,
            })
            .collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_formatter_failure_aborts_before_buffer() {
        let mode = FormatMode::custom(
            |_tag: &str, _time: Timestamp, record: &Record| -> Result<Bytes, FormatError> {
                if record["name"] == "moris2" {
                    Err(FormatError::new("rejected"))
                } else {
                    Ok(Bytes::from_static(b"ok"))
                }
            },
        );
        let engine = ChunkingEngine::new(ChunkKeySpec::none(), mode, true);
        let buffer = RecordingBuffer::default();

        let err = engine
            .execute_chunking("test.tag", &reference_stream(), &buffer)
            .unwrap_err();
        assert!(matches!(err, OutputError::Formatter { .. }));
        assert!(buffer.calls().is_empty());
    }

    #[test]
    fn test_buffer_error_propagates_and_keeps_earlier_groups() {
        let spec = ChunkKeySpec::parse("time", Some(60)).unwrap();
        let engine = ChunkingEngine::new(spec, FormatMode::Bulk, true);
        let buffer = RecordingBuffer {
            fail_after: Some(1),
            ..Default::default()
        };

        let err = engine
            .execute_chunking("t", &reference_stream(), &buffer)
            .unwrap_err();
        assert!(matches!(
            err,
            OutputError::Buffer(BufferError::Overflow { .. })
        ));
        assert_eq!(counts(&buffer.calls()), vec![3]);
    }

    #[test]
    fn test_rich_time_buckets_keep_nanoseconds() {
        let spec = ChunkKeySpec::parse("time", Some(60)).unwrap();
        let engine = ChunkingEngine::new(spec, FormatMode::Bulk, false);
        let buffer = RecordingBuffer::default();

        engine
            .execute_chunking("test.tag", &rich_reference_stream(), &buffer)
            .unwrap();

        let calls = buffer.calls();
        assert_eq!(counts(&calls), vec![3, 2, 1]);

        let times: Vec<EventTime> = calls
            .iter()
            .flat_map(|c| decode_event_stream(bulk_data(c)))
            .map(|(t, _)| t)
            .collect();
        let expected: Vec<EventTime> = rich_reference_stream().iter().map(|(t, _)| t).collect();
        assert_eq!(times, expected);
        assert_eq!(times[1].nsec(), 123_456_789);
    }

    #[test]
    fn test_rich_time_variable_keys() {
        let spec = ChunkKeySpec::parse("key,name", None).unwrap();
        let engine = ChunkingEngine::new(spec, FormatMode::Bulk, false);
        let buffer = RecordingBuffer::default();

        engine
            .execute_chunking("test.tag", &rich_reference_stream(), &buffer)
            .unwrap();

        let calls = buffer.calls();
        assert_eq!(counts(&calls), vec![5, 1]);

        let moris2 = decode_event_stream(bulk_data(&calls[1]));
        assert_eq!(moris2[0].0, EventTime::new(T0 + 13, 123_456_789));
        assert_eq!(moris2[0].1["name"], json!("moris2"));
    }

    #[test]
    fn test_rich_time_no_dimension_collapse() {
        let engine = ChunkingEngine::new(ChunkKeySpec::none(), FormatMode::Bulk, false);
        let buffer = RecordingBuffer::default();

        engine
            .execute_chunking("t", &rich_reference_stream(), &buffer)
            .unwrap();

        let calls = buffer.calls();
        assert_eq!(counts(&calls), vec![6]);
        let nanos: Vec<u32> = decode_event_stream(bulk_data(&calls[0]))
            .into_iter()
            .map(|(t, _)| t.nsec())
            .collect();
        assert_eq!(nanos, NANOS);
    }

    #[test]
    fn test_custom_formatter_with_time_key() {
        let spec = ChunkKeySpec::parse("time", Some(60)).unwrap();
        let engine = ChunkingEngine::new(spec, json_array_mode(), true);
        let buffer = RecordingBuffer::default();

        let outcome = engine
            .execute_chunking("test.tag", &reference_stream(), &buffer)
            .unwrap();
        assert_eq!(outcome, ChunkingOutcome { groups: 3, events: 6 });

        let calls = buffer.calls();
        assert_eq!(counts(&calls), vec![3, 2, 1]);

        let buckets: Vec<(i64, Vec<i64>)> = calls
            .iter()
            .map(|c| match c {
                Call::Items { key, items } => {
                    let times = items
                        .iter()
                        .map(|item| {
                            let (time, _): (i64, Value) = serde_json::from_slice(item).unwrap();
                            time
                        })
                        .collect();
                    (key.timekey.unwrap(), times)
                }
                Call::Bulk { .. } => panic!("expected item call"),
            })
            .collect();
        assert_eq!(
            buckets,
            vec![
                (T0, vec![T0, T0 + 13, T0 + 25]),
                (T0 + 60, vec![T0 + 61, T0 + 73]),
                (T0 + 120, vec![T0 + 152]),
            ]
        );
    }

    #[test]
    fn test_signed_zero_values_share_one_group() {
        let spec = ChunkKeySpec::parse("v", None).unwrap();
        let engine = ChunkingEngine::new(spec, FormatMode::Bulk, true);
        let buffer = RecordingBuffer::default();

        let stream: EventStream = [0.0, -0.0, 0.0, -0.0]
            .into_iter()
            .map(|v: f64| {
                let record = json!({ "v": v }).as_object().cloned().unwrap();
                contracts::Event::new(EventTime::from_secs(T0), record)
            })
            .collect();

        engine.execute_chunking("t", &stream, &buffer).unwrap();
        assert_eq!(counts(&buffer.calls()), vec![4]);
    }
}
