//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - e2e：配置 -> 输出 -> 路由 -> 缓冲 -> writer
//! - 并发写入下的分区完整性

#[cfg(test)]
mod contract_tests {
    use contracts::{LifecycleState, MetadataKey};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
        assert!(MetadataKey::empty().is_empty());
    }

    #[test]
    fn test_lifecycle_snapshot() {
        let names: Vec<&str> = LifecycleState::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "unconfigured",
                "configured",
                "started",
                "stopped",
                "before_shutdown",
                "shutdown",
                "after_shutdown",
                "closed",
                "terminated",
            ]
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use buffer::{create_writer, BufferSettings, ConfiguredWriter, MemoryBuffer};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        Emitter, EventStream, EventTime, LifecycleState, OutputError, PipelineConfig, Record,
    };
    use dispatcher::{RouteTable, RoutingOutput};
    use output::{Output, OutputSettings};
    use serde_json::{json, Value};

    type FileOutput = Output<MemoryBuffer<ConfiguredWriter>>;

    /// 2016-04-22 00:19:00 UTC
    const T0: i64 = 1461284340;

    /// Six events over three minutes; the second has a different name
    fn reference_stream() -> EventStream {
        [0, 13, 25, 61, 73, 152]
            .into_iter()
            .map(|offset| {
                let name = if offset == 13 { "moris2" } else { "moris1" };
                let record = json!({"key": "my value", "name": name, "offset": offset});
                let Value::Object(record) = record else {
                    unreachable!()
                };
                contracts::Event::new(EventTime::from_secs(T0 + offset), record)
            })
            .collect()
    }

    /// Build outputs and router the way the CLI does
    async fn assemble(config: &PipelineConfig) -> (Vec<Arc<FileOutput>>, RoutingOutput<RouteTable>) {
        let mut outputs = Vec::new();
        let mut table = RouteTable::new();

        for cfg in &config.outputs {
            let writer = create_writer(&cfg.name, &cfg.writer).unwrap();
            let buffer = MemoryBuffer::new(&cfg.name, BufferSettings::from(&cfg.buffer), writer);
            let output = Arc::new(Output::new(&cfg.name, buffer));
            output
                .configure(OutputSettings::from_config(cfg).unwrap())
                .unwrap();
            output.start().await.unwrap();

            let emitter: Arc<dyn Emitter> = output.clone();
            table.register(cfg.tags.iter().cloned(), emitter).unwrap();
            outputs.push(output);
        }

        (outputs, RoutingOutput::new("router", table))
    }

    async fn teardown(outputs: &[Arc<FileOutput>]) {
        for output in outputs {
            output.terminate().await.unwrap();
            assert_eq!(output.state(), LifecycleState::Terminated);
        }
    }

    fn files_under(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }

    /// Decode a concatenated `[time, record]` msgpack stream with integer times
    fn decode_entries(bytes: &[u8]) -> Vec<(i64, Value)> {
        let mut cursor = Cursor::new(bytes);
        let mut entries = Vec::new();
        while (cursor.position() as usize) < bytes.len() {
            entries.push(rmp_serde::decode::from_read(&mut cursor).unwrap());
        }
        entries
    }

    fn load(toml: &str) -> PipelineConfig {
        ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap()
    }

    /// End-to-end: time bucketed bulk chunks land in one file per minute
    #[tokio::test]
    async fn test_e2e_time_buckets_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&format!(
            r#"
[[outputs]]
name = "minutes"
tags = ["app.access"]
time_as_integer = true

[outputs.buffer]
chunk_keys = ["time", "tag"]
timekey_range = 60
flush_mode = "lazy"

[outputs.writer]
writer_type = "file"
params = {{ base_path = "{}", extension = "msgpack" }}
"#,
            dir.path().display()
        ));

        let (outputs, router) = assemble(&config).await;
        router.emits("app.access", &reference_stream()).unwrap();
        teardown(&outputs).await;

        let files = files_under(dir.path());
        assert_eq!(files.len(), 3);

        let buckets: Vec<String> = files
            .iter()
            .map(|f| {
                let bucket = f.parent().unwrap().file_name().unwrap();
                bucket.to_string_lossy().into_owned()
            })
            .collect();
        assert_eq!(
            buckets,
            vec!["20160422001900", "20160422002000", "20160422002100"]
        );
        assert!(files.iter().all(|f| f.starts_with(dir.path().join("app.access"))));

        let counts: Vec<usize> = files
            .iter()
            .map(|f| decode_entries(&std::fs::read(f).unwrap()).len())
            .collect();
        assert_eq!(counts, vec![3, 2, 1]);

        // order within a chunk follows the input
        let first = decode_entries(&std::fs::read(&files[0]).unwrap());
        let offsets: Vec<i64> = first.iter().map(|(_, r)| r["offset"].as_i64().unwrap()).collect();
        assert_eq!(offsets, vec![0, 13, 25]);
        assert_eq!(first[1].0, T0 + 13);

        let snapshot = outputs[0].buffer().metrics().snapshot();
        assert_eq!(snapshot.flushed_count, 3);
        assert_eq!(snapshot.flushed_records, 6);
    }

    /// End-to-end: custom formatter with variable keys, one text file per group
    #[tokio::test]
    async fn test_e2e_custom_format_variable_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&format!(
            r#"
[[outputs]]
name = "named"
tags = ["app.access"]
format = "json"

[outputs.buffer]
chunk_keys = "key,name"

[outputs.writer]
writer_type = "file"
params = {{ base_path = "{}" }}
"#,
            dir.path().display()
        ));

        let (outputs, router) = assemble(&config).await;
        router.emits("app.access", &reference_stream()).unwrap();
        teardown(&outputs).await;

        let files = files_under(dir.path());
        assert_eq!(files.len(), 2);

        let mut groups: Vec<(String, usize)> = files
            .iter()
            .map(|f| {
                let name = f.file_name().unwrap().to_string_lossy().into_owned();
                let lines = std::fs::read_to_string(f).unwrap().lines().count();
                (name, lines)
            })
            .collect();
        groups.sort_by_key(|(_, lines)| *lines);

        assert_eq!(groups[0].1, 1);
        assert!(groups[0].0.starts_with("key=my value,name=moris2."));
        assert_eq!(groups[1].1, 5);
        assert!(groups[1].0.starts_with("key=my value,name=moris1."));
        assert!(groups[1].0.ends_with(".log"));
    }

    /// Many producers on one output: every accepted event is flushed exactly once
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_concurrent_producers_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&format!(
            r#"
[[outputs]]
name = "shared"
tags = ["p0", "p1", "p2", "p3"]
time_as_integer = true

[outputs.buffer]
chunk_keys = ["tag"]
chunk_limit_records = 50
queue_limit = 256
flush_interval_ms = 10

[outputs.writer]
writer_type = "file"
params = {{ base_path = "{}", extension = "msgpack" }}
"#,
            dir.path().display()
        ));

        let (outputs, router) = assemble(&config).await;
        let router = Arc::new(router);

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let tag = format!("p{p}");
                    for batch in 0..25 {
                        let stream: EventStream = (0..10)
                            .map(|i| {
                                let mut record = Record::new();
                                record.insert("seq".into(), json!(batch * 10 + i));
                                contracts::Event::new(EventTime::from_secs(T0), record)
                            })
                            .collect();
                        router.emits(&tag, &stream).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        teardown(&outputs).await;

        let mut per_tag = std::collections::HashMap::new();
        for file in files_under(dir.path()) {
            let tag = file
                .strip_prefix(dir.path())
                .unwrap()
                .components()
                .next()
                .unwrap()
                .as_os_str()
                .to_string_lossy()
                .into_owned();
            let entries = decode_entries(&std::fs::read(&file).unwrap());
            let seqs = per_tag.entry(tag).or_insert_with(Vec::new);
            seqs.extend(entries.iter().map(|(_, r)| r["seq"].as_i64().unwrap()));
        }

        assert_eq!(per_tag.len(), 4);
        for seqs in per_tag.values_mut() {
            seqs.sort_unstable();
            assert_eq!(*seqs, (0..250).collect::<Vec<i64>>());
        }
        assert_eq!(router.metrics().routed_count(), 100);
    }

    /// After teardown the router surfaces the output's refusal, and unknown tags fail
    #[tokio::test]
    async fn test_e2e_emit_after_teardown_and_unknown_tag() {
        let config = load(
            r#"
[[outputs]]
name = "debug"
tags = ["debug"]
"#,
        );

        let (outputs, router) = assemble(&config).await;
        router
            .emit("debug", EventTime::from_secs(T0), Record::new())
            .unwrap();

        let err = router
            .emit("missing", EventTime::from_secs(T0), Record::new())
            .unwrap_err();
        assert!(matches!(err, OutputError::NoRoute { .. }));

        teardown(&outputs).await;
        let err = router
            .emit("debug", EventTime::from_secs(T0), Record::new())
            .unwrap_err();
        assert!(matches!(
            err,
            OutputError::NotReady { state: LifecycleState::Terminated, .. }
        ));

        let snapshot = outputs[0].snapshot();
        assert_eq!(snapshot.events_emitted, 1);
        assert_eq!(snapshot.emits_rejected, 1);
    }
}
