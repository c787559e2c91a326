//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（无需传感器与远端数据库）
//! - 离线队列的重启与丢弃行为

#[cfg(test)]
mod contract_tests {
    use contracts::{Event, Sample};

    #[test]
    fn test_event_wire_shape() {
        let event = Event {
            id: "20250101120000-000000-000007".to_string(),
            sequence: 7,
            device: "pi-3".to_string(),
            trigger_time: 10.0,
            start_time: 4.0,
            end_time: 16.0,
            samples: vec![Sample::new(4.0, 1013.0, 2.1, 21.5)],
        };

        let value = serde_json::to_value(&event).unwrap();
        for key in [
            "id",
            "sequence",
            "device",
            "trigger_time",
            "start_time",
            "end_time",
            "samples",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        let sample = &value["samples"][0];
        for key in ["timestamp", "pressure", "altitude", "temperature"] {
            assert!(sample.get(key).is_some(), "missing sample.{key}");
        }
    }

    #[test]
    fn test_config_round_trip() {
        use config_loader::{ConfigFormat, ConfigLoader};

        let mut blueprint = contracts::AgentBlueprint::default();
        blueprint.device.name = "pi-roundtrip".to_string();
        blueprint.detection.threshold_meters = 2.5;
        blueprint
            .sink
            .params
            .insert("format".to_string(), "bincode".to_string());

        let toml = ConfigLoader::to_toml(&blueprint).unwrap();
        let from_toml = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(from_toml.device.name, "pi-roundtrip");
        assert_eq!(from_toml.detection.threshold_meters, 2.5);
        assert_eq!(from_toml.sink.params["format"], "bincode");

        let json = ConfigLoader::to_json(&from_toml).unwrap();
        let from_json = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(
            from_json.storage.offline_data_path,
            blueprint.storage.offline_data_path
        );
        assert_eq!(from_json.database.address(), blueprint.database.address());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::future::pending;
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use altimon_cli::{AgentStats, Orchestrator, OrchestratorConfig};
    use contracts::{AgentBlueprint, ContractError, Event, EventSink};
    use ingestion::{AltitudeProfile, MockBarometer, MockBarometerConfig};
    use tokio::time::Instant;

    /// Four level changes, each settling well before the next
    const FOUR_STEPS: &str = "0:0,10:3,25:0,40:3,55:0";

    /// Refuses deliveries until `down_until`, then acknowledges everything
    struct OutageSink {
        down_until: Instant,
        delivered: Arc<Mutex<Vec<Event>>>,
        refused: Arc<Mutex<u64>>,
    }

    impl OutageSink {
        fn new(outage: Duration) -> (Self, Arc<Mutex<Vec<Event>>>, Arc<Mutex<u64>>) {
            let delivered = Arc::new(Mutex::new(Vec::new()));
            let refused = Arc::new(Mutex::new(0));
            let sink = Self {
                down_until: Instant::now() + outage,
                delivered: Arc::clone(&delivered),
                refused: Arc::clone(&refused),
            };
            (sink, delivered, refused)
        }

        fn always_down() -> Self {
            Self::new(Duration::from_secs(24 * 3600)).0
        }
    }

    impl EventSink for OutageSink {
        fn name(&self) -> &str {
            "outage"
        }

        async fn deliver(&mut self, event: &Event) -> Result<(), ContractError> {
            if Instant::now() < self.down_until {
                *self.refused.lock().unwrap() += 1;
                return Err(ContractError::sink_connection("outage", "remote unreachable"));
            }
            self.delivered.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn blueprint(offline_path: &Path) -> AgentBlueprint {
        let mut blueprint = AgentBlueprint::default();
        blueprint.device.name = "e2e-device".to_string();
        blueprint.sensor.sample_rate_hz = 5.0;
        blueprint.detection.threshold_meters = 1.0;
        blueprint.detection.comparison_window_seconds = 2.0;
        blueprint.detection.stabilization_time_seconds = 3.0;
        blueprint.database.reconnect_delay_seconds = 1.0;
        blueprint.database.max_reconnect_delay_seconds = 4.0;
        blueprint.database.reconnect_attempts = 3;
        blueprint.storage.offline_data_path = offline_path.to_path_buf();
        blueprint
    }

    fn barometer(steps: &str) -> MockBarometer {
        MockBarometer::new(MockBarometerConfig {
            sensor_id: "mock".to_string(),
            profile: AltitudeProfile::parse_steps(steps).unwrap(),
            ..Default::default()
        })
    }

    async fn run(
        blueprint: AgentBlueprint,
        seconds: u64,
        source: MockBarometer,
        sink: OutageSink,
    ) -> AgentStats {
        Orchestrator::new(OrchestratorConfig {
            blueprint,
            duration: Some(Duration::from_secs(seconds)),
        })
        .run_with(source, sink, pending())
        .await
        .unwrap()
    }

    fn sequences(events: &[Event]) -> Vec<u64> {
        events.iter().map(|e| e.sequence).collect()
    }

    /// 0 m for 5 s, 2 m for 10 s, 0.1 m for 6 s: one recording, closed by the shutdown flush
    #[tokio::test(start_paused = true)]
    async fn test_step_scenario_produces_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut blueprint = blueprint(dir.path());
        blueprint.detection.comparison_window_seconds = 5.0;
        blueprint.detection.stabilization_time_seconds = 5.0;
        let (sink, delivered, _) = OutageSink::new(Duration::ZERO);

        let stats = run(blueprint.clone(), 21, barometer("0:0,5:2,15:0.1"), sink).await;

        assert_eq!(stats.events_emitted, 1);
        assert!((104..=106).contains(&stats.samples_taken));
        // the flushed event reaches the worker only after shutdown, so it waits on disk
        assert!(delivered.lock().unwrap().is_empty());
        assert_eq!(stats.final_queue_depth, 1);

        let queue = dispatcher::OfflineQueue::open(
            dir.path(),
            blueprint.storage.max_offline_files,
            &blueprint.device.name,
            Arc::new(dispatcher::DeliveryMetrics::new()),
        )
        .unwrap();
        let event = queue.peek_oldest().unwrap().unwrap().event;
        assert_eq!(event.device, "e2e-device");
        assert_eq!(event.sequence, 1);

        // lookback reaches the first sample of the run
        let triggered_after = event.trigger_time - event.start_time;
        assert!(
            (4.9..=5.3).contains(&triggered_after),
            "triggered {triggered_after}s in"
        );
        let closed_after = event.end_time - event.start_time;
        assert!(
            (20.5..=21.0).contains(&closed_after),
            "closed {closed_after}s in"
        );

        assert!(event
            .samples
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
        assert!(event.samples.iter().any(|s| (s.altitude - 2.0).abs() < 0.01));
        assert!(event.samples.iter().any(|s| (s.altitude - 0.1).abs() < 0.01));
        assert_eq!(event.samples.last().unwrap().timestamp, event.end_time);
        assert_eq!(event.sample_count() as u64, stats.samples_taken);
    }

    /// Reads fail for about a second while recording; the recording carries on unchanged
    #[tokio::test(start_paused = true)]
    async fn test_read_failures_mid_recording_keep_the_event() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, delivered, _) = OutageSink::new(Duration::ZERO);
        let source = barometer("0:0,10:3");
        let failures = source.failure_injector();

        // between the 11.0 s and 11.2 s ticks: the reads at 11.2 ..= 12.0 s fail
        let started = Instant::now();
        let outage = tokio::spawn(async move {
            tokio::time::sleep_until(started + Duration::from_millis(11_100)).await;
            failures.store(5, Ordering::SeqCst);
        });

        let stats = run(blueprint(dir.path()), 20, source, sink).await;
        outage.await.unwrap();

        assert_eq!(stats.sensor_errors, 5);
        assert_eq!(stats.events_emitted, 1);
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let event = &delivered[0];

        // lookback reaches the first sample, so offsets are relative to the run start
        let triggered_after = event.trigger_time - event.start_time;
        assert!(
            (9.9..=10.3).contains(&triggered_after),
            "triggered {triggered_after}s in"
        );
        // quiet from the first sample after the failures (12.2 s) for 3 s
        let closed_after = event.end_time - event.start_time;
        assert!(
            (15.0..=15.4).contains(&closed_after),
            "closed {closed_after}s in"
        );

        let offsets: Vec<f64> = event
            .samples
            .iter()
            .map(|s| s.timestamp - event.start_time)
            .collect();
        assert!(!offsets.iter().any(|t| (11.1..12.1).contains(t)));
        let widest = offsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(0.0_f64, f64::max);
        assert!((1.1..=1.3).contains(&widest), "widest gap {widest}s");
        // ticks 0 ..= 15.2 s at 5 Hz, minus the five failed reads
        assert_eq!(event.sample_count(), 72);
    }

    /// The remote store is down for the first 50 s; order survives the outage
    #[tokio::test(start_paused = true)]
    async fn test_fifo_delivery_across_outage() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, delivered, refused) = OutageSink::new(Duration::from_secs(50));

        let stats = run(blueprint(dir.path()), 90, barometer(FOUR_STEPS), sink).await;

        let delivered = delivered.lock().unwrap();
        assert_eq!(stats.events_emitted, 4);
        assert_eq!(sequences(&delivered), vec![1, 2, 3, 4]);
        assert!(*refused.lock().unwrap() >= 2);
        assert!(stats.delivery.failures >= 2);
        assert_eq!(stats.delivery.delivered, 4);
        assert_eq!(stats.delivery.data_lost, 0);
        assert_eq!(stats.events_lost, 0);
        assert_eq!(stats.final_queue_depth, 0);
        assert_eq!(stats.events_live + stats.events_spilled, 4);
    }

    /// Events queued in one run are delivered first by the next, and numbering continues
    #[tokio::test(start_paused = true)]
    async fn test_restart_resumes_queue_and_sequence() {
        let dir = tempfile::tempdir().unwrap();

        let first = run(
            blueprint(dir.path()),
            30,
            barometer("0:0,10:3"),
            OutageSink::always_down(),
        )
        .await;
        assert_eq!(first.events_emitted, 1);
        assert_eq!(first.delivery.delivered, 0);
        assert_eq!(first.final_queue_depth, 1);

        let (sink, delivered, _) = OutageSink::new(Duration::ZERO);
        let second = run(blueprint(dir.path()), 30, barometer("0:0,10:3"), sink).await;

        let delivered = delivered.lock().unwrap();
        assert_eq!(sequences(&delivered), vec![1, 2]);
        assert_ne!(delivered[0].id, delivered[1].id);
        assert_eq!(second.final_queue_depth, 0);
    }

    /// A full queue drops its oldest record, and only that
    #[tokio::test(start_paused = true)]
    async fn test_bounded_queue_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut blueprint = blueprint(dir.path());
        blueprint.storage.max_offline_files = 2;

        let stats = run(
            blueprint.clone(),
            70,
            barometer(FOUR_STEPS),
            OutageSink::always_down(),
        )
        .await;

        assert_eq!(stats.events_emitted, 4);
        assert_eq!(stats.final_queue_depth, 2);
        assert_eq!(stats.delivery.data_lost, 2);

        let queue = dispatcher::OfflineQueue::open(
            dir.path(),
            blueprint.storage.max_offline_files,
            &blueprint.device.name,
            Arc::new(dispatcher::DeliveryMetrics::new()),
        )
        .unwrap();
        assert_eq!(queue.next_sequence(), 5);
        let oldest = queue.peek_oldest().unwrap().unwrap();
        assert_eq!(oldest.event.sequence, 3);
        assert!(oldest.attempt_count >= 1);
    }

    /// Full stack against a local ingestion endpoint, in real time
    #[tokio::test]
    async fn test_network_delivery_with_ack() {
        use dispatcher::sinks::{decode_payload, NetworkFormat, ACK};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&received);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    while let Ok(len) = socket.read_u32().await {
                        let mut payload = vec![0u8; len as usize];
                        if socket.read_exact(&mut payload).await.is_err() {
                            break;
                        }
                        let envelope = decode_payload(&payload, NetworkFormat::Json).unwrap();
                        store.lock().unwrap().push(envelope);
                        if socket.write_u8(ACK).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let mut blueprint = blueprint(dir.path());
        blueprint.sensor.sample_rate_hz = 20.0;
        blueprint.sensor.params.insert("steps".into(), "0:0,1:3".into());
        blueprint.detection.comparison_window_seconds = 0.5;
        blueprint.detection.stabilization_time_seconds = 0.5;
        blueprint.detection.lookback_seconds = 1.0;
        blueprint.buffer.ring_buffer_seconds = 3.0;
        blueprint.database.host = "127.0.0.1".into();
        blueprint.database.port = port;

        let stats = Orchestrator::new(OrchestratorConfig {
            blueprint,
            duration: Some(Duration::from_secs(4)),
        })
        .run(pending())
        .await
        .unwrap();

        assert!(stats.events_emitted >= 1);
        assert_eq!(stats.delivery.delivered, stats.events_emitted);
        assert_eq!(stats.final_queue_depth, 0);

        let received = received.lock().unwrap();
        assert_eq!(received.len() as u64, stats.events_emitted);
        let first = &received[0];
        assert_eq!(first.device, "e2e-device");
        assert_eq!(first.database, "altitude_data");
        assert_eq!(first.table, "altitude_events");
        assert_eq!(first.event.sequence, 1);
        assert!(first.event.samples.iter().any(|s| s.altitude > 2.0));
    }
}
