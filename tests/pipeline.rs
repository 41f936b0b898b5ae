use std::sync::Arc;
use std::time::Duration;

use sensorwatch::analysis::ThresholdModel;
use sensorwatch::config::DatabaseConfig;
use sensorwatch::{Config, LiveEvent, LiveFanout, ModelRegistry, Pipeline, SensorType, Sink};

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.database = DatabaseConfig::in_memory();
    config.source.tick_ms = 10;
    config.scorer.poll_timeout_ms = 20;
    config.live.websocket_enabled = false;
    for sensor in SensorType::ALL {
        config.sensors.get_mut(sensor).spike_probability = 0.0;
    }
    config
}

fn registry(temperature: f64, humidity: f64, pressure: f64) -> ModelRegistry {
    ModelRegistry::builder()
        .with(SensorType::Temperature, ThresholdModel::above(temperature))
        .with(SensorType::Humidity, ThresholdModel::above(humidity))
        .with(SensorType::Pressure, ThresholdModel::above(pressure))
        .build()
        .expect("every sensor type has a model")
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn every_anomaly_mirrors_a_persisted_reading() {
    let pipeline = Pipeline::builder(quiet_config())
        .registry(registry(-1.0e9, -1.0e9, -1.0e9))
        .start()
        .await
        .expect("pipeline should start");

    wait_until(|| pipeline.stats().anomalies_detected >= SensorType::COUNT as u64).await;
    let sink = pipeline.sink();
    pipeline.shutdown().await;

    for sensor in SensorType::ALL {
        let readings = sink.recent_readings(sensor, 1000).unwrap();
        let anomalies = sink.recent_anomalies(sensor, 1000).unwrap();
        assert!(!anomalies.is_empty(), "no anomaly for {}", sensor);
        for anomaly in &anomalies {
            assert!(
                readings.contains(anomaly),
                "anomaly {:?} has no matching reading",
                anomaly
            );
        }
    }
}

#[tokio::test]
async fn only_values_over_the_limit_become_anomalies() {
    let mut config = quiet_config();
    config.sensors.temperature.min = 41.0;
    config.sensors.temperature.max = 42.0;

    let pipeline = Pipeline::builder(config)
        .registry(registry(40.0, 1000.0, 1000.0))
        .start()
        .await
        .expect("pipeline should start");

    wait_until(|| pipeline.stats().messages_scored >= SensorType::COUNT as u64).await;
    let sink = pipeline.sink();
    pipeline.shutdown().await;

    let temperature = sink.recent_anomalies(SensorType::Temperature, 100).unwrap();
    assert_eq!(temperature.len(), 1);
    assert_eq!(
        temperature[0],
        sink.recent_readings(SensorType::Temperature, 100).unwrap()[0]
    );
    assert!(temperature[0].value > 40.0);

    assert!(sink.recent_anomalies(SensorType::Humidity, 100).unwrap().is_empty());
    assert!(sink.recent_anomalies(SensorType::Pressure, 100).unwrap().is_empty());
}

#[tokio::test]
async fn observers_see_readings_and_anomalies() {
    let fanout = Arc::new(LiveFanout::new(64));
    let mut observer = fanout.register();

    let mut config = quiet_config();
    config.sensors.temperature.min = 41.0;
    config.sensors.temperature.max = 42.0;

    let pipeline = Pipeline::builder(config)
        .fanout(fanout.clone())
        .registry(registry(40.0, 1000.0, 1000.0))
        .start()
        .await
        .expect("pipeline should start");

    let mut readings = 0;
    let mut anomalies = Vec::new();
    while readings < SensorType::COUNT || anomalies.is_empty() {
        let event = tokio::time::timeout(Duration::from_secs(5), observer.recv())
            .await
            .expect("timed out waiting for a live event")
            .expect("fan-out closed");
        match event {
            LiveEvent::SensorData(_) => readings += 1,
            LiveEvent::AnomalyData(payload) => anomalies.push(payload),
        }
    }

    pipeline.shutdown().await;

    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].sensor_type, SensorType::Temperature);
    assert!((41.0..=42.0).contains(&anomalies[0].value));
}
