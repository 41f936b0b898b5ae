//! Pipeline orchestrator - wires the source, channel, scorer, sink and
//! fan-out together and owns their tasks

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{sensor_topics, EventChannel, MemoryChannel, PipelineStats, StatsSnapshot};
use crate::config::{ChannelBackend, Config};
use crate::db::{Database, Sink};
use crate::detection::{AnomalyScorer, ModelRegistry};
use crate::error::Result;
use crate::sensors::{Emitter, ReadingSource};
use crate::streaming::{LiveFanout, MqttChannel};

/// Collects the pipeline's handles. Anything not injected is built from the
/// configuration when the pipeline starts.
pub struct PipelineBuilder {
    config: Config,
    channel: Option<Arc<dyn EventChannel>>,
    sink: Option<Arc<dyn Sink>>,
    fanout: Option<Arc<LiveFanout>>,
    registry: Option<Arc<ModelRegistry>>,
    source: Option<ReadingSource>,
}

impl PipelineBuilder {
    pub fn channel(mut self, channel: Arc<dyn EventChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn fanout(mut self, fanout: Arc<LiveFanout>) -> Self {
        self.fanout = Some(fanout);
        self
    }

    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn source(mut self, source: ReadingSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Build the missing handles and spawn the pipeline tasks.
    ///
    /// Models are loaded before anything else is opened, so a missing model
    /// fails startup without side effects. The scorer subscribes before the
    /// source starts emitting.
    pub async fn start(self) -> Result<Pipeline> {
        let config = self.config;
        config.validate()?;

        info!("Starting sensorwatch pipeline...");

        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(ModelRegistry::load(&config.sensors)?),
        };

        let sink: Arc<dyn Sink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(Database::open(&config.database)?),
        };

        let channel: Arc<dyn EventChannel> = match self.channel {
            Some(channel) => channel,
            None => match config.channel.backend {
                ChannelBackend::Memory => Arc::new(MemoryChannel::for_sensors()),
                ChannelBackend::Mqtt => Arc::new(MqttChannel::connect(&config.channel)),
            },
        };

        let fanout = self
            .fanout
            .unwrap_or_else(|| Arc::new(LiveFanout::new(config.live.observer_buffer)));

        let source = self
            .source
            .unwrap_or_else(|| ReadingSource::from_config(&config.sensors));

        let stats = Arc::new(PipelineStats::new());
        let token = CancellationToken::new();

        let partitions = if config.scorer.partitioned {
            sensor_topics().into_iter().map(|topic| vec![topic]).collect()
        } else {
            vec![sensor_topics()]
        };

        let scorer = AnomalyScorer::new(registry, sink.clone(), fanout.clone(), stats.clone())
            .with_poll_timeout(config.scorer.poll_timeout());

        // subscribe everything before spawning, so a failure leaves no task behind
        let mut subscriptions = Vec::with_capacity(partitions.len());
        for topics in &partitions {
            subscriptions.push(channel.subscribe(topics).await?);
        }

        let mut tasks = Vec::with_capacity(subscriptions.len() + 1);
        for subscription in subscriptions {
            tasks.push(tokio::spawn(scorer.clone().run(subscription, token.clone())));
        }

        let emitter = Emitter::new(source, channel, sink.clone(), fanout.clone(), stats.clone())
            .with_tick(config.source.tick());
        tasks.push(tokio::spawn(emitter.run(token.clone())));

        info!("Pipeline started ({} scorer task(s))", partitions.len());

        Ok(Pipeline {
            token,
            tasks,
            stats,
            sink,
            fanout,
            started_at: Instant::now(),
        })
    }
}

/// Running pipeline handle
pub struct Pipeline {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<PipelineStats>,
    sink: Arc<dyn Sink>,
    fanout: Arc<LiveFanout>,
    started_at: Instant,
}

impl Pipeline {
    pub fn builder(config: Config) -> PipelineBuilder {
        PipelineBuilder {
            config,
            channel: None,
            sink: None,
            fanout: None,
            registry: None,
            source: None,
        }
    }

    /// Start a pipeline built entirely from `config`
    pub async fn start(config: Config) -> Result<Self> {
        Self::builder(config).start().await
    }

    /// Every task is still running
    pub fn is_ready(&self) -> bool {
        !self.token.is_cancelled() && self.tasks.iter().all(|task| !task.is_finished())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }

    pub fn fanout(&self) -> Arc<LiveFanout> {
        self.fanout.clone()
    }

    /// Token cancelled on shutdown; other services can hang off it
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn uptime(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(self) -> StatsSnapshot {
        info!("Stopping sensorwatch pipeline...");
        self.token.cancel();

        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Pipeline task ended abnormally: {}", e);
            }
        }

        let stats = self.stats.snapshot();
        info!(
            "Pipeline stopped: {} emitted, {} scored, {} anomalies",
            stats.readings_emitted, stats.messages_scored, stats.anomalies_detected
        );
        stats
    }
}
