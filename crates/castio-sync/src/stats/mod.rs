//! Stat decoration pipeline.
//!
//! Freshly fetched stat snapshots pass through an ordered chain of stages
//! before storage. Each item is pulled through the whole chain before the
//! next one starts; a stage may mutate it, drop it, or buffer per-identity
//! state and flush once the stream is drained. The standard chain is
//! raw-engagement folding, rating computation, then the aggregate rollup.

pub mod engagement;
pub mod rollup;

pub use engagement::{EngagementStage, RawEngagementStage};
pub use rollup::RollupStage;

use std::sync::Arc;

use async_trait::async_trait;
use castio_core::types::MediaKind;
use castio_store::{IdentityRepository, MediaRepository, MediaStatRecord, StatRepository};
use tracing::{debug, instrument};

use crate::error::SyncResult;
use crate::events::EventPublisher;
use crate::policy::SyncPolicy;

/// Named counter: platform-reported engagements.
pub const STAT_ENGAGEMENTS: &str = "engagements";
/// Named counter: impressions.
pub const STAT_IMPRESSIONS: &str = "impressions";
/// Named counter: reach.
pub const STAT_REACH: &str = "reach";
/// Named counter: saves.
pub const STAT_SAVES: &str = "saves";
/// Named counter: video views.
pub const STAT_VIEWS: &str = "views";

/// One stat snapshot in flight through the pipeline, tagged with the kind
/// of media it measures.
#[derive(Debug, Clone)]
pub struct StatEnvelope {
    /// The snapshot being decorated.
    pub stat: MediaStatRecord,

    /// Kind of the measured media.
    pub media_kind: MediaKind,
}

impl StatEnvelope {
    /// Wrap a snapshot.
    #[must_use]
    pub fn new(stat: MediaStatRecord, media_kind: MediaKind) -> Self {
        Self { stat, media_kind }
    }

    /// Whether the snapshot measures a story.
    #[must_use]
    pub fn is_story(&self) -> bool {
        self.media_kind == MediaKind::Story
    }
}

/// What a stage decided about one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    /// Pass the envelope to the next stage.
    Keep,
    /// Remove the envelope from the stream.
    Drop,
}

/// One transform stage in the decoration chain.
#[async_trait]
pub trait StatStage: Send {
    /// Stage name for logging.
    fn name(&self) -> &'static str;

    /// Process one envelope.
    async fn process(&mut self, envelope: &mut StatEnvelope) -> SyncResult<StageAction>;

    /// Called once after the whole stream has been pulled through; stages
    /// that buffer emit their side effects here.
    async fn finish(&mut self) -> SyncResult<()> {
        Ok(())
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    /// Envelopes entering the pipeline.
    pub processed: usize,

    /// Envelopes surviving every stage.
    pub kept: usize,

    /// Snapshots actually written (new or content-changed).
    pub written: usize,
}

/// Ordered chain of stat stages ending in a change-detected batch write.
pub struct StatDecorationPipeline {
    stages: Vec<Box<dyn StatStage>>,
    stats: Arc<StatRepository>,
}

impl StatDecorationPipeline {
    /// Create an empty pipeline writing through the given repository.
    #[must_use]
    pub fn new(stats: Arc<StatRepository>) -> Self {
        Self {
            stages: Vec::new(),
            stats,
        }
    }

    /// Append a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: Box<dyn StatStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// The standard chain: saves folded into engagements, ratings computed,
    /// rollup aggregated onto identities.
    #[must_use]
    pub fn standard(
        identities: Arc<IdentityRepository>,
        media: Arc<MediaRepository>,
        stats: Arc<StatRepository>,
        events: Arc<dyn EventPublisher>,
        policy: SyncPolicy,
    ) -> Self {
        Self::new(stats)
            .with_stage(Box::new(RawEngagementStage::new()))
            .with_stage(Box::new(EngagementStage::new(Arc::clone(&identities))))
            .with_stage(Box::new(RollupStage::new(identities, media, events, policy)))
    }

    /// Pull every envelope through the chain, run the stages' flushes, then
    /// batch-write the surviving snapshots whose content changed.
    #[instrument(skip_all, fields(envelopes = envelopes.len(), stages = self.stages.len()))]
    pub async fn run(mut self, envelopes: Vec<StatEnvelope>) -> SyncResult<PipelineReport> {
        let processed = envelopes.len();
        let mut survivors = Vec::with_capacity(processed);

        'stream: for mut envelope in envelopes {
            for stage in &mut self.stages {
                if stage.process(&mut envelope).await? == StageAction::Drop {
                    debug!(stage = stage.name(), "Stage dropped stat snapshot");
                    continue 'stream;
                }
            }
            survivors.push(envelope);
        }

        for stage in &mut self.stages {
            stage.finish().await?;
        }

        let snapshots: Vec<MediaStatRecord> =
            survivors.iter().map(|e| e.stat.clone()).collect();
        let written = self.stats.put_changed(&snapshots).await?;

        Ok(PipelineReport {
            processed,
            kept: survivors.len(),
            written,
        })
    }
}

/// Round a rating to six decimals.
#[must_use]
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use castio_core::ids::{IdentityId, MediaId};
    use castio_core::types::StatPeriod;
    use castio_store::MemoryEdgeStore;
    use chrono::Utc;

    struct DropOdd {
        seen: usize,
    }

    #[async_trait]
    impl StatStage for DropOdd {
        fn name(&self) -> &'static str {
            "drop_odd"
        }

        async fn process(&mut self, _envelope: &mut StatEnvelope) -> SyncResult<StageAction> {
            self.seen += 1;
            if self.seen % 2 == 0 {
                Ok(StageAction::Drop)
            } else {
                Ok(StageAction::Keep)
            }
        }
    }

    fn envelope(value: i64) -> StatEnvelope {
        let mut stat = MediaStatRecord::new(
            MediaId::new(),
            IdentityId::new(),
            StatPeriod::Lifetime,
            Utc::now(),
        );
        stat.set_value(STAT_ENGAGEMENTS, value);
        StatEnvelope::new(stat, MediaKind::Post)
    }

    #[tokio::test]
    async fn test_dropped_envelopes_are_not_written() {
        let stats = Arc::new(StatRepository::new(Arc::new(MemoryEdgeStore::new())));
        let pipeline = StatDecorationPipeline::new(Arc::clone(&stats))
            .with_stage(Box::new(DropOdd { seen: 0 }));

        let report = pipeline
            .run(vec![envelope(1), envelope(2), envelope(3)])
            .await
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.kept, 2);
        assert_eq!(report.written, 2);
    }

    #[tokio::test]
    async fn test_empty_pipeline_passes_everything_through() {
        let stats = Arc::new(StatRepository::new(Arc::new(MemoryEdgeStore::new())));
        let pipeline = StatDecorationPipeline::new(stats);
        let report = pipeline.run(vec![envelope(1)]).await.unwrap();
        assert_eq!(report.kept, 1);
        assert_eq!(report.written, 1);
    }

    #[test]
    fn test_round6() {
        assert_eq!(round6(1.234_567_89), 1.234_568);
        assert_eq!(round6(1.2), 1.2);
        assert_eq!(round6(0.0), 0.0);
    }
}
