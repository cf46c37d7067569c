use crate::deadline::Deadline;
use crate::runner::BenchmarkRunner;
use crate::selector;
use crate::traits::{CandidateSource, SpeedProbe};
use crate::types::{BenchmarkOutcome, SelectionPolicy, Stage, StageFailure};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Runs one full benchmark per call: identity, candidates, selection, then
/// the three measurements, all under the caller's deadline.
///
/// The selection policy is fixed at construction. Nothing is kept between
/// calls, so concurrent `collect`s never observe each other.
pub struct Collector {
    source: Arc<dyn CandidateSource>,
    runner: BenchmarkRunner,
    policy: SelectionPolicy,
}

impl Collector {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        probe: Arc<dyn SpeedProbe>,
        policy: SelectionPolicy,
    ) -> Self {
        Self {
            source,
            runner: BenchmarkRunner::new(probe),
            policy,
        }
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub async fn collect(&self, deadline: &Deadline) -> BenchmarkOutcome {
        let mut outcome = BenchmarkOutcome::new(Uuid::new_v4());
        let start = Instant::now();
        let span = info_span!("collect", test_uuid = %outcome.correlation_id);

        async {
            if let Err(failure) = self.pipeline(deadline, &mut outcome).await {
                error!(stage = %failure.stage, error = %failure.error, "collection aborted");
                outcome.failures.push(failure);
            }
            outcome.elapsed = start.elapsed();
            info!(
                success = outcome.is_success(),
                elapsed = ?outcome.elapsed,
                "collection finished"
            );
        }
        .instrument(span)
        .await;

        outcome
    }

    /// Terminal failures come back as `Err`; measurement failures are
    /// folded into the outcome by the runner.
    async fn pipeline(
        &self,
        deadline: &Deadline,
        outcome: &mut BenchmarkOutcome,
    ) -> Result<(), StageFailure> {
        let identity = deadline
            .run(self.source.fetch_identity(deadline))
            .await
            .map_err(|e| StageFailure::new(Stage::Identity, e.into_lookup()))?;
        info!(ip = %identity.ip, isp = %identity.isp, "resolved caller identity");

        let candidates = deadline
            .run(self.source.fetch_candidates(&identity, deadline))
            .await
            .map_err(|e| StageFailure::new(Stage::Candidates, e.into_lookup()))?;
        outcome.identity = Some(identity);

        let server = selector::select(&candidates, &self.policy)
            .map_err(|e| StageFailure::new(Stage::Selection, e))?
            .clone();
        info!(
            server_id = %server.id,
            server_name = %server.name,
            distance_km = server.distance_km,
            policy = %self.policy,
            "selected server"
        );

        let report = self.runner.run(&server, deadline).await;
        info!(success = report.is_success(), "benchmark finished");
        outcome.server = Some(server);
        outcome.measurements = report.measurements;
        outcome.failures.extend(report.failures);

        Ok(())
    }
}
