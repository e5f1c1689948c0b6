//! Migration orchestrator - main workflow coordinator.
//!
//! Loads every table of the plan in dependency order, one row at a time,
//! through a single target session. A rejected row is counted and the load
//! moves on; only an unreachable store stops the run before it starts.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{Config, SourceFailurePolicy};
use crate::core::{ExternalRecord, LoadPlan, SourceReader, TableSpec, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::report::{MigrationReport, TableResult};
use crate::source::{JsonDirSource, PgSource};
use crate::state::{RunPhase, RunState, RunStatus};
use crate::target::{MemoryTarget, PgTarget};
use crate::transform::{self, Transformed};
use crate::translate::Translator;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    plan: LoadPlan,
    dry_run: bool,
    state: RunState,
    source: Option<Arc<dyn SourceReader>>,
    target: Option<Arc<dyn TargetWriter>>,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_type: String,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Create a new orchestrator. Fails if the tables cannot be ordered.
    pub fn new(config: Config) -> Result<Self> {
        let plan = LoadPlan::build(&config.tables)?;
        Ok(Self {
            config,
            plan,
            dry_run: false,
            state: RunState::new(),
            source: None,
            target: None,
        })
    }

    /// Write to an in-memory target instead of the configured database.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use this source instead of the one in the configuration.
    pub fn with_source(mut self, source: Arc<dyn SourceReader>) -> Self {
        self.source = Some(source);
        self
    }

    /// Use this target instead of the one in the configuration.
    pub fn with_target(mut self, target: Arc<dyn TargetWriter>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn plan(&self) -> &LoadPlan {
        &self.plan
    }

    pub fn phase(&self) -> &RunPhase {
        self.state.phase()
    }

    async fn open_source(&self) -> Result<Arc<dyn SourceReader>> {
        if let Some(source) = &self.source {
            return Ok(Arc::clone(source));
        }
        let config = &self.config.source;
        if config.is_postgres() {
            return Ok(Arc::new(PgSource::new(config).await?));
        }
        let dir = config
            .dir
            .clone()
            .ok_or_else(|| MigrateError::Config("source.dir is required".into()))?;
        let source = JsonDirSource::new(dir);
        source.health_check().await?;
        info!("Reading JSON exports from {}", source.dir().display());
        Ok(Arc::new(source))
    }

    async fn open_target(&self) -> Result<Arc<dyn TargetWriter>> {
        if let Some(target) = &self.target {
            return Ok(Arc::clone(target));
        }
        let policy = self.config.migration.update_policy;
        if self.dry_run {
            info!("Dry run: rows are written to an in-memory target");
            return Ok(Arc::new(MemoryTarget::new().with_update_policy(policy)));
        }
        Ok(Arc::new(PgTarget::new(&self.config.target, policy).await?))
    }

    /// Run the migration.
    pub async fn run(mut self) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting migration run: {} ({} tables{})",
            run_id,
            self.plan.len(),
            if self.dry_run { ", dry run" } else { "" }
        );

        self.state.advance(RunPhase::Connecting)?;
        let connected = match self.open_source().await {
            Ok(source) => self.open_target().await.map(|target| (source, target)),
            Err(e) => Err(e),
        };
        let (source, target) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                self.state.fail();
                error!("Could not connect: {}", e);
                return Err(e);
            }
        };

        let mut translator = Translator::new();
        let mut status = RunStatus::Completed;
        let mut tables = Vec::with_capacity(self.plan.len());
        let total = self.plan.len();
        let max_samples = self.config.migration.max_error_samples;

        for (position, spec) in self.plan.tables().iter().enumerate() {
            if status == RunStatus::Aborted {
                tables.push(TableResult::not_attempted(&spec.name));
                continue;
            }

            self.state.advance(RunPhase::Loading {
                table: spec.name.clone(),
                position,
                total,
            })?;
            info!("[{}/{}] {}", position + 1, total, spec.name);

            let records = match source.fetch(spec.source_table()).await {
                Ok(records) => records,
                Err(e) => {
                    match self.config.migration.on_source_error {
                        SourceFailurePolicy::SkipTable => {
                            warn!("{}: skipped, {}", spec.name, e);
                        }
                        SourceFailurePolicy::AbortRun => {
                            error!("{}: {}; stopping the run", spec.name, e);
                            status = RunStatus::Aborted;
                        }
                    }
                    tables.push(TableResult::skipped(&spec.name, e.to_string()));
                    continue;
                }
            };

            let result =
                load_table(spec, records, target.as_ref(), &mut translator, max_samples).await;
            tables.push(result);
        }

        self.state.advance(RunPhase::Reporting)?;
        target.close().await;

        let report = MigrationReport {
            run_id,
            status,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: timer.elapsed().as_secs_f64(),
            dry_run: self.dry_run,
            tables,
            mapping: translator.snapshot(),
        };

        info!(
            "Migration {}: {} rows attempted, {} succeeded, {} failed in {:.2}s",
            report.status.as_str(),
            report.total_attempted(),
            report.total_succeeded(),
            report.total_failed(),
            report.duration_seconds
        );

        self.state.advance(RunPhase::Done)?;
        Ok(report)
    }

    /// Check that the source and target can be reached.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = match self.open_source().await {
            Ok(source) => source.health_check().await.map(|_| source.source_type().to_string()),
            Err(e) => Err(e),
        };
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = match self.open_target().await {
            Ok(target) => {
                let checked = target.health_check().await;
                target.close().await;
                checked
            }
            Err(e) => Err(e),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let source_connected = source.is_ok();
        let target_connected = target.is_ok();
        Ok(HealthCheckResult {
            source_type: source
                .as_ref()
                .map(String::clone)
                .unwrap_or_else(|_| self.config.source.r#type.clone()),
            source_connected,
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected,
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            healthy: source_connected && target_connected,
        })
    }
}

/// Load the records of one table, row by row.
///
/// Row failures are counted and the next row is attempted. A conflicting
/// identifier mapping stops the table, since every later row of the same
/// scope could resolve to the wrong key.
async fn load_table(
    spec: &TableSpec,
    records: Vec<ExternalRecord>,
    target: &dyn TargetWriter,
    translator: &mut Translator,
    max_samples: usize,
) -> TableResult {
    let mut result = TableResult::new(&spec.name);
    let scope = spec.identity.as_ref().map(|i| i.scope.as_str());
    debug!("{}: {} records to load", spec.name, records.len());

    for record in records {
        let external_id = transform::external_id(spec, &record);
        let Transformed { row, unresolved } = transform::transform(spec, record, translator);

        match target.upsert(spec, &row).await {
            Ok(key) => {
                result.record_success(unresolved.len());
                debug!(
                    "{}: [{}] -> {}",
                    spec.name,
                    row.describe_key(&spec.natural_key),
                    key
                );
                let Some(scope) = scope else { continue };
                let Some(external_id) = external_id else {
                    warn!(
                        "{}: [{}] has no external id, later references to it will not resolve",
                        spec.name,
                        row.describe_key(&spec.natural_key)
                    );
                    continue;
                };
                if let Err(e) = translator.register(scope, &external_id, key) {
                    error!("{}: {}; remaining rows of this table are not loaded", spec.name, e);
                    result.abort(e.to_string());
                    break;
                }
            }
            Err(e) => {
                warn!("{}", e);
                result.record_failure(&e, unresolved.len(), max_samples);
            }
        }
    }

    result.finish();
    if result.unresolved_references > 0 {
        warn!(
            "{}: {} unresolved references written as NULL",
            spec.name, result.unresolved_references
        );
    }
    info!(
        "{}: {} attempted, {} succeeded, {} failed ({})",
        spec.name, result.attempted, result.succeeded, result.failed, result.status
    );
    result
}
