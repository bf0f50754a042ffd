use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::stream::Pipeline;
use crate::accumulator::StatKind;
use crate::bias::BiasCorrector;
use crate::buckets::FrequencyManager;
use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::increment::DataIncrement;
use crate::result::StatResult;
use crate::sink::{JsonLinesSink, ResultSink};

/// Drives one pipeline per configured (variable, statistic kind)
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use ndarray::{ArrayD, IxDyn};
/// use onepass::{DataIncrement, Engine, EngineConfig};
///
/// let config = EngineConfig::from_json(r#"{
///     "statistics": ["mean"],
///     "statistic_frequency": "daily",
///     "output_frequency": "daily",
///     "time_step_minutes": 60,
///     "variables": ["tas"],
///     "bias_correction": false
/// }"#).unwrap();
/// let mut engine = Engine::new(config).unwrap();
///
/// let day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// let mut results = Vec::new();
/// for hour in 0..24 {
///     let values = ArrayD::from_elem(IxDyn(&[1]), hour as f64);
///     let increment = DataIncrement::new("tas", values, day.and_hms_opt(hour, 0, 0).unwrap());
///     results.extend(engine.ingest(&increment).unwrap());
/// }
///
/// assert_eq!(results.len(), 1);
/// assert_eq!(results[0].value.values().unwrap()[[0]], 11.5);
/// ```
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    manager: FrequencyManager,
    pipelines: Vec<Pipeline>,
    correctors: HashMap<String, BiasCorrector>,
    store: Option<CheckpointStore>,
    since_checkpoint: u64,
}

impl Engine {
    /// Build an engine without bias correction
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_bias_correctors(config, Vec::new())
    }

    /// Build an engine with one corrector per variable.
    ///
    /// When the configuration enables bias correction, every variable needs
    /// a corrector; otherwise none may be given.
    pub fn with_bias_correctors(
        config: EngineConfig,
        correctors: impl IntoIterator<Item = BiasCorrector>,
    ) -> Result<Self> {
        let mut by_variable = HashMap::new();
        for corrector in correctors {
            if !config.variables().iter().any(|v| v == corrector.variable()) {
                return Err(Error::UnknownVariable(corrector.variable().to_string()));
            }
            by_variable.insert(corrector.variable().to_string(), corrector);
        }

        if config.bias_correction() {
            if let Some(missing) = config.variables().iter().find(|v| !by_variable.contains_key(*v)) {
                return Err(Error::BiasCorrectionUnavailable {
                    variable: missing.clone(),
                    reason: "bias correction is enabled but no calibration was supplied".into(),
                });
            }
        } else if !by_variable.is_empty() {
            return Err(Error::InvalidConfig(
                "bias correctors supplied while bias_correction is disabled".into(),
            ));
        }

        let pipelines = Self::fresh_pipelines(&config)?;
        let manager = FrequencyManager::new(config.frequency().clone());
        let store = config.checkpoint_path().map(CheckpointStore::new);

        info!(
            variables = config.variables().len(),
            statistics = config.statistics().len(),
            frequency = %config.frequency().describe(),
            "engine configured"
        );

        Ok(Self {
            config,
            manager,
            pipelines,
            correctors: by_variable,
            store,
            since_checkpoint: 0,
        })
    }

    fn fresh_pipelines(config: &EngineConfig) -> Result<Vec<Pipeline>> {
        let mut pipelines = Vec::with_capacity(config.variables().len() * config.statistics().len());
        for variable in config.variables() {
            for &kind in config.statistics() {
                pipelines.push(Pipeline::new(
                    variable.as_str(),
                    kind,
                    config.settings(),
                    config.max_gap_steps(),
                )?);
            }
        }
        Ok(pipelines)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &FrequencyManager {
        &self.manager
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn pipeline(&self, variable: &str, kind: StatKind) -> Option<&Pipeline> {
        self.pipelines
            .iter()
            .find(|p| p.variable == variable && p.kind == kind)
    }

    /// JSON-lines sink under `save_filepath`, if one is configured
    pub fn save_sink(&self) -> Result<Option<JsonLinesSink>> {
        self.config.save_path().map(JsonLinesSink::new).transpose()
    }

    /// Feed one increment to every pipeline of its variable.
    ///
    /// Writes a checkpoint when the configured cadence is reached.
    pub fn ingest(&mut self, increment: &DataIncrement) -> Result<Vec<StatResult>> {
        let variable = increment.variable();
        if !self.config.variables().iter().any(|v| v == variable) {
            return Err(Error::UnknownVariable(variable.to_string()));
        }

        let corrected = match self.correctors.get(variable) {
            Some(corrector) => Some(
                corrector
                    .correct(increment.values(), increment.weights())
                    .map_err(|e| self.in_first_pipeline(e, increment))?,
            ),
            None => None,
        };

        let mut results = Vec::new();
        for pipeline in self.pipelines.iter_mut().filter(|p| p.variable == variable) {
            results.extend(pipeline.ingest(&self.manager, increment, corrected.as_ref())?);
        }

        self.since_checkpoint += 1;
        if let Some(every) = self.config.checkpoint_every() {
            if self.since_checkpoint >= every {
                self.checkpoint()?;
            }
        }
        Ok(results)
    }

    /// Attach the context of the variable's first pipeline to an error
    /// raised before any pipeline saw the increment.
    fn in_first_pipeline(&self, error: Error, increment: &DataIncrement) -> Error {
        match self.pipelines.iter().find(|p| p.variable == increment.variable()) {
            Some(pipeline) => {
                let label = match pipeline.bucket() {
                    Some(bucket) => bucket.label(),
                    None => increment.timestamp().to_string(),
                };
                error.in_pipeline(&pipeline.variable, pipeline.kind, label)
            }
            None => error,
        }
    }

    /// Like [`ingest`](Self::ingest), handing results to `sink`; returns how many
    pub fn ingest_to(&mut self, increment: &DataIncrement, sink: &mut dyn ResultSink) -> Result<usize> {
        let results = self.ingest(increment)?;
        let count = results.len();
        for result in results {
            sink.accept(result)?;
        }
        Ok(count)
    }

    /// End of stream: flush every in-progress bucket and held result
    pub fn finish(&mut self) -> Result<Vec<StatResult>> {
        let mut results = Vec::new();
        for pipeline in &mut self.pipelines {
            results.extend(pipeline.finish(&self.manager)?);
        }
        debug!(results = results.len(), "engine finished");
        Ok(results)
    }

    /// [`finish`](Self::finish), handing results to `sink` and flushing it
    pub fn finish_to(&mut self, sink: &mut dyn ResultSink) -> Result<usize> {
        let results = self.finish()?;
        let count = results.len();
        for result in results {
            sink.accept(result)?;
        }
        sink.flush()?;
        Ok(count)
    }

    /// Copy of all pipeline state
    pub fn snapshot(&self) -> CheckpointRecord {
        CheckpointRecord::capture(&self.config, &self.pipelines)
    }

    /// Replace live state with a checkpoint record.
    ///
    /// Nothing changes unless the whole record validates. Configured
    /// pipelines absent from the record start fresh.
    pub fn restore(&mut self, record: CheckpointRecord) -> Result<()> {
        let mut restored = record.restore(&self.config)?;
        let mut pipelines = Self::fresh_pipelines(&self.config)?;
        for slot in pipelines.iter_mut() {
            if let Some(index) = restored
                .iter()
                .position(|p| p.variable == slot.variable && p.kind == slot.kind)
            {
                *slot = restored.swap_remove(index);
            }
        }
        self.pipelines = pipelines;
        self.since_checkpoint = 0;
        Ok(())
    }

    /// Write a checkpoint now
    pub fn checkpoint(&mut self) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("no checkpoint_filepath configured".into()))?;
        store.save(&self.snapshot())?;
        self.since_checkpoint = 0;
        Ok(())
    }

    /// Load and apply the stored checkpoint, if any; returns whether one was applied
    pub fn resume(&mut self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load()? {
            Some(record) => {
                self.restore(record)?;
                info!("resumed from checkpoint");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Graceful stop: persist state so a later run can resume
    pub fn shutdown(&mut self) -> Result<()> {
        if self.store.is_some() {
            self.checkpoint()?;
        } else {
            warn!("shutdown without checkpoint_filepath, in-progress buckets are lost");
        }
        Ok(())
    }

    /// Discard in-progress buckets after an upstream failure and fall back
    /// to the last checkpoint; returns whether one was applied
    pub fn abandon(&mut self) -> Result<bool> {
        for pipeline in &mut self.pipelines {
            pipeline.abandon();
        }
        self.since_checkpoint = 0;
        self.resume()
    }
}
