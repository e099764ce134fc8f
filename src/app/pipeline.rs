//! Shared pipeline logic used by the CLI subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! store load -> normalization -> windowing -> training -> artifacts -> forecast
//!
//! The CLI layer then focuses on wiring (paths, feeds) and presentation.

use tracing::{info, warn};

use crate::data::feed::MarketFeed;
use crate::domain::{
    ForecastResult, NormalizationState, Observation, TrainConfig, TrainQuality, TrainReport,
    MIN_TRAIN_ROWS, WINDOW_SIZE,
};
use crate::error::{AppError, ErrorKind};
use crate::forecast::forecaster;
use crate::io::artifacts::{ArtifactRepository, ModelFile, NormalizationFile};
use crate::io::store::{LoadedSeries, ObservationStore};
use crate::model::{trainer, SequenceModel};
use crate::prep::{normalize, windows};

/// Outputs of a training run.
#[derive(Debug, Clone)]
pub struct TrainRun {
    pub series: LoadedSeries,
    pub state: NormalizationState,
    pub model: SequenceModel,
    pub report: TrainReport,
}

/// Outputs of a predict run.
#[derive(Debug, Clone)]
pub struct PredictRun {
    pub series: LoadedSeries,
    pub state: NormalizationState,
    pub result: ForecastResult,
}

/// Fetch the feed's current snapshot and append it to the store.
pub fn run_fetch(
    store: &dyn ObservationStore,
    feed: &dyn MarketFeed,
) -> Result<Observation, AppError> {
    let obs = feed.fetch()?;
    store.append(&obs)?;
    info!(
        price = obs.mcx_gold_price,
        usd_inr = obs.usd_inr,
        "snapshot appended"
    );
    Ok(obs)
}

/// Train on the stored history and persist the fitted artifacts.
///
/// Artifacts are written only after training succeeds, so a failed run leaves
/// any previously saved model usable.
pub fn run_train(
    store: &dyn ObservationStore,
    artifacts: &dyn ArtifactRepository,
    config: &TrainConfig,
) -> Result<TrainRun, AppError> {
    // 1) Load the stored history.
    let series = store.load()?;
    if !series.row_errors.is_empty() {
        warn!(
            skipped = series.row_errors.len(),
            "skipped unusable rows during load"
        );
    }
    if series.observations.len() < MIN_TRAIN_ROWS {
        warn!(
            rows = series.observations.len(),
            required = MIN_TRAIN_ROWS,
            "not enough history to train; leaving artifacts untouched"
        );
        return Err(AppError::new(
            ErrorKind::InsufficientData,
            format!(
                "Need at least {MIN_TRAIN_ROWS} usable rows to train; have {}. \
                 Run `goldf fetch` (or `goldf sample`) to grow the history.",
                series.observations.len()
            ),
        ));
    }

    // 2) Fit the normalization and scale the history with it.
    let state = normalize::fit(&series.observations)?;
    if state.unit_transition.is_some() {
        warn!(
            factor = state.unit_correction_factor,
            "unit change detected in stored history; early rows rescaled for training"
        );
    }
    let scaled = normalize::apply(&series.observations, &state);

    // 3) Slice into supervised windows.
    let windows = windows::build(&scaled, WINDOW_SIZE);

    // 4) Fit the model, keeping the best epoch's weights.
    let (model, report) = trainer::train(&windows, config)?;

    // 5) Persist both artifacts.
    let quality = TrainQuality {
        best_loss: report.best_loss,
        epochs_run: report.epochs_run,
        windows: report.windows,
    };
    artifacts.save_model(&ModelFile::new(model.clone(), quality))?;
    artifacts.save_state(&NormalizationFile::new(state.clone()))?;

    Ok(TrainRun {
        series,
        state,
        model,
        report,
    })
}

/// Load the saved artifacts and forecast every horizon.
pub fn run_predict(
    store: &dyn ObservationStore,
    artifacts: &dyn ArtifactRepository,
) -> Result<PredictRun, AppError> {
    // 1) Load artifacts; a missing model is a hard error with a pointed message.
    let model_file = artifacts.load_model()?;
    let state_file = artifacts.load_state()?;

    // 2) Load the history the rollout will be seeded from.
    let series = store.load()?;
    if !series.row_errors.is_empty() {
        warn!(
            skipped = series.row_errors.len(),
            "skipped unusable rows during load"
        );
    }

    // 3) Forecast.
    let result = forecaster::forecast(&model_file.model, &state_file.state, &series.observations)?;

    Ok(PredictRun {
        series,
        state: state_file.state,
        result,
    })
}

/// Fetch, retrain, and forecast in one pass.
///
/// The forecast reuses the in-memory fit instead of round-tripping through
/// the artifact files.
pub fn run_once(
    store: &dyn ObservationStore,
    artifacts: &dyn ArtifactRepository,
    feed: &dyn MarketFeed,
    config: &TrainConfig,
) -> Result<(TrainRun, PredictRun), AppError> {
    run_fetch(store, feed)?;
    let train = run_train(store, artifacts, config)?;
    let result = forecaster::forecast(&train.model, &train.state, &train.series.observations)?;
    let predict = PredictRun {
        series: train.series.clone(),
        state: train.state.clone(),
        result,
    };
    Ok((train, predict))
}
