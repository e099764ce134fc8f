//! Artifact persistence: the fitted model and its normalization state as
//! two named JSON files under one directory.
//!
//! Saves go through a temp file and rename, so a crash mid-write never
//! leaves a half-written artifact behind.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{NormalizationState, TrainQuality};
use crate::error::{AppError, ErrorKind};
use crate::model::SequenceModel;

pub const MODEL_FILE: &str = "forecast_model.json";
pub const NORMALIZATION_FILE: &str = "normalization.json";

/// Provenance tag written into every artifact.
const TOOL_TAG: &str = "goldf";

/// On-disk envelope for the fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub tool: String,
    pub saved_at: NaiveDateTime,
    pub window_size: usize,
    pub feature_count: usize,
    pub quality: TrainQuality,
    pub model: SequenceModel,
}

impl ModelFile {
    pub fn new(model: SequenceModel, quality: TrainQuality) -> Self {
        Self {
            tool: TOOL_TAG.to_string(),
            saved_at: Local::now().naive_local(),
            window_size: model.window_size,
            feature_count: model.feature_count,
            quality,
            model,
        }
    }
}

/// On-disk envelope for the fitted normalization state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationFile {
    pub tool: String,
    pub saved_at: NaiveDateTime,
    pub state: NormalizationState,
}

impl NormalizationFile {
    pub fn new(state: NormalizationState) -> Self {
        Self {
            tool: TOOL_TAG.to_string(),
            saved_at: Local::now().naive_local(),
            state,
        }
    }
}

/// Storage seam for fitted artifacts. Inference requires both pieces; a
/// missing one surfaces as [`ErrorKind::MissingArtifact`].
pub trait ArtifactRepository {
    fn save_model(&self, file: &ModelFile) -> Result<(), AppError>;
    fn load_model(&self) -> Result<ModelFile, AppError>;
    fn save_state(&self, file: &NormalizationFile) -> Result<(), AppError>;
    fn load_state(&self) -> Result<NormalizationFile, AppError>;
}

/// Directory-backed repository.
pub struct FsArtifacts {
    dir: PathBuf,
}

impl FsArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(NORMALIZATION_FILE)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::new(
                ErrorKind::Input,
                format!("Failed to create '{}': {e}", self.dir.display()),
            )
        })?;
        let tmp = self.dir.join(format!("{name}.tmp"));
        let file = File::create(&tmp).map_err(|e| {
            AppError::new(
                ErrorKind::Input,
                format!("Failed to create '{}': {e}", tmp.display()),
            )
        })?;
        serde_json::to_writer_pretty(file, value).map_err(|e| {
            AppError::new(
                ErrorKind::Input,
                format!("Failed to write '{}': {e}", tmp.display()),
            )
        })?;
        let path = self.dir.join(name);
        fs::rename(&tmp, &path).map_err(|e| {
            AppError::new(
                ErrorKind::Input,
                format!("Failed to move '{}' into place: {e}", path.display()),
            )
        })
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str, what: &str) -> Result<T, AppError> {
        let path = self.dir.join(name);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::new(
                    ErrorKind::MissingArtifact,
                    format!(
                        "No fitted {what} at '{}'; run `goldf train` first.",
                        path.display()
                    ),
                )
            } else {
                AppError::new(
                    ErrorKind::Input,
                    format!("Failed to open '{}': {e}", path.display()),
                )
            }
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            AppError::new(
                ErrorKind::Input,
                format!("Invalid {what} artifact '{}': {e}", path.display()),
            )
        })
    }
}

impl ArtifactRepository for FsArtifacts {
    fn save_model(&self, file: &ModelFile) -> Result<(), AppError> {
        self.write_json(MODEL_FILE, file)
    }

    fn load_model(&self) -> Result<ModelFile, AppError> {
        self.read_json(MODEL_FILE, "model")
    }

    fn save_state(&self, file: &NormalizationFile) -> Result<(), AppError> {
        self.write_json(NORMALIZATION_FILE, file)
    }

    fn load_state(&self) -> Result<NormalizationFile, AppError> {
        self.read_json(NORMALIZATION_FILE, "normalization state")
    }
}

/// In-memory repository for tests and dry wiring.
#[derive(Debug, Default)]
pub struct MemoryArtifacts {
    model: RefCell<Option<ModelFile>>,
    state: RefCell<Option<NormalizationFile>>,
}

impl ArtifactRepository for MemoryArtifacts {
    fn save_model(&self, file: &ModelFile) -> Result<(), AppError> {
        *self.model.borrow_mut() = Some(file.clone());
        Ok(())
    }

    fn load_model(&self) -> Result<ModelFile, AppError> {
        self.model.borrow().clone().ok_or_else(|| {
            AppError::new(ErrorKind::MissingArtifact, "No fitted model in memory.")
        })
    }

    fn save_state(&self, file: &NormalizationFile) -> Result<(), AppError> {
        *self.state.borrow_mut() = Some(file.clone());
        Ok(())
    }

    fn load_state(&self) -> Result<NormalizationFile, AppError> {
        self.state.borrow().clone().ok_or_else(|| {
            AppError::new(ErrorKind::MissingArtifact, "No normalization state in memory.")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeatureRange, TrainConfig};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tiny_model() -> SequenceModel {
        let config = TrainConfig {
            lstm_units: [3, 2],
            dense_units: 2,
            ..TrainConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        SequenceModel::new(5, 4, &config, &mut rng)
    }

    fn some_state() -> NormalizationState {
        NormalizationState {
            unit_correction_factor: 1.0,
            unit_transition: None,
            ranges: [FeatureRange { min: 0.0, max: 1.0 }; 4],
            fitted_rows: 80,
        }
    }

    fn temp_repo(tag: &str) -> FsArtifacts {
        FsArtifacts::new(
            std::env::temp_dir().join(format!("goldf-artifacts-{tag}-{}", std::process::id())),
        )
    }

    #[test]
    fn fs_round_trips_both_artifacts() {
        let repo = temp_repo("roundtrip");
        let model_file = ModelFile::new(
            tiny_model(),
            TrainQuality {
                best_loss: 0.002,
                epochs_run: 40,
                windows: 60,
            },
        );
        let state_file = NormalizationFile::new(some_state());

        repo.save_model(&model_file).unwrap();
        repo.save_state(&state_file).unwrap();

        let model_back = repo.load_model().unwrap();
        assert_eq!(model_back.model, model_file.model);
        assert_eq!(model_back.window_size, 5);
        assert_eq!(model_back.tool, "goldf");
        let state_back = repo.load_state().unwrap();
        assert_eq!(state_back.state, state_file.state);

        std::fs::remove_dir_all(repo.dir()).ok();
    }

    #[test]
    fn missing_artifacts_are_their_own_error_kind() {
        let repo = temp_repo("missing");
        std::fs::remove_dir_all(repo.dir()).ok();
        let err = repo.load_model().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingArtifact);
        assert_eq!(err.exit_code(), 4);
        let err = repo.load_state().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingArtifact);
    }

    #[test]
    fn corrupt_artifact_is_an_input_error() {
        let repo = temp_repo("corrupt");
        std::fs::create_dir_all(repo.dir()).unwrap();
        std::fs::write(repo.model_path(), "not json").unwrap();
        let err = repo.load_model().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        std::fs::remove_dir_all(repo.dir()).ok();
    }

    #[test]
    fn memory_repository_round_trips() {
        let repo = MemoryArtifacts::default();
        assert_eq!(
            repo.load_model().unwrap_err().kind(),
            ErrorKind::MissingArtifact
        );
        let state_file = NormalizationFile::new(some_state());
        repo.save_state(&state_file).unwrap();
        assert_eq!(repo.load_state().unwrap().state, state_file.state);
    }
}
