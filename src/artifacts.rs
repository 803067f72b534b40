//! Files kept in the artifacts directory: the training and model configs (json) and the model record.

use crate::backend::MainBackend;
use crate::error::{Error, Result};
use crate::model::{Cnn, CnnConfig};
use burn::prelude::*;
use burn::record::{DefaultRecorder, FileRecorder};
use std::path::{Path, PathBuf};

/// Full precision, so a dump/load cycle reproduces predictions exactly.
pub type RecorderTy = DefaultRecorder;

pub const TRAINING_CONFIG_NAME: &str = "training_config";
pub const MODEL_CONFIG_NAME: &str = "model_config";
pub const MODEL_NAME: &str = "cnn_model";

/// Create the directory to save the model and configs.
///
/// With `delete`, an existing model is removed first.
pub fn create_artifact_dir(artifact_dir: &Path, delete: bool) -> Result<()> {
    std::fs::create_dir_all(artifact_dir)?;
    if delete {
        let path = model_path::<MainBackend>(artifact_dir);
        if std::fs::exists(&path)? {
            log::info!("Removing {path:?}");
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

pub fn config_path(artifact_dir: &Path, name: &str) -> PathBuf {
    artifact_dir.join(name).with_extension("json")
}

pub fn save_config(path: &Path, config: &impl Config) -> Result<()> {
    log::info!("Saving config into {path:?}");
    config.save(path)?;
    Ok(())
}

/// Loads the config at `path`, or `None` if there is no such file.
pub fn load_config<C: Config>(path: &Path) -> Result<Option<C>> {
    if !std::fs::exists(path)? {
        return Ok(None);
    }
    log::info!("Loading config from {path:?}");
    Ok(Some(C::load(path)?))
}

/// Path of the model record, with the recorder's file extension.
pub fn model_path<B: Backend>(artifact_dir: &Path) -> PathBuf {
    let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
    artifact_dir.join(MODEL_NAME).with_extension(file_ext)
}

pub fn model_exists<B: Backend>(artifact_dir: &Path) -> Result<bool> {
    Ok(std::fs::exists(model_path::<B>(artifact_dir))?)
}

/// Writes the whole parameter record of `model` to the artifacts directory.
pub fn save_model<B: Backend>(artifact_dir: &Path, model: &Cnn<B>) -> Result<PathBuf> {
    let path = model_path::<B>(artifact_dir);
    log::info!("Saving model to {path:?}");
    model
        .clone()
        .save_file(artifact_dir.join(MODEL_NAME), &RecorderTy::new())?; // ext added automatically
    Ok(path)
}

/// Builds a model from `model_config` and overwrites its weights with the saved record.
///
/// Fails if the record was saved from a model of a different shape.
pub fn load_model<B: Backend>(
    artifact_dir: &Path,
    model_config: &CnnConfig,
    device: &B::Device,
) -> Result<Cnn<B>> {
    let path = model_path::<B>(artifact_dir);
    if !std::fs::exists(&path)? {
        return Err(Error::MissingModel(path));
    }
    log::info!("Loading model from {path:?}");

    let model_init: Cnn<B> = model_config.init(device);
    let model = model_init.clone().load_file(
        artifact_dir.join(MODEL_NAME), // ext added automatically
        &RecorderTy::new(),
        device,
    )?;
    model.check_shapes(&model_init)?;
    Ok(model)
}
