pub mod artifacts;
pub mod backend;
pub mod classifier;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod training;

pub use backend::{MainAutoBackend, MainBackend, MainDevice};
pub use classifier::Classifier;
pub use cli::AppArgs;
pub use error::{Error, Result};

use crate::artifacts::{MODEL_CONFIG_NAME, TRAINING_CONFIG_NAME};
use crate::dataset::{AnimeFaceDataset, ClassTable};
use crate::model::CnnConfig;
use crate::training::TrainingConfig;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use std::time::Instant;

/// Loads the config given on the command line, falling back to the one in the artifacts directory.
fn load_config<C: Config>(
    explicit: Option<&std::path::Path>,
    app_args: &AppArgs,
    name: &str,
) -> Result<Option<C>> {
    match explicit {
        Some(path) => {
            log::info!("Loading config from {path:?}");
            Ok(Some(C::load(path)?))
        }
        None => artifacts::load_config(&artifacts::config_path(&app_args.artifacts_path, name)),
    }
}

pub fn launch<B, AutoB>(app_args: &AppArgs) -> Result<()>
where
    B: Backend + MainDevice,
    AutoB: AutodiffBackend + MainDevice,
{
    artifacts::create_artifact_dir(
        &app_args.artifacts_path,
        app_args.remove_artifacts && app_args.training,
    )?;

    let classes = ClassTable::scan(&app_args.dataset_path)?;
    log::info!(
        "Found {} classes in {:?}",
        classes.len(),
        app_args.dataset_path
    );

    // setup training and model configs
    let training_config = load_config(
        app_args.training_config.as_deref(),
        app_args,
        TRAINING_CONFIG_NAME,
    )?
    .unwrap_or_else(|| TrainingConfig::new(training::optimizer_config()));
    let model_config = load_config(
        app_args.model_config.as_deref(),
        app_args,
        MODEL_CONFIG_NAME,
    )?
    .unwrap_or_else(|| CnnConfig::new(classes.len()));
    model_config.validate()?;
    if model_config.n_outputs != classes.len() {
        return Err(Error::ClassCountMismatch {
            model: model_config.n_outputs,
            dataset: classes.len(),
        });
    }
    // save configs
    artifacts::save_config(
        &artifacts::config_path(&app_args.artifacts_path, TRAINING_CONFIG_NAME),
        &training_config,
    )?;
    artifacts::save_config(
        &artifacts::config_path(&app_args.artifacts_path, MODEL_CONFIG_NAME),
        &model_config,
    )?;

    if app_args.training {
        let start_time = Instant::now();
        let training_device = AutoB::main_device(app_args.gpu);
        log::info!("Training device: {training_device:?}");

        let dataset = AnimeFaceDataset::load(
            &app_args.dataset_path,
            &classes,
            model_config.image_size,
            model_config.in_channels,
        )?;
        let (train_set, test_set) =
            dataset.split(training_config.test_fraction, training_config.seed);

        let mut classifier = Classifier::<AutoB>::new(
            model_config.clone(),
            training_config.clone(),
            training_device,
        )?;
        if artifacts::model_exists::<AutoB>(&app_args.artifacts_path)? {
            log::info!("Resuming from the saved model");
            classifier.load(&app_args.artifacts_path)?;
        }
        classifier.train_and_test(train_set, test_set);
        classifier.dump(&app_args.artifacts_path)?;

        println!("time = {} min", start_time.elapsed().as_secs_f64() / 60.0);
    }

    if app_args.inference {
        let infer_device = B::main_device(app_args.gpu);
        log::info!("Inference device: {infer_device:?}");
        let model =
            artifacts::load_model::<B>(&app_args.artifacts_path, &model_config, &infer_device)?;

        log::info!("Reading image paths from stdin");
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        inference::interactive(
            &model,
            &model_config,
            &classes,
            &infer_device,
            stdin.lock(),
            &mut stdout,
        )?;
    }

    Ok(())
}
