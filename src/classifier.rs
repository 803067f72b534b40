use crate::artifacts;
use crate::dataset::{AnimeFaceBatcher, AnimeFaceItem};
use crate::error::Result;
use crate::model::{Cnn, CnnConfig};
use crate::training::{self, EpochReport, TrainingConfig};
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::optim::{Adam, adaptor::OptimizerAdaptor};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use std::path::{Path, PathBuf};

type Optim<AutoB> = OptimizerAdaptor<Adam, Cnn<AutoB>, AutoB>;

/// The network and the optimizer state bound to its parameters.
pub struct Classifier<AutoB: AutodiffBackend> {
    model: Cnn<AutoB>,
    optim: Optim<AutoB>,
    model_config: CnnConfig,
    training_config: TrainingConfig,
    device: AutoB::Device,
}

impl<AutoB: AutodiffBackend> Classifier<AutoB> {
    /// Randomly initialized weights and a fresh optimizer.
    pub fn new(
        model_config: CnnConfig,
        training_config: TrainingConfig,
        device: AutoB::Device,
    ) -> Result<Self> {
        model_config.validate()?;
        let model = model_config.init(&device);
        let optim = training_config.optimizer.init::<AutoB, Cnn<AutoB>>();
        Ok(Self {
            model,
            optim,
            model_config,
            training_config,
            device,
        })
    }

    /// Trains for the configured number of epochs, evaluating on `test_set` after each one.
    pub fn train_and_test(
        &mut self,
        train_set: impl Dataset<AnimeFaceItem> + 'static,
        test_set: impl Dataset<AnimeFaceItem> + 'static,
    ) -> Vec<EpochReport> {
        let batcher =
            AnimeFaceBatcher::new(self.model_config.image_size, self.model_config.in_channels);
        let (model, reports) = training::train(
            self.model.clone(),
            &mut self.optim,
            train_set,
            test_set,
            &batcher,
            &self.training_config,
            &self.device,
        );
        self.model = model;
        reports
    }

    /// Class probabilities, with dropout disabled.
    ///
    /// # Shapes
    ///   - Input [batch_size, channels, image_size, image_size]
    ///   - Output [batch_size, n_outputs]
    pub fn predict(
        &self,
        images: Tensor<AutoB::InnerBackend, 4>,
    ) -> Tensor<AutoB::InnerBackend, 2> {
        self.model.valid().predict(images)
    }

    pub fn dump(&self, artifact_dir: &Path) -> Result<PathBuf> {
        artifacts::save_model(artifact_dir, &self.model)
    }

    /// Replaces the weights with the saved ones and restarts the optimizer on them.
    pub fn load(&mut self, artifact_dir: &Path) -> Result<()> {
        self.model = artifacts::load_model(artifact_dir, &self.model_config, &self.device)?;
        self.optim = self.training_config.optimizer.init::<AutoB, Cnn<AutoB>>();
        Ok(())
    }
}
