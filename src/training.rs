use crate::dataset::{AnimeFaceBatch, AnimeFaceBatcher, AnimeFaceItem};
use crate::metrics::{EpochMeter, EpochMetrics};
use crate::model::Cnn;
use burn::prelude::*;
use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
};
use std::sync::Arc;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    #[config(default = 20)]
    pub num_epochs: usize,
    #[config(default = 100)]
    pub batch_size: usize,
    /// Share of the dataset held out for evaluation.
    #[config(default = 0.1)]
    pub test_fraction: f64,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 0)]
    pub seed: u64,
}

/// Adam with alpha=1e-3, beta1=0.9, beta2=0.999, eps=1e-8.
pub fn optimizer_config() -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub train: EpochMetrics,
    pub test: EpochMetrics,
}

pub type Dataloader<B> = Arc<dyn DataLoader<B, AnimeFaceBatch<B>>>;

/// Batches `dataset` on `device`, reshuffled on every pass when a seed is given.
pub fn dataloader<B: Backend>(
    batcher: &AnimeFaceBatcher,
    dataset: impl Dataset<AnimeFaceItem> + 'static,
    batch_size: usize,
    shuffle: Option<u64>,
    device: &B::Device,
) -> Dataloader<B> {
    let builder = DataLoaderBuilder::new(batcher.clone())
        .batch_size(batch_size.max(1))
        .set_device(device.clone());
    let builder = match shuffle {
        Some(seed) => builder.shuffle(seed),
        None => builder,
    };
    builder.build(dataset)
}

/// Runs `num_epochs` of training, each followed by an evaluation over `test_set`.
pub fn train<AutoB, O>(
    mut model: Cnn<AutoB>,
    optim: &mut O,
    train_set: impl Dataset<AnimeFaceItem> + 'static,
    test_set: impl Dataset<AnimeFaceItem> + 'static,
    batcher: &AnimeFaceBatcher,
    config: &TrainingConfig,
    device: &AutoB::Device,
) -> (Cnn<AutoB>, Vec<EpochReport>)
where
    AutoB: AutodiffBackend,
    O: Optimizer<Cnn<AutoB>, AutoB>,
{
    AutoB::seed(device, config.seed);

    let dataloader_train: Dataloader<AutoB> = dataloader(
        batcher,
        train_set,
        config.batch_size,
        Some(config.seed),
        device,
    );
    let dataloader_test: Dataloader<AutoB::InnerBackend> =
        dataloader(batcher, test_set, config.batch_size, None, device);

    log::info!(
        "Training on {} images, evaluating on {}",
        dataloader_train.num_items(),
        dataloader_test.num_items()
    );

    let mut reports = Vec::with_capacity(config.num_epochs);
    for epoch in 1..config.num_epochs + 1 {
        println!("epoch {epoch}");

        let (trained, train_metrics) =
            epoch_train::<AutoB, O>(Arc::clone(&dataloader_train), model, optim, config, epoch);
        model = trained;
        println!("train {train_metrics}");

        let test_metrics = epoch_valid::<AutoB::InnerBackend>(
            Arc::clone(&dataloader_test),
            &model.valid(),
            config,
            epoch,
        );
        println!("test {test_metrics}");

        reports.push(EpochReport {
            epoch,
            train: train_metrics,
            test: test_metrics,
        });
    }

    (model, reports)
}

/// One pass over `dataloader_train`, stepping the optimizer once per batch.
pub fn epoch_train<AutoB, O>(
    dataloader_train: Dataloader<AutoB>,
    mut model: Cnn<AutoB>,
    optim: &mut O,
    config: &TrainingConfig,
    epoch: usize,
) -> (Cnn<AutoB>, EpochMetrics)
where
    AutoB: AutodiffBackend,
    O: Optimizer<Cnn<AutoB>, AutoB>,
{
    let num_items = dataloader_train.num_items();
    let n_batches = num_items.div_ceil(config.batch_size.max(1));
    let mut meter = EpochMeter::new(epoch, config.num_epochs, num_items, Some(config.lr));

    for (b, batch) in dataloader_train.iter().enumerate() {
        let output = model.forward_classification(batch.images, batch.targets);
        let stats = meter.update(&output);

        let grads = output.loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(config.lr, model, grads);

        log::debug!(
            "Epoch {epoch}, Batch {:0>4}/{n_batches}, Loss {:.4}, Acc {:.4}",
            b + 1,
            stats.loss,
            stats.accuracy
        );
    }

    (model, meter.summary())
}

/// Evaluates every batch of `dataloader_valid`, in order.
pub fn epoch_valid<B: Backend>(
    dataloader_valid: Dataloader<B>,
    model: &Cnn<B>,
    config: &TrainingConfig,
    epoch: usize,
) -> EpochMetrics {
    let mut meter = EpochMeter::new(
        epoch,
        config.num_epochs,
        dataloader_valid.num_items(),
        Some(config.lr),
    );
    for batch in dataloader_valid.iter() {
        let output = model.forward_classification(batch.images, batch.targets);
        meter.update(&output);
    }
    meter.summary()
}
