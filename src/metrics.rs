use burn::data::dataloader::Progress;
use burn::prelude::*;
use burn::train::ClassificationOutput;
use burn::train::metric::{
    AccuracyMetric, Adaptor, LossInput, LossMetric, Metric, MetricMetadata, Numeric, NumericEntry,
};
use std::fmt;

/// Loss and accuracy of the last batch seen by an [`EpochMeter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchStats {
    pub loss: f64,
    pub accuracy: f64,
    pub batch_size: usize,
}

/// Loss and accuracy of one epoch, each batch weighted by its size.
pub struct EpochMeter<B: Backend> {
    loss: LossMetric<B>,
    accuracy: AccuracyMetric<B>,
    metadata: MetricMetadata,
}

impl<B: Backend> EpochMeter<B> {
    pub fn new(epoch: usize, epoch_total: usize, items_total: usize, lr: Option<f64>) -> Self {
        Self {
            loss: LossMetric::new(),
            accuracy: AccuracyMetric::new(),
            metadata: MetricMetadata {
                progress: Progress::new(0, items_total),
                epoch,
                epoch_total,
                iteration: 0,
                lr,
            },
        }
    }

    pub fn update(&mut self, output: &ClassificationOutput<B>) -> BatchStats {
        let [batch_size] = output.targets.dims();
        self.metadata.iteration += 1;
        self.metadata.progress.items_processed += batch_size;

        // one loss entry per item, so the running value is weighted by batch size
        let loss = LossInput::new(output.loss.clone().expand(Shape::new([batch_size])));
        self.loss.update(&loss, &self.metadata);
        self.accuracy.update(&output.adapt(), &self.metadata);

        BatchStats {
            loss: self.loss.value().current(),
            // the metric reports a percentage
            accuracy: self.accuracy.value().current() / 100.,
            batch_size,
        }
    }

    pub fn n_items(&self) -> usize {
        self.metadata.progress.items_processed
    }

    pub fn summary(&self) -> EpochMetrics {
        if self.n_items() == 0 {
            return EpochMetrics {
                loss: 0.,
                accuracy: 0.,
            };
        }
        EpochMetrics {
            loss: running_value(&self.loss),
            accuracy: running_value(&self.accuracy) / 100.,
        }
    }
}

/// Running (batch-size weighted) mean of a numeric metric, as burn 0.19 only exposes
/// the aggregated sum and count through [`Numeric::value`].
fn running_value<M: Numeric>(metric: &M) -> f64 {
    match metric.value() {
        NumericEntry::Aggregated { sum, count, .. } => sum / count as f64,
        NumericEntry::Value(value) => value,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mean loss={}, accuracy={}", self.loss, self.accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MainBackend;
    use approx::assert_abs_diff_eq;
    use burn::nn::loss::CrossEntropyLossConfig;
    use burn::tensor::Distribution;

    type B = MainBackend;

    fn targets(labels: &[i64], device: &<B as Backend>::Device) -> Tensor<B, 1, Int> {
        Tensor::from_data(
            TensorData::new(labels.to_vec(), [labels.len()]).convert::<<B as Backend>::IntElem>(),
            device,
        )
    }

    fn output(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> ClassificationOutput<B> {
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets.clone());
        ClassificationOutput::new(loss, logits, targets)
    }

    #[test]
    fn batch_accuracy() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::from_floats(
            [
                [2.0, 0.0, 0.0],
                [0.0, 3.0, 0.0],
                [0.0, 0.0, 1.0],
                [5.0, 0.0, 0.0],
            ],
            &device,
        );
        let mut meter = EpochMeter::new(1, 1, 4, None);
        let stats = meter.update(&output(logits, targets(&[0, 1, 0, 2], &device)));
        assert_eq!(stats.batch_size, 4);
        assert_abs_diff_eq!(stats.accuracy, 0.5, epsilon = 1e-6);
        assert!(stats.loss > 0.0);
        assert_eq!(meter.n_items(), 4);
    }

    #[test]
    fn weighted_batches_match_the_full_mean() {
        let device = Default::default();
        let labels = [0, 3, 1, 2, 2, 0, 1, 3, 3, 1];
        let logits = Tensor::<B, 2>::random([10, 4], Distribution::Normal(0., 2.), &device);

        let mut whole = EpochMeter::new(1, 1, 10, None);
        whole.update(&output(logits.clone(), targets(&labels, &device)));
        let full = whole.summary();

        let mut meter = EpochMeter::new(1, 1, 10, None);
        // last batch is short
        for (start, len) in [(0, 4), (4, 4), (8, 2)] {
            let batch_logits = logits.clone().narrow(0, start, len);
            let batch_targets = targets(&labels[start..start + len], &device);
            meter.update(&output(batch_logits, batch_targets));
        }

        assert_eq!(meter.n_items(), 10);
        let summary = meter.summary();
        assert_abs_diff_eq!(summary.loss, full.loss, epsilon = 1e-5);
        assert_abs_diff_eq!(summary.accuracy, full.accuracy, epsilon = 1e-6);
    }

    #[test]
    fn empty_meter_reports_zero() {
        let summary = EpochMeter::<B>::new(1, 1, 0, None).summary();
        assert_eq!(summary.loss, 0.0);
        assert_eq!(summary.accuracy, 0.0);
        assert_eq!(
            EpochMetrics {
                loss: 0.5,
                accuracy: 0.25
            }
            .to_string(),
            "mean loss=0.5, accuracy=0.25"
        );
    }
}
