use crate::error::Error;
use burn::{
    nn::{
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
    tensor::activation::softmax,
    train::ClassificationOutput,
};

/// Two conv/relu/max-pool stages followed by two fully-connected layers.
#[derive(Config, Debug)]
pub struct CnnConfig {
    /// Number of classes.
    pub n_outputs: usize,
    #[config(default = 3)]
    pub in_channels: usize,
    /// Side of the square input images.
    #[config(default = 32)]
    pub image_size: usize,
    #[config(default = 32)]
    pub conv_channels: usize,
    #[config(default = 5)]
    pub kernel_size: usize,
    /// Kernel size and stride of the first pooling.
    #[config(default = 2)]
    pub pool1_size: usize,
    /// Kernel size and stride of the second pooling.
    #[config(default = 3)]
    pub pool2_size: usize,
    #[config(default = 512)]
    pub n_hidden: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl CnnConfig {
    /// Side of the feature maps after both conv/pool stages, if the image is large enough.
    pub fn feature_map_size(&self) -> Option<usize> {
        let conv = |size: usize| size.checked_sub(self.kernel_size).map(|s| s + 1);
        let pool = |size: usize, k: usize| size.checked_sub(k).map(|s| s / k + 1);

        let size = conv(self.image_size)?;
        let size = pool(size, self.pool1_size)?;
        let size = conv(size)?;
        pool(size, self.pool2_size)
    }

    /// Input width of the first fully-connected layer.
    pub fn flat_features(&self) -> usize {
        let side = self.feature_map_size().unwrap_or(0);
        self.conv_channels * side * side
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.n_outputs == 0 {
            return Err(Error::InvalidModel("n_outputs must be positive".into()));
        }
        if self.kernel_size == 0 || self.pool1_size == 0 || self.pool2_size == 0 {
            return Err(Error::InvalidModel(
                "kernel and pooling sizes must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidModel(format!(
                "dropout {} is outside [0, 1)",
                self.dropout
            )));
        }
        if self.flat_features() == 0 {
            return Err(Error::InvalidModel(format!(
                "image size {} is too small for the layer stack",
                self.image_size
            )));
        }
        Ok(())
    }
}

#[derive(Module, Debug)]
pub struct Cnn<B: Backend> {
    pub conv1: Conv2d<B>,
    pub pool1: MaxPool2d,
    pub conv2: Conv2d<B>,
    pub pool2: MaxPool2d,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub dropout: Dropout,
    pub activation: Relu,
}

impl CnnConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Cnn<B> {
        let k = self.kernel_size;
        Cnn {
            conv1: Conv2dConfig::new([self.in_channels, self.conv_channels], [k, k]).init(device),
            pool1: MaxPool2dConfig::new([self.pool1_size, self.pool1_size])
                .with_strides([self.pool1_size, self.pool1_size])
                .init(),
            conv2: Conv2dConfig::new([self.conv_channels, self.conv_channels], [k, k]).init(device),
            pool2: MaxPool2dConfig::new([self.pool2_size, self.pool2_size])
                .with_strides([self.pool2_size, self.pool2_size])
                .init(),
            fc1: LinearConfig::new(self.flat_features(), self.n_hidden)
                .with_bias(true)
                .init(device),
            fc2: LinearConfig::new(self.n_hidden, self.n_outputs)
                .with_bias(true)
                .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Cnn<B> {
    /// Class logits.
    ///
    /// Dropout only fires on autodiff backends, so `valid()` copies run deterministically.
    ///
    /// # Shapes
    ///   - Input [batch_size, channels, image_size, image_size]
    ///   - Output [batch_size, n_outputs]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _channels, _height, _width] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.pool1.forward(self.activation.forward(x));
        let x = self.conv2.forward(x);
        let x = self.pool2.forward(self.activation.forward(x));

        let [_batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let [batch_size, _channels, _height, _width] = images.dims();
        assert_eq!([batch_size], targets.dims());

        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }

    /// Softmax probabilities over the classes.
    ///
    /// # Shapes
    ///   - Input [batch_size, channels, image_size, image_size]
    ///   - Output [batch_size, n_outputs]
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// Weight and bias shapes of every learnable layer, by layer name.
    pub fn param_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        fn bias<B: Backend>(bias: &Option<burn::module::Param<Tensor<B, 1>>>) -> Vec<usize> {
            bias.as_ref().map(|b| b.dims().to_vec()).unwrap_or_default()
        }
        vec![
            ("conv1.weight", self.conv1.weight.dims().to_vec()),
            ("conv1.bias", bias(&self.conv1.bias)),
            ("conv2.weight", self.conv2.weight.dims().to_vec()),
            ("conv2.bias", bias(&self.conv2.bias)),
            ("fc1.weight", self.fc1.weight.dims().to_vec()),
            ("fc1.bias", bias(&self.fc1.bias)),
            ("fc2.weight", self.fc2.weight.dims().to_vec()),
            ("fc2.bias", bias(&self.fc2.bias)),
        ]
    }

    /// Fails on the first layer whose shape differs from `expected`.
    pub fn check_shapes(&self, expected: &Cnn<B>) -> crate::error::Result<()> {
        for ((layer, expected), (_, found)) in
            expected.param_shapes().into_iter().zip(self.param_shapes())
        {
            if expected != found {
                return Err(Error::ShapeMismatch {
                    layer,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}
