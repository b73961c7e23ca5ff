//! CNN Classifier for CIFAR images
//!
//! A compact convolutional classifier built with Burn, sized for 32x32
//! inputs. Width scales with the `base_filters` capacity parameter so the
//! same architecture family serves every slot of the student growth
//! sequence. Dropout in the head doubles as the model noise the iterative
//! student training relies on.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the CIFAR classifier
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Base number of convolutional filters; later blocks double and
    /// quadruple it
    #[config(default = "16")]
    pub base_filters: usize,

    /// Dropout rate in the classifier head (student noise)
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

/// A CNN block with Conv2d, BatchNorm, ReLU, and optional MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// CIFAR image classifier
///
/// Architecture:
/// - 3 convolutional blocks with doubling filter counts, each halving the
///   spatial resolution (32 -> 16 -> 8 -> 4)
/// - Global average pooling
/// - Two-layer classifier head with dropout
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,

    pub global_pool: AdaptiveAvgPool2d,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> Classifier<B> {
    /// Create a new classifier from configuration
    pub fn new(config: &ClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        let conv1 = ConvBlock::new(config.in_channels, base, true, device); // 32 -> 16
        let conv2 = ConvBlock::new(base, base * 2, true, device); // 16 -> 8
        let conv3 = ConvBlock::new(base * 2, base * 4, true, device); // 8 -> 4

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        let fc1 = LinearConfig::new(base * 4, 128).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(128, config.num_classes).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, 32, 32]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        // Global pooling: [B, C, H, W] -> [B, C, 1, 1]
        let x = self.global_pool.forward(x);

        // Flatten: [B, C, 1, 1] -> [B, C]
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        burn::tensor::activation::softmax(logits, 1)
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
