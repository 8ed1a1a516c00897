// ============================================================
// Layer 5: Backbones
// ============================================================
// Two interchangeable feature extractors. Both take an NCHW
// image [1, 3, H, W] and return a [1, 512, H/16, W/16] map:
//
//   Vgg16      - conv1_1 … conv5_3, four 2×2 max-pools
//   Inception  - strided stem + two mixed blocks
//                (1×1 | 1×1→3×3 | 1×1→3×3→3×3 | pool→1×1)
//
// The selector comes from CtpnConfig::backbone.
//
// Reference: Simonyan & Zisserman (2015) VGG
//            Szegedy et al. (2016) Inception v3/v4
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::config::BackboneKind;

/// Downsampling factor shared by both backbones
pub const BACKBONE_STRIDE: u32 = 16;

/// Channels of the feature map both backbones emit
pub const BACKBONE_CHANNELS: usize = 512;

fn conv3x3<B: Backend>(c_in: usize, c_out: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([c_in, c_out], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

fn conv1x1<B: Backend>(c_in: usize, c_out: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([c_in, c_out], [1, 1]).init(device)
}

fn max_pool_2x2() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

// ─── VGG16 ────────────────────────────────────────────────────────────────────
/// A run of 3×3 conv + ReLU layers, optionally followed by a 2×2 pool.
#[derive(Module, Debug)]
pub struct VggStage<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub pool:  Option<MaxPool2d>,
}

impl<B: Backend> VggStage<B> {
    fn new(c_in: usize, c_out: usize, depth: usize, pool: bool, device: &B::Device) -> Self {
        let convs = (0..depth)
            .map(|i| conv3x3(if i == 0 { c_in } else { c_out }, c_out, device))
            .collect();
        Self { convs, pool: pool.then(max_pool_2x2) }
    }

    pub fn forward(&self, mut x: Tensor<B, 4>) -> Tensor<B, 4> {
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// VGG16 up to conv5_3 (pool5 dropped, stride 16).
#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    pub stages: Vec<VggStage<B>>,
}

impl<B: Backend> Vgg16<B> {
    pub fn new(device: &B::Device) -> Self {
        let stages = vec![
            VggStage::new(3, 64, 2, true, device),
            VggStage::new(64, 128, 2, true, device),
            VggStage::new(128, 256, 3, true, device),
            VggStage::new(256, 512, 3, true, device),
            VggStage::new(512, BACKBONE_CHANNELS, 3, false, device),
        ];
        Self { stages }
    }

    fn conv_weights(&self) -> Vec<Tensor<B, 4>> {
        self.stages
            .iter()
            .flat_map(|s| s.convs.iter().map(|c| c.weight.val()))
            .collect()
    }

    pub fn forward(&self, mut x: Tensor<B, 4>) -> Tensor<B, 4> {
        for stage in &self.stages {
            x = stage.forward(x);
        }
        x
    }
}

// ─── Inception ────────────────────────────────────────────────────────────────
/// Four parallel branches concatenated along channels.
#[derive(Module, Debug)]
pub struct MixedBlock<B: Backend> {
    pub branch_1x1:      Conv2d<B>,
    pub branch_3x3_red:  Conv2d<B>,
    pub branch_3x3:      Conv2d<B>,
    pub branch_dbl_red:  Conv2d<B>,
    pub branch_dbl_a:    Conv2d<B>,
    pub branch_dbl_b:    Conv2d<B>,
    pub pool:            AvgPool2d,
    pub branch_pool:     Conv2d<B>,
}

impl<B: Backend> MixedBlock<B> {
    /// `c_out` is split evenly over the four branches
    fn new(c_in: usize, c_out: usize, device: &B::Device) -> Self {
        let quarter = c_out / 4;
        let reduced = quarter / 2;
        Self {
            branch_1x1:     conv1x1(c_in, quarter, device),
            branch_3x3_red: conv1x1(c_in, reduced, device),
            branch_3x3:     conv3x3(reduced, quarter, device),
            branch_dbl_red: conv1x1(c_in, reduced, device),
            branch_dbl_a:   conv3x3(reduced, quarter, device),
            branch_dbl_b:   conv3x3(quarter, quarter, device),
            pool:           AvgPool2dConfig::new([3, 3])
                .with_strides([1, 1])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            branch_pool:    conv1x1(c_in, c_out - 3 * quarter, device),
        }
    }

    fn conv_weights(&self) -> Vec<Tensor<B, 4>> {
        [
            &self.branch_1x1,
            &self.branch_3x3_red,
            &self.branch_3x3,
            &self.branch_dbl_red,
            &self.branch_dbl_a,
            &self.branch_dbl_b,
            &self.branch_pool,
        ]
        .into_iter()
        .map(|c| c.weight.val())
        .collect()
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = relu(self.branch_1x1.forward(x.clone()));

        let b2 = relu(self.branch_3x3_red.forward(x.clone()));
        let b2 = relu(self.branch_3x3.forward(b2));

        let b3 = relu(self.branch_dbl_red.forward(x.clone()));
        let b3 = relu(self.branch_dbl_a.forward(b3));
        let b3 = relu(self.branch_dbl_b.forward(b3));

        let b4 = relu(self.branch_pool.forward(self.pool.forward(x)));

        Tensor::cat(vec![b1, b2, b3, b4], 1)
    }
}

/// Inception-style extractor: stem to stride 8, mixed block,
/// pool to stride 16, mixed block.
#[derive(Module, Debug)]
pub struct Inception<B: Backend> {
    pub stem_a:  Conv2d<B>,
    pub stem_b:  Conv2d<B>,
    pub stem_c:  Conv2d<B>,
    pub stem_d:  Conv2d<B>,
    pub pool:    MaxPool2d,
    pub mixed_a: MixedBlock<B>,
    pub mixed_b: MixedBlock<B>,
}

impl<B: Backend> Inception<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            stem_a:  Conv2dConfig::new([3, 32], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            stem_b:  conv3x3(32, 64, device),
            stem_c:  conv1x1(64, 80, device),
            stem_d:  conv3x3(80, 192, device),
            pool:    max_pool_2x2(),
            mixed_a: MixedBlock::new(192, 256, device),
            mixed_b: MixedBlock::new(256, BACKBONE_CHANNELS, device),
        }
    }

    fn conv_weights(&self) -> Vec<Tensor<B, 4>> {
        let mut weights: Vec<Tensor<B, 4>> = [&self.stem_a, &self.stem_b, &self.stem_c, &self.stem_d]
            .into_iter()
            .map(|c| c.weight.val())
            .collect();
        weights.extend(self.mixed_a.conv_weights());
        weights.extend(self.mixed_b.conv_weights());
        weights
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.stem_a.forward(x));          // /2
        let x = relu(self.stem_b.forward(x));
        let x = self.pool.forward(x);                  // /4
        let x = relu(self.stem_c.forward(x));
        let x = relu(self.stem_d.forward(x));
        let x = self.pool.forward(x);                  // /8
        let x = self.mixed_a.forward(x);
        let x = self.pool.forward(x);                  // /16
        self.mixed_b.forward(x)
    }
}

// ─── Backbone selector ────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    Vgg16(Vgg16<B>),
    Inception(Inception<B>),
}

impl<B: Backend> Backbone<B> {
    pub fn new(kind: BackboneKind, device: &B::Device) -> Self {
        match kind {
            BackboneKind::Vgg16     => Backbone::Vgg16(Vgg16::new(device)),
            BackboneKind::Inception => Backbone::Inception(Inception::new(device)),
        }
    }

    /// images: [1, 3, H, W] → features: [1, 512, H/16, W/16]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Backbone::Vgg16(net)     => net.forward(images),
            Backbone::Inception(net) => net.forward(images),
        }
    }

    /// Kernels of every convolution (biases excluded)
    pub fn conv_weights(&self) -> Vec<Tensor<B, 4>> {
        match self {
            Backbone::Vgg16(net)     => net.conv_weights(),
            Backbone::Inception(net) => net.conv_weights(),
        }
    }

    pub fn out_channels(&self) -> usize {
        BACKBONE_CHANNELS
    }

    pub fn stride(&self) -> u32 {
        BACKBONE_STRIDE
    }
}
