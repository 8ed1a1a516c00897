// ============================================================
// Layer 5: Row-wise Bidirectional LSTM
// ============================================================
// Each row of the feature map is read as a left-to-right
// sequence, so every cell sees horizontal context from the
// whole text line:
//
//   [1, C, H, W] → [H, W, C]          rows become the batch
//   BiLSTM       → [H, W, 2·hidden]   forward ‖ backward
//   Linear       → [H, W, C_out]
//   reshape      → [1, C_out, H, W]
//
// Reference: Tian et al. (2016) CTPN §3.2 (recurrent connectionist text proposals)
//            Burn Book §3 (nn::BiLstm)

use burn::{
    nn::{BiLstm, BiLstmConfig, Linear, LinearConfig},
    prelude::*,
};

#[derive(Config, Debug)]
pub struct RowBiLstmConfig {
    /// Channels of the incoming feature map
    pub d_input:  usize,
    /// Hidden units per direction
    #[config(default = 128)]
    pub d_hidden: usize,
    /// Channels of the outgoing feature map
    pub d_output: usize,
}

impl RowBiLstmConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RowBiLstm<B> {
        RowBiLstm {
            lstm: BiLstmConfig::new(self.d_input, self.d_hidden, true).init(device),
            fc:   LinearConfig::new(2 * self.d_hidden, self.d_output).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct RowBiLstm<B: Backend> {
    pub lstm: BiLstm<B>,
    pub fc:   Linear<B>,
}

impl<B: Backend> RowBiLstm<B> {
    /// features: [N, C, H, W] → [N, C_out, H, W]
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        let [n, c, h, w] = features.dims();

        let rows = features.permute([0, 2, 3, 1]).reshape([n * h, w, c]);
        let (seq, _state) = self.lstm.forward(rows, None);
        let out = self.fc.forward(seq); // [N·H, W, C_out]
        let c_out = out.dims()[2];

        out.reshape([n, h, w, c_out]).permute([0, 3, 1, 2])
    }
}
