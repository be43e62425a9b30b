//! 基于强度阈值的基线预测器.
//!
//! 不依赖任何模型权重, 仅用于在真实数据上比较不同分块参数对拼接结果的影响.

use mri_berry::prelude::*;
use ndarray::{Array3, Array4, Axis, Zip};

/// 按立方块内相对强度分割的预测器.
///
/// 第一阶段: 原始输入第 `channel` 个通道大于 `ratio * 立方块最大值` 的体素为前景.
/// 后续阶段: 上一阶段前景中, 辅助通道大于 `ratio * 立方块最大值` 的体素为前景.
#[derive(Copy, Clone, Debug)]
pub struct ThresholdPredictor {
    channel: usize,
    ratio: f32,
}

impl ThresholdPredictor {
    pub fn new(channel: usize, ratio: f32) -> Self {
        Self { channel, ratio }
    }
}

#[inline]
fn cube_max<'a, I: IntoIterator<Item = &'a f32>>(it: I) -> f32 {
    it.into_iter().copied().fold(f32::MIN, f32::max)
}

/// 由二值标签构造 one-hot 概率图.
fn one_hot(label: &Array3<u8>) -> Array4<f32> {
    let (z, h, w) = label.dim();
    Array4::from_shape_fn((z, h, w, 2), |(a, b, c, k)| {
        (label[(a, b, c)] as usize == k) as u8 as f32
    })
}

impl StagePredictor for ThresholdPredictor {
    fn predict(&self, input: StageInput<'_>) -> Result<StageOutput, PredictError> {
        let label = match input {
            StageInput::Raw(raw) => {
                if self.channel >= raw.len_of(Axis(3)) {
                    return Err(format!("no channel {} in raw input", self.channel).into());
                }
                let v = raw.index_axis(Axis(3), self.channel);
                let t = self.ratio * cube_max(v.iter());
                v.mapv(|x| (x > 0.0 && x > t) as u8)
            }
            StageInput::Conditioned { prob, secondary } => {
                let t = self.ratio * cube_max(secondary.iter());
                let mut label = Array3::<u8>::zeros(secondary.dim());
                Zip::from(&mut label)
                    .and(prob.lanes(Axis(3)))
                    .and(&secondary)
                    .for_each(|l, p, &s| *l = (p[1] > 0.5 && s > 0.0 && s > t) as u8);
                label
            }
        };
        Ok(StageOutput {
            prob: one_hot(&label),
            label,
        })
    }
}

/// 创建三个阶段的基线预测器上下文.
///
/// 第一阶段使用 FLAIR (通道 0), 后续两个阶段使用辅助通道.
pub fn baseline_context() -> CascadeContext {
    CascadeContext::new(
        ThresholdPredictor::new(0, 0.3),
        ThresholdPredictor::new(0, 0.5),
        ThresholdPredictor::new(0, 0.8),
    )
}
