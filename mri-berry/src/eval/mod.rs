//! 分割评估指标.
//!
//! 逐类别计算 Dice 系数与敏感度. 真值中不存在的类别在该样本上 "无定义",
//! 以 `NaN` 表示, 聚合时被排除, 而不是记作 0.

use ndarray::{ArrayView3, Zip};

use crate::{SegError, SegResult};

mod accumulator;

pub use accumulator::MetricAccumulator;

/// 单个样本中每个类别的体素计数.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassCounts {
    /// `|pred == c|`.
    pub predicted: Vec<u64>,
    /// `|gt == c|`.
    pub truth: Vec<u64>,
    /// `|pred == c ∩ gt == c|`.
    pub overlap: Vec<u64>,
}

impl ClassCounts {
    /// 统计 `pred` 与 `gt` 中每个类别的体素数及其交集.
    ///
    /// # 返回值
    ///
    /// - 两者形状不一致时返回 `Err(SegError::VolumeShapeMismatch)`;
    /// - 任一标签值不小于 `num_classes` 时返回 `Err(SegError::LabelOutOfRange)`.
    pub fn count(
        pred: ArrayView3<'_, u8>,
        gt: ArrayView3<'_, u8>,
        num_classes: usize,
    ) -> SegResult<Self> {
        if pred.dim() != gt.dim() {
            return Err(SegError::VolumeShapeMismatch {
                expected: gt.dim(),
                found: pred.dim(),
            });
        }
        let mut ans = Self {
            predicted: vec![0; num_classes],
            truth: vec![0; num_classes],
            overlap: vec![0; num_classes],
        };
        let mut bad: Option<u8> = None;
        Zip::from(&pred).and(&gt).for_each(|&p, &g| {
            let (pi, gi) = (p as usize, g as usize);
            if pi >= num_classes || gi >= num_classes {
                bad.get_or_insert(p.max(g));
                return;
            }
            ans.predicted[pi] += 1;
            ans.truth[gi] += 1;
            if pi == gi {
                ans.overlap[pi] += 1;
            }
        });
        match bad {
            Some(label) => Err(SegError::LabelOutOfRange { label, num_classes }),
            None => Ok(ans),
        }
    }

    /// 类别数.
    #[inline]
    pub fn num_classes(&self) -> usize {
        self.truth.len()
    }

    /// 类别 `class` 是否出现在真值中. 不出现时该类别的指标无定义.
    #[inline]
    pub fn present(&self, class: usize) -> bool {
        self.truth[class] > 0
    }

    /// 每个类别的 Dice 系数 `2|P ∩ G| / (|P| + |G|)`.
    ///
    /// 真值中不存在的类别为 `NaN`, 即使预测中有该类别的体素.
    pub fn dice(&self) -> Vec<f64> {
        (0..self.num_classes())
            .map(|c| {
                if !self.present(c) {
                    return f64::NAN;
                }
                ratio(2 * self.overlap[c], self.predicted[c] + self.truth[c])
            })
            .collect()
    }

    /// 每个类别的敏感度 `|P ∩ G| / |G|`. 真值中不存在的类别为 `NaN`.
    pub fn sensitivity(&self) -> Vec<f64> {
        (0..self.num_classes())
            .map(|c| ratio(self.overlap[c], self.truth[c]))
            .collect()
    }
}

#[inline]
fn ratio(num: u64, denom: u64) -> f64 {
    if denom == 0 {
        f64::NAN
    } else {
        num as f64 / denom as f64
    }
}

/// 逐类别 Dice 系数. 见 [`ClassCounts::dice`].
#[inline]
pub fn dice(pred: ArrayView3<'_, u8>, gt: ArrayView3<'_, u8>, num_classes: usize) -> SegResult<Vec<f64>> {
    Ok(ClassCounts::count(pred, gt, num_classes)?.dice())
}

/// 逐类别敏感度 (召回率). 见 [`ClassCounts::sensitivity`].
#[inline]
pub fn sensitivity(
    pred: ArrayView3<'_, u8>,
    gt: ArrayView3<'_, u8>,
    num_classes: usize,
) -> SegResult<Vec<f64>> {
    Ok(ClassCounts::count(pred, gt, num_classes)?.sensitivity())
}
