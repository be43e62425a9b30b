use crate::{SegError, SegResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 逐样本, 逐类别的指标记录.
///
/// 每个样本追加一次, 评估结束时求每个类别的均值.
/// 某样本中无定义 (`NaN`, 即真值中不存在该类别) 的类别不参与该类别的均值.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricAccumulator {
    num_classes: usize,
    samples: Vec<Vec<f64>>,
}

impl MetricAccumulator {
    /// 创建空记录.
    #[inline]
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            samples: Vec::new(),
        }
    }

    /// 类别数.
    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// 已记录的样本数.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// 是否还没有记录任何样本.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 全部样本记录.
    #[inline]
    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    /// 追加一个样本的逐类别指标. 长度与类别数不符时返回 `Err(SegError::InvalidConfig)`.
    pub fn push(&mut self, scores: Vec<f64>) -> SegResult<()> {
        if scores.len() != self.num_classes {
            return Err(SegError::InvalidConfig(format!(
                "指标长度 {} 与类别数 {} 不一致",
                scores.len(),
                self.num_classes
            )));
        }
        self.samples.push(scores);
        Ok(())
    }

    /// 类别 `class` 有定义的样本数.
    pub fn defined(&self, class: usize) -> usize {
        self.samples.iter().filter(|s| !s[class].is_nan()).count()
    }

    /// 每个类别只对有定义的样本求平均. 某类别在所有样本上都无定义时为 `NaN`.
    pub fn mean(&self) -> Vec<f64> {
        (0..self.num_classes)
            .map(|c| {
                let (sum, cnt) = self
                    .samples
                    .iter()
                    .map(|s| s[c])
                    .filter(|v| !v.is_nan())
                    .fold((0.0, 0usize), |(sum, cnt), v| (sum + v, cnt + 1));
                if cnt == 0 {
                    f64::NAN
                } else {
                    sum / cnt as f64
                }
            })
            .collect()
    }

    /// 朴素均值: 无定义的值记为 0, 除以全部样本数. 没有样本时为 `NaN`.
    ///
    /// 只用于与 [`Self::mean`] 对照.
    pub fn plain_mean(&self) -> Vec<f64> {
        let n = self.samples.len();
        (0..self.num_classes)
            .map(|c| {
                if n == 0 {
                    return f64::NAN;
                }
                let sum: f64 = self
                    .samples
                    .iter()
                    .map(|s| if s[c].is_nan() { 0.0 } else { s[c] })
                    .sum();
                sum / n as f64
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::MetricAccumulator;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    #[test]
    fn test_mean_excludes_undefined() {
        let mut acc = MetricAccumulator::new(3);
        acc.push(vec![0.9, 0.8, 0.6]).unwrap();
        acc.push(vec![0.7, 0.4, f64::NAN]).unwrap();
        acc.push(vec![0.8, 0.6, 0.8]).unwrap();

        let m = acc.mean();
        assert!(f64_eq(m[0], 0.8));
        assert!(f64_eq(m[1], 0.6));
        // 只取第 1, 3 个样本.
        assert!(f64_eq(m[2], 0.7));
        assert_eq!(acc.defined(2), 2);

        let p = acc.plain_mean();
        assert!(f64_eq(p[2], 1.4 / 3.0));
        assert!(f64_eq(p[0], 0.8));
    }

    #[test]
    fn test_mean_skips_class_absent_from_truth() {
        use crate::eval::ClassCounts;
        use ndarray::{s, Array3};

        let mut gt = Array3::<u8>::zeros((2, 2, 4));
        gt.slice_mut(s![.., .., ..2]).fill(1);
        // 完全命中.
        let perfect = ClassCounts::count(gt.view(), gt.view(), 2).unwrap();
        // 真值没有类别 1, 预测有一个假阳性体素.
        let empty = Array3::<u8>::zeros((2, 2, 4));
        let mut stray = empty.clone();
        stray[(0, 0, 0)] = 1;
        let false_positive = ClassCounts::count(stray.view(), empty.view(), 2).unwrap();
        // 命中一半: Dice = 8 / 12.
        let mut half = Array3::<u8>::zeros((2, 2, 4));
        half.slice_mut(s![.., ..1, ..2]).fill(1);
        let partial = ClassCounts::count(half.view(), gt.view(), 2).unwrap();

        let mut acc = MetricAccumulator::new(2);
        for c in [&perfect, &false_positive, &partial] {
            acc.push(c.dice()).unwrap();
        }
        assert_eq!(acc.defined(1), 2);
        assert!(f64_eq(acc.mean()[1], (1.0 + 8.0 / 12.0) / 2.0));
        assert!(f64_eq(acc.plain_mean()[1], (1.0 + 8.0 / 12.0) / 3.0));
    }

    #[test]
    fn test_all_undefined() {
        let mut acc = MetricAccumulator::new(2);
        assert!(acc.is_empty());
        assert!(acc.mean()[0].is_nan());
        assert!(acc.plain_mean()[1].is_nan());

        acc.push(vec![1.0, f64::NAN]).unwrap();
        acc.push(vec![0.5, f64::NAN]).unwrap();
        assert!(acc.mean()[1].is_nan());
        assert!(f64_eq(acc.plain_mean()[1], 0.0));
        assert!(f64_eq(acc.mean()[0], 0.75));
    }

    #[test]
    fn test_push_length_mismatch() {
        let mut acc = MetricAccumulator::new(2);
        assert!(acc.push(vec![1.0]).is_err());
        assert_eq!(acc.len(), 0);
    }
}
