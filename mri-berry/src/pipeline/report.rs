use std::fmt;

use crate::eval::{ClassCounts, MetricAccumulator};
use crate::SegResult;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 评估区域.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Region {
    /// 全肿瘤.
    WholeTumor,
    /// 肿瘤核心.
    TumorCore,
    /// 增强肿瘤.
    Enhancing,
}

impl Region {
    /// 按报告顺序排列的全部区域.
    pub const ALL: [Region; 3] = [Region::WholeTumor, Region::TumorCore, Region::Enhancing];
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WholeTumor => "WT",
            Self::TumorCore => "TC",
            Self::Enhancing => "ET",
        };
        f.write_str(s)
    }
}

/// 单个病例三个区域的逐类别指标.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaseScores {
    /// 按 [`Region::ALL`] 顺序的 Dice.
    pub dice: [Vec<f64>; 3],
    /// 按 [`Region::ALL`] 顺序的敏感度.
    pub sensitivity: [Vec<f64>; 3],
}

impl CaseScores {
    /// 由三个区域的体素计数计算.
    pub fn from_counts(counts: &[ClassCounts; 3]) -> Self {
        Self {
            dice: [counts[0].dice(), counts[1].dice(), counts[2].dice()],
            sensitivity: [
                counts[0].sensitivity(),
                counts[1].sensitivity(),
                counts[2].sensitivity(),
            ],
        }
    }

    /// 区域 `region` 前景类别 (类别 1) 的 Dice.
    #[inline]
    pub fn dice_of(&self, region: Region) -> f64 {
        self.dice[region as usize][1]
    }

    /// 区域 `region` 前景类别 (类别 1) 的敏感度.
    #[inline]
    pub fn sensitivity_of(&self, region: Region) -> f64 {
        self.sensitivity[region as usize][1]
    }
}

/// 接收每个已评分病例的外部汇.
pub trait EvalSink {
    /// 记录一个病例的指标.
    fn record(&mut self, case_id: &str, scores: &CaseScores);
}

impl EvalSink for Vec<(String, CaseScores)> {
    #[inline]
    fn record(&mut self, case_id: &str, scores: &CaseScores) {
        self.push((case_id.to_string(), scores.clone()));
    }
}

/// 把每个病例的前景指标写入日志.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogSink;

impl EvalSink for LogSink {
    fn record(&mut self, case_id: &str, scores: &CaseScores) {
        let [wt, tc, et] = Region::ALL.map(|r| scores.dice_of(r));
        let [swt, stc, set] = Region::ALL.map(|r| scores.sensitivity_of(r));
        log::info!(
            "{case_id:30} dice [WT, TC, ET]: [{wt:.3}, {tc:.3}, {et:.3}] \
             sensitivity [WT, TC, ET]: [{swt:.3}, {stc:.3}, {set:.3}]"
        );
    }
}

/// 一次批量评估的汇总.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatchReport {
    /// 按 [`Region::ALL`] 顺序的 Dice 记录.
    pub dice: [MetricAccumulator; 3],
    /// 按 [`Region::ALL`] 顺序的敏感度记录.
    pub sensitivity: [MetricAccumulator; 3],
    /// 成功处理的病例数 (含无真值的病例).
    pub processed: usize,
    /// 被跳过的病例及原因.
    pub skipped: Vec<(String, String)>,
}

impl BatchReport {
    /// 创建空报告.
    pub fn new(num_classes: usize) -> Self {
        Self {
            dice: std::array::from_fn(|_| MetricAccumulator::new(num_classes)),
            sensitivity: std::array::from_fn(|_| MetricAccumulator::new(num_classes)),
            processed: 0,
            skipped: Vec::new(),
        }
    }

    /// 记录一个病例的指标.
    pub fn record(&mut self, scores: &CaseScores) -> SegResult<()> {
        for r in 0..3 {
            self.dice[r].push(scores.dice[r].clone())?;
            self.sensitivity[r].push(scores.sensitivity[r].clone())?;
        }
        Ok(())
    }

    /// 已评分的病例数.
    #[inline]
    pub fn scored(&self) -> usize {
        self.dice[0].len()
    }

    /// 区域 `region` 前景类别的 Dice 均值 (排除无定义样本).
    #[inline]
    pub fn mean_dice(&self, region: Region) -> f64 {
        foreground(&self.dice[region as usize].mean())
    }

    /// 区域 `region` 前景类别的敏感度均值 (排除无定义样本).
    #[inline]
    pub fn mean_sensitivity(&self, region: Region) -> f64 {
        foreground(&self.sensitivity[region as usize].mean())
    }

    /// 区域 `region` 前景类别的朴素 Dice 均值.
    #[inline]
    pub fn plain_mean_dice(&self, region: Region) -> f64 {
        foreground(&self.dice[region as usize].plain_mean())
    }

    /// 区域 `region` 前景类别的朴素敏感度均值.
    #[inline]
    pub fn plain_mean_sensitivity(&self, region: Region) -> f64 {
        foreground(&self.sensitivity[region as usize].plain_mean())
    }

    /// 三个区域前景 Dice 均值的平均. 跳过无定义的区域.
    pub fn average_dice(&self) -> f64 {
        average(Region::ALL.map(|r| self.mean_dice(r)))
    }

    /// 三个区域前景敏感度均值的平均. 跳过无定义的区域.
    pub fn average_sensitivity(&self) -> f64 {
        average(Region::ALL.map(|r| self.mean_sensitivity(r)))
    }
}

#[inline]
fn foreground(means: &[f64]) -> f64 {
    means.get(1).copied().unwrap_or(f64::NAN)
}

fn average(values: [f64; 3]) -> f64 {
    let defined: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if defined.is_empty() {
        f64::NAN
    } else {
        defined.iter().sum::<f64>() / defined.len() as f64
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let triple = |g: &dyn Fn(Region) -> f64| {
            let [a, b, c] = Region::ALL.map(g);
            format!("[{a:.3}, {b:.3}, {c:.3}]")
        };
        writeln!(
            f,
            "cases: {} processed, {} scored, {} skipped",
            self.processed,
            self.scored(),
            self.skipped.len()
        )?;
        writeln!(f, "average dice [WT, TC, ET]: {}", triple(&|r| self.mean_dice(r)))?;
        writeln!(
            f,
            "plain average dice [WT, TC, ET]: {}",
            triple(&|r| self.plain_mean_dice(r))
        )?;
        writeln!(
            f,
            "average sensitivity [WT, TC, ET]: {}",
            triple(&|r| self.mean_sensitivity(r))
        )?;
        writeln!(
            f,
            "plain average sensitivity [WT, TC, ET]: {}",
            triple(&|r| self.plain_mean_sensitivity(r))
        )?;
        write!(
            f,
            "mean over regions: dice {:.3}, sensitivity {:.3}",
            self.average_dice(),
            self.average_sensitivity()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    fn scores(wt: f64, tc: f64, et: f64) -> CaseScores {
        CaseScores {
            dice: [vec![1.0, wt], vec![1.0, tc], vec![1.0, et]],
            sensitivity: [vec![1.0, wt], vec![1.0, tc], vec![1.0, et]],
        }
    }

    #[test]
    fn test_report_means() {
        let mut report = BatchReport::new(2);
        report.record(&scores(0.9, 0.8, 0.6)).unwrap();
        report.record(&scores(0.7, 0.6, f64::NAN)).unwrap();
        report.record(&scores(0.8, 0.7, 0.8)).unwrap();
        assert_eq!(report.scored(), 3);

        assert!(f64_eq(report.mean_dice(Region::WholeTumor), 0.8));
        assert!(f64_eq(report.mean_dice(Region::Enhancing), 0.7));
        assert!(f64_eq(report.plain_mean_dice(Region::Enhancing), 1.4 / 3.0));
        assert!(f64_eq(report.average_dice(), (0.8 + 0.7 + 0.7) / 3.0));

        let text = report.to_string();
        assert!(text.contains("average dice [WT, TC, ET]: [0.800, 0.700, 0.700]"));
        assert!(text.contains("plain average dice [WT, TC, ET]: [0.800, 0.700, 0.467]"));
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<(String, CaseScores)> = Vec::new();
        sink.record("c1", &scores(0.5, 0.5, 0.5));
        LogSink.record("c1", &scores(0.5, 0.5, 0.5));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].0, "c1");
        assert_eq!(sink[0].1.dice_of(Region::TumorCore), 0.5);
    }

    #[test]
    fn test_empty_report() {
        let report = BatchReport::new(2);
        assert!(report.mean_dice(Region::WholeTumor).is_nan());
        assert!(report.average_dice().is_nan());
        assert!(report.to_string().contains("0 scored"));
    }
}
