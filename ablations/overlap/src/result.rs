//! 实验结果.

use mri_berry::prelude::*;
use std::io::{self, Write};
use std::time::Duration;

/// 将单个重叠比例的结果写进 `w` 中.
fn describe_into<W: Write>(
    overlap: f64,
    report: &BatchReport,
    elapsed: Duration,
    w: &mut W,
) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: f64) -> String {
        if f.is_nan() {
            "/".to_string()
        } else {
            format!("{f:.6}")
        }
    }

    writeln!(w, "Overlap `{overlap}`:")?;
    writeln!(w, "{S4}Processed cases: {}", report.processed)?;
    writeln!(w, "{S4}Scored cases: {}", report.scored())?;
    writeln!(w, "{S4}Skipped cases: {}", report.skipped.len())?;
    for r in Region::ALL {
        writeln!(
            w,
            "{S4}{r} dice: {} (plain {}), sensitivity: {}",
            f64_to_display(report.mean_dice(r)),
            f64_to_display(report.plain_mean_dice(r)),
            f64_to_display(report.mean_sensitivity(r)),
        )?;
    }
    writeln!(w, "{S4}Average dice: {}", f64_to_display(report.average_dice()))?;
    write!(w, "{S4}Total machine time: {} ms", elapsed.as_millis())?;
    Ok(())
}

/// 消融实验最终结果.
#[derive(Debug, Default)]
pub struct AblationResult {
    data: Vec<(f64, BatchReport, Duration)>,
}

impl AblationResult {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            data: Vec::with_capacity(n),
        }
    }

    /// 记录一个重叠比例的运行结果.
    pub fn push(&mut self, overlap: f64, report: BatchReport, elapsed: Duration) {
        self.data.push((overlap, report, elapsed));
    }

    /// 平均 Dice 最高的重叠比例.
    pub fn best(&self) -> Option<f64> {
        self.data
            .iter()
            .filter(|(_, r, _)| !r.average_dice().is_nan())
            .max_by(|a, b| a.1.average_dice().total_cmp(&b.1.average_dice()))
            .map(|(o, _, _)| *o)
    }

    /// 分析运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        utils::sep_to(&mut out)?;
        for (overlap, report, elapsed) in self.data.iter() {
            describe_into(*overlap, report, *elapsed, &mut out)?;
            writeln!(out)?;
            utils::sep_to(&mut out)?;
        }
        match self.best() {
            Some(o) => writeln!(out, "Best overlap: {o}"),
            None => writeln!(out, "No case was scored."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mri_berry::pipeline::CaseScores;

    fn report(dice: f64) -> BatchReport {
        let mut r = BatchReport::new(2);
        let d = vec![1.0, dice];
        r.record(&CaseScores {
            dice: [d.clone(), d.clone(), d.clone()],
            sensitivity: [d.clone(), d.clone(), d],
        })
        .unwrap();
        r
    }

    #[test]
    fn test_best_and_describe() {
        let mut res = AblationResult::default();
        res.push(0.0, report(0.6), Duration::from_millis(3));
        res.push(0.5, report(0.8), Duration::from_millis(5));
        res.push(0.75, BatchReport::new(2), Duration::ZERO);
        assert_eq!(res.best(), Some(0.5));

        let mut buf = Vec::new();
        describe_into(0.5, &res.data[1].1, res.data[1].2, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Overlap `0.5`"));
        assert!(text.contains("WT dice: 0.800000"));
        assert!(text.contains("5 ms"));
    }
}
