//! 三阶段级联推理编排.
//!
//! 对每个立方块严格按 `WT -> TC -> NET` 的顺序调用三个阶段的预测器:
//! 第 k + 1 阶段以第 k 阶段的概率图和辅助通道立方块为条件输入.
//! 不同立方块之间没有数据依赖, 打开 `rayon` feature 后可以并行处理.

use std::fmt;

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Ix3, Ix4};

use crate::config::CascadeConfig;
use crate::consts::{PROGRESS_EVERY, STAGES};
use crate::tiling::CubeSet;
use crate::{SegError, SegResult};

mod predictor;

pub use predictor::{
    PredictError, Serialized, StageInput, StageOutput, StagePredictor, StagePredictorMut,
};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 级联阶段.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    /// 第一阶段: 全肿瘤.
    WholeTumor,
    /// 第二阶段: 肿瘤核心.
    TumorCore,
    /// 第三阶段: 坏死核心.
    Necrotic,
}

impl Stage {
    /// 按执行顺序排列的全部阶段.
    pub const ALL: [Stage; STAGES] = [Stage::WholeTumor, Stage::TumorCore, Stage::Necrotic];

    /// 阶段序号, 从 1 开始.
    #[inline]
    pub const fn number(self) -> usize {
        self as usize + 1
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WholeTumor => "WT",
            Self::TumorCore => "TC",
            Self::Necrotic => "NET",
        };
        f.write_str(s)
    }
}

/// 显式持有三个阶段预测器的上下文. 运行前预测器必须已经就绪.
pub struct CascadeContext {
    stages: [Box<dyn StagePredictor>; STAGES],
}

impl fmt::Debug for CascadeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadeContext").finish_non_exhaustive()
    }
}

impl CascadeContext {
    /// 依次传入 WT, TC, NET 三个阶段的预测器.
    pub fn new<A, B, C>(whole_tumor: A, tumor_core: B, necrotic: C) -> Self
    where
        A: StagePredictor + 'static,
        B: StagePredictor + 'static,
        C: StagePredictor + 'static,
    {
        Self {
            stages: [Box::new(whole_tumor), Box::new(tumor_core), Box::new(necrotic)],
        }
    }

    /// 获取 `stage` 阶段的预测器.
    #[inline]
    pub fn predictor(&self, stage: Stage) -> &dyn StagePredictor {
        self.stages[stage as usize].as_ref()
    }
}

/// 单个立方块在单个阶段的结果.
#[derive(Clone, Debug)]
pub struct CascadeStageResult {
    /// 概率图. 仅在 `keep_probability` 打开时保留.
    pub prob: Option<Array4<f32>>,
    /// 标签立方块.
    pub label: Array3<u8>,
}

/// 一个病例所有立方块的级联结果, 按阶段分组, 每组内保持分块顺序.
#[derive(Clone, Debug)]
pub struct CascadeOutput {
    stages: [Vec<CascadeStageResult>; STAGES],
}

impl CascadeOutput {
    /// 立方块个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.stages[0].len()
    }

    /// 是否没有任何立方块.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages[0].is_empty()
    }

    /// `stage` 阶段的全部结果.
    #[inline]
    pub fn stage(&self, stage: Stage) -> &[CascadeStageResult] {
        &self.stages[stage as usize]
    }

    /// 按分块顺序迭代 `stage` 阶段的标签立方块, 可直接交给拼接器.
    pub fn labels(&self, stage: Stage) -> impl ExactSizeIterator<Item = ArrayView3<'_, u8>> {
        self.stages[stage as usize].iter().map(|r| r.label.view())
    }
}

/// 级联编排器. 借用上下文中的预测器, 自身不持有任何可变状态.
#[derive(Debug)]
pub struct CascadeOrchestrator<'c> {
    ctx: &'c CascadeContext,
    edge: usize,
    num_classes: usize,
    keep_probability: bool,
    parallel: bool,
}

impl<'c> CascadeOrchestrator<'c> {
    /// 由上下文和运行配置创建编排器.
    pub fn new(ctx: &'c CascadeContext, config: &CascadeConfig) -> Self {
        Self {
            ctx,
            edge: config.cube_edge,
            num_classes: config.num_classes,
            keep_probability: config.keep_probability,
            parallel: config.parallel,
        }
    }

    /// 检查预测器输出的形状和标签范围.
    fn check_output(&self, cube: usize, out: &StageOutput) -> SegResult<()> {
        let e = self.edge;
        let (pz, ph, pw, _) = out.prob.dim();
        if out.label.dim() != (e, e, e) {
            return Err(SegError::CubeShapeMismatch {
                index: cube,
                found: out.label.dim(),
                edge: e,
            });
        }
        if (pz, ph, pw) != (e, e, e) {
            return Err(SegError::CubeShapeMismatch {
                index: cube,
                found: (pz, ph, pw),
                edge: e,
            });
        }
        if let Some(&label) = out.label.iter().find(|&&l| l as usize >= self.num_classes) {
            return Err(SegError::LabelOutOfRange {
                label,
                num_classes: self.num_classes,
            });
        }
        Ok(())
    }

    /// 调用单个阶段的预测器并检查输出.
    fn predict(&self, stage: Stage, cube: usize, input: StageInput<'_>) -> SegResult<StageOutput> {
        let out = self
            .ctx
            .predictor(stage)
            .predict(input)
            .map_err(|e| SegError::Predictor {
                stage: stage.number(),
                cube,
                reason: e.to_string(),
            })?;
        self.check_output(cube, &out)?;
        Ok(out)
    }

    /// 对第 `index` 个立方块依次运行三个阶段.
    fn run_cube(
        &self,
        index: usize,
        raw: ArrayView4<'_, f32>,
        secondary: ArrayView3<'_, f32>,
    ) -> SegResult<[CascadeStageResult; STAGES]> {
        let wt = self.predict(Stage::WholeTumor, index, StageInput::Raw(raw))?;
        let tc = self.predict(
            Stage::TumorCore,
            index,
            StageInput::Conditioned {
                prob: wt.prob.view(),
                secondary: secondary.view(),
            },
        )?;
        let net = self.predict(
            Stage::Necrotic,
            index,
            StageInput::Conditioned {
                prob: tc.prob.view(),
                secondary: secondary.view(),
            },
        )?;

        let keep = self.keep_probability;
        Ok([wt, tc, net].map(|o| CascadeStageResult {
            prob: keep.then_some(o.prob),
            label: o.label,
        }))
    }

    /// 检查两组立方块来自同一空间形状且按同样的参数分块.
    fn check_inputs(
        &self,
        primary: &CubeSet<f32, Ix4>,
        secondary: &CubeSet<f32, Ix3>,
    ) -> SegResult<()> {
        if primary.shape() != secondary.shape() {
            return Err(SegError::VolumeShapeMismatch {
                expected: primary.shape(),
                found: secondary.shape(),
            });
        }
        if primary.anchors() != secondary.anchors() {
            return Err(SegError::CubeCountMismatch {
                expected: primary.len(),
                found: secondary.len(),
            });
        }
        if primary.spec().edge() != self.edge {
            return Err(SegError::InvalidConfig(format!(
                "立方块边长 {} 与配置 {} 不一致",
                primary.spec().edge(),
                self.edge
            )));
        }
        Ok(())
    }

    /// 按分块顺序收集每个立方块的三阶段结果, 并按阶段分组.
    fn regroup(per_cube: Vec<[CascadeStageResult; STAGES]>) -> CascadeOutput {
        let mut stages: [Vec<CascadeStageResult>; STAGES] =
            std::array::from_fn(|_| Vec::with_capacity(per_cube.len()));
        for cube in per_cube {
            for (dst, r) in stages.iter_mut().zip(cube) {
                dst.push(r);
            }
        }
        CascadeOutput { stages }
    }

    /// 串行地对全部立方块运行级联. 任一立方块失败即返回该错误.
    ///
    /// `primary` 为多模态原始立方块, `secondary` 为辅助通道立方块,
    /// 两者必须由同一个 `TileSpec` 从同形状的体数据分解得到.
    pub fn run(
        &self,
        primary: &CubeSet<f32, Ix4>,
        secondary: &CubeSet<f32, Ix3>,
    ) -> SegResult<CascadeOutput> {
        self.check_inputs(primary, secondary)?;
        let n = primary.len();
        let mut per_cube = Vec::with_capacity(n);
        for c in 0..n {
            if c % PROGRESS_EVERY == 0 {
                log::debug!("predicting cube {c}/{n}");
            }
            per_cube.push(self.run_cube(c, primary.cube(c), secondary.cube(c))?);
        }
        Ok(Self::regroup(per_cube))
    }

    /// 借助 `rayon` 并行地对全部立方块运行级联. 结果顺序与分块顺序一致.
    #[cfg(feature = "rayon")]
    pub fn par_run(
        &self,
        primary: &CubeSet<f32, Ix4>,
        secondary: &CubeSet<f32, Ix3>,
    ) -> SegResult<CascadeOutput> {
        self.check_inputs(primary, secondary)?;
        let n = primary.len();
        let done = AtomicUsize::new(0);
        let per_cube = (0..n)
            .into_par_iter()
            .map(|c| {
                let r = self.run_cube(c, primary.cube(c), secondary.cube(c));
                let finished = done.fetch_add(1, Ordering::Relaxed);
                if finished % PROGRESS_EVERY == 0 {
                    log::debug!("predicted {finished}/{n} cubes");
                }
                r
            })
            .collect::<SegResult<Vec<_>>>()?;
        Ok(Self::regroup(per_cube))
    }

    /// 按配置选择串行或并行执行.
    pub fn execute(
        &self,
        primary: &CubeSet<f32, Ix4>,
        secondary: &CubeSet<f32, Ix3>,
    ) -> SegResult<CascadeOutput> {
        #[cfg(feature = "rayon")]
        if self.parallel {
            return self.par_run(primary, secondary);
        }
        self.run(primary, secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiling::{decompose, TileSpec};
    use ndarray::{Axis, Zip};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 输出 `label = (通道 0 > 0)` 的第一阶段桩.
    struct RawThreshold;

    impl StagePredictor for RawThreshold {
        fn predict(&self, input: StageInput<'_>) -> Result<StageOutput, PredictError> {
            let StageInput::Raw(raw) = input else {
                return Err("stage 1 expects raw input".into());
            };
            let label = raw.index_axis(Axis(3), 0).mapv(|v| (v > 0.0) as u8);
            Ok(StageOutput {
                prob: probability(&label),
                label,
            })
        }
    }

    /// 输出 `label = 上一阶段前景 && secondary > 1` 的后续阶段桩.
    struct Conditioned {
        calls: Arc<AtomicUsize>,
    }

    impl StagePredictor for Conditioned {
        fn predict(&self, input: StageInput<'_>) -> Result<StageOutput, PredictError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let StageInput::Conditioned { prob, secondary } = input else {
                return Err("expects conditioned input".into());
            };
            let mut label = Array3::<u8>::zeros(secondary.dim());
            Zip::from(&mut label)
                .and(prob.lanes(Axis(3)))
                .and(&secondary)
                .for_each(|l, p, &s| *l = (p[1] > 0.5 && s > 1.0) as u8);
            Ok(StageOutput {
                prob: probability(&label),
                label,
            })
        }
    }

    /// 由二值标签构造 one-hot 概率图.
    fn probability(label: &Array3<u8>) -> Array4<f32> {
        let (z, h, w) = label.dim();
        Array4::from_shape_fn((z, h, w, 2), |(a, b, c, k)| {
            (label[(a, b, c)] as usize == k) as u8 as f32
        })
    }

    struct Failing;

    impl StagePredictor for Failing {
        fn predict(&self, _: StageInput<'_>) -> Result<StageOutput, PredictError> {
            Err("boom".into())
        }
    }

    fn inputs(spec: &TileSpec) -> (CubeSet<f32, Ix4>, CubeSet<f32, Ix3>) {
        let raw = Array4::from_shape_fn((8, 8, 8, 2), |(z, _, _, c)| {
            if c == 0 && z < 4 {
                1.0
            } else {
                0.0
            }
        });
        let sec = Array3::from_shape_fn((8, 8, 8), |(_, h, _)| h as f32);
        (
            decompose(raw.view(), spec).unwrap(),
            decompose(sec.view(), spec).unwrap(),
        )
    }

    fn config(parallel: bool) -> CascadeConfig {
        CascadeConfig {
            parallel,
            ..CascadeConfig::with_tiling(4, 0.5)
        }
    }

    #[test]
    fn test_run_sequences_stages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = CascadeContext::new(
            RawThreshold,
            Conditioned {
                calls: Arc::clone(&calls),
            },
            Conditioned {
                calls: Arc::clone(&calls),
            },
        );
        let cfg = config(false);
        let spec = cfg.tile_spec().unwrap();
        let (primary, secondary) = inputs(&spec);
        let out = CascadeOrchestrator::new(&ctx, &cfg)
            .run(&primary, &secondary)
            .unwrap();

        assert_eq!(out.len(), 27);
        assert_eq!(calls.load(Ordering::Relaxed), 2 * 27);
        for (i, (anchor, _)) in primary.iter().enumerate() {
            let wt = &out.stage(Stage::WholeTumor)[i].label;
            let tc = &out.stage(Stage::TumorCore)[i].label;
            // 第一阶段: z < 4.
            assert_eq!(wt[(0, 0, 0)], (anchor.0 < 4) as u8);
            // 第二阶段在第一阶段前景之内.
            Zip::from(wt).and(tc).for_each(|&a, &b| assert!(b <= a));
            assert!(out.stage(Stage::Necrotic)[i].prob.is_none());
        }
        assert_eq!(out.labels(Stage::TumorCore).len(), 27);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_run_matches_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = CascadeContext::new(
            RawThreshold,
            Conditioned {
                calls: Arc::clone(&calls),
            },
            Conditioned { calls },
        );
        let mut cfg = config(true);
        cfg.keep_probability = true;
        let spec = cfg.tile_spec().unwrap();
        let (primary, secondary) = inputs(&spec);
        let orch = CascadeOrchestrator::new(&ctx, &cfg);
        let a = orch.run(&primary, &secondary).unwrap();
        let b = orch.execute(&primary, &secondary).unwrap();
        for stage in Stage::ALL {
            let la: Vec<_> = a.labels(stage).collect();
            let lb: Vec<_> = b.labels(stage).collect();
            assert_eq!(la, lb);
            assert!(b.stage(stage).iter().all(|r| r.prob.is_some()));
        }
    }

    #[test]
    fn test_predictor_failure_is_reported() {
        let ctx = CascadeContext::new(RawThreshold, Failing, Failing);
        let cfg = config(false);
        let spec = cfg.tile_spec().unwrap();
        let (primary, secondary) = inputs(&spec);
        let err = CascadeOrchestrator::new(&ctx, &cfg)
            .run(&primary, &secondary)
            .unwrap_err();
        assert!(matches!(err, SegError::Predictor { stage: 2, cube: 0, .. }));
        assert!(!err.is_run_fatal());
    }

    #[test]
    fn test_mismatched_inputs() {
        let ctx = CascadeContext::new(RawThreshold, Failing, Failing);
        let cfg = config(false);
        let spec = cfg.tile_spec().unwrap();
        let (primary, _) = inputs(&spec);
        let other = decompose(Array3::<f32>::zeros((8, 8, 12)).view(), &spec).unwrap();
        let err = CascadeOrchestrator::new(&ctx, &cfg)
            .run(&primary, &other)
            .unwrap_err();
        assert!(matches!(err, SegError::VolumeShapeMismatch { .. }));
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::ALL.map(Stage::number), [1, 2, 3]);
        assert_eq!(Stage::TumorCore.to_string(), "TC");
    }
}
