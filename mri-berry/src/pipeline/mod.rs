//! 病例级分割流程与批量评估.
//!
//! 数据流: 原始体数据 -> 前景区域提取 -> 分块 -> 级联推理 -> 逐阶段拼接
//! -> 标签重映射 -> 评估 (若有真值).

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayView3};
use nifti::NiftiHeader;

use crate::cascade::{CascadeContext, CascadeOrchestrator, CascadeOutput, Stage};
use crate::config::CascadeConfig;
use crate::consts::mask::OFF;
use crate::data::{crop, extract_region, restore, save_label, save_npz, BoundingBox};
use crate::eval::ClassCounts;
use crate::post_proc::{KeepLargestComponent, PostProcess};
use crate::remap::{apply_override, enhancing_compare, merge, CaseOverride, NoOverride};
use crate::tiling::{compose, decompose, TileSpec};
use crate::{Idx3d, SegResult};

mod case;
mod report;

pub use case::{Case, GroundTruth};
pub use report::{BatchReport, CaseScores, EvalSink, LogSink, Region};

/// 批量评估的输入项: 病例标识以及加载结果.
pub type CaseSource = (String, SegResult<Case>);

/// 单个病例的分割结果. 所有体数据均已回填到病例的完整空间形状.
#[derive(Clone, Debug)]
pub struct CaseOutcome {
    /// 病例标识.
    pub id: String,
    /// 前景包围盒.
    pub bbox: BoundingBox,
    /// 立方块个数.
    pub cubes: usize,
    /// 全肿瘤掩码 (已后处理).
    pub whole_tumor: Array3<u8>,
    /// 肿瘤核心掩码 (已后处理).
    pub tumor_core: Array3<u8>,
    /// 坏死核心掩码.
    pub necrotic: Array3<u8>,
    /// 增强肿瘤对比掩码 (`tc - net`, 在后处理之前导出).
    pub enhancing: Array3<u8>,
    /// 合并后的 BraTS 多类别标签, 已施加病例级修正.
    pub merged: Array3<u8>,
    /// 病例级修正改动的体素数.
    pub folded: usize,
    /// 指标. 仅在病例带有真值时存在.
    pub scores: Option<CaseScores>,
    /// 每个立方块每个阶段的原始结果. 仅在 `keep_probability` 打开时保留.
    pub stages: Option<CascadeOutput>,
}

impl CaseOutcome {
    /// 空间形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.merged.dim()
    }

    /// 将多类别标签保存为 nii 文件, 沿用 `reference` 的空间变换.
    #[inline]
    pub fn save_label<P: AsRef<Path>>(&self, path: P, reference: &NiftiHeader) -> SegResult<()> {
        save_label(path, self.merged.view(), reference)
    }

    /// 将各阶段结果与合并标签导出到一个 npz 压缩包.
    pub fn save_stages_npz<P: AsRef<Path>>(&self, path: P) -> SegResult<()> {
        save_npz(
            path,
            [
                ("wt", self.whole_tumor.view()),
                ("tc", self.tumor_core.view()),
                ("net", self.necrotic.view()),
                ("et", self.enhancing.view()),
                ("merged", self.merged.view()),
            ],
        )
    }
}

/// 级联分割流程. 持有配置, 预测器上下文, 后处理和病例级修正表.
pub struct CascadePipeline {
    config: CascadeConfig,
    spec: TileSpec,
    ctx: CascadeContext,
    post: Box<dyn PostProcess>,
    lookup: Box<dyn CaseOverride>,
    output: Option<PathBuf>,
}

impl std::fmt::Debug for CascadePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadePipeline")
            .field("config", &self.config)
            .field("ctx", &self.ctx)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl CascadePipeline {
    /// 创建流程. 配置不合法时返回 `Err(SegError::InvalidConfig)`.
    ///
    /// 默认后处理为 [`KeepLargestComponent`], 默认不做病例级修正.
    pub fn new(config: CascadeConfig, ctx: CascadeContext) -> SegResult<Self> {
        config.validate()?;
        let spec = config.tile_spec()?;
        Ok(Self {
            config,
            spec,
            ctx,
            post: Box::new(KeepLargestComponent),
            lookup: Box::new(NoOverride),
            output: None,
        })
    }

    /// 替换后处理步骤.
    pub fn with_post_process<P: PostProcess + 'static>(mut self, post: P) -> Self {
        self.post = Box::new(post);
        self
    }

    /// 替换病例级修正表.
    pub fn with_override<O: CaseOverride + 'static>(mut self, lookup: O) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    /// 批量评估时把每个病例的合并标签保存到 `dir/<case_id>.nii.gz`.
    ///
    /// 只保存带有参考 header 的病例 (见 [`Case::reference`]).
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output = Some(dir.into());
        self
    }

    /// 运行配置.
    #[inline]
    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// 分块参数.
    #[inline]
    pub fn tile_spec(&self) -> &TileSpec {
        &self.spec
    }

    /// 拼接 `stage` 阶段的全部立方块标签.
    fn compose_stage(&self, out: &CascadeOutput, stage: Stage, shape: Idx3d) -> SegResult<Array3<u8>> {
        compose(out.labels(stage), shape, &self.spec, self.config.num_classes)
    }

    /// 在裁剪区域内对三个区域评分.
    ///
    /// `fold` 为真时, 增强肿瘤已并入肿瘤核心: 预测与真值的 ET 掩码都被清空,
    /// 该病例的 ET 指标因此无定义.
    fn score(
        &self,
        truth: &GroundTruth,
        bbox: &BoundingBox,
        wt: ArrayView3<'_, u8>,
        tc: ArrayView3<'_, u8>,
        et: ArrayView3<'_, u8>,
        fold: bool,
    ) -> SegResult<CaseScores> {
        let n = self.config.num_classes;
        let gt_wt = crop(truth.whole_tumor.view(), bbox)?;
        let gt_tc = crop(truth.tumor_core.view(), bbox)?;
        let gt_net = crop(truth.necrotic.view(), bbox)?;
        let mut gt_et = enhancing_compare(gt_tc, gt_net)?;
        let mut et = et.to_owned();
        if fold {
            gt_et.fill(OFF);
            et.fill(OFF);
        }
        let counts = [
            ClassCounts::count(wt, gt_wt, n)?,
            ClassCounts::count(tc, gt_tc, n)?,
            ClassCounts::count(et.view(), gt_et.view(), n)?,
        ];
        Ok(CaseScores::from_counts(&counts))
    }

    /// 对单个病例运行完整流程.
    ///
    /// 失败时不产生任何部分结果. 调用方可用 [`crate::SegError::is_run_fatal`]
    /// 判断是跳过该病例还是终止整个运行.
    pub fn run_case(&self, case: &Case) -> SegResult<CaseOutcome> {
        let id = case.id();
        let full = case.shape();
        log::info!("start processing {id}, shape {full:?}");

        let bbox = extract_region(case.secondary().view(), self.config.background_threshold)?;
        let shape = bbox.shape();
        let primary = decompose(crop(case.primary().view(), &bbox)?, &self.spec)?;
        let secondary = decompose(crop(case.secondary().view(), &bbox)?, &self.spec)?;

        let out = CascadeOrchestrator::new(&self.ctx, &self.config).execute(&primary, &secondary)?;
        let mut wt = self.compose_stage(&out, Stage::WholeTumor, shape)?;
        let mut tc = self.compose_stage(&out, Stage::TumorCore, shape)?;
        let net = self.compose_stage(&out, Stage::Necrotic, shape)?;

        // ET 对比掩码在后处理之前由 TC 导出.
        let et = enhancing_compare(tc.view(), net.view())?;
        self.post.apply(&mut wt);
        self.post.apply(&mut tc);

        let fold = self.lookup.fold_enhancing(id);
        let scores = match case.truth() {
            Some(truth) => Some(self.score(truth, &bbox, wt.view(), tc.view(), et.view(), fold)?),
            None => None,
        };

        let whole_tumor = restore(wt.view(), &bbox, full)?;
        let tumor_core = restore(tc.view(), &bbox, full)?;
        let necrotic = restore(net.view(), &bbox, full)?;
        let enhancing = restore(et.view(), &bbox, full)?;
        let mut merged = merge(whole_tumor.view(), tumor_core.view(), enhancing.view())?;
        let folded = apply_override(self.lookup.as_ref(), id, merged.view_mut());

        if let Some(s) = &scores {
            let [a, b, c] = Region::ALL.map(|r| s.dice_of(r));
            log::info!("{id} dice [WT, TC, ET]: [{a:.3}, {b:.3}, {c:.3}]");
        }
        log::info!("finished {id}: {} cubes, {folded} voxels folded", out.len());

        Ok(CaseOutcome {
            id: id.to_string(),
            bbox,
            cubes: out.len(),
            whole_tumor,
            tumor_core,
            necrotic,
            enhancing,
            merged,
            folded,
            scores,
            stages: self.config.keep_probability.then_some(out),
        })
    }

    /// 按 [`Self::with_output_dir`] 的设置保存合并标签.
    fn persist(&self, case: &Case, outcome: &CaseOutcome) -> SegResult<()> {
        let Some(dir) = &self.output else {
            return Ok(());
        };
        let Some(reference) = case.reference() else {
            log::warn!("{}: no reference header, label not saved", case.id());
            return Ok(());
        };
        fs::create_dir_all(dir)?;
        outcome.save_label(dir.join(format!("{}.nii.gz", case.id())), reference)
    }

    /// 批量评估.
    ///
    /// 加载失败或只对单个病例致命的错误会被记录到 [`BatchReport::skipped`] 并跳过;
    /// 运行级致命错误 (分块器与拼接器不一致) 会立即返回.
    /// 每个带真值的病例的指标会交给 `sink`.
    pub fn evaluate<I, S>(&self, cases: I, sink: &mut S) -> SegResult<BatchReport>
    where
        I: IntoIterator<Item = CaseSource>,
        S: EvalSink + ?Sized,
    {
        let mut report = BatchReport::new(self.config.num_classes);
        for (id, case) in cases {
            let result = case.and_then(|c| {
                let outcome = self.run_case(&c)?;
                self.persist(&c, &outcome)?;
                Ok(outcome)
            });
            match result {
                Ok(outcome) => {
                    report.processed += 1;
                    if let Some(scores) = &outcome.scores {
                        report.record(scores)?;
                        sink.record(&outcome.id, scores);
                    }
                }
                Err(e) if e.is_run_fatal() => {
                    log::error!("{id}: {e}, aborting the run");
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("{id} skipped: {e}");
                    report.skipped.push((id, e.to_string()));
                }
            }
        }
        log::info!("batch finished\n{report}");
        Ok(report)
    }
}
