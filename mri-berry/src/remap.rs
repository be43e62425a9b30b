//! 层级标签重映射.
//!
//! 三个阶段各自输出二值掩码 (WT, TC, NET). 这里把它们合并为 BraTS
//! 多类别标签, 并通过集合相减导出增强肿瘤 (ET) 对比掩码.

use std::collections::HashSet;

use ndarray::{Array3, ArrayView3, ArrayViewMut3, Zip};

use crate::consts::brats::{BACKGROUND, EDEMA, ENHANCING, NECROTIC};
use crate::consts::mask::{OFF, ON};
use crate::{SegError, SegResult};

/// 检查同一病例的掩码形状一致.
fn check_same_shape(a: &ArrayView3<'_, u8>, b: &ArrayView3<'_, u8>) -> SegResult<()> {
    if a.dim() != b.dim() {
        return Err(SegError::VolumeShapeMismatch {
            expected: a.dim(),
            found: b.dim(),
        });
    }
    Ok(())
}

/// 按固定优先级合并三个二值掩码, 后写覆盖先写:
///
/// 1. 全部置为背景 0;
/// 2. `wt == 1` 处置为 2 (水肿);
/// 3. `tc == 1` 处置为 1 (坏死核心);
/// 4. `et == 1` 处置为 4 (增强肿瘤).
///
/// 三者形状不一致时返回 `Err(SegError::VolumeShapeMismatch)`.
pub fn merge(
    wt: ArrayView3<'_, u8>,
    tc: ArrayView3<'_, u8>,
    et: ArrayView3<'_, u8>,
) -> SegResult<Array3<u8>> {
    check_same_shape(&wt, &tc)?;
    check_same_shape(&wt, &et)?;

    let mut ans = Array3::from_elem(wt.raw_dim(), BACKGROUND);
    Zip::from(&mut ans)
        .and(&wt)
        .and(&tc)
        .and(&et)
        .for_each(|out, &w, &t, &e| {
            if w == ON {
                *out = EDEMA;
            }
            if t == ON {
                *out = NECROTIC;
            }
            if e == ON {
                *out = ENHANCING;
            }
        });
    Ok(ans)
}

/// 从肿瘤核心掩码中减去坏死核心, 得到增强肿瘤对比掩码:
/// `et = tc; et[net == 1] = 0`.
///
/// 预测结果与真值都使用同一规则.
pub fn enhancing_compare(
    tc: ArrayView3<'_, u8>,
    net: ArrayView3<'_, u8>,
) -> SegResult<Array3<u8>> {
    check_same_shape(&tc, &net)?;
    let mut ans = tc.to_owned();
    Zip::from(&mut ans).and(&net).for_each(|e, &n| {
        if n == ON {
            *e = OFF;
        }
    });
    Ok(ans)
}

/// 病例级标签修正查询: 哪些病例的增强肿瘤应折叠为肿瘤核心.
///
/// 这是一项显式的事后数据修正, 在配置期注入, 而不是通用算法规则.
pub trait CaseOverride: Send + Sync {
    /// 病例 `case_id` 是否需要将增强肿瘤折叠为坏死核心 (4 -> 1).
    fn fold_enhancing(&self, case_id: &str) -> bool;
}

impl<F> CaseOverride for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    #[inline]
    fn fold_enhancing(&self, case_id: &str) -> bool {
        self(case_id)
    }
}

/// 不修正任何病例.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOverride;

impl CaseOverride for NoOverride {
    #[inline]
    fn fold_enhancing(&self, _: &str) -> bool {
        false
    }
}

/// 由一组低级别胶质瘤 (LGG) 病例标识构成的修正表.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LowGradeList {
    ids: HashSet<String>,
}

impl LowGradeList {
    /// 由任意病例标识集合创建.
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(ids: I) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// 解析以逗号分隔的病例标识列表, 忽略空白项.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    /// BraTS 2019 测试集中需要修正的 15 个 LGG 病例.
    pub fn brats19() -> Self {
        Self::new([
            "BraTS19_TCIA09_225_1",
            "BraTS19_TCIA09_248_1",
            "BraTS19_TCIA09_381_1",
            "BraTS19_TCIA10_127_1",
            "BraTS19_TCIA10_195_1",
            "BraTS19_TCIA10_232_1",
            "BraTS19_TCIA10_236_1",
            "BraTS19_TCIA10_609_1",
            "BraTS19_TCIA10_614_1",
            "BraTS19_TCIA10_631_1",
            "BraTS19_TCIA12_146_1",
            "BraTS19_TCIA12_613_1",
            "BraTS19_TCIA12_641_1",
            "BraTS19_TCIA13_626_1",
            "BraTS19_TCIA13_646_1",
        ])
    }

    /// 表中病例数.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// 表是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl CaseOverride for LowGradeList {
    #[inline]
    fn fold_enhancing(&self, case_id: &str) -> bool {
        self.ids.contains(case_id)
    }
}

/// 对多类别标签体 `merged` 施加病例级修正. 返回被修改的体素数.
pub fn apply_override<O: CaseOverride + ?Sized>(
    lookup: &O,
    case_id: &str,
    mut merged: ArrayViewMut3<'_, u8>,
) -> usize {
    if !lookup.fold_enhancing(case_id) {
        return 0;
    }
    let mut cnt = 0usize;
    merged
        .iter_mut()
        .filter(|p| **p == ENHANCING)
        .for_each(|p| {
            cnt += 1;
            *p = NECROTIC;
        });
    log::debug!("case {case_id}: {cnt} enhancing voxels folded into tumor core");
    cnt
}
