//! 运行时错误.

use crate::Idx3d;
use thiserror::Error;

/// 分割流程的运行时错误.
///
/// 绝大多数错误只对单个病例致命: 批量评估时跳过该病例并继续.
/// 少数错误 (见 [`SegError::is_run_fatal`]) 说明分块器和拼接器的参数不一致,
/// 此时整个运行都应当终止.
#[derive(Debug, Error)]
pub enum SegError {
    /// 参考通道中不存在任何前景体素.
    #[error("参考通道中不存在前景体素")]
    EmptyRegion,

    /// 同一病例的多个体数据空间形状不一致.
    #[error("体数据形状不一致: 期望 {expected:?}, 实际 {found:?}")]
    VolumeShapeMismatch {
        /// 参考形状.
        expected: Idx3d,
        /// 实际形状.
        found: Idx3d,
    },

    /// 体数据某个轴过短, 补零倍数超过安全上限.
    #[error("轴长 {extent} 补零到 {edge} 超出安全上限 {bound}")]
    PaddingTooLarge {
        /// 原始轴长.
        extent: usize,
        /// 立方块边长.
        edge: usize,
        /// 允许的最大补零倍数.
        bound: f64,
    },

    /// 形状超出 nifti header 的 16 位维度上限.
    #[error("形状 {0:?} 超出 nifti 维度上限")]
    ShapeTooLarge(Idx3d),

    /// 拼接时存在未被任何立方块覆盖的体素. 这是编程错误.
    #[error("体素 {voxel:?} 未被任何立方块覆盖")]
    TileCoverageViolation {
        /// 第一个未覆盖的体素 (补零后坐标).
        voxel: Idx3d,
    },

    /// 立方块数量与锚点数量不一致. 这是编程错误.
    #[error("立方块数量不一致: 期望 {expected}, 实际 {found}")]
    CubeCountMismatch {
        /// 由分块参数推出的锚点数.
        expected: usize,
        /// 实际收到的立方块数.
        found: usize,
    },

    /// 立方块形状与边长不符.
    #[error("第 {index} 个立方块形状为 {found:?}, 边长应为 {edge}")]
    CubeShapeMismatch {
        /// 立方块序号 (分块顺序).
        index: usize,
        /// 实际形状.
        found: Idx3d,
        /// 期望边长.
        edge: usize,
    },

    /// 标签值不小于类别数.
    #[error("标签值 {label} 超出类别数 {num_classes}")]
    LabelOutOfRange {
        /// 非法标签值.
        label: u8,
        /// 类别数.
        num_classes: usize,
    },

    /// 配置不合法.
    #[error("配置不合法: {0}")]
    InvalidConfig(String),

    /// 预测器调用失败. 不重试.
    #[error("第 {stage} 阶段预测第 {cube} 个立方块失败: {reason}")]
    Predictor {
        /// 阶段 (1, 2, 3).
        stage: usize,
        /// 立方块序号.
        cube: usize,
        /// 预测器给出的原因.
        reason: String,
    },

    /// nifti 读写错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 数组维度或形状错误.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    /// npz 写入错误.
    #[error(transparent)]
    Npz(#[from] ndarray_npy::WriteNpzError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SegError {
    /// 该错误是否意味着整个运行都应终止 (而不仅仅是跳过当前病例).
    #[inline]
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::TileCoverageViolation { .. } | Self::CubeCountMismatch { .. }
        )
    }
}

/// 分割流程运行时结果.
pub type SegResult<T> = Result<T, SegError>;

#[cfg(test)]
mod tests {
    use super::SegError;

    #[test]
    fn test_fatality_classes() {
        assert!(SegError::TileCoverageViolation { voxel: (0, 0, 0) }.is_run_fatal());
        assert!(SegError::CubeCountMismatch {
            expected: 8,
            found: 7
        }
        .is_run_fatal());
        assert!(!SegError::EmptyRegion.is_run_fatal());
        assert!(!SegError::VolumeShapeMismatch {
            expected: (1, 2, 3),
            found: (3, 2, 1)
        }
        .is_run_fatal());
    }
}
