use ndarray::{Array3, Array4, ArrayView3, Axis};
use nifti::NiftiHeader;

use crate::consts::brats::{is_necrotic, is_tumor_core, is_whole_tumor};
use crate::{Idx3d, SegError, SegResult};

/// 三个层级区域的真值掩码, 均为 0/1.
#[derive(Clone, Debug, PartialEq)]
pub struct GroundTruth {
    /// 全肿瘤 {1, 2, 4}.
    pub whole_tumor: Array3<u8>,
    /// 肿瘤核心 {1, 4}.
    pub tumor_core: Array3<u8>,
    /// 坏死核心 {1}.
    pub necrotic: Array3<u8>,
}

impl GroundTruth {
    /// 从 BraTS 多类别标注导出三个区域掩码.
    pub fn from_brats(label: ArrayView3<'_, u8>) -> Self {
        Self {
            whole_tumor: label.mapv(|p| is_whole_tumor(p) as u8),
            tumor_core: label.mapv(|p| is_tumor_core(p) as u8),
            necrotic: label.mapv(|p| is_necrotic(p) as u8),
        }
    }

    /// 直接由三个掩码创建. 形状不一致时返回 `Err(SegError::VolumeShapeMismatch)`.
    pub fn new(
        whole_tumor: Array3<u8>,
        tumor_core: Array3<u8>,
        necrotic: Array3<u8>,
    ) -> SegResult<Self> {
        for found in [tumor_core.dim(), necrotic.dim()] {
            if found != whole_tumor.dim() {
                return Err(SegError::VolumeShapeMismatch {
                    expected: whole_tumor.dim(),
                    found,
                });
            }
        }
        Ok(Self {
            whole_tumor,
            tumor_core,
            necrotic,
        })
    }

    /// 空间形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.whole_tumor.dim()
    }
}

/// 一个待分割的病例. 所有体数据已经空间对齐.
#[derive(Clone, Debug)]
pub struct Case {
    id: String,
    primary: Array4<f32>,
    secondary: Array3<f32>,
    truth: Option<GroundTruth>,
    reference: Option<Box<NiftiHeader>>,
}

impl Case {
    /// 创建病例.
    ///
    /// `primary` 形状为 `(z, h, w, 模态数)`, 是第一阶段的输入;
    /// `secondary` 形状为 `(z, h, w)`, 是对比度最高的辅助通道 (通常为 T1ce),
    /// 既用于前景区域提取, 也是后续阶段的条件输入.
    ///
    /// 两者空间形状不一致时返回 `Err(SegError::VolumeShapeMismatch)`.
    pub fn new<S: Into<String>>(
        id: S,
        primary: Array4<f32>,
        secondary: Array3<f32>,
    ) -> SegResult<Self> {
        let (z, h, w, _) = primary.dim();
        if (z, h, w) != secondary.dim() {
            return Err(SegError::VolumeShapeMismatch {
                expected: secondary.dim(),
                found: (z, h, w),
            });
        }
        Ok(Self {
            id: id.into(),
            primary,
            secondary,
            truth: None,
            reference: None,
        })
    }

    /// 以单通道体数据创建病例: `primary` 即 `secondary` 本身.
    pub fn single_channel<S: Into<String>>(id: S, volume: Array3<f32>) -> SegResult<Self> {
        let primary = volume.clone().insert_axis(Axis(3));
        Self::new(id, primary, volume)
    }

    /// 附加真值. 形状不一致时返回 `Err(SegError::VolumeShapeMismatch)`.
    pub fn with_truth(mut self, truth: GroundTruth) -> SegResult<Self> {
        if truth.shape() != self.shape() {
            return Err(SegError::VolumeShapeMismatch {
                expected: self.shape(),
                found: truth.shape(),
            });
        }
        self.truth = Some(truth);
        Ok(self)
    }

    /// 附加保存结果时使用的参考 header.
    #[inline]
    pub fn with_reference(mut self, header: NiftiHeader) -> Self {
        self.reference = Some(Box::new(header));
        self
    }

    /// 病例标识.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 空间形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.secondary.dim()
    }

    /// 多模态输入.
    #[inline]
    pub fn primary(&self) -> &Array4<f32> {
        &self.primary
    }

    /// 辅助通道.
    #[inline]
    pub fn secondary(&self) -> &Array3<f32> {
        &self.secondary
    }

    /// 真值 (若有).
    #[inline]
    pub fn truth(&self) -> Option<&GroundTruth> {
        self.truth.as_ref()
    }

    /// 参考 header (若有).
    #[inline]
    pub fn reference(&self) -> Option<&NiftiHeader> {
        self.reference.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_truth_from_brats() {
        let label = Array3::from_shape_vec((1, 1, 5), vec![0, 1, 2, 4, 0]).unwrap();
        let gt = GroundTruth::from_brats(label.view());
        assert_eq!(gt.whole_tumor.as_slice().unwrap(), &[0, 1, 1, 1, 0]);
        assert_eq!(gt.tumor_core.as_slice().unwrap(), &[0, 1, 0, 1, 0]);
        assert_eq!(gt.necrotic.as_slice().unwrap(), &[0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_case_shape_checks() {
        let p = Array4::<f32>::zeros((4, 5, 6, 4));
        assert!(Case::new("a", p.clone(), Array3::zeros((4, 5, 6))).is_ok());
        assert!(matches!(
            Case::new("a", p, Array3::zeros((4, 5, 7))),
            Err(SegError::VolumeShapeMismatch { .. })
        ));

        let c = Case::single_channel("b", Array3::zeros((3, 3, 3))).unwrap();
        assert_eq!(c.primary().dim(), (3, 3, 3, 1));
        assert_eq!(c.id(), "b");
        let gt = GroundTruth::from_brats(Array3::<u8>::zeros((3, 3, 2)).view());
        assert!(c.with_truth(gt).is_err());

        assert!(GroundTruth::new(
            Array3::zeros((2, 2, 2)),
            Array3::zeros((2, 2, 2)),
            Array3::zeros((2, 2, 1))
        )
        .is_err());
    }
}
