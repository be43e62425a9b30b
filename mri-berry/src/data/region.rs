//! 前景区域提取, 裁剪与回填.

use ndarray::{Array, Array3, ArrayView, ArrayView3, Axis, Dimension};
use num::Zero;

use crate::tiling::{spatial_shape, spatial_window};
use crate::{Idx3d, SegError, SegResult};

/// 轴对齐包围盒. `min` 与 `max` 均为闭区间端点.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    /// 每个轴上的最小索引.
    pub min: Idx3d,
    /// 每个轴上的最大索引 (包含).
    pub max: Idx3d,
}

impl BoundingBox {
    /// 创建包围盒. 若某个轴上 `min > max` 则返回 `None`.
    #[inline]
    pub fn new(min: Idx3d, max: Idx3d) -> Option<Self> {
        (min.0 <= max.0 && min.1 <= max.1 && min.2 <= max.2).then_some(Self { min, max })
    }

    /// 覆盖整个 `shape` 的包围盒. `shape` 的任何一个轴为 0 时返回 `None`.
    #[inline]
    pub fn full((z, h, w): Idx3d) -> Option<Self> {
        if z == 0 || h == 0 || w == 0 {
            return None;
        }
        Some(Self {
            min: (0, 0, 0),
            max: (z - 1, h - 1, w - 1),
        })
    }

    /// 包围盒形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (
            self.max.0 - self.min.0 + 1,
            self.max.1 - self.min.1 + 1,
            self.max.2 - self.min.2 + 1,
        )
    }

    /// 包围盒体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 包围盒是否完全位于形状为 `shape` 的体数据内.
    #[inline]
    pub fn within(&self, (z, h, w): Idx3d) -> bool {
        self.max.0 < z && self.max.1 < h && self.max.2 < w
    }

    /// 体素 `pos` 是否位于包围盒内.
    #[inline]
    pub fn contains(&self, (z, h, w): Idx3d) -> bool {
        (self.min.0..=self.max.0).contains(&z)
            && (self.min.1..=self.max.1).contains(&h)
            && (self.min.2..=self.max.2).contains(&w)
    }
}

/// 沿 `axis` 求前景的最小和最大索引.
fn axis_extent(fg: &Array3<bool>, axis: usize) -> Option<(usize, usize)> {
    let any: Vec<bool> = fg
        .axis_iter(Axis(axis))
        .map(|plane| plane.iter().any(|&p| p))
        .collect();
    let lo = any.iter().position(|&p| p)?;
    let hi = any.iter().rposition(|&p| p)?;
    Some((lo, hi))
}

/// 计算参考通道 `reference` 中所有严格大于 `threshold` 的体素的最小包围盒.
///
/// 不存在前景体素时返回 `Err(SegError::EmptyRegion)`.
/// 该错误只对当前病例致命.
pub fn extract_region(reference: ArrayView3<'_, f32>, threshold: f32) -> SegResult<BoundingBox> {
    let fg = reference.mapv(|v| v > threshold);
    let (z0, z1) = axis_extent(&fg, 0).ok_or(SegError::EmptyRegion)?;
    let (h0, h1) = axis_extent(&fg, 1).ok_or(SegError::EmptyRegion)?;
    let (w0, w1) = axis_extent(&fg, 2).ok_or(SegError::EmptyRegion)?;
    let bbox = BoundingBox {
        min: (z0, h0, w0),
        max: (z1, h1, w1),
    };
    log::debug!(
        "foreground of {:?} bounded by {bbox:?}, shape {:?}",
        reference.dim(),
        bbox.shape()
    );
    Ok(bbox)
}

/// 用包围盒 `bbox` 裁剪 `volume` 的前三个空间轴, 其余轴保留. 只切片, 不缩放.
///
/// 包围盒越出 `volume` 时返回 `Err(SegError::VolumeShapeMismatch)`.
pub fn crop<'a, T, D>(
    volume: ArrayView<'a, T, D>,
    bbox: &BoundingBox,
) -> SegResult<ArrayView<'a, T, D>>
where
    D: Dimension,
{
    if volume.ndim() < 3 {
        return Err(SegError::InvalidConfig(format!(
            "体数据至少需要三个空间轴, 实际为 {}",
            volume.ndim()
        )));
    }
    let shape = spatial_shape(volume.shape());
    if !bbox.within(shape) {
        return Err(SegError::VolumeShapeMismatch {
            expected: (bbox.max.0 + 1, bbox.max.1 + 1, bbox.max.2 + 1),
            found: shape,
        });
    }
    let mut view = volume;
    view.slice_each_axis_inplace(spatial_window(bbox.min, bbox.shape()));
    Ok(view)
}

/// 将裁剪后的结果 `cropped` 回填到形状为 `full_shape` 的全零体数据中.
///
/// `cropped` 的形状必须与 `bbox` 一致且 `bbox` 必须位于 `full_shape` 内,
/// 否则返回 `Err(SegError::VolumeShapeMismatch)`.
pub fn restore<T: Clone + Zero>(
    cropped: ArrayView3<'_, T>,
    bbox: &BoundingBox,
    full_shape: Idx3d,
) -> SegResult<Array3<T>> {
    if cropped.dim() != bbox.shape() {
        return Err(SegError::VolumeShapeMismatch {
            expected: bbox.shape(),
            found: cropped.dim(),
        });
    }
    if !bbox.within(full_shape) {
        return Err(SegError::VolumeShapeMismatch {
            expected: full_shape,
            found: (bbox.max.0 + 1, bbox.max.1 + 1, bbox.max.2 + 1),
        });
    }
    let mut ans = Array::from_elem(full_shape, T::zero());
    ans.slice_each_axis_mut(spatial_window(bbox.min, bbox.shape()))
        .assign(&cropped);
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array4};

    #[test]
    fn test_extract_region() {
        let mut vol = Array3::<f32>::zeros((6, 7, 8));
        vol[(1, 2, 3)] = 1.0;
        vol[(4, 5, 3)] = 0.5;
        vol[(2, 3, 6)] = 2.0;
        let bbox = extract_region(vol.view(), 0.0).unwrap();
        assert_eq!(bbox.min, (1, 2, 3));
        assert_eq!(bbox.max, (4, 5, 6));
        assert_eq!(bbox.shape(), (4, 4, 4));
        assert!(bbox.within((6, 7, 8)));
        assert!(bbox.contains((2, 2, 3)));
        assert!(!bbox.contains((0, 2, 3)));

        // 阈值是严格大于.
        let bbox = extract_region(vol.view(), 0.5).unwrap();
        assert_eq!(bbox.min, (1, 2, 3));
        assert_eq!(bbox.max, (2, 3, 6));
    }

    #[test]
    fn test_empty_region() {
        let vol = Array3::<f32>::from_elem((4, 4, 4), -1.0);
        assert!(matches!(
            extract_region(vol.view(), 0.0),
            Err(SegError::EmptyRegion)
        ));
        let vol = Array3::<f32>::zeros((0, 4, 4));
        assert!(matches!(
            extract_region(vol.view(), 0.0),
            Err(SegError::EmptyRegion)
        ));
    }

    #[test]
    fn test_bounding_box_new() {
        assert!(BoundingBox::new((1, 1, 1), (1, 2, 3)).is_some());
        assert!(BoundingBox::new((2, 1, 1), (1, 2, 3)).is_none());
        assert_eq!(
            BoundingBox::full((2, 3, 4)).unwrap().shape(),
            (2, 3, 4)
        );
        assert!(BoundingBox::full((0, 3, 4)).is_none());
    }

    #[test]
    fn test_crop_and_restore() {
        let vol = Array3::from_shape_fn((6, 7, 8), |(z, h, w)| (z * 100 + h * 10 + w) as u32);
        let bbox = BoundingBox::new((1, 2, 3), (3, 5, 4)).unwrap();
        let c = crop(vol.view(), &bbox).unwrap();
        assert_eq!(c.dim(), (3, 4, 2));
        assert_eq!(c, vol.slice(s![1..4, 2..6, 3..5]));

        let r = restore(c, &bbox, (6, 7, 8)).unwrap();
        assert_eq!(r.slice(s![1..4, 2..6, 3..5]), c);
        assert_eq!(r.sum(), c.sum());
        assert_eq!(r[(0, 0, 0)], 0);
    }

    #[test]
    fn test_crop_keeps_channels() {
        let vol = Array4::from_shape_fn((5, 5, 5, 2), |(_, _, _, c)| c as f32);
        let bbox = BoundingBox::new((0, 1, 2), (4, 3, 2)).unwrap();
        let c = crop(vol.view(), &bbox).unwrap();
        assert_eq!(c.dim(), (5, 3, 1, 2));
        assert_eq!(c[(0, 0, 0, 1)], 1.0);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let vol = Array3::<u8>::zeros((4, 4, 4));
        let bbox = BoundingBox::new((0, 0, 0), (4, 1, 1)).unwrap();
        assert!(matches!(
            crop(vol.view(), &bbox),
            Err(SegError::VolumeShapeMismatch { .. })
        ));
        let small = Array3::<u8>::zeros((2, 2, 2));
        assert!(restore(small.view(), &bbox, (4, 4, 4)).is_err());
    }
}
