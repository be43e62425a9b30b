//! 重叠分块与拼接.
//!
//! 分块器 ([`decompose`]) 和拼接器 ([`compose`]) 之间没有任何位置元数据传递:
//! 拼接器依据同一个 [`TileSpec`] 重新推算锚点序列. 因此两者 **必须**
//! 使用相同的参数, 否则拼接会静默错位.
//!
//! 锚点按 `(axis0, axis1, axis2)` 字典序排列, 该顺序从分块一直保持到拼接.

use itertools::iproduct;
use ndarray::{Array, ArrayView, AxisDescription, Dimension, Slice};
use num::Zero;

use crate::{Idx3d, SegError, SegResult};

mod stitch;

pub use stitch::compose;

/// 分块参数: 立方块边长, 重叠比例, 以及补零安全上限.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TileSpec {
    edge: usize,
    overlap: f64,
    max_pad_factor: f64,
}

impl TileSpec {
    /// 创建分块参数.
    ///
    /// - `edge` 必须为正;
    /// - `overlap` 必须在 `[0, 1)` 内;
    /// - `max_pad_factor` 必须是不小于 1 的有限值.
    ///
    /// 否则返回 `Err(SegError::InvalidConfig)`.
    pub fn new(edge: usize, overlap: f64, max_pad_factor: f64) -> SegResult<Self> {
        if edge == 0 {
            return Err(SegError::InvalidConfig("立方块边长必须为正".to_string()));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(SegError::InvalidConfig(format!(
                "重叠比例 {overlap} 不在 [0, 1) 内"
            )));
        }
        if !max_pad_factor.is_finite() || max_pad_factor < 1.0 {
            return Err(SegError::InvalidConfig(format!(
                "补零上限 {max_pad_factor} 必须是不小于 1 的有限值"
            )));
        }
        Ok(Self {
            edge,
            overlap,
            max_pad_factor,
        })
    }

    /// 立方块边长.
    #[inline]
    pub fn edge(&self) -> usize {
        self.edge
    }

    /// 重叠比例.
    #[inline]
    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    /// 最大补零倍数.
    #[inline]
    pub fn max_pad_factor(&self) -> f64 {
        self.max_pad_factor
    }

    /// 相邻锚点间距 `floor(edge * (1 - overlap))`, 至少为 1.
    #[inline]
    pub fn stride(&self) -> usize {
        ((self.edge as f64 * (1.0 - self.overlap)).floor() as usize).max(1)
    }

    /// 单个轴补零后的长度. 轴长不小于边长时不补零.
    pub fn padded_extent(&self, extent: usize) -> SegResult<usize> {
        if extent >= self.edge {
            return Ok(extent);
        }
        // extent == 0 时倍数为 inf, 同样拒绝.
        if self.edge as f64 / extent as f64 > self.max_pad_factor {
            return Err(SegError::PaddingTooLarge {
                extent,
                edge: self.edge,
                bound: self.max_pad_factor,
            });
        }
        Ok(self.edge)
    }

    /// 三维形状补零后的形状.
    pub fn padded_shape(&self, (z, h, w): Idx3d) -> SegResult<Idx3d> {
        Ok((
            self.padded_extent(z)?,
            self.padded_extent(h)?,
            self.padded_extent(w)?,
        ))
    }

    /// 单个轴上的锚点序列. `extent` 必须不小于边长 (即已补零).
    ///
    /// 从 0 开始以 `stride` 递增; 一旦锚点加边长越过轴长,
    /// 就将其钳制为 `extent - edge` 并停止.
    pub fn axis_anchors(&self, extent: usize) -> Vec<usize> {
        debug_assert!(extent >= self.edge);
        let stride = self.stride();
        let mut ans = Vec::with_capacity(extent / stride + 1);
        let mut anchor = 0usize;
        loop {
            if anchor + self.edge >= extent {
                ans.push(extent - self.edge);
                break ans;
            }
            ans.push(anchor);
            anchor += stride;
        }
    }

    /// 补零后形状 `padded` 上的全部锚点, 按字典序排列.
    pub fn anchors(&self, (z, h, w): Idx3d) -> Vec<Idx3d> {
        let (az, ah, aw) = (
            self.axis_anchors(z),
            self.axis_anchors(h),
            self.axis_anchors(w),
        );
        iproduct!(az, ah, aw).collect()
    }
}

/// 获取前三个轴为 `[from, from + len)`, 其余轴取全部的切片规则.
#[inline]
pub(crate) fn spatial_window(from: Idx3d, len: Idx3d) -> impl Fn(AxisDescription) -> Slice {
    move |desc: AxisDescription| {
        let (f, l) = match desc.axis.index() {
            0 => (from.0, len.0),
            1 => (from.1, len.1),
            2 => (from.2, len.2),
            _ => return Slice::from(..),
        };
        Slice::from(f..f + l)
    }
}

/// 获取数组前三个轴的形状. 调用方保证维数不小于 3.
#[inline]
pub(crate) fn spatial_shape(shape: &[usize]) -> Idx3d {
    (shape[0], shape[1], shape[2])
}

/// 一组按锚点字典序排列的 (锚点, 立方块) 对.
///
/// 立方块的前三个轴是空间轴, 长度均为 `spec.edge()`; 其余轴 (如通道) 原样保留.
#[derive(Clone, Debug)]
pub struct CubeSet<T, D: Dimension> {
    spec: TileSpec,
    shape: Idx3d,
    padded: Idx3d,
    anchors: Vec<Idx3d>,
    cubes: Vec<Array<T, D>>,
}

impl<T, D: Dimension> CubeSet<T, D> {
    /// 立方块个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.cubes.len()
    }

    /// 是否为空. 合法分块的结果永远非空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    /// 分块参数.
    #[inline]
    pub fn spec(&self) -> &TileSpec {
        &self.spec
    }

    /// 原体数据的空间形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 补零后的空间形状.
    #[inline]
    pub fn padded_shape(&self) -> Idx3d {
        self.padded
    }

    /// 锚点序列.
    #[inline]
    pub fn anchors(&self) -> &[Idx3d] {
        &self.anchors
    }

    /// 第 `index` 个立方块的视图. 越界时 panic.
    #[inline]
    pub fn cube(&self, index: usize) -> ArrayView<'_, T, D> {
        self.cubes[index].view()
    }

    /// 按分块顺序迭代 (锚点, 立方块视图).
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (Idx3d, ArrayView<'_, T, D>)> {
        self.anchors
            .iter()
            .copied()
            .zip(self.cubes.iter().map(|c| c.view()))
    }
}

/// 将体数据 `volume` 分解为一组完全覆盖它的重叠立方块.
///
/// `volume` 的前三个轴为空间轴, 其余轴 (例如通道) 随立方块一起切出.
/// 当某空间轴短于边长时, 先在该轴末端补零到边长 (受
/// `spec.max_pad_factor()` 约束).
///
/// # 返回值
///
/// - 维数小于 3 时返回 `Err(SegError::InvalidConfig)`;
/// - 补零倍数超限时返回 `Err(SegError::PaddingTooLarge)`;
/// - 否则返回按锚点字典序排列的 [`CubeSet`].
pub fn decompose<T, D>(volume: ArrayView<'_, T, D>, spec: &TileSpec) -> SegResult<CubeSet<T, D>>
where
    T: Clone + Zero,
    D: Dimension,
{
    if volume.ndim() < 3 {
        return Err(SegError::InvalidConfig(format!(
            "体数据至少需要三个空间轴, 实际为 {}",
            volume.ndim()
        )));
    }
    let shape = spatial_shape(volume.shape());
    let padded = spec.padded_shape(shape)?;

    let buffer = (padded != shape).then(|| {
        let mut dim = volume.raw_dim();
        (dim[0], dim[1], dim[2]) = padded;
        let mut buf = Array::from_elem(dim, T::zero());
        buf.slice_each_axis_mut(spatial_window((0, 0, 0), shape))
            .assign(&volume);
        buf
    });
    let source = match buffer.as_ref() {
        Some(b) => b.view(),
        None => volume.view(),
    };

    let e = spec.edge();
    let anchors = spec.anchors(padded);
    let cubes = anchors
        .iter()
        .map(|&a| source.slice_each_axis(spatial_window(a, (e, e, e))).to_owned())
        .collect();

    log::debug!(
        "decomposed {shape:?} (padded {padded:?}) into {} cubes, edge {e}, stride {}",
        anchors.len(),
        spec.stride()
    );
    Ok(CubeSet {
        spec: *spec,
        shape,
        padded,
        anchors,
        cubes,
    })
}

#[cfg(test)]
mod tests {
    use super::{decompose, TileSpec};
    use crate::{Idx3d, SegError};
    use ndarray::{Array3, Array4};

    fn spec(edge: usize, overlap: f64) -> TileSpec {
        TileSpec::new(edge, overlap, 4.0).unwrap()
    }

    /// 统计每个体素被覆盖的次数.
    fn coverage(padded: Idx3d, anchors: &[Idx3d], e: usize) -> Array3<u32> {
        let mut c = Array3::<u32>::zeros(padded);
        for &(z, h, w) in anchors {
            c.slice_mut(ndarray::s![z..z + e, h..h + e, w..w + e])
                .mapv_inplace(|v| v + 1);
        }
        c
    }

    #[test]
    fn test_cube_set_outlives_source() {
        let (unpadded, padded) = {
            let vol = Array3::from_shape_fn((5, 5, 5), |(z, _, _)| z as f32);
            let short = Array3::from_shape_fn((3, 5, 5), |(z, _, _)| z as f32 + 1.0);
            (
                decompose(vol.view(), &spec(4, 0.5)).unwrap(),
                decompose(short.view(), &spec(4, 0.5)).unwrap(),
            )
        };
        assert_eq!(unpadded.len(), 8);
        assert_eq!(unpadded.anchors()[1], (0, 0, 1));
        assert_eq!(unpadded.anchors()[7], (1, 1, 1));
        assert_eq!(unpadded.cube(0)[(1, 0, 0)], 1.0);
        assert_eq!(padded.padded_shape(), (4, 5, 5));
        assert_eq!(padded.cube(0)[(2, 0, 0)], 3.0);
        assert_eq!(padded.cube(0)[(3, 0, 0)], 0.0);
    }

    #[test]
    fn test_stride() {
        assert_eq!(spec(6, 0.5).stride(), 3);
        assert_eq!(spec(96, 0.0).stride(), 96);
        assert_eq!(spec(5, 0.3).stride(), 3);
        // 至少前进 1 步.
        assert_eq!(spec(4, 0.99).stride(), 1);
    }

    #[test]
    fn test_axis_anchors_clamped() {
        let s = spec(6, 0.5);
        assert_eq!(s.axis_anchors(10), vec![0, 3, 4]);
        assert_eq!(s.axis_anchors(6), vec![0]);
        assert_eq!(s.axis_anchors(9), vec![0, 3]);
        assert_eq!(s.axis_anchors(12), vec![0, 3, 6]);

        let s = spec(4, 0.0);
        assert_eq!(s.axis_anchors(10), vec![0, 4, 6]);
    }

    #[test]
    fn test_anchor_order_lexicographic() {
        let s = spec(2, 0.0);
        let anchors = s.anchors((4, 4, 2));
        assert_eq!(
            anchors,
            vec![(0, 0, 0), (0, 2, 0), (2, 0, 0), (2, 2, 0)]
        );
        assert!(anchors.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_full_coverage() {
        for &(edge, overlap) in &[(3, 0.0), (4, 0.25), (5, 0.5), (6, 0.5), (7, 0.9)] {
            let s = spec(edge, overlap);
            for shape in [(7, 8, 9), (13, 5, 11), (edge, edge, edge), (20, 17, 7)] {
                let padded = s.padded_shape(shape).unwrap();
                let anchors = s.anchors(padded);
                let c = coverage(padded, &anchors, edge);
                assert!(c.iter().all(|&v| v >= 1), "{edge} {overlap} {shape:?}");
                // 最后一个立方块不越界.
                assert!(anchors
                    .iter()
                    .all(|a| a.0 + edge <= padded.0 && a.1 + edge <= padded.1 && a.2 + edge <= padded.2));
            }
        }
    }

    #[test]
    fn test_decompose_cube_contents() {
        let vol = Array3::from_shape_fn((10, 10, 10), |(z, h, w)| (z * 100 + h * 10 + w) as u32);
        let cubes = decompose(vol.view(), &spec(6, 0.5)).unwrap();
        assert_eq!(cubes.len(), 27);
        assert_eq!(cubes.padded_shape(), (10, 10, 10));
        for (anchor, cube) in cubes.iter() {
            assert_eq!(cube.dim(), (6, 6, 6));
            assert_eq!(cube[(0, 0, 0)], vol[anchor]);
            assert_eq!(cube[(5, 5, 5)], vol[(anchor.0 + 5, anchor.1 + 5, anchor.2 + 5)]);
        }
    }

    #[test]
    fn test_decompose_keeps_channels() {
        let vol = Array4::from_shape_fn((8, 8, 8, 3), |(_, _, _, c)| c as f32);
        let cubes = decompose(vol.view(), &spec(4, 0.5)).unwrap();
        assert_eq!(cubes.len(), 27);
        for (_, cube) in cubes.iter() {
            assert_eq!(cube.dim(), (4, 4, 4, 3));
            assert_eq!(cube[(1, 2, 3, 2)], 2.0);
        }
    }

    #[test]
    fn test_decompose_pads_short_axis() {
        let vol = Array3::<f32>::ones((3, 8, 8));
        let cubes = decompose(vol.view(), &spec(4, 0.5)).unwrap();
        assert_eq!(cubes.shape(), (3, 8, 8));
        assert_eq!(cubes.padded_shape(), (4, 8, 8));
        let (_, first) = cubes.iter().next().unwrap();
        assert_eq!(first[(2, 0, 0)], 1.0);
        assert_eq!(first[(3, 0, 0)], 0.0);
    }

    #[test]
    fn test_decompose_rejects_tiny_axis() {
        let vol = Array3::<f32>::ones((1, 8, 8));
        let err = decompose(vol.view(), &spec(8, 0.5)).unwrap_err();
        assert!(matches!(err, SegError::PaddingTooLarge { extent: 1, edge: 8, .. }));

        let vol = Array3::<f32>::ones((0, 8, 8));
        assert!(decompose(vol.view(), &spec(8, 0.5)).is_err());
    }
}
