//! 立方块标签拼接.

use ndarray::{s, Array3, Array4, ArrayView3, ArrayView4, Axis, Zip};

use super::TileSpec;
use crate::{Idx3d, SegError, SegResult};

/// 将按分块顺序排列的立方块标签 `cubes` 拼接回形状为 `target_shape` 的完整标签体.
///
/// 锚点不随立方块传入, 而是由 `spec` 和 `target_shape` 重新推算, 因此 `spec`
/// 必须与分块时使用的完全一致.
///
/// 只被一个立方块覆盖的体素直接取该立方块的标签. 被多个立方块覆盖的体素取多数票;
/// 票数相同时, 取分块顺序中最后一次投出的那个标签.
///
/// # 返回值
///
/// - 立方块个数与锚点个数不一致时返回 `Err(SegError::CubeCountMismatch)`;
/// - 立方块形状不是 `edge^3` 时返回 `Err(SegError::CubeShapeMismatch)`;
/// - 标签值不小于 `num_classes` 时返回 `Err(SegError::LabelOutOfRange)`;
/// - 存在未被覆盖的体素时返回 `Err(SegError::TileCoverageViolation)`;
/// - 否则返回形状恰为 `target_shape` 的标签体.
pub fn compose<'a, I>(
    cubes: I,
    target_shape: Idx3d,
    spec: &TileSpec,
    num_classes: usize,
) -> SegResult<Array3<u8>>
where
    I: IntoIterator<Item = ArrayView3<'a, u8>>,
{
    let padded = spec.padded_shape(target_shape)?;
    let anchors = spec.anchors(padded);
    let e = spec.edge();
    let (pz, ph, pw) = padded;

    // 每个体素上每个类别的票数, 以及该类别最后一次得票的立方块序号 (从 1 开始).
    let mut votes = Array4::<u32>::zeros((pz, ph, pw, num_classes));
    let mut latest = Array4::<u32>::zeros((pz, ph, pw, num_classes));

    let mut found = 0usize;
    for (index, cube) in cubes.into_iter().enumerate() {
        found += 1;
        let Some(&(z, h, w)) = anchors.get(index) else {
            continue;
        };
        if cube.dim() != (e, e, e) {
            return Err(SegError::CubeShapeMismatch {
                index,
                found: cube.dim(),
                edge: e,
            });
        }
        if let Some(&label) = cube.iter().find(|&&l| l as usize >= num_classes) {
            return Err(SegError::LabelOutOfRange { label, num_classes });
        }

        let order = index as u32 + 1;
        Zip::from(votes.slice_mut(s![z..z + e, h..h + e, w..w + e, ..]).lanes_mut(Axis(3)))
            .and(latest.slice_mut(s![z..z + e, h..h + e, w..w + e, ..]).lanes_mut(Axis(3)))
            .and(&cube)
            .for_each(|mut v, mut l, &label| {
                v[label as usize] += 1;
                l[label as usize] = order;
            });
    }
    if found != anchors.len() {
        return Err(SegError::CubeCountMismatch {
            expected: anchors.len(),
            found,
        });
    }

    let ans = resolve(votes.view(), latest.view())?;
    if padded == target_shape {
        Ok(ans)
    } else {
        let (tz, th, tw) = target_shape;
        Ok(ans.slice(s![..tz, ..th, ..tw]).to_owned())
    }
}

/// 由每个体素每个类别的票数与最后得票序号决出标签.
///
/// 没有任何票的体素返回 `Err(SegError::TileCoverageViolation)`.
fn resolve(votes: ArrayView4<'_, u32>, latest: ArrayView4<'_, u32>) -> SegResult<Array3<u8>> {
    let (pz, ph, pw, num_classes) = votes.dim();
    let mut uncovered: Option<Idx3d> = None;
    let mut ans = Array3::<u8>::zeros((pz, ph, pw));
    Zip::indexed(&mut ans)
        .and(votes.lanes(Axis(3)))
        .and(latest.lanes(Axis(3)))
        .for_each(|pos, out, v, l| {
            // 有票的类别其最后得票序号两两不同, 因此 `(票数, 序号)` 的最大值唯一.
            let best = (0..num_classes).max_by_key(|&c| (v[c], l[c])).unwrap_or(0);
            if v[best] == 0 {
                uncovered.get_or_insert(pos);
            }
            *out = best as u8;
        });
    match uncovered {
        Some(voxel) => Err(SegError::TileCoverageViolation { voxel }),
        None => Ok(ans),
    }
}
