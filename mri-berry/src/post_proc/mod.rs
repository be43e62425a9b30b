//! 二值掩码后处理.
//!
//! 在拼接得到的 WT 和 TC 掩码上清除零散的小连通块.
//! 连通性按 6-相邻 (共面) 定义.

use std::collections::VecDeque;

use ndarray::Array3;

use crate::consts::mask::{OFF, ON};
use crate::Idx3d;

/// 可插拔的掩码后处理步骤.
pub trait PostProcess: Send + Sync {
    /// 就地处理 0/1 掩码.
    fn apply(&self, mask: &mut Array3<u8>);
}

/// 什么也不做.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl PostProcess for Identity {
    #[inline]
    fn apply(&self, _: &mut Array3<u8>) {}
}

/// 只保留体素数最多的前景连通块.
#[derive(Copy, Clone, Debug, Default)]
pub struct KeepLargestComponent;

impl PostProcess for KeepLargestComponent {
    fn apply(&self, mask: &mut Array3<u8>) {
        let (labels, sizes) = components(mask);
        let Some(largest) = argmax(&sizes) else {
            return;
        };
        clear_except(mask, &labels, |id| id == largest);
    }
}

/// 清除体素数小于最大连通块 `ratio` 倍的前景连通块.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RemoveMinorComponents {
    /// 相对最大连通块的保留比例, 取值 `[0, 1]`.
    pub ratio: f64,
}

impl Default for RemoveMinorComponents {
    fn default() -> Self {
        Self { ratio: 0.3 }
    }
}

impl PostProcess for RemoveMinorComponents {
    fn apply(&self, mask: &mut Array3<u8>) {
        let (labels, sizes) = components(mask);
        let Some(largest) = argmax(&sizes) else {
            return;
        };
        let bound = sizes[largest] as f64 * self.ratio;
        clear_except(mask, &labels, |id| sizes[id] as f64 >= bound);
    }
}

/// 体素 `pos` 的 6-相邻体素 (不越界的部分).
fn neighbour6((z, h, w): Idx3d, (dz, dh, dw): Idx3d) -> impl Iterator<Item = Idx3d> {
    [
        z.checked_sub(1).map(|z| (z, h, w)),
        (z + 1 < dz).then_some((z + 1, h, w)),
        h.checked_sub(1).map(|h| (z, h, w)),
        (h + 1 < dh).then_some((z, h + 1, w)),
        w.checked_sub(1).map(|w| (z, h, w)),
        (w + 1 < dw).then_some((z, h, w + 1)),
    ]
    .into_iter()
    .flatten()
}

/// 标记所有前景连通块.
///
/// 返回每个体素所属连通块编号 (背景为 0, 连通块从 1 开始) 以及每个编号的体素数
/// (`sizes[0]` 恒为 0).
fn components(mask: &Array3<u8>) -> (Array3<u32>, Vec<usize>) {
    let dim = mask.dim();
    let mut labels = Array3::<u32>::zeros(dim);
    let mut sizes = vec![0usize];
    let mut bfs_q = VecDeque::new();

    for (pos, &p) in mask.indexed_iter() {
        if p != ON || labels[pos] != 0 {
            continue;
        }
        let id = sizes.len() as u32;
        let mut size = 0usize;
        labels[pos] = id;
        bfs_q.push_back(pos);
        while let Some(cur) = bfs_q.pop_front() {
            size += 1;
            for next in neighbour6(cur, dim) {
                if mask[next] == ON && labels[next] == 0 {
                    labels[next] = id;
                    bfs_q.push_back(next);
                }
            }
        }
        sizes.push(size);
    }
    (labels, sizes)
}

/// 体素数最多的连通块编号. 没有前景时返回 `None`.
#[inline]
fn argmax(sizes: &[usize]) -> Option<usize> {
    sizes
        .iter()
        .enumerate()
        .skip(1)
        .max_by_key(|&(id, &s)| (s, std::cmp::Reverse(id)))
        .map(|(id, _)| id)
}

/// 清除所有不满足 `keep` 的连通块.
fn clear_except<F: Fn(usize) -> bool>(mask: &mut Array3<u8>, labels: &Array3<u32>, keep: F) {
    ndarray::Zip::from(mask).and(labels).for_each(|m, &id| {
        if id != 0 && !keep(id as usize) {
            *m = OFF;
        }
    });
}
