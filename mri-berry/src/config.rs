//! 级联分割运行配置.

use crate::consts::*;
use crate::tiling::TileSpec;
use crate::{SegError, SegResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一次运行中所有阶段共享的配置.
///
/// 分块器与拼接器都从同一个 [`TileSpec`] 出发, 而 [`TileSpec`]
/// 只能经由 [`Self::tile_spec`] 从该结构获得.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CascadeConfig {
    /// 立方块边长 (体素).
    pub cube_edge: usize,

    /// 相邻立方块沿每个轴的重叠比例, 取值 `[0, 1)`.
    pub overlap: f64,

    /// 每个阶段输出的类别数 (含背景).
    pub num_classes: usize,

    /// 参考通道中严格大于该值的体素视为前景.
    pub background_threshold: f32,

    /// 轴长小于边长时允许的最大补零倍数 (`edge / extent`).
    pub max_pad_factor: f64,

    /// 是否保留每个立方块每个阶段的概率图.
    pub keep_probability: bool,

    /// 是否并行预测立方块. 仅在 `rayon` feature 打开时生效.
    pub parallel: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            cube_edge: DEFAULT_CUBE_EDGE,
            overlap: DEFAULT_OVERLAP,
            num_classes: DEFAULT_NUM_CLASSES,
            background_threshold: 0.0,
            max_pad_factor: DEFAULT_MAX_PAD_FACTOR,
            keep_probability: false,
            parallel: true,
        }
    }
}

impl CascadeConfig {
    /// 以给定边长和重叠比例创建配置, 其余字段取默认值.
    pub fn with_tiling(cube_edge: usize, overlap: f64) -> Self {
        Self {
            cube_edge,
            overlap,
            ..Self::default()
        }
    }

    /// 检查配置是否合法.
    pub fn validate(&self) -> SegResult<()> {
        if !(2..=u8::MAX as usize + 1).contains(&self.num_classes) {
            return Err(SegError::InvalidConfig(format!(
                "num_classes = {}",
                self.num_classes
            )));
        }
        if !self.background_threshold.is_finite() {
            return Err(SegError::InvalidConfig(
                "background_threshold 必须是有限值".to_string(),
            ));
        }
        self.tile_spec().map(|_| ())
    }

    /// 获取分块参数.
    #[inline]
    pub fn tile_spec(&self) -> SegResult<TileSpec> {
        TileSpec::new(self.cube_edge, self.overlap, self.max_pad_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::CascadeConfig;

    #[test]
    fn test_default_is_valid() {
        assert!(CascadeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut c = CascadeConfig::with_tiling(0, 0.5);
        assert!(c.validate().is_err());

        c.cube_edge = 8;
        c.overlap = 1.0;
        assert!(c.validate().is_err());
        c.overlap = -0.1;
        assert!(c.validate().is_err());
        c.overlap = 0.25;
        assert!(c.validate().is_ok());

        c.num_classes = 1;
        assert!(c.validate().is_err());
        c.num_classes = 2;

        c.max_pad_factor = 0.5;
        assert!(c.validate().is_err());
        c.max_pad_factor = f64::NAN;
        assert!(c.validate().is_err());
    }
}
