//! 通用常量.

/// BraTS 标签值.
pub mod brats {
    /// 背景.
    pub const BACKGROUND: u8 = 0;

    /// 坏死 / 非增强肿瘤核心 (NCR/NET).
    pub const NECROTIC: u8 = 1;

    /// 瘤周水肿 (ED).
    pub const EDEMA: u8 = 2;

    /// 增强肿瘤 (ET).
    pub const ENHANCING: u8 = 4;

    /// 像素是否属于全肿瘤 (WT)?
    #[inline]
    pub const fn is_whole_tumor(p: u8) -> bool {
        matches!(p, NECROTIC | EDEMA | ENHANCING)
    }

    /// 像素是否属于肿瘤核心 (TC)?
    #[inline]
    pub const fn is_tumor_core(p: u8) -> bool {
        matches!(p, NECROTIC | ENHANCING)
    }

    /// 像素是否属于坏死核心 (NET)?
    #[inline]
    pub const fn is_necrotic(p: u8) -> bool {
        matches!(p, NECROTIC)
    }
}

/// 单阶段二值掩码的取值.
pub mod mask {
    /// 背景.
    pub const OFF: u8 = 0;

    /// 前景.
    pub const ON: u8 = 1;
}

/// 默认立方块边长.
pub const DEFAULT_CUBE_EDGE: usize = 96;

/// 默认重叠比例.
pub const DEFAULT_OVERLAP: f64 = 0.5;

/// 默认类别数 (背景 + 前景).
pub const DEFAULT_NUM_CLASSES: usize = 2;

/// 默认最大补零倍数.
pub const DEFAULT_MAX_PAD_FACTOR: f64 = 4.0;

/// 级联阶段数.
pub const STAGES: usize = 3;

/// 每预测多少个立方块输出一次进度日志.
pub(crate) const PROGRESS_EVERY: usize = 20;
