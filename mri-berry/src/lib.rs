#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供 BraTS 格式 3D 脑肿瘤 MRI 的三阶段级联分割编排与评估.
//!
//! 一个完整的 3D 扫描无法一次性交给预测器, 因此本 crate 负责: 提取前景区域,
//! 将其分解为重叠的立方块, 对每个立方块依次调用三个阶段的预测器,
//! 再把立方块标签拼接回完整体数据, 合并为多类别标签并与真值比较.
//!
//! 预测器本身 (神经网络的结构, 训练与权重) 不属于本 crate, 只以
//! [`cascade::StagePredictor`] 能力的形式注入.
//!
//! # 注意
//!
//! 1. 所有体数据均按 `(z, h, w)` 访问; 多通道数据的通道轴位于最后.
//! 2. 分块器和拼接器之间不传递任何位置信息, 两者必须由同一个
//!   [`tiling::TileSpec`] 驱动.
//! 3. 单个病例的失败不会中断批量评估; 只有分块器与拼接器参数不一致这类
//!   内部错误才会终止整个运行 (见 [`SegError::is_run_fatal`]).
//!
//! # 模块
//!
//! ### 前景区域提取与裁剪 ✅
//!
//! 实现位于 `mri-berry/src/data/region.rs`.
//!
//! ### 重叠分块与多数票拼接 ✅
//!
//! 实现位于 `mri-berry/src/tiling`.
//!
//! ### 三阶段级联编排, 可选 `rayon` 并行 ✅
//!
//! 实现位于 `mri-berry/src/cascade`.
//!
//! ### 层级标签重映射与 LGG 病例修正 ✅
//!
//! 实现位于 `mri-berry/src/remap.rs`.
//!
//! ### Dice / 敏感度及排除无定义样本的聚合 ✅
//!
//! 实现位于 `mri-berry/src/eval`.
//!
//! ### 连通块后处理 ✅
//!
//! 实现位于 `mri-berry/src/post_proc`.
//!
//! ### 病例级流程与批量评估 ✅
//!
//! 实现位于 `mri-berry/src/pipeline`.
//!
//! ### nii 读写与 BraTS 目录加载 ✅
//!
//! 实现位于 `mri-berry/src/data` 和 `mri-berry/src/dataset`.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D MRI nii 文件基础数据结构.
pub mod data;

pub use data::{MriLabel, MriVolume, NiftiHeaderAttr};

pub mod consts;

mod error;

pub use error::{SegError, SegResult};

pub mod config;

pub use config::CascadeConfig;

pub mod tiling;

pub mod cascade;

pub mod remap;

pub mod eval;

pub mod post_proc;

pub mod pipeline;

pub mod dataset;
pub mod prelude;
