//! 阶段预测器接口.
//!
//! 级联核心不关心预测器内部如何计算 (神经网络, 阈值, 测试桩皆可),
//! 只依赖这里的 `predict` 能力.

use std::error::Error;
use std::sync::Mutex;

use ndarray::{Array3, Array4, ArrayView3, ArrayView4};

/// 预测器自身的错误. 级联核心只读取它的文字描述.
pub type PredictError = Box<dyn Error + Send + Sync>;

/// 单个立方块在单个阶段的输入.
#[derive(Copy, Clone, Debug)]
pub enum StageInput<'a> {
    /// 第一阶段: 原始多模态立方块, 形状为 `(e, e, e, 模态数)`.
    Raw(ArrayView4<'a, f32>),

    /// 后续阶段: 上一阶段的概率图, 加上辅助通道 (通常为 T1ce) 立方块.
    Conditioned {
        /// 上一阶段输出的概率图, 形状为 `(e, e, e, 类别数)`.
        prob: ArrayView4<'a, f32>,
        /// 辅助通道立方块, 形状为 `(e, e, e)`.
        secondary: ArrayView3<'a, f32>,
    },
}

impl<'a> StageInput<'a> {
    /// 输入的空间形状.
    #[inline]
    pub fn spatial_dim(&self) -> (usize, usize, usize) {
        match self {
            Self::Raw(raw) => {
                let (z, h, w, _) = raw.dim();
                (z, h, w)
            }
            Self::Conditioned { secondary, .. } => secondary.dim(),
        }
    }
}

/// 单个立方块在单个阶段的输出.
#[derive(Clone, Debug)]
pub struct StageOutput {
    /// 每个体素每个类别的概率, 形状为 `(e, e, e, 类别数)`.
    pub prob: Array4<f32>,
    /// 每个体素的类别, 形状为 `(e, e, e)`.
    pub label: Array3<u8>,
}

/// 可被多个工作线程同时调用的阶段预测器.
pub trait StagePredictor: Send + Sync {
    /// 对一个立方块做预测. 失败时级联核心不会重试.
    fn predict(&self, input: StageInput<'_>) -> Result<StageOutput, PredictError>;
}

impl<F> StagePredictor for F
where
    F: Fn(StageInput<'_>) -> Result<StageOutput, PredictError> + Send + Sync,
{
    #[inline]
    fn predict(&self, input: StageInput<'_>) -> Result<StageOutput, PredictError> {
        self(input)
    }
}

/// 需要独占访问的阶段预测器, 例如内部持有可变会话状态的模型.
///
/// 用 [`Serialized`] 包装后即可当作 [`StagePredictor`] 使用.
pub trait StagePredictorMut: Send {
    /// 对一个立方块做预测.
    fn predict_mut(&mut self, input: StageInput<'_>) -> Result<StageOutput, PredictError>;
}

/// 在预测器边界上串行化调用.
///
/// 多个工作线程仍可并行分块和收集结果, 但同一时刻只有一个线程进入内部预测器.
#[derive(Debug, Default)]
pub struct Serialized<P> {
    inner: Mutex<P>,
}

impl<P> Serialized<P> {
    /// 包装预测器.
    #[inline]
    pub fn new(inner: P) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// 取回内部预测器. 锁已中毒时依然返回其内容.
    pub fn into_inner(self) -> P {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<P: StagePredictorMut> StagePredictor for Serialized<P> {
    fn predict(&self, input: StageInput<'_>) -> Result<StageOutput, PredictError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| PredictError::from("predictor mutex poisoned"))?;
        guard.predict_mut(input)
    }
}
