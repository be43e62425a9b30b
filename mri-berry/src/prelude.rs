//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;
pub use crate::{SegError, SegResult};

pub use crate::data::{BoundingBox, MriLabel, MriVolume, NiftiHeaderAttr};

pub use crate::config::CascadeConfig;
pub use crate::tiling::{compose, decompose, CubeSet, TileSpec};

pub use crate::cascade::{
    CascadeContext, CascadeOrchestrator, PredictError, Serialized, Stage, StageInput, StageOutput,
    StagePredictor, StagePredictorMut,
};

pub use crate::remap::{CaseOverride, LowGradeList, NoOverride};

pub use crate::eval::{dice, sensitivity, MetricAccumulator};

pub use crate::post_proc::{Identity, KeepLargestComponent, PostProcess};

pub use crate::pipeline::{
    BatchReport, Case, CaseOutcome, CascadePipeline, EvalSink, GroundTruth, LogSink, Region,
};

pub use crate::consts::brats::{BACKGROUND, EDEMA, ENHANCING, NECROTIC};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{self, brats_loader, CaseLayout};
