//! 程序运行函数.

use crate::predictor::baseline_context;
use crate::result::AblationResult;
use mri_berry::prelude::*;
use std::time::Instant;
use utils::loader;

/// 参与比较的重叠比例.
pub const OVERLAPS: [f64; 4] = [0.0, 0.25, 0.5, 0.75];

/// 实际运行.
pub fn run() -> SegResult<AblationResult> {
    let base = utils::config_from_env();
    log::info!(
        "Running overlap ablation: edge {}, {} cpus",
        base.cube_edge,
        utils::cpus()
    );

    let mut result = AblationResult::with_capacity(OVERLAPS.len());
    for overlap in OVERLAPS {
        let config = CascadeConfig {
            overlap,
            ..base.clone()
        };
        let mut pipeline =
            CascadePipeline::new(config, baseline_context())?.with_override(utils::lgg_list_from_env());
        if let Some(dir) = utils::save_dir_from_env() {
            pipeline = pipeline.with_output_dir(dir.join(format!("overlap-{overlap}")));
        }
        let cases = loader::loader_from_env_or_home(CaseLayout::default())?;
        log::info!("overlap {overlap}: {} cases", cases.len());

        let start = Instant::now();
        let report = pipeline.evaluate(cases, &mut LogSink)?;
        result.push(overlap, report, start.elapsed());
    }
    Ok(result)
}
