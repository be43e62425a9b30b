//! 消融实验依赖的通用组件.

use mri_berry::prelude::*;
use std::env;
use std::path::PathBuf;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 读取一个可解析的环境变量. 未设置或无法解析时返回 `None`.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let v = env::var(key).ok()?;
    match v.trim().parse() {
        Ok(t) => Some(t),
        Err(_) => {
            log::warn!("ignoring ${key} = {v:?}");
            None
        }
    }
}

/// 从环境变量覆盖默认运行配置.
///
/// - `$MRI_BERRY_CUBE_EDGE`: 立方块边长;
/// - `$MRI_BERRY_OVERLAP`: 重叠比例;
/// - `$MRI_BERRY_SERIAL`: 非空时关闭并行.
pub fn config_from_env() -> CascadeConfig {
    let mut cfg = CascadeConfig::default();
    if let Some(edge) = env_parse("MRI_BERRY_CUBE_EDGE") {
        cfg.cube_edge = edge;
    }
    if let Some(overlap) = env_parse("MRI_BERRY_OVERLAP") {
        cfg.overlap = overlap;
    }
    if env::var_os("MRI_BERRY_SERIAL").is_some_and(|v| !v.is_empty()) {
        cfg.parallel = false;
    }
    cfg
}

/// 合并标签的输出目录. 仅在 `$MRI_BERRY_SAVE_DIR` 非空时返回.
pub fn save_dir_from_env() -> Option<PathBuf> {
    env::var_os("MRI_BERRY_SAVE_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// 获取需要折叠增强肿瘤标签的低级别病例表.
///
/// 1. 若环境变量 `$MRI_BERRY_LGG_LIST` 非空, 则按逗号分隔解析;
/// 2. 否则, 返回 BraTS 2019 验证集中已知的低级别病例.
pub fn lgg_list_from_env() -> LowGradeList {
    match env::var("MRI_BERRY_LGG_LIST") {
        Ok(list) if !list.trim().is_empty() => LowGradeList::parse(&list),
        _ => LowGradeList::brats19(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sep_to() {
        let mut buf = Vec::new();
        sep_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SEP.len() + 1);
        assert!(cpus() >= 1);
    }
}
