//! 对 `mri-berry::dataset` 的更一层封装. 提供更直接的数据集加载器.

use mri_berry::dataset::{self, CaseLayout, CaseLoader};
use mri_berry::SegResult;
use std::env;
use std::path::PathBuf;

/// 获取 BraTS 测试集基本路径.
///
/// 1. 若环境变量 `$BRATS_TEST_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/brats/test`.
///
/// 两者都无法确定时返回 `None`.
pub fn test_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("BRATS_TEST_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => dataset::home_dataset_dir_with(["brats", "test"]),
    }
}

/// 从 `$BRATS_TEST_DIR` 或者 `$HOME/dataset/brats/test` 下创建病例加载器.
pub fn loader_from_env_or_home(layout: CaseLayout) -> SegResult<CaseLoader> {
    let dir = test_dir_from_env_or_home().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "cannot locate home directory")
    })?;
    dataset::brats_loader(dir, layout)
}
