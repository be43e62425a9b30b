//! BraTS 目录结构数据加载器.
//!
//! 目录结构为 `<root>/<case_id>/<case_id>_<modality>.nii[.gz]`.
//! 提供迭代器风格的数据集获取模式.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{stack, Array3, Array4, Axis};

use crate::data::{MriLabel, MriVolume, NiftiHeaderAttr};
use crate::pipeline::{Case, GroundTruth};
use crate::{SegError, SegResult};

/// BraTS 模态.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Modality {
    /// FLAIR.
    Flair,
    /// T1.
    T1,
    /// 增强 T1.
    T1ce,
    /// T2.
    T2,
}

impl Modality {
    /// BraTS 的四种模态, 按常用通道顺序排列.
    pub const ALL: [Modality; 4] = [Modality::Flair, Modality::T1, Modality::T1ce, Modality::T2];

    /// 文件名后缀.
    #[inline]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Flair => "flair",
            Self::T1 => "t1",
            Self::T1ce => "t1ce",
            Self::T2 => "t2",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// 病例的通道组织方式.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseLayout {
    /// 第一阶段输入的模态, 按通道顺序.
    pub primary: Vec<Modality>,
    /// 辅助通道: 前景区域提取与后续阶段的条件输入.
    pub secondary: Modality,
    /// 是否加载 `seg` 真值 (不存在时视为无真值).
    pub with_truth: bool,
}

impl Default for CaseLayout {
    /// 四模态输入, T1ce 作为辅助通道, 加载真值.
    fn default() -> Self {
        Self {
            primary: Modality::ALL.to_vec(),
            secondary: Modality::T1ce,
            with_truth: true,
        }
    }
}

/// 查找 `<dir>/<id>_<suffix>.nii.gz` 或 `<dir>/<id>_<suffix>.nii`.
fn locate(dir: &Path, id: &str, suffix: &str) -> Option<PathBuf> {
    ["nii.gz", "nii"]
        .into_iter()
        .map(|ext| dir.join(format!("{id}_{suffix}.{ext}")))
        .find(|p| p.is_file())
}

/// 打开必需的模态文件.
fn open_modality(dir: &Path, id: &str, m: Modality) -> SegResult<MriVolume> {
    let path = locate(dir, id, m.suffix()).ok_or_else(|| {
        SegError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{id}: missing modality {m}"),
        ))
    })?;
    MriVolume::open(path)
}

/// 从病例目录 `dir` 加载一个病例.
///
/// 所有模态与真值必须与辅助通道形状一致, 否则返回
/// `Err(SegError::VolumeShapeMismatch)`.
pub fn load_case<P: AsRef<Path>>(dir: P, id: &str, layout: &CaseLayout) -> SegResult<Case> {
    let dir = dir.as_ref();
    let secondary = open_modality(dir, id, layout.secondary)?;
    let shape = secondary.shape();
    let reference = secondary.header().clone();

    let mut channels: Vec<Array3<f32>> = Vec::with_capacity(layout.primary.len());
    for &m in layout.primary.iter() {
        let data = if m == layout.secondary {
            secondary.data().to_owned()
        } else {
            let v = open_modality(dir, id, m)?;
            if v.shape() != shape {
                return Err(SegError::VolumeShapeMismatch {
                    expected: shape,
                    found: v.shape(),
                });
            }
            v.into_data()
        };
        channels.push(data);
    }
    let primary: Array4<f32> = if channels.is_empty() {
        secondary.data().to_owned().insert_axis(Axis(3))
    } else {
        let views: Vec<_> = channels.iter().map(|c| c.view()).collect();
        stack(Axis(3), &views)?
    };

    let mut case = Case::new(id, primary, secondary.into_data())?.with_reference(reference);
    if layout.with_truth {
        if let Some(path) = locate(dir, id, "seg") {
            let seg = MriLabel::open(path)?;
            case = case.with_truth(GroundTruth::from_brats(seg.data()))?;
        }
    }
    Ok(case)
}

/// 列出 `root` 下所有病例目录名, 按字典序排列.
pub fn case_ids<P: AsRef<Path>>(root: P) -> SegResult<Vec<String>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(root.as_ref())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// 从 `root` 创建 BraTS 病例加载器. 会按目录名字典序迭代全部病例.
///
/// `root` 不可读时返回 `Err`.
pub fn brats_loader<P: AsRef<Path>>(root: P, layout: CaseLayout) -> SegResult<CaseLoader> {
    let ids = case_ids(root.as_ref())?;
    Ok(case_loader(ids, root, layout))
}

/// 从指定病例标识和路径创建 BraTS 病例加载器.
///
/// 病例目录不存在时, 加载器在迭代时会返回 `Err`.
pub fn case_loader<I, S, P>(ids: I, root: P, layout: CaseLayout) -> CaseLoader
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    P: AsRef<Path>,
{
    let mut data_rev: Vec<String> = ids.into_iter().map(Into::into).collect();
    data_rev.reverse();
    CaseLoader {
        path: root.as_ref().to_owned(),
        data_rev,
        layout,
    }
}

/// BraTS 病例加载器.
#[derive(Debug)]
pub struct CaseLoader {
    path: PathBuf,
    data_rev: Vec<String>,
    layout: CaseLayout,
}

impl Iterator for CaseLoader {
    type Item = (String, SegResult<Case>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.data_rev.pop()?;

        self.path.push(&id);
        let data = load_case(self.path.as_path(), &id, &self.layout);
        self.path.pop();

        Some((id, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.data_rev.len(), Some(self.data_rev.len()))
    }
}

impl ExactSizeIterator for CaseLoader {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}
