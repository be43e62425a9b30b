//! 分割结果持久化.

use std::fs::File;
use std::path::Path;

use ndarray::ArrayView3;
use ndarray_npy::NpzWriter;
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;

use crate::SegResult;

/// 将 \[z, h, w\] 格式的多类别标签体 `label` 保存为 nii (或 nii.gz) 文件.
///
/// 写出的文件沿用 `reference` 的空间变换 (affine 与朝向), 通常取自同一病例的
/// 任一模态. 数据按 nifti 惯例转回 \[w, h, z\] 后写出.
pub fn save_label<P: AsRef<Path>>(
    path: P,
    label: ArrayView3<'_, u8>,
    reference: &NiftiHeader,
) -> SegResult<()> {
    let path = path.as_ref();
    WriterOptions::new(path)
        .reference_header(reference)
        .write_nifti(&label.permuted_axes([2, 1, 0]))?;
    log::info!("label volume {:?} saved to {}", label.dim(), path.display());
    Ok(())
}

/// 将若干具名标签体依次写入一个 npz 压缩包. 已存在的同名文件会被覆盖.
pub fn save_npz<'a, P, I>(path: P, entries: I) -> SegResult<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (&'a str, ArrayView3<'a, u8>)>,
{
    let mut npz = NpzWriter::new(File::create(path.as_ref())?);
    for (name, data) in entries {
        npz.add_array(name, &data)?;
    }
    npz.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{save_label, save_npz};
    use crate::data::{fake_header, MriLabel, NiftiHeaderAttr};
    use ndarray::{s, Array3, Ix3, OwnedRepr};
    use ndarray_npy::NpzReader;
    use std::fs::{self, File};

    #[test]
    fn test_save_npz() {
        let wt = Array3::from_shape_fn((3, 4, 5), |(z, h, w)| ((z + h + w) % 2) as u8);
        let tc = Array3::<u8>::zeros((3, 4, 5));

        let path = std::env::temp_dir().join(format!("mri-berry-npz-{}.npz", std::process::id()));
        save_npz(&path, [("wt", wt.view()), ("tc", tc.view())]).unwrap();

        let mut reader = NpzReader::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.len(), 2);
        let back: ndarray::ArrayBase<OwnedRepr<u8>, Ix3> = reader.by_index(0).unwrap();
        assert_eq!(back, wt);
        let back: ndarray::ArrayBase<OwnedRepr<u8>, Ix3> = reader.by_index(1).unwrap();
        assert_eq!(back, tc);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_label_keeps_reference() {
        let mut label = Array3::<u8>::zeros((3, 4, 5));
        label.slice_mut(s![1.., .., 2..]).fill(2);
        label.slice_mut(s![2.., 1..3, 3..]).fill(1);
        label[(2, 3, 4)] = 4;

        let mut reference = fake_header((3, 4, 5), [0.9, 0.9, 2.5]).unwrap();
        reference.sform_code = 1;
        reference.srow_x = [-0.9, 0.0, 0.0, 90.0];
        reference.srow_y = [0.0, 0.9, 0.0, -126.0];
        reference.srow_z = [0.0, 0.0, 2.5, -72.0];

        let path = std::env::temp_dir().join(format!("mri-berry-label-{}.nii", std::process::id()));
        save_label(&path, label.view(), &reference).unwrap();

        let back = MriLabel::open(&path).unwrap();
        assert_eq!(back.shape(), (3, 4, 5));
        assert_eq!(back.data(), label.view());
        assert_eq!(back.count(4), 1);
        let h = back.header();
        assert_eq!(h.sform_code, 1);
        assert_eq!(h.srow_x, reference.srow_x);
        assert_eq!(h.srow_y, reference.srow_y);
        assert_eq!(h.srow_z, reference.srow_z);
        assert_eq!(h.pixdim[1..4], reference.pixdim[1..4]);

        fs::remove_file(&path).unwrap();
    }
}
