use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::brats::*;
use crate::{Idx3d, SegError, SegResult};

pub mod region;
pub mod save;

pub use region::{crop, extract_region, restore, BoundingBox};
pub use save::{save_label, save_npz};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 将 nifti 惯用的 \[w, h, z\] 数据转换为标准布局的 \[z, h, w\] 数据.
#[inline]
fn to_zhw<T: Clone>(data: Array3<T>) -> Array3<T> {
    let data = data.permuted_axes([2, 1, 0]);
    if data.is_standard_layout() {
        data
    } else {
        data.as_standard_layout().to_owned()
    }
}

/// 为手动拼接的数据构造 header. 仅写入形状和体素分辨率.
///
/// 任一轴长超过 `u16::MAX` 时返回 `Err(SegError::ShapeTooLarge)`.
fn fake_header(shape: Idx3d, pix_dim: [f32; 3]) -> SegResult<BoxedHeader> {
    let dim = |n: usize| u16::try_from(n).map_err(|_| SegError::ShapeTooLarge(shape));
    let (z, h, w) = shape;
    let mut header = Box::<NiftiHeader>::default();
    header.dim = [3, dim(w)?, dim(h)?, dim(z)?, 1, 1, 1, 1];
    let [_, pw, ph, pz, ..] = &mut header.pixdim;
    let [w, h, z] = pix_dim;
    (*pw, *ph, *pz) = (w, h, z);
    header.intent_name[..4].copy_from_slice(b"fake");
    Ok(header)
}

/// 3D MRI nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高, 宽.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    #[inline]
    fn is_faked(&self) -> bool {
        self.header().intent_name.starts_with(b"fake")
    }
}

/// nii 格式单模态 3D MRI 扫描, 包括 header 和体素强度. 强度以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct MriVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for MriVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MriVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for MriVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl MriVolume {
    /// 打开 nii (或 nii.gz) 文件格式的 3D MRI 扫描. `path` 为文件的本地路径.
    pub fn open<P: AsRef<Path>>(path: P) -> SegResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .into_dimensionality::<Ix3>()?;

        Ok(Self {
            header,
            data: to_zhw(data),
        })
    }

    /// 根据 \[z, h, w\] 格式的裸数据直接创建实体. 体素分辨率为各向同性的 1mm.
    ///
    /// 该方法创建的实体没有真实的空间变换信息, 因此你应仅将其用于实验目的.
    ///
    /// 任一轴长超过 `u16::MAX` 时返回 `Err(SegError::ShapeTooLarge)`.
    pub fn fake(data: Array3<f32>) -> SegResult<Self> {
        let header = fake_header(data.dim(), [1.0; 3])?;
        Ok(Self { header, data })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 消费自我, 获得底层数据.
    #[inline]
    pub fn into_data(self) -> Array3<f32> {
        self.data
    }
}

/// nii 格式 3D MRI 标注, 包括 header 和真值标签. 标签值以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct MriLabel {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl NiftiHeaderAttr for MriLabel {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MriLabel {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for MriLabel {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl MriLabel {
    /// 打开 nii (或 nii.gz) 文件格式的 3D MRI 标注. `path` 为文件的本地路径.
    pub fn open<P: AsRef<Path>>(path: P) -> SegResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        let data = obj
            .into_volume()
            .into_ndarray::<u8>()?
            .into_dimensionality::<Ix3>()?;

        Ok(Self {
            header,
            data: to_zhw(data),
        })
    }

    /// 根据 \[z, h, w\] 格式的裸标签数据直接创建实体.
    ///
    /// 该方法创建的实体没有真实的空间变换信息, 因此你应仅将其用于实验目的.
    ///
    /// 任一轴长超过 `u16::MAX` 时返回 `Err(SegError::ShapeTooLarge)`.
    pub fn fake(data: Array3<u8>) -> SegResult<Self> {
        let header = fake_header(data.dim(), [1.0; 3])?;
        Ok(Self { header, data })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }

    /// 获取 3D 标注中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 获取 BraTS 标签的基本统计信息.
    ///
    /// 统计信息格式为: \[背景, 坏死核心, 水肿, 增强肿瘤\] 的体素数.
    /// 该操作不会统计任何其他像素信息.
    pub fn numeric_statistics(&self) -> [usize; 4] {
        let mut ans = [0; 4];
        for &p in self.data.iter() {
            match p {
                BACKGROUND => ans[0] += 1,
                NECROTIC => ans[1] += 1,
                EDEMA => ans[2] += 1,
                ENHANCING => ans[3] += 1,
                _ => {}
            }
        }
        ans
    }

    /// 将 3D 标注中值为 `old` 的体素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn replace(&mut self, old: u8, new: u8) -> usize {
        let mut cnt = 0usize;
        self.data
            .iter_mut()
            .filter(|pix| **pix == old)
            .for_each(|p| {
                cnt += 1;
                *p = new;
            });
        cnt
    }

    /// 按谓词 `pred` 生成 0/1 二值掩码.
    #[inline]
    pub fn mask(&self, pred: fn(u8) -> bool) -> Array3<u8> {
        self.data.mapv(|p| pred(p) as u8)
    }

    /// 全肿瘤 (WT = {1, 2, 4}) 掩码.
    #[inline]
    pub fn whole_tumor(&self) -> Array3<u8> {
        self.mask(is_whole_tumor)
    }

    /// 肿瘤核心 (TC = {1, 4}) 掩码.
    #[inline]
    pub fn tumor_core(&self) -> Array3<u8> {
        self.mask(is_tumor_core)
    }

    /// 坏死核心 (NET = {1}) 掩码.
    #[inline]
    pub fn necrotic(&self) -> Array3<u8> {
        self.mask(is_necrotic)
    }
}
