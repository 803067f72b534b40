use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

#[cfg(feature = "f16")]
pub type Element = burn::tensor::f16;
#[cfg(not(feature = "f16"))]
pub type Element = f32;

#[cfg(feature = "cuda")]
pub type MainBackend = burn::backend::Cuda<Element, i32>;
#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type MainBackend = burn::backend::wgpu::Wgpu<Element, i32>;
#[cfg(all(
    any(feature = "tch-cpu", feature = "tch-gpu"),
    not(any(feature = "cuda", feature = "wgpu"))
))]
pub type MainBackend = burn::backend::libtorch::LibTorch<Element>;
#[cfg(not(any(
    feature = "cuda",
    feature = "wgpu",
    feature = "tch-cpu",
    feature = "tch-gpu"
)))]
pub type MainBackend = burn::backend::NdArray<Element, i32>;

pub type MainAutoBackend = burn::backend::Autodiff<MainBackend>;

/// Maps the `--gpu` flag to a device id: negative values select the cpu.
pub fn gpu_index(gpu: i32) -> Option<usize> {
    usize::try_from(gpu).ok()
}

/// Device selection for a backend, driven by the `--gpu` flag.
pub trait MainDevice: Backend {
    fn main_device(gpu: i32) -> <Self as Backend>::Device {
        if let Some(index) = gpu_index(gpu) {
            log::warn!("gpu {index} requested but this backend only runs on the cpu");
        }
        Default::default()
    }
}

#[cfg(not(any(
    feature = "cuda",
    feature = "wgpu",
    feature = "tch-cpu",
    feature = "tch-gpu"
)))]
impl MainDevice for MainBackend {}

#[cfg(all(
    feature = "tch-cpu",
    not(any(feature = "cuda", feature = "wgpu", feature = "tch-gpu"))
))]
impl MainDevice for MainBackend {}

#[cfg(all(
    feature = "tch-gpu",
    not(any(feature = "cuda", feature = "wgpu")),
    not(target_os = "macos")
))]
impl MainDevice for MainBackend {
    fn main_device(gpu: i32) -> <Self as Backend>::Device {
        match gpu_index(gpu) {
            Some(index) => burn::backend::libtorch::LibTorchDevice::Cuda(index),
            None => burn::backend::libtorch::LibTorchDevice::Cpu,
        }
    }
}
#[cfg(all(
    feature = "tch-gpu",
    not(any(feature = "cuda", feature = "wgpu")),
    target_os = "macos"
))]
impl MainDevice for MainBackend {
    fn main_device(gpu: i32) -> <Self as Backend>::Device {
        match gpu_index(gpu) {
            Some(_) => burn::backend::libtorch::LibTorchDevice::Mps,
            None => burn::backend::libtorch::LibTorchDevice::Cpu,
        }
    }
}

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
impl MainDevice for MainBackend {
    fn main_device(gpu: i32) -> <Self as Backend>::Device {
        match gpu_index(gpu) {
            Some(index) => burn::backend::wgpu::WgpuDevice::DiscreteGpu(index),
            None => burn::backend::wgpu::WgpuDevice::Cpu,
        }
    }
}

#[cfg(feature = "cuda")]
impl MainDevice for MainBackend {
    fn main_device(gpu: i32) -> <Self as Backend>::Device {
        let index = gpu_index(gpu).unwrap_or_else(|| {
            log::warn!("the cuda backend has no cpu device, using gpu 0");
            0
        });
        burn::backend::cuda::CudaDevice::new(index)
    }
}

impl MainDevice for MainAutoBackend {
    fn main_device(gpu: i32) -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device(gpu)
    }
}
