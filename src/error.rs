use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image folder error: {0}")]
    ImageFolder(#[from] burn::data::dataset::vision::ImageLoaderError),

    #[error(
        "{path:?} is annotated {annotation}, which is not its directory's class; every class directory needs an image"
    )]
    LabelMismatch { path: PathBuf, annotation: String },

    #[error("config error: {0}")]
    Config(#[from] burn::config::ConfigError),

    #[error("record error: {0}")]
    Record(#[from] burn::record::RecorderError),

    #[error("invalid arguments: {0}")]
    Args(#[from] pico_args::Error),

    #[error("unused arguments: {0:?}")]
    UnusedArguments(Vec<OsString>),

    #[error("no class directories or images found under {0:?}")]
    EmptyDataset(PathBuf),

    #[error("the model predicts {model} classes but the dataset has {dataset}")]
    ClassCountMismatch { model: usize, dataset: usize },

    #[error("invalid model config: {0}")]
    InvalidModel(String),

    #[error("shape mismatch in {layer}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        layer: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("no trained model at {0:?}; run with --training first")]
    MissingModel(PathBuf),

    #[error("tensor data error: {0}")]
    TensorData(String),
}
