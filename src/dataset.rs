use crate::error::{Error, Result};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::vision::{Annotation, ImageDatasetItem, ImageFolderDataset};
use burn::data::dataset::{Dataset, InMemDataset};
use burn::prelude::*;
use image::imageops::{self, FilterType};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const IMAGE_SIZE: usize = 32;
pub const CHANNELS: usize = 3;
pub const DEFAULT_ROOT: &str = "./animeface-character-dataset/thumb";

/// AnimeFace item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AnimeFaceItem {
    /// Image as a flat, channel-first array of floats.
    /// Each value is a brightness, in between 0.0 and 1.0.
    ///
    /// # Shape
    /// [CHANNELS * IMAGE_SIZE * IMAGE_SIZE]
    pub image: Vec<f32>,

    /// Index of the class directory the image was read from.
    pub label: usize,
}

/// Sorted class directory names. The position of a name is its class id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
    names: Vec<String>,
}

impl ClassTable {
    pub fn new(mut names: Vec<String>) -> Self {
        names.sort();
        names.dedup();
        Self { names }
    }

    /// Lists the class directories directly under `root`.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut names = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        if names.is_empty() {
            return Err(Error::EmptyDataset(root.to_path_buf()));
        }
        Ok(Self::new(names))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Class id of the innermost path component naming a class directory.
    pub fn class_id(&self, path: &Path) -> Option<usize> {
        path.components().rev().find_map(|component| {
            let component = component.as_os_str().to_str()?;
            self.names
                .binary_search_by(|name| name.as_str().cmp(component))
                .ok()
        })
    }
}

/// Reads an image, stretches it to `size x size` and lays it out channel-first in [0, 1].
///
/// `channels` is either 1 (luma) or 3 (rgb).
pub fn load_image(path: &Path, size: usize, channels: usize) -> Result<Vec<f32>> {
    let image = image::open(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let side =
        u32::try_from(size).map_err(|_| Error::InvalidModel(format!("image size {size}")))?;
    let raw = match channels {
        1 => imageops::resize(&image.to_luma8(), side, side, FilterType::Triangle).into_raw(),
        3 => imageops::resize(&image.to_rgb8(), side, side, FilterType::Triangle).into_raw(),
        _ => {
            return Err(Error::InvalidModel(format!(
                "unsupported channel count {channels}"
            )));
        }
    };
    debug_assert_eq!(raw.len(), size * size * channels);

    // HWC -> CHW
    let mut image = vec![0f32; raw.len()];
    for (i, pixel) in raw.into_iter().enumerate() {
        let c = i % channels;
        let hw = i / channels;
        image[c * size * size + hw] = pixel as f32 / 255.;
    }
    Ok(image)
}

/// Shuffles `items` with `seed` and moves the last `ceil(n * test_fraction)` of them to the test side.
pub fn split_train_test<T>(mut items: Vec<T>, test_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let n = items.len();
    let n_test = ((n as f64) * test_fraction.clamp(0., 1.)).ceil() as usize;
    let n_test = n_test.min(n);
    items.shuffle(&mut StdRng::seed_from_u64(seed));
    let test = items.split_off(n - n_test);
    (items, test)
}

/// Stretches a listed image to `size x size` and checks its label against `classes`.
///
/// The pixels are read again from the file, so every color type goes through the same conversion.
fn resize_item(
    item: &ImageDatasetItem,
    classes: &ClassTable,
    size: usize,
    channels: usize,
) -> Result<AnimeFaceItem> {
    let path = Path::new(&item.image_path);
    let label = match &item.annotation {
        Annotation::Label(label) if classes.class_id(path) == Some(*label) => *label,
        other => {
            return Err(Error::LabelMismatch {
                path: path.to_path_buf(),
                annotation: format!("{other:?}"),
            });
        }
    };
    let image = load_image(path, size, channels)?;
    Ok(AnimeFaceItem { image, label })
}

/// Images of the AnimeFace character dataset, one directory per character.
///
/// The whole dataset is decoded once and kept in memory.
pub struct AnimeFaceDataset {
    dataset: InMemDataset<AnimeFaceItem>,
}

impl Dataset<AnimeFaceItem> for AnimeFaceDataset {
    fn get(&self, index: usize) -> Option<AnimeFaceItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl AnimeFaceDataset {
    /// Reads every image under `root` resized to `image_size` with `channels` channels.
    pub fn load(
        root: &Path,
        classes: &ClassTable,
        image_size: usize,
        channels: usize,
    ) -> Result<Self> {
        let folder = ImageFolderDataset::new_classification(root)?;
        if folder.is_empty() {
            return Err(Error::EmptyDataset(root.to_path_buf()));
        }
        log::info!(
            "Loading {} images of {} classes from {root:?}",
            folder.len(),
            classes.len()
        );

        let items = folder
            .iter()
            .map(|item| resize_item(&item, classes, image_size, channels))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            dataset: InMemDataset::new(items),
        })
    }

    /// Consumes the dataset into (train, test) partitions.
    pub fn split(
        self,
        test_fraction: f64,
        seed: u64,
    ) -> (InMemDataset<AnimeFaceItem>, InMemDataset<AnimeFaceItem>) {
        let items: Vec<AnimeFaceItem> = self.dataset.iter().collect();
        let (train, test) = split_train_test(items, test_fraction, seed);
        (InMemDataset::new(train), InMemDataset::new(test))
    }
}

#[derive(Clone, Debug)]
pub struct AnimeFaceBatcher {
    pub image_size: usize,
    pub channels: usize,
}

impl Default for AnimeFaceBatcher {
    fn default() -> Self {
        Self {
            image_size: IMAGE_SIZE,
            channels: CHANNELS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnimeFaceBatch<B: Backend> {
    /// Brightness in [0, 1].
    ///
    /// # Shape
    /// [batch_size, channels, image_size, image_size]
    pub images: Tensor<B, 4>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl AnimeFaceBatcher {
    pub fn new(image_size: usize, channels: usize) -> Self {
        Self {
            image_size,
            channels,
        }
    }

    /// Stacks flat channel-first images into a `[n, channels, size, size]` tensor.
    pub fn images<B: Backend>(&self, images: Vec<Vec<f32>>, device: &B::Device) -> Tensor<B, 4> {
        let n = images.len();
        let flat: Vec<f32> = images.into_iter().flatten().collect();
        let data = TensorData::new(flat, [n, self.channels, self.image_size, self.image_size])
            .convert::<B::FloatElem>();
        Tensor::<B, 4>::from_data(data, device)
    }
}

impl<B: Backend> Batcher<B, AnimeFaceItem, AnimeFaceBatch<B>> for AnimeFaceBatcher {
    fn batch(&self, items: Vec<AnimeFaceItem>, device: &B::Device) -> AnimeFaceBatch<B> {
        let (items_image, items_label): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.image, item.label as i64))
            .unzip();
        let n = items_label.len();

        let images = self.images::<B>(items_image, device);
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(items_label, [n]).convert::<B::IntElem>(),
            device,
        );

        AnimeFaceBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MainBackend;
    use image::{Rgb, RgbImage};
    use temp_dir::TempDir;

    fn write_image(path: &Path, width: u32, height: u32, color: [u8; 3]) {
        RgbImage::from_pixel(width, height, Rgb(color))
            .save(path)
            .unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, color) in [
            ("002_hatsune_miku", [0, 200, 200]),
            ("001_kinomoto_sakura", [255, 0, 0]),
        ] {
            let class_dir = dir.path().join(name);
            fs::create_dir(&class_dir).unwrap();
            for i in 0..3 {
                write_image(&class_dir.join(format!("face_{i}.png")), 40, 20, color);
            }
            fs::write(class_dir.join("notes.txt"), "not an image").unwrap();
        }
        fs::write(dir.path().join("README"), "ignored").unwrap();
        dir
    }

    #[test]
    fn class_table_is_sorted_and_skips_files() {
        let dir = fixture();
        let classes = ClassTable::scan(dir.path()).unwrap();
        assert_eq!(classes.names(), ["001_kinomoto_sakura", "002_hatsune_miku"]);
        assert_eq!(classes.name(1), Some("002_hatsune_miku"));
        assert_eq!(classes.name(2), None);
    }

    #[test]
    fn class_id_from_path() {
        let classes = ClassTable::new(vec!["b".into(), "a".into(), "c".into()]);
        assert_eq!(
            classes.class_id(Path::new("/data/thumb/c/face_1.png")),
            Some(2)
        );
        assert_eq!(classes.class_id(Path::new("thumb/a/face_1.png")), Some(0));
        assert_eq!(classes.class_id(Path::new("/data/thumb/other/x.png")), None);
    }

    #[test]
    fn empty_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ClassTable::scan(dir.path()),
            Err(Error::EmptyDataset(_))
        ));
    }

    #[test]
    fn non_square_image_is_resized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.png");
        write_image(&path, 40, 20, [255, 0, 51]);

        let image = load_image(&path, IMAGE_SIZE, CHANNELS).unwrap();
        assert_eq!(image.len(), CHANNELS * IMAGE_SIZE * IMAGE_SIZE);
        assert!(image.iter().all(|v| (0.0..=1.0).contains(v)));
        // channel-first: the whole red plane comes first
        let plane = IMAGE_SIZE * IMAGE_SIZE;
        assert!(image[..plane].iter().all(|&v| v == 1.0));
        assert!(image[plane..2 * plane].iter().all(|&v| v == 0.0));
        assert!(image[2 * plane..].iter().all(|&v| (v - 0.2).abs() < 1e-6));

        let gray = load_image(&path, 8, 1).unwrap();
        assert_eq!(gray.len(), 8 * 8);
    }

    #[test]
    fn unreadable_image_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            load_image(&missing, IMAGE_SIZE, CHANNELS),
            Err(Error::Image { .. })
        ));
    }

    #[test]
    fn split_sizes_follow_the_test_fraction() {
        let items: Vec<usize> = (0..95).collect();
        let (train, test) = split_train_test(items.clone(), 0.1, 7);
        assert_eq!(train.len() + test.len(), 95);
        assert_eq!(test.len(), 10);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort();
        assert_eq!(all, items);

        let (train_again, test_again) = split_train_test(items, 0.1, 7);
        assert_eq!(train, train_again);
        assert_eq!(test, test_again);
    }

    #[test]
    fn split_of_a_tiny_set_keeps_everything() {
        let (train, test) = split_train_test(vec![1], 0.1, 0);
        assert_eq!(train.len() + test.len(), 1);
        let (train, test) = split_train_test(Vec::<u8>::new(), 0.1, 0);
        assert!(train.is_empty() && test.is_empty());
    }

    #[test]
    fn dataset_loads_labels_by_directory() {
        let dir = fixture();
        let classes = ClassTable::scan(dir.path()).unwrap();
        let dataset = AnimeFaceDataset::load(dir.path(), &classes, IMAGE_SIZE, CHANNELS).unwrap();
        assert_eq!(dataset.len(), 6);

        let labels: Vec<usize> = dataset.iter().map(|item| item.label).collect();
        assert_eq!(labels, [0, 0, 0, 1, 1, 1]);
        // red images belong to sakura (class 0)
        let first = dataset.get(0).unwrap();
        assert_eq!(first.image[0], 1.0);

        let (train, test) = dataset.split(0.1, 0);
        assert_eq!(train.len(), 5);
        assert_eq!(test.len(), 1);
    }

    #[test]
    fn class_directory_without_images_is_reported() {
        let dir = fixture();
        fs::create_dir(dir.path().join("000_nobody")).unwrap();
        let classes = ClassTable::scan(dir.path()).unwrap();
        assert_eq!(classes.len(), 3);
        assert!(matches!(
            AnimeFaceDataset::load(dir.path(), &classes, IMAGE_SIZE, CHANNELS),
            Err(Error::LabelMismatch { .. })
        ));
    }

    #[test]
    fn classes_without_any_image_are_empty() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("001_a")).unwrap();
        fs::write(dir.path().join("001_a").join("notes.txt"), "not an image").unwrap();
        let classes = ClassTable::scan(dir.path()).unwrap();
        assert!(matches!(
            AnimeFaceDataset::load(dir.path(), &classes, IMAGE_SIZE, CHANNELS),
            Err(Error::EmptyDataset(_))
        ));
    }

    #[test]
    fn batcher_shapes() {
        let device = Default::default();
        let item = |label| AnimeFaceItem {
            image: vec![0.5; CHANNELS * IMAGE_SIZE * IMAGE_SIZE],
            label,
        };
        let batch: AnimeFaceBatch<MainBackend> =
            AnimeFaceBatcher::default().batch(vec![item(0), item(4), item(2)], &device);
        assert_eq!(batch.images.dims(), [3, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]);
        assert_eq!(batch.targets.dims(), [3]);
        let targets: Vec<i64> = batch
            .targets
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(targets, [0, 4, 2]);
    }
}
