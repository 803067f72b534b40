use crate::dataset::{AnimeFaceBatcher, ClassTable, load_image};
use crate::error::{Error, Result};
use crate::model::{Cnn, CnnConfig};
use burn::prelude::*;
use std::io::{BufRead, Write};
use std::path::Path;

/// How many classes are printed per prediction.
pub const TOP_K: usize = 9;
pub const SEPARATOR: &str = "#########################################";

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub class_id: usize,
    pub name: String,
    pub probability: f32,
}

/// Pairs probabilities with class names, most probable first.
pub fn rank(probabilities: &[f32], classes: &ClassTable) -> Vec<Ranked> {
    let mut ranking: Vec<Ranked> = probabilities
        .iter()
        .enumerate()
        .map(|(class_id, &probability)| Ranked {
            class_id,
            name: classes
                .name(class_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class {class_id}")),
            probability,
        })
        .collect();
    ranking.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranking
}

/// Class probabilities for the image at `path`.
pub fn predict_image<B: Backend>(
    model: &Cnn<B>,
    model_config: &CnnConfig,
    path: &Path,
    device: &B::Device,
) -> Result<Vec<f32>> {
    let image = load_image(path, model_config.image_size, model_config.in_channels)?;
    let batcher = AnimeFaceBatcher::new(model_config.image_size, model_config.in_channels);
    let images = batcher.images::<B>(vec![image], device);

    let probabilities = model.predict(images);
    let [_batch_size, n_outputs] = probabilities.dims();
    let probabilities = probabilities
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| Error::TensorData(format!("{err:?}")))?;
    debug_assert_eq!(probabilities.len(), n_outputs);
    Ok(probabilities)
}

/// Prints the `top` most probable classes followed by a separator line.
pub fn write_ranking(out: &mut impl Write, ranking: &[Ranked], top: usize) -> std::io::Result<()> {
    for (i, ranked) in ranking.iter().take(top).enumerate() {
        writeln!(
            out,
            "#{}  {}  {:?}%",
            i + 1,
            ranked.name,
            ranked.probability * 100.
        )?;
    }
    writeln!(out, "{SEPARATOR}")
}

/// Reads one image path per line from `input` and writes its ranking to `out`, until end of input.
///
/// Blank lines are skipped; an unreadable image ends the loop with an error.
pub fn interactive<B: Backend>(
    model: &Cnn<B>,
    model_config: &CnnConfig,
    classes: &ClassTable,
    device: &B::Device,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let path = line.trim_end_matches(['\r', '\n']);
        if path.trim().is_empty() {
            continue;
        }
        let path = Path::new(path);

        let probabilities = predict_image(model, model_config, path, device)?;
        if let Some(expected) = classes.class_id(path).and_then(|id| classes.name(id)) {
            writeln!(out, "expected: {expected}")?;
        }
        write_ranking(out, &rank(&probabilities, classes), TOP_K)?;
        out.flush()?;
    }
    log::info!("End of input");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MainBackend;
    use image::{Rgb, RgbImage};
    use temp_dir::TempDir;

    fn classes(n: usize) -> ClassTable {
        ClassTable::new((0..n).map(|i| format!("{i:03}_chara")).collect())
    }

    #[test]
    fn ranking_is_descending() {
        let probabilities = [0.05, 0.4, 0.1, 0.3, 0.15];
        let ranking = rank(&probabilities, &classes(5));
        let order: Vec<usize> = ranking.iter().map(|r| r.class_id).collect();
        assert_eq!(order, [1, 3, 4, 2, 0]);
        assert_eq!(ranking[0].name, "001_chara");
        assert!(
            ranking
                .windows(2)
                .all(|w| w[0].probability >= w[1].probability)
        );
        assert!(
            ranking
                .iter()
                .all(|r| ranking[0].probability >= r.probability)
        );
    }

    #[test]
    fn ranking_prints_at_most_top_k() {
        let probabilities: Vec<f32> = (0..12).map(|i| i as f32 / 66.).collect();
        let ranking = rank(&probabilities, &classes(12));
        let mut out = Vec::new();
        write_ranking(&mut out, &ranking, TOP_K).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), TOP_K + 1);
        assert!(lines[0].starts_with("#1  011_chara  "));
        assert!(lines[8].starts_with("#9  003_chara  "));
        assert_eq!(lines[9], SEPARATOR);

        let mut out = Vec::new();
        write_ranking(&mut out, &rank(&[0.25, 0.75], &classes(2)), TOP_K).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("#1  001_chara  75.0%\n#2  000_chara  25.0%\n{SEPARATOR}\n")
        );
    }

    #[test]
    fn interactive_loop_stops_at_end_of_input() {
        let dir = TempDir::new().unwrap();
        let class_dir = dir.path().join("001_chara");
        std::fs::create_dir(&class_dir).unwrap();
        let path = class_dir.join("face.png");
        // not square
        RgbImage::from_pixel(48, 30, Rgb([10, 200, 30]))
            .save(&path)
            .unwrap();

        let device = Default::default();
        let config = CnnConfig::new(3).with_n_hidden(8);
        let model: Cnn<MainBackend> = config.init(&device);
        let input = format!("{}\n\n{}\n", path.display(), path.display());

        let mut out = Vec::new();
        interactive(
            &model,
            &config,
            &classes(3),
            &device,
            input.as_bytes(),
            &mut out,
        )
        .unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches(SEPARATOR).count(), 2);
        assert_eq!(out.matches("expected: 001_chara").count(), 2);
        assert_eq!(out.lines().filter(|l| l.starts_with("#1  ")).count(), 2);
    }

    #[test]
    fn unreadable_image_is_fatal() {
        let device = Default::default();
        let config = CnnConfig::new(2).with_n_hidden(8);
        let model: Cnn<MainBackend> = config.init(&device);
        let mut out = Vec::new();
        let result = interactive(
            &model,
            &config,
            &classes(2),
            &device,
            "/no/such/image.png\n".as_bytes(),
            &mut out,
        );
        assert!(matches!(result, Err(Error::Image { .. })));
    }
}
