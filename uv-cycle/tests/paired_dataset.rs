use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};
use std::{fs, path::Path, sync::Arc};
use tch::{vision, Kind, Tensor};
use uv_cycle::{
    dataset::{DatasetSplit, ManifestRecord, PairedViewDataset, TrainingBatch},
    loss::{CycleLossInit, CyclePredictions},
    model::{ModelPairInit, RendererInit, TexturePredictorInit},
};

const IMAGE_SIZE: usize = 32;

fn write_image(path: &Path, rgb: [u8; 3], size: i64) -> Result<()> {
    let pixel = Tensor::of_slice(&rgb).view([3, 1, 1]);
    let image = pixel.expand(&[3, size, size], false).contiguous();
    vision::image::save(&image, path)?;
    Ok(())
}

fn write_dataset(dir: &Path) -> Result<()> {
    let mut records = vec![];

    for (source, num_views) in [("livery_a", 3), ("livery_b", 1)] {
        let source_uv = dir.join(format!("{}_uv.png", source));
        write_image(&source_uv, [200, 30, 30], 48)?;

        for view in 0..num_views {
            let augmented_uv = dir.join(format!("{}_{}_uv.png", source, view));
            let augmented_view = dir.join(format!("{}_{}_view.png", source, view));
            write_image(&augmented_uv, [190, 40, 40], IMAGE_SIZE as i64)?;
            write_image(&augmented_view, [20, 20 + view as u8 * 40, 220], IMAGE_SIZE as i64)?;

            records.push(ManifestRecord {
                source_uv: source_uv.clone(),
                source_view: dir.join(format!("{}_view.png", source)),
                augmented_uv,
                augmented_view,
                seed: view as u64,
                transforms: vec!["hue_shift".into()],
            });
        }
    }

    fs::write(
        dir.join("metadata.json"),
        serde_json::to_string_pretty(&records)?,
    )?;
    Ok(())
}

#[test]
fn samples_are_loaded_from_a_dataset_directory() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_dataset(dir.path())?;

    let dataset = PairedViewDataset::open(dir.path(), IMAGE_SIZE)?;
    assert_eq!(dataset.len(), 4);
    assert_eq!(dataset.index().groups().len(), 2);

    let mut rng = StdRng::seed_from_u64(1337);
    let sample = dataset.get(0, &mut rng)?;
    assert_eq!(sample.uv_gt.size(), [3, 32, 32]);
    assert_eq!(sample.view_a.size(), [3, 32, 32]);
    assert_eq!(sample.mask_a.size(), [1, 32, 32]);

    for mask in [&sample.mask_a, &sample.mask_b] {
        assert!(f64::from(mask.min()) >= 0.0);
        assert!(f64::from(mask.max()) <= 1.0);
    }

    // The saturated blue views are body pixels everywhere.
    assert!(f64::from(sample.mask_a.mean(Kind::Float)) > 0.99);
    Ok(())
}

#[test]
fn partners_stay_within_their_group() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_dataset(dir.path())?;
    let dataset = PairedViewDataset::open(dir.path(), IMAGE_SIZE)?;
    let index = dataset.index();
    let mut rng = StdRng::seed_from_u64(3);

    for _ in 0..20 {
        for sample_index in 0..index.len() {
            let pair = index.pair(sample_index, &mut rng)?;
            assert_eq!(pair.primary.source_uv, pair.partner.source_uv);

            let group_size = index.groups()[index.locate(sample_index)?.group].records.len();
            if group_size > 1 {
                assert!(!Arc::ptr_eq(&pair.primary, &pair.partner));
            } else {
                assert!(Arc::ptr_eq(&pair.primary, &pair.partner));
            }
        }
    }
    Ok(())
}

#[test]
fn a_batch_runs_through_the_cycle_loss() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_dataset(dir.path())?;
    let dataset = PairedViewDataset::open(dir.path(), IMAGE_SIZE)?;

    let mut rng = StdRng::seed_from_u64(42);
    let split = DatasetSplit::new(dataset.len(), 0.25, &mut rng)?;
    assert_eq!(split.val.len(), 1);
    assert_eq!(split.train.len(), 3);

    let samples = split
        .train
        .iter()
        .map(|&index| dataset.get(index, &mut rng))
        .collect::<Result<Vec<_>>>()?;
    let batch = TrainingBatch::from_samples(&samples)?;
    assert_eq!(batch.batch_size(), 3);

    let model = ModelPairInit {
        predictor: TexturePredictorInit {
            base_c: 4,
            ..Default::default()
        },
        renderer: RendererInit {
            base_c: 4,
            ..Default::default()
        },
    }
    .build(tch::Device::Cpu);
    let loss = CycleLossInit::default().build()?;

    let output = loss.forward(&CyclePredictions::new(&model, &batch, true), &batch);
    let values = output.values();
    assert!(values.total.is_finite());
    assert!(values.cycle >= 0.0 && values.cross >= 0.0);

    output.total.backward();
    Ok(())
}
