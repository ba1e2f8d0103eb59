use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, ensure};
use clap::Parser;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use opencv::core::Mat;
use rayon::prelude::*;

use crate::catalogue::{Catalogue, CropRecord, IndexEntry};
use crate::cli::SubCommandExtend;
use crate::config::{DetectorOptions, Opts, SearchOptions};
use crate::detect::{ObjectLocalizer, YoloLocalizer};
use crate::encoder::{ClipEncoder, ImageEncoder};
use crate::index::EmbeddingIndex;
use crate::utils::{crop, frame_size, imread, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    #[command(flatten)]
    pub detector: DetectorOptions,
    /// 作品目录 JSON，图片路径相对于该文件所在目录
    pub catalogue: PathBuf,
    /// 每个批次并行解码的图片数量
    #[arg(long, value_name = "SIZE", default_value_t = 64)]
    pub batch_size: usize,
    /// 不检测作品的局部区域
    #[arg(long)]
    pub no_crops: bool,
}

impl SubCommandExtend for BuildCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let source = Catalogue::open(&self.catalogue)?;
        ensure!(!source.is_empty(), "catalogue {} is empty", self.catalogue.display());
        let base = self.catalogue.parent().unwrap_or(Path::new(".")).to_path_buf();

        let mut encoder = ClipEncoder::load(&self.detector.encoder, self.search.dimensions)?;
        let mut index = EmbeddingIndex::new(self.search.dimensions)?;

        info!("编码 {} 件作品", source.len());
        let entries =
            embed_entries(source.into_entries(), &base, self.batch_size, &mut encoder, &mut index)?;
        ensure!(!entries.is_empty(), "no readable artwork image");

        let entries = if self.no_crops {
            entries
        } else {
            let mut localizer = YoloLocalizer::load(
                &self.detector.detector,
                self.detector.input_size,
                self.detector.confidence,
            )?;
            info!("检测作品局部区域");
            detect_crops(entries, &base, &mut localizer, &mut encoder, &index)?
        };

        let catalogue = Catalogue::new(entries);
        catalogue.check_alignment(index.len());
        fs::create_dir_all(opts.conf_dir.path())?;
        index.save(opts.conf_dir.index())?;
        catalogue.save(opts.conf_dir.catalogue())?;
        info!("索引构建完成，共 {} 件作品", catalogue.len());
        Ok(())
    }
}

fn image_path(base: &Path, entry: &IndexEntry) -> PathBuf {
    base.join(&entry.image_path)
}

/// 按批次并行解码作品图片并编码，无法读取的作品会被跳过
///
/// 返回的条目顺序与索引位置一致
fn embed_entries(
    entries: Vec<IndexEntry>,
    base: &Path,
    batch_size: usize,
    encoder: &mut dyn ImageEncoder,
    index: &mut EmbeddingIndex,
) -> Result<Vec<IndexEntry>> {
    let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());
    let mut kept = Vec::with_capacity(entries.len());

    for chunk in entries.chunks(batch_size.max(1)) {
        let images = chunk
            .par_iter()
            .map(|entry| imread(image_path(base, entry)))
            .collect::<Vec<_>>();

        let mut vectors = vec![];
        for (entry, image) in chunk.iter().zip(images) {
            pb.inc(1);
            let image = match image {
                Ok(image) => image,
                Err(e) => {
                    warn!("跳过作品 {}: {}", entry.id, e);
                    continue;
                }
            };
            vectors.push(encoder.encode(&image)?);
            kept.push(entry.clone());
        }
        index.add(&vectors)?;
    }

    pb.finish_and_clear();
    Ok(kept)
}

/// 检测每件作品的局部区域，用最接近的作品简介作为该区域的描述
fn detect_crops(
    mut entries: Vec<IndexEntry>,
    base: &Path,
    localizer: &mut dyn ObjectLocalizer,
    encoder: &mut dyn ImageEncoder,
    index: &EmbeddingIndex,
) -> Result<Vec<IndexEntry>> {
    let summaries = entries.iter().map(|e| e.summary.clone()).collect::<Vec<_>>();
    let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());

    for entry in entries.iter_mut() {
        pb.inc(1);
        let image = match imread(image_path(base, entry)) {
            Ok(image) => image,
            Err(e) => {
                warn!("跳过作品 {}: {}", entry.id, e);
                continue;
            }
        };
        entry.crops = crops_of(entry, &image, &summaries, localizer, encoder, index)?;
        debug!("{}: {} crops", entry.id, entry.crops.len());
    }

    pb.finish_and_clear();
    Ok(entries)
}

fn crops_of(
    entry: &IndexEntry,
    image: &Mat,
    summaries: &[String],
    localizer: &mut dyn ObjectLocalizer,
    encoder: &mut dyn ImageEncoder,
    index: &EmbeddingIndex,
) -> Result<Vec<CropRecord>> {
    let (w, h) = frame_size(image);
    let mut crops = vec![];
    for (i, detection) in localizer.detect(image)?.into_iter().enumerate() {
        let crop_id = format!("{}_crop{}", entry.id, i);
        let bbox = detection.bbox.clip(w, h);
        if bbox.is_empty() {
            debug!("{}: degenerate box {:?}", crop_id, detection.bbox);
            continue;
        }

        // 没有文本编码器，描述取图片检索到的最近作品的简介
        let embedding = encoder.encode(&crop(image, bbox)?)?;
        let description = index
            .search(&embedding, 1)?
            .first()
            .and_then(|n| summaries.get(n.position))
            .cloned()
            .unwrap_or_default();

        crops.extend(CropRecord::from_bbox(crop_id, bbox, w, h, description));
    }
    Ok(crops)
}
