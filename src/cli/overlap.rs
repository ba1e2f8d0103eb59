use anyhow::Result;
use clap::Parser;
use serde_json::json;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{Opts, OverlapOptions, parse_bbox, parse_size};
use crate::quadrant::{primary_quadrant, quadrants_for_bbox};
use crate::types::{BoundingBox, Quadrant};

#[derive(Parser, Debug, Clone)]
pub struct OverlapCommand {
    #[command(flatten)]
    pub overlap: OverlapOptions,
    /// 边界框，格式为 x1,y1,x2,y2
    #[arg(value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: BoundingBox,
    /// 画面尺寸
    #[arg(short, long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: (i32, i32),
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for OverlapCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let (width, height) = self.size;
        let (hits, ratios) = quadrants_for_bbox(
            self.bbox,
            width,
            height,
            self.overlap.min_ratio,
            self.overlap.min_pixels,
        );
        let primary = primary_quadrant(&ratios);

        match self.output_format {
            OutputFormat::Json => {
                let value = json!({ "hits": hits, "ratios": ratios, "primary": primary });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Table => {
                let hits = hits.iter().map(Quadrant::to_string).collect::<Vec<_>>();
                println!("hits: [{}]", hits.join(", "));
                for (q, ratio) in &ratios {
                    println!("{}\t{:.4}", q, ratio);
                }
                match primary {
                    Some(q) => println!("primary: {} ({})", q, q.label()),
                    None => println!("primary: none"),
                }
            }
        }
        Ok(())
    }
}
