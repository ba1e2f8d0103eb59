use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, error, info, warn};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

use crate::cli::{OutputFormat, SubCommandExtend, open_pipeline, print_attention};
use crate::config::{DetectorOptions, GazeOptions, Opts, SearchOptions};
use crate::metrics;
use crate::pipeline::{AttentionPipeline, QuadrantSource};
use crate::types::Quadrant;

/// 输入设备产生的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// 只识别作品
    Identify,
    /// 完整解析注视区域
    Resolve,
    /// 手动指定象限
    Manual(Quadrant),
    Quit,
}

impl Trigger {
    /// 解析一行输入：`tab` 识别，空行或 `enter` 解析，`1`~`4` 指定象限，`q` 退出
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim_end_matches(['\r', '\n']) {
            "\t" => return Some(Trigger::Identify),
            "" => return Some(Trigger::Resolve),
            _ => {}
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "tab" | "i" => Some(Trigger::Identify),
            "" | "enter" | "r" => Some(Trigger::Resolve),
            "q" | "quit" => Some(Trigger::Quit),
            s => s.parse().ok().map(Trigger::Manual),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    #[command(flatten)]
    pub detector: DetectorOptions,
    #[command(flatten)]
    pub gaze: GazeOptions,
    /// 拍摄作品的摄像头编号
    #[arg(long, value_name = "INDEX", default_value_t = 0)]
    pub scene_camera: i32,
    /// 拍摄观众人脸的摄像头编号，不指定则只使用手动象限
    #[arg(long, value_name = "INDEX")]
    pub eye_camera: Option<i32>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Json)]
    pub output_format: OutputFormat,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME", default_value = "docent")]
    pub prometheus_instance: String,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for RunCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let mut pipeline = open_pipeline(&opts.conf_dir, &self.search, &self.detector, &self.gaze)?;
        let mut scene_cam = open_camera(self.scene_camera)?;
        let mut eye_cam = self.eye_camera.map(open_camera).transpose()?;

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone();
            let auth = self.prometheus_auth.clone();
            thread::spawn(move || {
                loop {
                    metrics::push(&url, &instance, auth.as_deref());
                    thread::sleep(Duration::from_secs(30));
                }
            });
        }

        // 同一时间只处理一个事件，处理期间到达的事件直接丢弃
        let (tx, rx) = bounded(1);
        thread::spawn(move || read_triggers(io::stdin().lock(), tx));

        info!("tab：识别作品，回车：解析注视区域，1~4：指定象限，q：退出");
        let mut session = Session::new(self.gaze.fallback, self.output_format);
        session.serve(&rx, &mut pipeline, &mut scene_cam, eye_cam.as_mut())
    }
}

fn open_camera(index: i32) -> Result<VideoCapture> {
    let cap = VideoCapture::new(index, videoio::CAP_ANY)?;
    if !cap.is_opened()? {
        bail!("无法打开摄像头 {}", index);
    }
    Ok(cap)
}

fn capture(cap: &mut VideoCapture) -> Result<Mat> {
    let mut frame = Mat::default();
    if !cap.read(&mut frame)? || frame.empty() {
        bail!("摄像头没有返回画面");
    }
    Ok(frame)
}

/// 逐行读取输入并转换为事件，通道已满时丢弃事件，退出事件会一直等待到被接收
pub fn read_triggers(input: impl BufRead, tx: Sender<Trigger>) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        let Some(trigger) = Trigger::parse(&line) else {
            debug!("ignored input {:?}", line);
            continue;
        };
        if trigger == Trigger::Quit {
            break;
        }
        match tx.try_send(trigger) {
            Ok(()) => {}
            Err(TrySendError::Full(t)) => debug!("busy, dropped {:?}", t),
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
    let _ = tx.send(Trigger::Quit);
}

/// 调用方持有的象限状态
struct Session {
    /// 视线未知时使用的象限，手动指定或视线识别成功后更新
    fallback: Quadrant,
    /// 下一次解析使用的手动象限
    manual: Option<Quadrant>,
    format: OutputFormat,
}

impl Session {
    fn new(fallback: Quadrant, format: OutputFormat) -> Self {
        Self { fallback, manual: None, format }
    }

    fn serve(
        &mut self,
        rx: &Receiver<Trigger>,
        pipeline: &mut AttentionPipeline,
        scene_cam: &mut VideoCapture,
        mut eye_cam: Option<&mut VideoCapture>,
    ) -> Result<()> {
        for trigger in rx.iter() {
            let r = match trigger {
                Trigger::Quit => break,
                Trigger::Manual(q) => {
                    info!("手动指定象限 {} ({})", q, q.label());
                    self.manual = Some(q);
                    self.fallback = q;
                    Ok(())
                }
                Trigger::Identify => self.identify(pipeline, scene_cam),
                Trigger::Resolve => self.resolve(pipeline, scene_cam, eye_cam.as_deref_mut()),
            };
            if let Err(e) = r {
                error!("{:#}", e);
            }
        }
        Ok(())
    }

    fn identify(
        &self,
        pipeline: &mut AttentionPipeline,
        scene_cam: &mut VideoCapture,
    ) -> Result<()> {
        let scene = capture(scene_cam)?;
        match pipeline.identify_scene(&scene) {
            Ok((entry, score)) => {
                info!("{} - {} ({:.3})", entry.title, entry.artist, score);
                if self.format == OutputFormat::Json {
                    println!("{}", serde_json::to_string(entry)?);
                }
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("未识别到作品，请重试: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(
        &mut self,
        pipeline: &mut AttentionPipeline,
        scene_cam: &mut VideoCapture,
        eye_cam: Option<&mut VideoCapture>,
    ) -> Result<()> {
        let scene = capture(scene_cam)?;
        let eye = match eye_cam {
            Some(cam) => capture(cam).map_err(|e| warn!("{}", e)).ok(),
            None => None,
        };

        let manual = self.manual.take();
        match pipeline.resolve(&scene, eye.as_ref(), manual, self.fallback) {
            Ok(result) => {
                if result.source == QuadrantSource::Gaze {
                    self.fallback = result.quadrant;
                }
                print_attention(&result, self.format)
            }
            Err(e) if e.is_not_found() => {
                warn!("未识别到作品，请重试: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
