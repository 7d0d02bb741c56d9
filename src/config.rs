use crate::view::ViewMode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "pixelsong", version, about = "Camera-driven pixel simulation that plays what it sees")]
pub struct Config {
    #[arg(long, value_enum, default_value_t = SourceKind::Pattern)]
    pub source: SourceKind,

    /// Raw RGB24 stream for `--source stream`; `-` reads stdin.
    #[arg(long, default_value = "-")]
    pub input: String,

    /// Grid width in cells. Defaults to the terminal width.
    #[arg(long)]
    pub width: Option<usize>,

    /// Grid height in cells. Defaults to twice the usable terminal rows.
    #[arg(long)]
    pub height: Option<usize>,

    #[arg(long, default_value_t = 30.0)]
    pub camera_rate: f32,

    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    #[arg(long)]
    pub tempo: Option<f32>,

    #[arg(long)]
    pub beats: Option<u32>,

    #[arg(long)]
    pub voices: Option<usize>,

    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[arg(long, default_value = "snapshots")]
    pub snapshots: PathBuf,

    #[arg(long, value_enum, default_value_t = ViewMode::Composite)]
    pub view: ViewMode,

    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = false)]
    pub mute: bool,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_updates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    #[value(alias = "synthetic", alias = "demo")]
    Pattern,
    #[value(alias = "raw", alias = "pipe")]
    Stream,
}
