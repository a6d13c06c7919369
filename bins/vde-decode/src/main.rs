//! vde-decode - Tegra VDE 硬件 H.264 解码命令行工具
//!
//! 读取 Annex-B 格式的 H.264 Baseline 码流, 提交硬件解码,
//! 将每一帧去平铺后以原始 YUV420 平面格式写入输出文件.

mod decode;
mod logging;

use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::error;

#[derive(Parser, Debug)]
#[command(name = "vde-decode", version, about = "Tegra VDE 硬件 H.264 解码工具")]
pub struct Cli {
    /// 输入 H.264 Annex-B 码流文件
    #[arg(short, long)]
    pub input: PathBuf,

    /// 输出原始 YUV420 文件
    #[arg(short, long)]
    pub output: PathBuf,

    /// 会话配置文件 (JSON), 缺省使用内置默认值
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 最多解码的帧数
    #[arg(short = 'n', long = "frames")]
    pub max_frames: Option<usize>,

    /// 覆盖输出文件
    #[arg(short = 'y', long)]
    pub overwrite: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("vde-decode", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    if let Err(e) = decode::run(&cli) {
        error!("解码失败: {e:#}");
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}
