use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cfg = pixelsong::config::Config::parse();
    if cfg.list_devices {
        pixelsong::audio::list_output_devices()?;
        return Ok(());
    }

    pixelsong::app::run(cfg)
}
