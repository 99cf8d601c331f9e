use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use slidestack_core::io::image_io::load_image;

#[derive(Args)]
pub struct InfoArgs {
    /// Input image files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    for (i, path) in args.files.iter().enumerate() {
        let image =
            load_image(path).with_context(|| format!("Failed to load {}", path.display()))?;
        if i > 0 {
            println!();
        }
        println!("File:        {}", path.display());
        println!("Dimensions:  {}x{}", image.width(), image.height());
        println!("Format:      {}", image.format);
        println!("Channels:    {}", image.channel_count());
        let decoded_mb = image.decoded_bytes() as f64 / (1024.0 * 1024.0);
        println!("Decoded:     {:.1} MB", decoded_mb);
    }
    Ok(())
}
