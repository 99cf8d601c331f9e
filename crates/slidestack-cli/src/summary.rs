use std::path::Path;

use console::Style;
use slidestack_core::pipeline::{AlignmentConfig, AlignmentMode, RunReport};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            warning: Style::new().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_alignment_summary(config: &AlignmentConfig, image_count: usize, output: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Slide Alignment"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(15)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Images"),
        s.value.apply_to(image_count)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Source"),
        s.value.apply_to(config.source)
    );
    println!();

    println!("  {}", s.header.apply_to("Registration"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Mode"),
        s.method.apply_to(config.mode)
    );
    match config.mode {
        AlignmentMode::Automatic => {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Ratio"),
                s.value.apply_to(config.features.match_ratio)
            );
            println!(
                "    {:<12}{}",
                s.label.apply_to("Tolerance"),
                s.value.apply_to(format!(
                    "{:.2}% of image size",
                    config.features.inlier_threshold * 100.0
                ))
            );
        }
        AlignmentMode::Landmark => {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Model"),
                s.method.apply_to(config.model)
            );
            println!(
                "    {:<12}{}",
                s.label.apply_to("Mesh"),
                s.value.apply_to(format!(
                    "{0}x{0}, alpha {1}",
                    config.mesh.resolution, config.mesh.alpha
                ))
            );
        }
    }
    println!();

    println!("  {}", s.header.apply_to("Output"));
    if config.keep_all_pixel_data {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Canvas"),
            s.method.apply_to("keep all pixel data")
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Canvas"),
            s.disabled.apply_to("crop to source")
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Storage"),
        s.value.apply_to(config.storage)
    );
    println!();
}

pub fn print_run_report(report: &RunReport) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Aligned"),
        s.value.apply_to(report.aligned_count)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Canvas"),
        s.value.apply_to(report.canvas)
    );
    for (index, offset) in report.aligned.iter().zip(&report.offsets) {
        let marker = if *index == report.source_index {
            " (source)"
        } else {
            ""
        };
        println!(
            "    {:<12}{}{}",
            s.label.apply_to(format!("#{index}")),
            s.value.apply_to(format!("{:+}, {:+}", offset.dx, offset.dy)),
            s.disabled.apply_to(marker)
        );
    }
    if !report.skipped.is_empty() {
        println!();
        println!("  {}", s.header.apply_to("Skipped"));
        for skip in &report.skipped {
            println!(
                "    {:<12}{}",
                s.label.apply_to(format!("#{}", skip.index)),
                s.warning.apply_to(format!("{}: {}", skip.name, skip.reason))
            );
        }
    }
    if let Some(ref path) = report.output {
        println!();
        println!("Output saved to {}", s.path.apply_to(path.display()));
    }
}
