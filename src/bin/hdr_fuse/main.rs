use std::io::BufWriter;

use anyhow::{anyhow, bail, Context, Result};
use clap::{App, Arg};

use lib::false_color::Colormap;
use lib::logger::{self, info};
use lib::request::{process, ProcessOutcome, ProcessRequest, Upload};
use lib::PipelineConfig;

fn main() {
    logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn app() -> App<'static, 'static> {
    App::new("HDR Fuse")
        .version("0.1")
        .about("Fuses differently exposed images of a scene into a single displayable image")
        .arg(
            Arg::with_name("INPUT")
                .help("input image files, at least two")
                .required(true)
                .multiple(true)
                .index(1),
        )
        .arg(
            Arg::with_name("align")
                .long("align")
                .help("Aligns the images before merging"),
        )
        .arg(
            Arg::with_name("suppress_flare")
                .long("suppress-flare")
                .help("Equalizes local contrast to suppress glare"),
        )
        .arg(
            Arg::with_name("radiance")
                .long("radiance")
                .help("Merges a calibrated radiance map and tone maps it, instead of exposure fusion"),
        )
        .arg(
            Arg::with_name("curve")
                .long("curve")
                .value_name("FILE")
                .help("Polynomial response curve to use instead of calibrating (implies --radiance)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("colormap")
                .long("colormap")
                .value_name("NAME")
                .help("False-color lookup table")
                .possible_values(&["jet", "blue-red"])
                .default_value("jet")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("bias")
                .long("bias")
                .value_name("N")
                .help("Tone mapping shadow boost")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("PREFIX")
                .help("Output file name prefix")
                .default_value("hdr")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("hdr")
                .long("hdr")
                .value_name("FILE")
                .help("Also writes the radiance map as a Radiance .hdr file (implies --radiance)")
                .takes_value(true),
        )
}

fn run() -> Result<()> {
    let matches = app().get_matches();

    let mut config = PipelineConfig::default();
    config.align = matches.is_present("align");
    config.suppress_flare = matches.is_present("suppress_flare");
    config.ghost_resistant = !(matches.is_present("radiance") || matches.is_present("hdr"));
    if let Some(path) = matches.value_of("curve") {
        config.external_curve =
            Some(std::fs::read_to_string(path).with_context(|| format!("reading curve file {}", path))?);
    }
    if let Some(name) = matches.value_of("colormap") {
        config.colormap = Colormap::from_name(name).ok_or_else(|| anyhow!("unknown colormap {}", name))?;
    }
    if let Some(bias) = matches.value_of("bias") {
        config.tone_bias = bias
            .parse::<f32>()
            .with_context(|| format!("invalid bias {}", bias))?;
    }

    let mut uploads = Vec::new();
    for filename in matches.values_of("INPUT").into_iter().flatten() {
        uploads.push(Upload::from_path(filename).with_context(|| format!("reading {}", filename))?);
    }
    info!("Loaded {} image files", uploads.len());

    let output = match process(ProcessRequest {
        uploads: uploads,
        config: config,
    }) {
        ProcessOutcome::Success(output) => output,
        ProcessOutcome::Failure { message } => bail!(message),
    };

    let prefix = matches
        .value_of("output")
        .ok_or_else(|| anyhow!("no output prefix given"))?;
    let preview_path = format!("{}_preview.png", prefix);
    let false_color_path = format!("{}_false_color.png", prefix);
    output
        .preview
        .save(&preview_path)
        .with_context(|| format!("writing {}", preview_path))?;
    output
        .false_color
        .save(&false_color_path)
        .with_context(|| format!("writing {}", false_color_path))?;
    info!("Wrote {} and {}", preview_path, false_color_path);

    if let Some(path) = matches.value_of("hdr") {
        let map = output
            .radiance
            .as_ref()
            .ok_or_else(|| anyhow!("no radiance map was produced"))?;
        let mut writer = BufWriter::new(std::fs::File::create(path).with_context(|| format!("creating {}", path))?);
        hdr::write_hdr(&mut writer, &map.pixels, map.width, map.height)
            .with_context(|| format!("writing {}", path))?;
        info!("Wrote radiance map to {}", path);
    }

    println!("{}", output.status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_prefix_defaults_to_hdr() {
        let matches = app().get_matches_from(vec!["hdr_fuse", "a.jpg", "b.jpg"]);
        assert_eq!(matches.value_of("output"), Some("hdr"));

        let matches = app().get_matches_from(vec!["hdr_fuse", "-o", "out/scene", "a.jpg", "b.jpg"]);
        assert_eq!(matches.value_of("output"), Some("out/scene"));
        assert_eq!(matches.values_of("INPUT").unwrap().count(), 2);
    }
}
