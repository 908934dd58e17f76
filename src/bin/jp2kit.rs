//! jp2kit CLI - encode, decode, and inspect JPEG 2000 images.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use jp2kit::{
    decode_with, encode, read_info, DecodeOptions, EncoderOptions, Format, PlanarImage,
    ProgressionOrder,
};

/// JPEG 2000 (ISO/IEC 15444-1) encoder and decoder
#[derive(Parser)]
#[command(name = "jp2kit")]
#[command(version)]
#[command(about = "Encode, decode, and inspect JPEG 2000 images", long_about = None)]
#[command(after_help = "EXAMPLES:
    jp2kit encode -i photo.ppm -o photo.jp2
    jp2kit encode -i scan.pgm -o scan.j2k --lossy --quality 75
    jp2kit decode -i photo.jp2 -o photo.ppm
    jp2kit info -i photo.jp2")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a PGM/PPM image to JPEG 2000
    #[command(visible_alias = "e")]
    Encode {
        /// Input image (binary PGM or PPM)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file; .jp2 wraps the codestream in JP2 boxes
        #[arg(short, long)]
        output: PathBuf,

        /// Lossy 9-7 path instead of the lossless 5-3 default
        #[arg(long)]
        lossy: bool,

        /// Quality 1-100, used with --lossy
        #[arg(short, long, default_value_t = 85)]
        quality: u8,

        /// Number of resolutions
        #[arg(short, long, default_value_t = 6)]
        resolutions: u8,

        /// Progression order
        #[arg(short, long, default_value = "lrcp", value_enum)]
        progression: ProgressionArg,

        /// Tile size as WIDTHxHEIGHT (default: one tile)
        #[arg(short, long)]
        tile: Option<String>,

        /// Comment embedded in the codestream
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Decode a JPEG 2000 file to PGM/PPM
    #[command(visible_alias = "d")]
    Decode {
        /// Input file (.jp2 or raw codestream)
        #[arg(short, long)]
        input: PathBuf,

        /// Output image; extension picks PGM or PPM
        #[arg(short, long)]
        output: PathBuf,

        /// Keep going over corrupt code-blocks and truncated data
        #[arg(long)]
        lenient: bool,
    },

    /// Print stream metadata without decoding pixels
    Info {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressionArg {
    Lrcp,
    Rlcp,
    Rpcl,
    Pcrl,
    Cprl,
}

impl From<ProgressionArg> for ProgressionOrder {
    fn from(arg: ProgressionArg) -> Self {
        match arg {
            ProgressionArg::Lrcp => ProgressionOrder::Lrcp,
            ProgressionArg::Rlcp => ProgressionOrder::Rlcp,
            ProgressionArg::Rpcl => ProgressionOrder::Rpcl,
            ProgressionArg::Pcrl => ProgressionOrder::Pcrl,
            ProgressionArg::Cprl => ProgressionOrder::Cprl,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Encode {
            input,
            output,
            lossy,
            quality,
            resolutions,
            progression,
            tile,
            comment,
        } => {
            let image = read_pnm(&input)?;
            let tile_size = tile.map(|arg| parse_tile(&arg)).transpose()?;
            let options = EncoderOptions {
                format: if output.extension().is_some_and(|e| e == "jp2") {
                    Format::Jp2
                } else {
                    Format::J2k
                },
                lossless: !lossy,
                quality,
                resolutions,
                progression: progression.into(),
                tile_size,
                comment,
                ..Default::default()
            };
            let bytes = encode(&image, &options).map_err(|e| e.to_string())?;
            fs::write(&output, &bytes).map_err(|e| e.to_string())?;
            println!(
                "{} -> {} ({} bytes, {:.2}x)",
                input.display(),
                output.display(),
                bytes.len(),
                pixel_bytes(&image) as f64 / bytes.len() as f64
            );
            Ok(())
        }
        Commands::Decode {
            input,
            output,
            lenient,
        } => {
            let data = fs::read(&input).map_err(|e| e.to_string())?;
            let options = DecodeOptions {
                lenient,
                allow_partial: lenient,
            };
            let decoded = decode_with(&data, &options).map_err(|e| e.to_string())?;
            write_pnm(&output, &decoded.image)?;
            println!(
                "{} -> {} ({}x{}, {} components)",
                input.display(),
                output.display(),
                decoded.image.width,
                decoded.image.height,
                decoded.image.component_count()
            );
            Ok(())
        }
        Commands::Info { input } => {
            let data = fs::read(&input).map_err(|e| e.to_string())?;
            let info = read_info(&data).map_err(|e| e.to_string())?;
            println!("format:        {:?}", info.format);
            println!("size:          {}x{}", info.width, info.height);
            println!("components:    {}", info.components.len());
            for (i, c) in info.components.iter().enumerate() {
                println!(
                    "  [{}] {} bit {}",
                    i,
                    c.precision,
                    if c.signed { "signed" } else { "unsigned" }
                );
            }
            println!("colorspace:    {:?}", info.colorspace);
            println!("profile:       {}", info.profile);
            println!("resolutions:   {}", info.decomposition_levels + 1);
            println!("layers:        {}", info.layers);
            println!(
                "tiles:         {} ({}x{})",
                info.tile_count, info.tile_width, info.tile_height
            );
            if let Some(icc) = &info.icc_profile {
                println!("icc profile:   {} bytes", icc.len());
            }
            if let Some(comment) = &info.comment {
                println!("comment:       {comment}");
            }
            Ok(())
        }
    }
}

fn parse_tile(arg: &str) -> Result<(u32, u32), String> {
    let (w, h) = arg
        .split_once('x')
        .ok_or_else(|| format!("tile size '{arg}' is not WIDTHxHEIGHT"))?;
    Ok((
        w.parse().map_err(|_| format!("bad tile width '{w}'"))?,
        h.parse().map_err(|_| format!("bad tile height '{h}'"))?,
    ))
}

fn pixel_bytes(image: &PlanarImage) -> usize {
    let per_sample = if image.precision > 8 { 2 } else { 1 };
    image.width as usize * image.height as usize * image.component_count() * per_sample
}

/// Minimal binary PGM (P5) / PPM (P6) reader.
fn read_pnm(path: &Path) -> Result<PlanarImage, String> {
    let data = fs::read(path).map_err(|e| e.to_string())?;
    let mut fields = Vec::new();
    let mut pos = 0;
    // Header: magic, width, height, maxval, separated by whitespace and
    // '#' comments.
    while fields.len() < 4 && pos < data.len() {
        while pos < data.len() && data[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos < data.len() && data[pos] == b'#' {
            while pos < data.len() && data[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        let start = pos;
        while pos < data.len() && !data[pos].is_ascii_whitespace() {
            pos += 1;
        }
        fields.push(String::from_utf8_lossy(&data[start..pos]).into_owned());
    }
    if fields.len() < 4 {
        return Err("truncated PNM header".into());
    }
    pos = (pos + 1).min(data.len()); // single whitespace after maxval

    let components = match fields[0].as_str() {
        "P5" => 1,
        "P6" => 3,
        magic => return Err(format!("unsupported PNM magic '{magic}'")),
    };
    let width: u32 = fields[1].parse().map_err(|_| "bad PNM width")?;
    let height: u32 = fields[2].parse().map_err(|_| "bad PNM height")?;
    let maxval: u32 = fields[3].parse().map_err(|_| "bad PNM maxval")?;
    let precision: u8 = if maxval > 255 { 16 } else { 8 };
    let wide = maxval > 255;

    let samples = width as usize * height as usize * components;
    let body = &data[pos..];
    if body.len() < samples * if wide { 2 } else { 1 } {
        return Err("truncated PNM pixel data".into());
    }

    let mut image = PlanarImage::new(width, height, precision, false, components);
    for i in 0..width as usize * height as usize {
        for c in 0..components {
            let k = i * components + c;
            image.planes[c][i] = if wide {
                i32::from(u16::from_be_bytes([body[2 * k], body[2 * k + 1]]))
            } else {
                i32::from(body[k])
            };
        }
    }
    Ok(image)
}

fn write_pnm(path: &Path, image: &PlanarImage) -> Result<(), String> {
    let components = image.component_count();
    let magic = match components {
        1 => "P5",
        3 => "P6",
        n => return Err(format!("cannot write {n}-component image as PNM")),
    };
    let wide = image.precision > 8;
    let maxval = (1u32 << image.precision) - 1;
    let mut out = format!("{magic}\n{} {}\n{maxval}\n", image.width, image.height).into_bytes();
    for i in 0..image.width as usize * image.height as usize {
        for plane in &image.planes {
            let v = plane[i].clamp(0, maxval as i32) as u16;
            if wide {
                out.extend_from_slice(&v.to_be_bytes());
            } else {
                out.push(v as u8);
            }
        }
    }
    fs::write(path, out).map_err(|e| e.to_string())
}
