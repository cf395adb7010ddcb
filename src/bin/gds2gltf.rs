//! GDSII to glTF converter
//!
//! Extrudes every polygon of a GDSII layout according to a layer-stack file
//! and writes the resulting hierarchy as a glTF 2.0 scene.
//!
//! Usage:
//! - `gds2gltf chip.gds chip.layerstack` writes `chip.gds.gltf`
//! - `gds2gltf chip.gds chip.layerstack --glb -o chip.glb`
//! - `gds2gltf chip.gds --list-cells`

#![forbid(unsafe_code)]

use clap::Parser;
use gds2gltf::{ConvertOptions, Converter, LayerStack, Library, OutputFormat};
use std::path::{Path, PathBuf};

/// Command-line arguments for the converter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the GDSII layout file
    #[arg(value_name = "LAYOUT")]
    layout: PathBuf,

    /// Path to the layer-stack file
    #[arg(value_name = "LAYERSTACK", required_unless_present = "list_cells")]
    layer_stack: Option<PathBuf>,

    /// Output file (defaults to the layout path plus .gltf or .glb)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Write a binary .glb container instead of .gltf
    #[arg(long)]
    glb: bool,

    /// Convert only this cell as the scene root
    #[arg(long, value_name = "CELL")]
    top: Option<String>,

    /// Inward vertex displacement used to open hole slits, in user units
    #[arg(long, value_name = "DELTA")]
    inset: Option<f64>,

    /// List the cells of the layout and exit
    #[arg(long)]
    list_cells: bool,

    /// Print conversion statistics
    #[arg(long)]
    stats: bool,

    /// Verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    fn format(&self) -> OutputFormat {
        if self.glb {
            OutputFormat::Glb
        } else {
            OutputFormat::Gltf
        }
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output(&self.layout, self.format()))
    }
}

/// `<layout>.gltf` or `<layout>.glb` next to the layout file
fn default_output(layout: &Path, format: OutputFormat) -> PathBuf {
    let mut name = layout.as_os_str().to_owned();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level()))
        .init();

    if args.list_cells {
        let library = Library::from_file(&args.layout)?;
        for name in library.cell_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    // Layer stack first: configuration errors abort before any geometry work.
    let stack_path = args
        .layer_stack
        .as_ref()
        .ok_or("a layer-stack file is required")?;
    let stack = LayerStack::from_file(stack_path)?;
    log::info!("loaded {} layers from {}", stack.len(), stack_path.display());

    let library = Library::from_file(&args.layout)?;

    let mut options = ConvertOptions::new();
    if let Some(top) = &args.top {
        options = options.with_top(top.clone());
    }
    if let Some(delta) = args.inset {
        options = options.with_inset(delta);
    }

    let conversion = Converter::new(&stack, options).convert(&library)?;
    let output = args.output_path();
    conversion.write(&output, args.format())?;
    log::info!("wrote {}", output.display());

    if args.stats {
        print!("{}", conversion.report);
    }

    Ok(())
}
