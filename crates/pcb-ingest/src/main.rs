use clap::Parser;
use pcb_ingest::project::Project;
use pcb_ingest::sniff;
use pcb_ingest::FileKind;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pcb-ingest", about = "Parse PCB fabrication files into a layered image model")]
struct Cli {
    /// Input files (Gerber, Excellon, IPC-D-356A, pick-and-place)
    inputs: Vec<PathBuf>,

    /// Only report the detected file types
    #[arg(long)]
    sniff: bool,

    /// Load a saved project instead of individual files
    #[arg(long, conflicts_with = "inputs")]
    project: Option<PathBuf>,

    /// Save the resulting project to this path
    #[arg(long)]
    save_project: Option<PathBuf>,

    /// Re-export slot N (0-based) to this path after loading
    #[arg(long, requires = "export_to")]
    export_slot: Option<usize>,

    /// Output path for --export-slot
    #[arg(long)]
    export_to: Option<PathBuf>,

    /// Per-file function tags, e.g. "t,2,3,b" or "tl,tm,t,b,bm,bl"
    #[arg(long)]
    layers: Option<String>,

    /// IPC-D-356A layer digits to ingest (e.g. "01")
    #[arg(long)]
    ipc_layers: Option<String>,

    /// Include IPC-D-356A conductor records
    #[arg(long)]
    ipc_tracks: bool,

    /// Annotate Gerber layers from IPC-D-356A data (on by default)
    #[arg(long, default_value = "y")]
    annotate: String,

    /// Overwrite existing attributes when annotating
    #[arg(long)]
    overwrite: bool,

    /// Keep large drill tool diameters as inches instead of assuming mils
    #[arg(long)]
    no_drill_mils_quirk: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.sniff {
        for input in &cli.inputs {
            match sniff::sniff_path(input) {
                Ok((winner, best)) => {
                    let kind = if winner != FileKind::Unknown { winner } else { best };
                    println!("{}: {}", input.display(), kind.as_str());
                }
                Err(e) => {
                    eprintln!("{}: {e}", input.display());
                    return ExitCode::FAILURE;
                }
            }
        }
        return ExitCode::SUCCESS;
    }

    let mut project = if let Some(path) = &cli.project {
        match Project::load_project(path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    } else {
        Project::new()
    };

    if let Some(layers) = &cli.layers {
        project.attrs.set("layers", layers);
    }
    if let Some(ipc_layers) = &cli.ipc_layers {
        project.attrs.set("ipcd356a-layers", ipc_layers);
    }
    if cli.ipc_tracks {
        project.attrs.set("ipcd356a-tracks", "yes");
    }
    project.attrs.set("annotate", &cli.annotate);
    if cli.no_drill_mils_quirk {
        project.attrs.set("drill-large-tool-mils", "n");
    }

    for input in &cli.inputs {
        if let Err(e) = project.open_layer_from_filename(input) {
            eprintln!("{}: {e}", input.display());
            return ExitCode::FAILURE;
        }
    }

    if project.attrs.get_or("annotate", "y").starts_with('y') {
        project.annotate_all(cli.overwrite);
    }

    for (i, slot) in project.slots.iter().enumerate() {
        let image = &slot.image;
        let bbox = &image.info.bbox;
        let extent = if bbox.is_empty() {
            String::from("empty")
        } else {
            format!(
                "[{:.4}, {:.4}] x [{:.4}, {:.4}] in",
                bbox.min_x, bbox.max_x, bbox.min_y, bbox.max_y
            )
        };
        println!(
            "#{i} {}: {:?}, {} nets, {} apertures, {extent}",
            slot.name,
            image.kind,
            image.nets.len(),
            image.apertures.len()
        );
    }

    if let (Some(slot), Some(out)) = (cli.export_slot, &cli.export_to) {
        if slot >= project.slots.len() {
            eprintln!("no slot #{slot}");
            return ExitCode::FAILURE;
        }
        if let Err(e) = project.save_layer_from_index(slot, out) {
            eprintln!("{}: {e}", out.display());
            return ExitCode::FAILURE;
        }
        eprintln!("wrote {}", out.display());
    }

    if let Some(path) = &cli.save_project {
        if let Err(e) = project.save_project(path) {
            eprintln!("{}: {e}", path.display());
            return ExitCode::FAILURE;
        }
        eprintln!("saved project to {}", path.display());
    }

    ExitCode::SUCCESS
}
