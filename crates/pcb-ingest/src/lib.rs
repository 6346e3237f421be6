pub mod attrs;
pub mod error;
pub mod parsers;
pub mod project;
pub mod reader;
pub mod search;
pub mod sniff;
pub mod types;

use std::path::Path;

pub use error::IngestError;
pub use project::{FileSlot, Project};
pub use sniff::FileKind;
pub use types::{Image, LayerKind};

/// Sniff a file and parse it with default options, outside of any project.
/// Pick-and-place files may produce two images (top and bottom).
pub fn ingest_path(path: &Path) -> Result<Vec<Image>, IngestError> {
    let (winner, best) = sniff::sniff_path(path)?;
    let kind = if winner != FileKind::Unknown {
        winner
    } else {
        best
    };
    match kind {
        FileKind::Rs274x => Ok(vec![parsers::gerber::parse_file(path)?]),
        FileKind::Excellon => Ok(vec![parsers::excellon::parse_file(
            path,
            &parsers::excellon::DrillOptions::default(),
        )?]),
        FileKind::Ipcd356a => Ok(vec![parsers::ipcd356a::parse_file(
            path,
            &parsers::ipcd356a::IpcOptions::default(),
        )?]),
        FileKind::PnpCsv | FileKind::EaglePartlist => {
            let (top, bottom) = parsers::pnp::parse_file(path)?;
            let mut out = vec![top];
            out.extend(bottom);
            Ok(out)
        }
        FileKind::Unknown => Err(IngestError::UnsupportedFormat(
            path.display().to_string(),
        )),
    }
}
