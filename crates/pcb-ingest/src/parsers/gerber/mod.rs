pub mod commands;
pub mod coord;
pub mod interpreter;
pub mod lexer;
pub mod macros;
pub mod writer;

use std::path::Path;

use log::warn;

use crate::error::IngestError;
use crate::types::Image;

use self::commands::{GerberCommand, LocatedCommand};

/// `%IF` nesting limit; beyond this the include is dropped with a warning.
const MAX_INCLUDE_DEPTH: usize = 8;

/// Parse RS-274-X text that has no includes (or whose includes should not
/// be resolved).
pub fn parse_str(content: &str, file: &str) -> Result<Image, IngestError> {
    let tokens = lexer::tokenize(content);
    let cmds = commands::parse_commands(&tokens, file)?;
    interpreter::interpret(&cmds, file)
}

/// Parse an RS-274-X file from disk, resolving `%IF` includes relative to
/// the directory of the including file. Included files share the same
/// parser state.
pub fn parse_file(path: &Path) -> Result<Image, IngestError> {
    let content = std::fs::read_to_string(path)?;
    let name = path.to_string_lossy().into_owned();
    let dir = path.parent().unwrap_or(Path::new("."));
    let tokens = lexer::tokenize(&content);
    let cmds = commands::parse_commands(&tokens, &name)?;
    let cmds = resolve_includes(cmds, dir, &name, 0)?;
    interpreter::interpret(&cmds, &name)
}

fn resolve_includes(
    cmds: Vec<LocatedCommand>,
    dir: &Path,
    file: &str,
    depth: usize,
) -> Result<Vec<LocatedCommand>, IngestError> {
    let mut out = Vec::with_capacity(cmds.len());
    for lc in cmds {
        match &lc.cmd {
            GerberCommand::IncludeFile(rel) => {
                if depth >= MAX_INCLUDE_DEPTH {
                    warn!("{file}:{}: include nesting too deep, skipping {rel:?}", lc.line);
                    continue;
                }
                let inc_path = dir.join(rel);
                let content = match std::fs::read_to_string(&inc_path) {
                    Ok(c) => c,
                    Err(e) => {
                        // An unopenable include is fatal for the file.
                        return Err(IngestError::ParseError {
                            file: file.to_string(),
                            line: lc.line,
                            msg: format!("cannot open include {}: {e}", inc_path.display()),
                        });
                    }
                };
                let inc_name = inc_path.to_string_lossy().into_owned();
                let inc_dir = inc_path.parent().unwrap_or(Path::new(".")).to_path_buf();
                let tokens = lexer::tokenize(&content);
                let inner = commands::parse_commands(&tokens, &inc_name)?;
                out.extend(resolve_includes(inner, &inc_dir, &inc_name, depth + 1)?);
            }
            _ => out.push(lc),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApertureState, Unit};

    const MINIMUM: &str = "\
%FSLAX23Y23*%
%MOIN*%
%ADD10C,0.050*%
D10*
X0Y0D02*
X1000Y0D01*
M02*
";

    #[test]
    fn test_parse_str_minimum() {
        let img = parse_str(MINIMUM, "min.gbr").unwrap();
        assert_eq!(img.info.unit, Unit::Inch);
        assert_eq!(img.nets.len(), 2);
        assert!((img.info.bbox.max_x - 1.025).abs() < 1e-9);
    }

    #[test]
    fn test_whitespace_insensitive() {
        // Collapsing whitespace must not change the parsed image.
        let spaced = "%FSLAX23Y23*%  %MOIN*%\n%ADD10C,0.050*%\nD10* X0Y0D02*\nX1000 Y0 D01*\nM02*";
        let a = parse_str(MINIMUM, "a").unwrap();
        let b = parse_str(spaced, "b").unwrap();
        assert_eq!(a.nets.len(), b.nets.len());
        for (na, nb) in a.nets.iter().zip(b.nets.iter()) {
            assert!((na.stop_x - nb.stop_x).abs() < 1e-12);
            assert!((na.stop_y - nb.stop_y).abs() < 1e-12);
            assert_eq!(na.aperture_state, nb.aperture_state);
        }
    }

    #[test]
    fn test_include_file_shares_state() {
        let dir = std::env::temp_dir().join("pcb_ingest_include_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("apertures.ginc"),
            "%ADD10C,0.050*%\n%ADD11R,0.1X0.1*%\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("main.gbr"),
            "%FSLAX23Y23*%\n%MOIN*%\n%IFapertures.ginc*%\nD11*\nX0Y0D03*\nM02*\n",
        )
        .unwrap();

        let img = parse_file(&dir.join("main.gbr")).unwrap();
        assert!(img.apertures.contains_key(&10));
        assert!(img.apertures.contains_key(&11));
        assert_eq!(img.nets[0].aperture, 11);
        assert_eq!(img.nets[0].aperture_state, ApertureState::Flash);
    }

    #[test]
    fn test_missing_include_is_fatal() {
        let dir = std::env::temp_dir().join("pcb_ingest_missing_include");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("main.gbr"),
            "%FSLAX23Y23*%\n%MOIN*%\n%IFnot_there.ginc*%\nM02*\n",
        )
        .unwrap();
        assert!(parse_file(&dir.join("main.gbr")).is_err());
    }
}
