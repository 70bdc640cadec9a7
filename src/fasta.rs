use std::fs;
use std::path::Path;

use crate::domain::ProteinRecord;
use crate::error::EnrichError;

pub fn read_fasta(path: &Path) -> Result<Vec<ProteinRecord>, EnrichError> {
    let bytes = fs::read(path)
        .map_err(|err| EnrichError::Fasta(format!("{}: {err}", path.display())))?;
    parse_fasta(&String::from_utf8_lossy(&bytes))
}

/// Records in file order with 1-based indices. The identifier is the first
/// whitespace-separated token of the header.
pub fn parse_fasta(content: &str) -> Result<Vec<ProteinRecord>, EnrichError> {
    let mut records = Vec::new();
    let mut current: Option<(String, String)> = None;

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim_start_matches('\u{feff}').trim_end();
        if let Some(header) = line.strip_prefix('>') {
            if let Some((identifier, sequence)) = current.take() {
                records.push(ProteinRecord::new(records.len() + 1, identifier, sequence)?);
            }
            let identifier = header.split_whitespace().next().ok_or_else(|| {
                EnrichError::Fasta(format!("line {}: empty header", line_no + 1))
            })?;
            current = Some((identifier.to_string(), String::new()));
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        match current.as_mut() {
            Some((_, sequence)) => sequence.extend(
                line.chars()
                    .filter(|ch| !ch.is_whitespace())
                    .map(|ch| ch.to_ascii_uppercase()),
            ),
            None => {
                return Err(EnrichError::Fasta(format!(
                    "line {}: sequence data before the first header",
                    line_no + 1
                )));
            }
        }
    }
    if let Some((identifier, sequence)) = current {
        records.push(ProteinRecord::new(records.len() + 1, identifier, sequence)?);
    }
    Ok(records)
}
