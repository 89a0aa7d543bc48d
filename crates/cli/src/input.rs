// Input item reading and selection

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

/// Read items from a file, or from stdin when no path is given
pub fn read_items(path: Option<&Path>) -> Result<Vec<String>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            parse_items(BufReader::new(file))
                .with_context(|| format!("failed to read input file {}", path.display()))
        }
        None => parse_items(io::stdin().lock()).context("failed to read items from stdin"),
    }
}

/// One item per line; surrounding whitespace trimmed, blank lines skipped
pub fn parse_items(reader: impl BufRead) -> io::Result<Vec<String>> {
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let item = line.trim();
        if !item.is_empty() {
            items.push(item.to_string());
        }
    }
    Ok(items)
}

/// Apply `--start` (1-based, inclusive) and `--first`
pub fn select(items: Vec<String>, start: Option<usize>, first: bool) -> Vec<String> {
    let skip = start.map(|s| s.saturating_sub(1)).unwrap_or(0);
    let take = if first { 1 } else { usize::MAX };
    items.into_iter().skip(skip).take(take).collect()
}
