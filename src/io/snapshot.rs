use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use brotli::enc::BrotliEncoderParams;
use brotli::{CompressorWriter, Decompressor};
use serde::{Deserialize, Serialize};

use crate::model::{Content, Group, NodeRecord};

pub const SNAPSHOT_VERSION: &str = "1";

/// Whole-store document persisted by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub groups: Vec<Group>,
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub contents: Vec<Content>,
    pub next_id: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            groups: Vec::new(),
            nodes: Vec::new(),
            contents: Vec::new(),
            next_id: 1,
        }
    }
}

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "br")
}

impl Snapshot {
    /// Writes the snapshot as JSON.
    ///
    /// Brotli compression is enabled when the path ends with `.br`
    /// (e.g. `tabs.json.br`), using quality 6 and a 22-bit window.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;

        let mut writer: Box<dyn Write> = if is_compressed(path) {
            let params = BrotliEncoderParams {
                quality: 6,
                lgwin: 22,
                ..Default::default()
            };
            Box::new(CompressorWriter::with_params(BufWriter::new(file), 4096, &params))
        } else {
            Box::new(BufWriter::new(file))
        };

        serde_json::to_writer_pretty(&mut writer, self).context("Failed to serialize snapshot")?;
        writer.flush().context("Failed to flush snapshot")?;
        Ok(())
    }

    /// Reads a snapshot written by [`Snapshot::save`], decompressing `.br` files.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;

        let mut reader: Box<dyn Read> = if is_compressed(path) {
            Box::new(BufReader::new(Decompressor::new(file, 4096)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
    }
}
