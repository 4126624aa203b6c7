use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::DeckError;

/// The deck container: a zip of XML parts plus binary media, read fully into
/// memory so the writer can re-emit untouched entries byte-identical.
pub struct DeckPackage {
    pub entries: Vec<DeckEntry>,
}

pub struct DeckEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DeckPackage {
    pub fn read(bytes: &[u8]) -> Result<Self, DeckError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| DeckError::Malformed(format!("open container: {e}")))?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| DeckError::Malformed(format!("container entry {i}: {e}")))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| DeckError::Malformed(format!("read entry {}: {e}", file.name())))?;
            entries.push(DeckEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    /// Serialize the container with some parts replaced; every other entry is
    /// written back with its original bytes and metadata.
    pub fn write_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<Vec<u8>, DeckError> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements
                .get(&ent.name)
                .cloned()
                .unwrap_or_else(|| ent.data.clone());
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .map_err(|e| DeckError::WriterIo(format!("add dir {}: {e}", ent.name)))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .map_err(|e| DeckError::WriterIo(format!("start file {}: {e}", ent.name)))?;
                zout.write_all(&data)
                    .map_err(|e| DeckError::WriterIo(format!("write file {}: {e}", ent.name)))?;
            }
        }
        let cursor = zout
            .finish()
            .map_err(|e| DeckError::WriterIo(format!("finish container: {e}")))?;
        Ok(cursor.into_inner())
    }

    pub fn entry(&self, name: &str) -> Option<&DeckEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Slide parts in deck order (`ppt/slides/slide1.xml`, `slide2.xml`, ...).
    pub fn slide_part_names(&self) -> Vec<String> {
        let mut slides: Vec<(usize, String)> = self
            .entries
            .iter()
            .filter_map(|e| {
                let rest = e.name.strip_prefix("ppt/slides/slide")?;
                let num: usize = rest.strip_suffix(".xml")?.parse().ok()?;
                Some((num, e.name.clone()))
            })
            .collect();
        slides.sort_by_key(|(num, _)| *num);
        slides.into_iter().map(|(_, name)| name).collect()
    }

    /// Relationships part for a given part name
    /// (`ppt/slides/slide1.xml` -> `ppt/slides/_rels/slide1.xml.rels`).
    pub fn rels_name_for(part_name: &str) -> String {
        match part_name.rsplit_once('/') {
            Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
            None => format!("_rels/{part_name}.rels"),
        }
    }

    /// Resolve a relationship target relative to the directory of `part_name`.
    pub fn resolve_rel_target(part_name: &str, target: &str) -> String {
        let base = part_name.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        let mut segs: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
        for seg in target.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    segs.pop();
                }
                other => segs.push(other),
            }
        }
        segs.join("/")
    }
}
