use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DB_FILE_NAME: &str = "resultd.sqlite3";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/resultd.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
const RECORDS_DIR: &str = "records";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

pub const BUNDLE_FORMAT_V1: &str = "resultd-workspace-v1";
pub const BARE_SQLITE_FORMAT: &str = "bare-sqlite3";

/// A JSON document stored next to the database in a bundle, e.g. the latest
/// record for each PIN.
#[derive(Debug, Clone)]
pub struct BundleDocument {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub db_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_json_entry<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start bundle entry {name}"))?;
    let text = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize bundle entry {name}"))?;
    zip.write_all(text.as_bytes())
        .with_context(|| format!("failed to write bundle entry {name}"))?;
    Ok(())
}

/// Zips the workspace database plus `documents` (under `records/`) into
/// `out_path`. The manifest records the database checksum so imports can
/// verify it.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
    documents: &[BundleDocument],
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("workspace database not found: {}", db_path.to_string_lossy()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": db_sha256,
        "documentCount": documents.len(),
    });
    write_json_entry(&mut zip, MANIFEST_ENTRY, &manifest)?;

    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;

    write_json_entry(
        &mut zip,
        META_WORKSPACE_ENTRY,
        &json!({ "sourceWorkspace": workspace_path.to_string_lossy() }),
    )?;

    for doc in documents {
        write_json_entry(&mut zip, &format!("{RECORDS_DIR}/{}.json", doc.name), &doc.value)?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3 + documents.len(),
        db_sha256,
    })
}

fn read_signature(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = Vec::with_capacity(SQLITE_MAGIC.len());
    Read::by_ref(&mut f)
        .take(SQLITE_MAGIC.len() as u64)
        .read_to_end(&mut sig)
        .context("failed to read file signature")?;
    Ok(sig)
}

/// Writes `bytes` to a temp file beside `dst`, then moves it into place.
fn replace_database(bytes: &[u8], dst: &Path) -> anyhow::Result<()> {
    let tmp = dst.with_extension("sqlite3.importing");
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
    if dst.exists() {
        std::fs::remove_file(dst).with_context(|| {
            format!("failed to remove existing database {}", dst.to_string_lossy())
        })?;
    }
    std::fs::rename(&tmp, dst)
        .with_context(|| format!("failed to move imported database to {}", dst.to_string_lossy()))?;
    Ok(())
}

/// Restores a workspace database from a bundle made by
/// [`export_workspace_bundle`] or from a bare SQLite file.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!("failed to create workspace {}", workspace_path.to_string_lossy())
    })?;
    let dst = workspace_path.join(DB_FILE_NAME);

    let sig = read_signature(in_path)?;
    if sig.as_slice() == SQLITE_MAGIC.as_slice() {
        let bytes = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        replace_database(&bytes, &dst)?;
        return Ok(ImportSummary {
            bundle_format_detected: BARE_SQLITE_FORMAT.to_string(),
            db_sha256: sha256_hex(&bytes),
        });
    }
    if !sig.starts_with(&ZIP_MAGIC) {
        bail!("not a workspace bundle or SQLite database: {}", in_path.to_string_lossy());
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {DB_ENTRY}"))?
        .read_to_end(&mut bytes)
        .context("failed to extract database entry")?;
    let db_sha256 = sha256_hex(&bytes);
    if let Some(expected) = manifest.get("dbSha256").and_then(|v| v.as_str()) {
        if expected != db_sha256 {
            bail!("database checksum mismatch: expected {expected}, got {db_sha256}");
        }
    }
    replace_database(&bytes, &dst)?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        db_sha256,
    })
}

/// Writes `value` as pretty-printed JSON, creating parent directories.
pub fn export_json<T: Serialize>(value: &T, out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let text = serde_json::to_string_pretty(value).context("failed to serialize JSON export")?;
    std::fs::write(out_path, text)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(())
}
