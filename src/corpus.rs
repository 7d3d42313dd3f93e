//! Lectura del corpus: un fichero `.txt` por consulta, el nombre del fichero
//! como clave del documento.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::SourceDocument;

/// Documento que no se pudo cargar y motivo.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Corpus {
    pub documents: Vec<SourceDocument>,
    pub skipped: Vec<SkippedFile>,
}

/// Lee todos los `.txt` del directorio (sin recursión), ordenados por nombre.
///
/// El contenido se recorta a `max_chars` caracteres. Un directorio inexistente
/// es un error; un fichero ilegible o vacío sólo se omite.
pub fn load_corpus(dir: &Path, max_chars: usize) -> Result<Corpus> {
    if !dir.is_dir() {
        return Err(Error::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "la ruta no es un directorio",
            ),
        });
    }

    let mut corpus = Corpus::default();
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(dir).to_path_buf();
                warn!("No se pudo recorrer {}: {err}. Se omite.", path.display());
                corpus.skipped.push(SkippedFile {
                    path,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let is_txt = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if is_txt && entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    for path in paths {
        match read_document(&path, max_chars) {
            Ok(Some(doc)) => corpus.documents.push(doc),
            Ok(None) => {
                warn!("Fichero vacío, se omite: {}", path.display());
                corpus.skipped.push(SkippedFile {
                    path,
                    reason: "fichero vacío".into(),
                });
            }
            Err(err) => {
                warn!("{err}. Se omite.");
                corpus.skipped.push(SkippedFile {
                    path,
                    reason: err.to_string(),
                });
            }
        }
    }

    info!(
        "Corpus {}: {} documentos leídos, {} omitidos.",
        dir.display(),
        corpus.documents.len(),
        corpus.skipped.len()
    );
    Ok(corpus)
}

fn read_document(path: &Path, max_chars: usize) -> Result<Option<SourceDocument>> {
    let bytes = fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = decode_text(&bytes).ok_or_else(|| Error::Decode {
        path: path.to_path_buf(),
    })?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    Ok(Some(SourceDocument::new(filename, truncate_chars(text, max_chars))))
}

/// UTF-8 (sin BOM) y, si no es válido, Windows-1252 / Latin-1.
/// Devuelve `None` para contenido binario.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.to_string());
    }
    if bytes.contains(&0) {
        return None;
    }
    Some(bytes.iter().map(|&b| decode_cp1252(b)).collect())
}

fn decode_cp1252(byte: u8) -> char {
    // Sólo el rango 0x80..=0x9F difiere de Latin-1.
    const HIGH: [char; 32] = [
        '€', '\u{81}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{8D}', 'Ž',
        '\u{8F}', '\u{90}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\u{9D}',
        'ž', 'Ÿ',
    ];
    match byte {
        0x80..=0x9F => HIGH[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

/// Recorta a `max_chars` caracteres respetando los límites UTF-8.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_fallback_decodes_accents() {
        let bytes = b"fi\xe8vre et toux";
        assert_eq!(decode_text(bytes).unwrap(), "fièvre et toux");
    }

    #[test]
    fn cp1252_specials_are_mapped() {
        assert_eq!(decode_text(b"\x93ok\x94 \x80").unwrap(), "“ok” €");
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(decode_text("\u{feff}hola".as_bytes()).unwrap(), "hola");
    }

    #[test]
    fn binary_content_is_rejected() {
        assert!(decode_text(&[0xff, 0x00, 0xfe]).is_none());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("fièvre", 3), "fiè");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
