//! # Detección de Content-Type
//! src/http/sniff.rs
//!
//! Deduce el tipo de contenido a partir de los primeros bytes de un body,
//! siguiendo (de forma reducida) el algoritmo de "MIME sniffing" del WHATWG.
//! Solo se examinan los primeros `SNIFF_LEN` bytes.

/// Máximo de bytes examinados
pub const SNIFF_LEN: usize = 512;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Firmas HTML: se comparan sin distinguir mayúsculas, después de espacios
/// iniciales, y deben terminar en espacio o '>'
const HTML_SIGNATURES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Firmas binarias exactas
const EXACT_SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x00asm", "application/wasm"),
];

/// Retorna un Content-Type para los bytes dados
///
/// # Ejemplo
/// ```
/// use http_gate::http::sniff::detect_content_type;
///
/// assert_eq!(detect_content_type(b"<html><body>hola</body></html>"), "text/html; charset=utf-8");
/// assert_eq!(detect_content_type(b"hola mundo"), "text/plain; charset=utf-8");
/// ```
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    let first_non_ws = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | 0x0C | b'\r' | b' '))
        .unwrap_or(data.len());
    let trimmed = &data[first_non_ws..];

    for sig in HTML_SIGNATURES {
        if matches_html(trimmed, sig) {
            return "text/html; charset=utf-8";
        }
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    for (sig, ctype) in EXACT_SIGNATURES {
        if data.starts_with(sig) {
            return ctype;
        }
    }

    // BOMs de texto
    if data.starts_with(b"\xEF\xBB\xBF") {
        return TEXT_PLAIN;
    }
    if data.starts_with(b"\xFE\xFF") || data.starts_with(b"\xFF\xFE") {
        return "text/plain; charset=utf-16";
    }

    if data.iter().any(|&b| is_binary_byte(b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn matches_html(data: &[u8], sig: &[u8]) -> bool {
    if data.len() < sig.len() + 1 {
        return false;
    }
    let prefix_matches = data
        .iter()
        .zip(sig.iter())
        .all(|(d, s)| d.to_ascii_uppercase() == *s);
    prefix_matches && matches!(data[sig.len()], b' ' | b'>')
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_with_leading_whitespace() {
        assert_eq!(
            detect_content_type(b"  \n<!doctype html><html></html>"),
            "text/html; charset=utf-8"
        );
    }

    #[test]
    fn test_html_needs_terminator() {
        // "<bold" no es "<b" seguido de espacio o '>'
        assert_eq!(detect_content_type(b"<bold"), TEXT_PLAIN);
    }

    #[test]
    fn test_xml() {
        assert_eq!(detect_content_type(b"<?xml version=\"1.0\"?>"), "text/xml; charset=utf-8");
    }

    #[test]
    fn test_json_is_plain_text() {
        assert_eq!(detect_content_type(br#"{"ok": true}"#), TEXT_PLAIN);
    }

    #[test]
    fn test_binary_signatures() {
        assert_eq!(detect_content_type(b"\x89PNG\x0D\x0A\x1A\x0A...."), "image/png");
        assert_eq!(detect_content_type(b"\x1F\x8B\x08\x00"), "application/x-gzip");
        assert_eq!(detect_content_type(&[0x00, 0x01, 0x02]), OCTET_STREAM);
    }

    #[test]
    fn test_empty_is_plain_text() {
        assert_eq!(detect_content_type(b""), TEXT_PLAIN);
    }
}
