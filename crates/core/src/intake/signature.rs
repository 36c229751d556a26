//! Magic-number checks per file family.

/// Number of leading bytes needed to recognise any binary family.
pub const SIGNATURE_PROBE_LEN: usize = 16;

/// Groups of extensions that share a binary signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFamily {
    Pdf,
    /// ZIP containers: docx, xlsx, pptx, epub.
    Zip,
    /// OLE2 compound documents: doc, xls, ppt.
    Ole,
    Png,
    Jpeg,
    Gif,
    Tiff,
    Bmp,
    Webp,
    Rtf,
    /// Plain text: html, csv, xml, txt, md.
    Text,
    /// Text that must also parse as JSON.
    Json,
}

/// Map a lowercase extension to its family.
pub fn family_for_extension(extension: &str) -> Option<FileFamily> {
    let family = match extension {
        "pdf" => FileFamily::Pdf,
        "docx" | "xlsx" | "pptx" | "epub" => FileFamily::Zip,
        "doc" | "xls" | "ppt" => FileFamily::Ole,
        "png" => FileFamily::Png,
        "jpg" | "jpeg" => FileFamily::Jpeg,
        "gif" => FileFamily::Gif,
        "tif" | "tiff" => FileFamily::Tiff,
        "bmp" => FileFamily::Bmp,
        "webp" => FileFamily::Webp,
        "rtf" => FileFamily::Rtf,
        "html" | "htm" | "csv" | "xml" | "txt" | "md" => FileFamily::Text,
        "json" => FileFamily::Json,
        _ => return None,
    };
    Some(family)
}

const OLE2: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

impl FileFamily {
    pub fn is_text(&self) -> bool {
        matches!(self, FileFamily::Text | FileFamily::Json)
    }

    /// Check the leading bytes of a binary file. Text families always match
    /// here; their content is checked separately.
    pub fn matches(&self, header: &[u8]) -> bool {
        match self {
            FileFamily::Pdf => header.starts_with(b"%PDF-"),
            FileFamily::Zip => {
                header.starts_with(b"PK\x03\x04")
                    || header.starts_with(b"PK\x05\x06")
                    || header.starts_with(b"PK\x07\x08")
            }
            FileFamily::Ole => header.starts_with(OLE2),
            FileFamily::Png => header.starts_with(PNG),
            FileFamily::Jpeg => header.starts_with(&[0xFF, 0xD8, 0xFF]),
            FileFamily::Gif => header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a"),
            FileFamily::Tiff => header.starts_with(b"II*\0") || header.starts_with(b"MM\0*"),
            FileFamily::Bmp => header.starts_with(b"BM"),
            FileFamily::Webp => {
                header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WEBP"
            }
            FileFamily::Rtf => header.starts_with(b"{\\rtf"),
            FileFamily::Text | FileFamily::Json => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_lookup() {
        assert_eq!(family_for_extension("docx"), Some(FileFamily::Zip));
        assert_eq!(family_for_extension("jpeg"), Some(FileFamily::Jpeg));
        assert_eq!(family_for_extension("json"), Some(FileFamily::Json));
        assert_eq!(family_for_extension("exe"), None);
    }

    #[test]
    fn test_binary_signatures() {
        assert!(FileFamily::Pdf.matches(b"%PDF-1.7\n"));
        assert!(!FileFamily::Pdf.matches(b"<html>"));
        assert!(FileFamily::Zip.matches(b"PK\x03\x04rest"));
        assert!(FileFamily::Ole.matches(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0]));
        assert!(FileFamily::Png.matches(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]));
        assert!(FileFamily::Jpeg.matches(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(FileFamily::Gif.matches(b"GIF89a..."));
        assert!(FileFamily::Tiff.matches(b"MM\0*...."));
        assert!(FileFamily::Webp.matches(b"RIFF\x10\0\0\0WEBPVP8 "));
        assert!(!FileFamily::Webp.matches(b"RIFF\x10\0\0\0WAVE"));
        assert!(FileFamily::Rtf.matches(b"{\\rtf1\\ansi"));
    }

    #[test]
    fn test_short_headers_do_not_match() {
        assert!(!FileFamily::Pdf.matches(b"%PD"));
        assert!(!FileFamily::Webp.matches(b"RIFF"));
    }

    #[test]
    fn test_text_families_accept_anything_here() {
        assert!(FileFamily::Text.matches(&[0, 1, 2]));
        assert!(FileFamily::Json.is_text());
        assert!(!FileFamily::Pdf.is_text());
    }
}
