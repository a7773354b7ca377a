//! Download one image into a directory, named by its image id.
//!
//! Bytes go to `<id>.<ext>.part` first and are renamed into place, so a half-written
//! file never carries a final name. With sniffing on, the final extension comes from
//! the file's magic bytes when they disagree with the URL.

use crate::extract::split_last_segment;
use crate::model::Image;
use crate::reddit::{HttpGet, ScrapeError};
use std::path::{Path, PathBuf};

/// Successful result of [Downloader::download].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A new file was written.
    Saved(PathBuf),
    /// A file for this image id was already on disk; nothing was fetched.
    AlreadyExists(PathBuf),
}

impl DownloadOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DownloadOutcome::Saved(p) | DownloadOutcome::AlreadyExists(p) => p,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Downloader {
    sniff: bool,
}

impl Default for Downloader {
    fn default() -> Self {
        Self { sniff: true }
    }
}

impl Downloader {
    pub fn new(sniff: bool) -> Self {
        Self { sniff }
    }

    /// Download `image` into `directory`.
    ///
    /// Errors are per image: [ScrapeError::UnsupportedAsset] and [ScrapeError::WriteConflict]
    /// mean "skip", anything else means the download failed. The working file is removed
    /// on every error path.
    pub fn download(
        &self,
        http: &mut dyn HttpGet,
        directory: &Path,
        image: &Image,
    ) -> Result<DownloadOutcome, ScrapeError> {
        let unsupported = || ScrapeError::UnsupportedAsset {
            link: image.link.clone(),
        };
        if !image.is_downloadable() {
            return Err(unsupported());
        }
        let (_, ext) = split_last_segment(&image.link).ok_or_else(unsupported)?;
        let assumed_ext = ext.to_ascii_lowercase();

        if let Some(existing) = self.existing_file(directory, &image.image_id, &assumed_ext)? {
            return Ok(DownloadOutcome::AlreadyExists(existing));
        }

        let bytes = http.get_bytes(&image.link)?;
        let detected = sniff_extension(&bytes);
        if bytes.is_empty() || (detected.is_none() && looks_like_text(&bytes)) {
            return Err(ScrapeError::NotMedia {
                url: image.link.clone(),
            });
        }

        let part_path = directory.join(format!("{}.{}.part", image.image_id, assumed_ext));
        if let Err(e) = std::fs::write(&part_path, &bytes) {
            let _ = std::fs::remove_file(&part_path);
            return Err(ScrapeError::io(&part_path, e));
        }

        let final_ext = match detected {
            Some(found) if self.sniff && !same_type(found, &assumed_ext) => found,
            _ => assumed_ext.as_str(),
        };
        let final_path = directory.join(format!("{}.{}", image.image_id, final_ext));
        if final_path.exists() {
            let _ = std::fs::remove_file(&part_path);
            return Err(ScrapeError::WriteConflict { path: final_path });
        }
        if let Err(e) = std::fs::rename(&part_path, &final_path) {
            let _ = std::fs::remove_file(&part_path);
            return Err(ScrapeError::io(&final_path, e));
        }
        Ok(DownloadOutcome::Saved(final_path))
    }

    /// The file already stored for `image_id`: the URL's name first, then (when sniffing
    /// may have renamed it) a same-stem file with an extension sniffing can produce.
    fn existing_file(
        &self,
        directory: &Path,
        image_id: &str,
        assumed_ext: &str,
    ) -> Result<Option<PathBuf>, ScrapeError> {
        let direct = directory.join(format!("{}.{}", image_id, assumed_ext));
        if direct.exists() {
            return Ok(Some(direct));
        }
        if !self.sniff || !directory.exists() {
            return Ok(None);
        }
        let entries = std::fs::read_dir(directory).map_err(|e| ScrapeError::io(directory, e))?;
        for entry in entries {
            let path = entry.map_err(|e| ScrapeError::io(directory, e))?.path();
            let media_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| is_media_extension(e, assumed_ext));
            if media_ext && path.is_file() && path.file_stem().is_some_and(|s| s == image_id) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

/// File extension for known media magic bytes.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        iso_brand_extension(&bytes[8..12])
    } else if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        Some("webm")
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        Some("tiff")
    } else if bytes.starts_with(b"%PDF") {
        Some("pdf")
    } else if bytes.starts_with(b"BM") && bytes.len() >= 14 {
        Some("bmp")
    } else {
        None
    }
}

/// Every extension [sniff_extension] can return.
const SNIFFED_EXTENSIONS: &[&str] = &[
    "jpg", "png", "gif", "webp", "mp4", "mov", "avif", "heic", "webm", "tiff", "pdf", "bmp",
];

/// ISO base media files share the `ftyp` box; the major brand tells them apart.
fn iso_brand_extension(brand: &[u8]) -> Option<&'static str> {
    match brand {
        b"isom" | b"iso2" | b"mp41" | b"mp42" | b"avc1" | b"M4V " => Some("mp4"),
        b"avif" | b"avis" => Some("avif"),
        b"heic" | b"heix" | b"mif1" => Some("heic"),
        b"qt  " => Some("mov"),
        _ => None,
    }
}

fn is_media_extension(ext: &str, assumed: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    same_type(&ext, assumed) || SNIFFED_EXTENSIONS.iter().any(|known| same_type(known, &ext))
}

fn same_type(detected: &str, assumed: &str) -> bool {
    fn normalize(ext: &str) -> &str {
        match ext {
            "jpeg" | "jpe" => "jpg",
            "tif" => "tiff",
            other => other,
        }
    }
    normalize(detected) == normalize(assumed)
}

/// Error pages and API bodies served in place of an image.
fn looks_like_text(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let trimmed = head.trim_start().to_ascii_lowercase();
    trimmed.starts_with("<!doctype html")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<?xml")
        || trimmed.starts_with('{')
        || trimmed.starts_with('[')
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::Author;
    use std::collections::HashMap;

    pub(crate) const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    pub(crate) const JPG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 16, b'J', b'F', b'I', b'F'];

    /// In-memory HTTP: canned bodies by URL, every request recorded.
    #[derive(Default)]
    pub(crate) struct StubHttp {
        pub bodies: HashMap<String, Vec<u8>>,
        pub requests: Vec<String>,
    }

    impl StubHttp {
        pub fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }
    }

    impl HttpGet for StubHttp {
        fn get_bytes(&mut self, url: &str) -> Result<Vec<u8>, ScrapeError> {
            self.requests.push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    pub(crate) fn image(link: &str) -> Image {
        Image {
            post_id: "p1".to_string(),
            image_id: crate::extract::image_id(link),
            author: Author {
                name: "someone".to_string(),
                profile_link: "https://www.reddit.com/user/someone/".to_string(),
            },
            post_link: String::new(),
            link: link.to_string(),
            title: "t".to_string(),
            subreddit: "pics".to_string(),
            category: None,
        }
    }

    #[test]
    fn saves_file_named_by_image_id() -> Result<(), ScrapeError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/xyz789.png";
        let mut http = StubHttp::default().with(link, PNG);
        let outcome = Downloader::default().download(&mut http, dir.path(), &image(link))?;
        assert_eq!(outcome, DownloadOutcome::Saved(dir.path().join("xyz789.png")));
        assert_eq!(std::fs::read(dir.path().join("xyz789.png")).expect("read"), PNG);
        Ok(())
    }

    #[test]
    fn second_download_is_a_no_op_without_fetch() -> Result<(), ScrapeError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/xyz789.png";
        let mut http = StubHttp::default().with(link, PNG);
        let downloader = Downloader::default();
        downloader.download(&mut http, dir.path(), &image(link))?;
        let second = downloader.download(&mut http, dir.path(), &image(link))?;
        assert!(matches!(second, DownloadOutcome::AlreadyExists(_)));
        assert_eq!(http.requests.len(), 1);
        let files = std::fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(files, 1);
        Ok(())
    }

    #[test]
    fn sniffed_type_corrects_extension() -> Result<(), ScrapeError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/abc.png";
        let mut http = StubHttp::default().with(link, JPG);
        let outcome = Downloader::new(true).download(&mut http, dir.path(), &image(link))?;
        assert_eq!(outcome.path(), dir.path().join("abc.jpg"));
        assert!(!dir.path().join("abc.png").exists());
        assert!(!dir.path().join("abc.png.part").exists());

        // A rerun finds the renamed file without fetching again.
        let again = Downloader::new(true).download(&mut http, dir.path(), &image(link))?;
        assert_eq!(again, DownloadOutcome::AlreadyExists(dir.path().join("abc.jpg")));
        assert_eq!(http.requests.len(), 1);
        Ok(())
    }

    #[test]
    fn sniffing_off_keeps_url_extension() -> Result<(), ScrapeError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/abc.png";
        let mut http = StubHttp::default().with(link, JPG);
        let outcome = Downloader::new(false).download(&mut http, dir.path(), &image(link))?;
        assert_eq!(outcome.path(), dir.path().join("abc.png"));
        Ok(())
    }

    #[test]
    fn jpeg_and_jpg_are_the_same_type() -> Result<(), ScrapeError> {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/abc.jpeg";
        let mut http = StubHttp::default().with(link, JPG);
        let outcome = Downloader::new(true).download(&mut http, dir.path(), &image(link))?;
        assert_eq!(outcome.path(), dir.path().join("abc.jpeg"));
        Ok(())
    }

    #[test]
    fn copy_renamed_by_earlier_run_counts_as_existing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/abc.png";
        std::fs::write(dir.path().join("abc.jpg"), b"existing").expect("seed");
        let mut http = StubHttp::default().with(link, JPG);
        let outcome = Downloader::new(true).download(&mut http, dir.path(), &image(link));
        assert!(matches!(outcome, Ok(DownloadOutcome::AlreadyExists(_))));
        assert!(http.requests.is_empty());
    }

    #[test]
    fn conflict_discards_new_copy_and_keeps_existing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/abc.png";
        let mut http = StubHttp::default().with(link, JPG);
        // Not a regular file, so the existing-copy scan passes over it.
        let taken = dir.path().join("abc.jpg");
        std::fs::create_dir(&taken).expect("seed");
        let result = Downloader::new(true).download(&mut http, dir.path(), &image(link));
        match result {
            Err(ScrapeError::WriteConflict { path }) => assert_eq!(path, taken),
            other => panic!("expected WriteConflict, got {:?}", other),
        }
        assert!(taken.is_dir());
        assert!(!dir.path().join("abc.png.part").exists());
        assert!(!dir.path().join("abc.png").exists());
    }

    #[test]
    fn link_without_extension_is_unsupported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut http = StubHttp::default();
        let result = Downloader::default().download(
            &mut http,
            dir.path(),
            &image("https://imgur.com/a/gallery"),
        );
        assert!(matches!(result, Err(ScrapeError::UnsupportedAsset { .. })));
        assert!(http.requests.is_empty());
    }

    #[test]
    fn html_body_is_not_media() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/removed.png";
        let mut http = StubHttp::default().with(link, b"<!DOCTYPE html><html>removed</html>");
        let result = Downloader::default().download(&mut http, dir.path(), &image(link));
        assert!(matches!(result, Err(ScrapeError::NotMedia { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    }

    #[test]
    fn http_failure_leaves_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut http = StubHttp::default();
        let link = "https://i.imgur.com/gone.png";
        let result = Downloader::default().download(&mut http, dir.path(), &image(link));
        assert!(matches!(result, Err(ScrapeError::HttpStatus { status: 404, .. })));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        let link = "https://i.imgur.com/abc.png";
        let mut http = StubHttp::default().with(link, PNG);
        let result = Downloader::new(false).download(&mut http, &missing, &image(link));
        assert!(matches!(result, Err(ScrapeError::Io { .. })));
    }

    #[test]
    fn sniff_table() {
        assert_eq!(sniff_extension(PNG), Some("png"));
        assert_eq!(sniff_extension(JPG), Some("jpg"));
        assert_eq!(sniff_extension(b"GIF89a...."), Some("gif"));
        assert_eq!(sniff_extension(b"RIFF\0\0\0\0WEBPVP8 "), Some("webp"));
        assert_eq!(sniff_extension(b"\0\0\0\x18ftypmp42"), Some("mp4"));
        assert_eq!(sniff_extension(b"hello"), None);
        assert_eq!(sniff_extension(b""), None);
    }

    #[test]
    fn iso_media_is_told_apart_by_major_brand() {
        let cases: &[(&[u8], Option<&str>)] = &[
            (b"\0\0\0\x18ftypisom", Some("mp4")),
            (b"\0\0\0\x18ftypiso2", Some("mp4")),
            (b"\0\0\0\x18ftypmp41", Some("mp4")),
            (b"\0\0\0\x18ftypavc1", Some("mp4")),
            (b"\0\0\0\x18ftypM4V ", Some("mp4")),
            (b"\0\0\0\x1cftypavif", Some("avif")),
            (b"\0\0\0\x1cftypavis", Some("avif")),
            (b"\0\0\0\x18ftypheic", Some("heic")),
            (b"\0\0\0\x18ftypheix", Some("heic")),
            (b"\0\0\0\x18ftypmif1", Some("heic")),
            (b"\0\0\0\x14ftypqt  ", Some("mov")),
            (b"\0\0\0\x18ftypcrx ", None),
            (b"\0\0\0\x18ftyp", None),
        ];
        for (bytes, expected) in cases {
            assert_eq!(sniff_extension(bytes), *expected, "{:?}", bytes);
        }
    }

    #[test]
    fn avif_and_heic_keep_their_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let avif = "https://i.imgur.com/still.avif";
        let heic = "https://i.imgur.com/photo.heic";
        let mut http = StubHttp::default()
            .with(avif, b"\0\0\0\x1cftypavif\0\0\0\0mif1")
            .with(heic, b"\0\0\0\x18ftypheic\0\0\0\0");
        let downloader = Downloader::new(true);
        let saved = downloader.download(&mut http, dir.path(), &image(avif));
        assert_eq!(saved.expect("avif").path(), dir.path().join("still.avif"));
        let saved = downloader.download(&mut http, dir.path(), &image(heic));
        assert_eq!(saved.expect("heic").path(), dir.path().join("photo.heic"));
    }

    #[test]
    fn unknown_brand_keeps_url_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/clip.mp4";
        let mut http = StubHttp::default().with(link, b"\0\0\0\x18ftypcrx \0\0\0\0");
        let saved = Downloader::new(true).download(&mut http, dir.path(), &image(link));
        assert_eq!(saved.expect("saved").path(), dir.path().join("clip.mp4"));
    }

    #[test]
    fn same_stem_non_media_file_does_not_block_download() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = "https://i.imgur.com/abc.png";
        std::fs::write(dir.path().join("abc.txt"), b"notes").expect("seed");
        std::fs::write(dir.path().join("abc.json"), b"{}").expect("seed");
        let mut http = StubHttp::default().with(link, PNG);
        let outcome = Downloader::new(true).download(&mut http, dir.path(), &image(link));
        assert_eq!(
            outcome.expect("saved"),
            DownloadOutcome::Saved(dir.path().join("abc.png"))
        );
        assert_eq!(http.requests, vec![link.to_string()]);
    }

    #[test]
    fn media_extension_check() {
        assert!(is_media_extension("jpeg", "png"));
        assert!(is_media_extension("MOV", "png"));
        assert!(is_media_extension("xyz", "xyz"));
        assert!(!is_media_extension("txt", "png"));
        assert!(!is_media_extension("part", "png"));
    }
}
