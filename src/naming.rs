//! Safe, deterministic local filenames for catalogue assets.
//!
//! The extension comes from the media type when the URL has none, because
//! servers label content more reliably than they name it. The stem comes from
//! the asset title when there is one, because titles are readable.
use crate::catalog::Asset;
use crate::error::SyncError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use url::Url;

const FALLBACK_FILENAME: &str = "download";

/// Resolves the asset URL and the filename to store it under.
pub fn prepare_download(asset: &Asset) -> Result<(Url, PathBuf), SyncError> {
    let url = Url::parse(&asset.href).map_err(|_| SyncError::InvalidUrl(asset.href.clone()))?;

    let base_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or(FALLBACK_FILENAME);
    let base = Path::new(base_name);

    let extension = base
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .or_else(|| {
            asset
                .media_type
                .as_deref()
                .and_then(extension_for_media_type)
                .map(str::to_owned)
        })
        .unwrap_or_default();

    let url_stem = base
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(FALLBACK_FILENAME);

    let stem = asset
        .title
        .as_deref()
        .map(sanitize_title)
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| url_stem.to_owned());

    Ok((url, PathBuf::from(format!("{stem}{extension}"))))
}

/// Geospatial types first, then a general MIME table. Parameters such as
/// `; application=geotiff` are ignored.
pub fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    let mime = media_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if mime == "application/geo+json" {
        return Some(".geojson");
    }
    if mime.starts_with("image/tiff") {
        return Some(".tif");
    }

    match mime.as_str() {
        "application/json" => Some(".json"),
        "application/xml" | "text/xml" => Some(".xml"),
        "text/plain" => Some(".txt"),
        "text/csv" => Some(".csv"),
        "text/html" => Some(".html"),
        "application/pdf" => Some(".pdf"),
        "application/zip" => Some(".zip"),
        "application/gzip" => Some(".gz"),
        "application/x-netcdf" | "application/netcdf" => Some(".nc"),
        "application/x-hdf5" => Some(".h5"),
        "application/vnd.las" => Some(".las"),
        "application/vnd.laszip" => Some(".laz"),
        "application/geopackage+sqlite3" => Some(".gpkg"),
        "application/vnd.google-earth.kml+xml" => Some(".kml"),
        "application/vnd.google-earth.kmz" => Some(".kmz"),
        "application/x-parquet" | "application/vnd.apache.parquet" => Some(".parquet"),
        "image/jpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/jp2" => Some(".jp2"),
        "image/svg+xml" => Some(".svg"),
        "video/mp4" => Some(".mp4"),
        _ => None,
    }
}

/// Makes an asset title usable as a filename stem on every common filesystem.
pub fn sanitize_title(title: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| {
        Regex::new(r"\s+").expect("Regex pattern should always compile")
    });

    let cleaned: String = title
        .replace('<', "under")
        .replace('>', "over")
        .chars()
        .filter(|c| !matches!(c, ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();

    whitespace.replace_all(&cleaned, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(href: &str, media_type: Option<&str>, title: Option<&str>) -> Asset {
        Asset {
            href: href.to_string(),
            media_type: media_type.map(str::to_string),
            title: title.map(str::to_string),
            roles: vec![],
        }
    }

    #[test]
    fn test_url_filename_is_kept() {
        let (url, filename) =
            prepare_download(&asset("https://www.example.com/foobar/bazquux1.tif?one=1&two=2", None, None))
                .unwrap();
        assert_eq!(url.as_str(), "https://www.example.com/foobar/bazquux1.tif?one=1&two=2");
        assert_eq!(filename, PathBuf::from("bazquux1.tif"));
    }

    #[test]
    fn test_extension_guessed_from_media_type() {
        let (_, tif) =
            prepare_download(&asset("https://store.example.com/image", Some("image/tiff; application=geotiff"), None))
                .unwrap();
        assert_eq!(tif, PathBuf::from("image.tif"));

        let (_, geojson) =
            prepare_download(&asset("https://store.example.com/layer", Some("application/geo+json"), None))
                .unwrap();
        assert_eq!(geojson, PathBuf::from("layer.geojson"));

        let (_, png) =
            prepare_download(&asset("https://store.example.com/thumb", Some("image/png"), None)).unwrap();
        assert_eq!(png, PathBuf::from("thumb.png"));

        let (_, unknown) =
            prepare_download(&asset("https://store.example.com/blob", Some("application/x-mystery"), None))
                .unwrap();
        assert_eq!(unknown, PathBuf::from("blob"));
    }

    #[test]
    fn test_url_extension_wins_over_media_type() {
        let (_, filename) =
            prepare_download(&asset("https://fake.com/metadata.json", Some("image/tiff"), None)).unwrap();
        assert_eq!(filename, PathBuf::from("metadata.json"));
    }

    #[test]
    fn test_title_replaces_stem() {
        let (_, rgb) = prepare_download(&asset(
            "https://fake.com/rgbdownload.tif",
            Some("image/tiff; application=geotiff"),
            Some("RGB"),
        ))
        .unwrap();
        assert_eq!(rgb, PathBuf::from("RGB.tif"));

        let (_, metadata) = prepare_download(&asset(
            "https://fake.com/metadata.json",
            Some("application/json"),
            Some("Metadata"),
        ))
        .unwrap();
        assert_eq!(metadata, PathBuf::from("Metadata.json"));

        let (_, guessed) = prepare_download(&asset(
            "https://fake.com/download",
            Some("image/tiff"),
            Some("Digital Surface Model"),
        ))
        .unwrap();
        assert_eq!(guessed, PathBuf::from("Digital Surface Model.tif"));
    }

    #[test]
    fn test_title_that_sanitizes_to_nothing_keeps_url_stem() {
        let (_, filename) =
            prepare_download(&asset("https://fake.com/scene.tif", None, Some("???"))).unwrap();
        assert_eq!(filename, PathBuf::from("scene.tif"));
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("A<B"), "AunderB");
        assert_eq!(sanitize_title("depth > 2m"), "depth over 2m");
        assert_eq!(sanitize_title(r#"a:b"c/d\e|f?g*h"#), "abcdefgh");
        assert_eq!(sanitize_title("  NDVI \t\n  2023  "), "NDVI 2023");
    }

    #[test]
    fn test_directory_url_falls_back() {
        let (_, filename) =
            prepare_download(&asset("https://fake.com/items/", Some("application/json"), None)).unwrap();
        assert_eq!(filename, PathBuf::from("download.json"));
    }

    #[test]
    fn test_invalid_href() {
        let result = prepare_download(&asset("not a url", None, None));
        assert!(matches!(result, Err(SyncError::InvalidUrl(href)) if href == "not a url"));
    }
}
