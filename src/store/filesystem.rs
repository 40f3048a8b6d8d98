//! Asset store over a directory of image files.
//!
//! Asset ids and uris are file paths. Creation time comes from EXIF
//! `DateTimeOriginal` when present and the file's mtime otherwise. Deleting
//! moves files into the trash.

use chrono::{DateTime, NaiveDate, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{AssetMetadataExtra, AssetRecord, AssetStore, DeleteOutcome, ListOptions, MediaType, Permission};
use crate::classify::screenshot::SCREENSHOT_SUBTYPE;
use crate::config::ScannerConfig;
use crate::error::AssetStoreError;
use crate::trash::TrashManager;

pub struct FsAssetStore {
    root: PathBuf,
    extensions: Vec<String>,
    favorites: Vec<PathBuf>,
    trash: TrashManager,
}

/// The EXIF fields the engine cares about.
#[derive(Debug, Default)]
struct ExifSummary {
    taken_at: Option<i64>,
    has_gps: bool,
    screenshot: bool,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>, config: &ScannerConfig, trash: TrashManager) -> Self {
        let root = root.into();
        // Relative favorites are taken relative to the library root.
        let favorites = config
            .favorites
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
            .collect();

        Self {
            root,
            extensions: config.image_extensions.iter().map(|e| e.to_lowercase()).collect(),
            favorites,
            trash,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    fn is_favorite(&self, path: &Path) -> bool {
        self.favorites.iter().any(|f| path.starts_with(f))
    }

    /// Resolve an asset id to a file inside the library.
    fn resolve(&self, id: &str) -> Option<PathBuf> {
        let path = PathBuf::from(id);
        (path.starts_with(&self.root) && path.is_file()).then_some(path)
    }

    fn read_record(&self, path: &Path) -> AssetRecord {
        let (width, height) = image::ImageReader::open(path)
            .ok()
            .and_then(|r| r.with_guessed_format().ok())
            .and_then(|r| r.into_dimensions().ok())
            .unwrap_or((0, 0));

        let creation_time = read_exif(path)
            .taken_at
            .or_else(|| modified_millis(path));

        let id = path.to_string_lossy().to_string();
        AssetRecord {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            width,
            height,
            creation_time,
            media_type: MediaType::Photo,
            uri: id.clone(),
            id,
        }
    }
}

impl AssetStore for FsAssetStore {
    fn check_permission(&self) -> Permission {
        match fs::read_dir(&self.root) {
            Ok(_) => Permission::Granted,
            Err(_) => Permission::Denied,
        }
    }

    /// There is nobody to ask; this re-checks readability.
    fn request_permission(&self) -> Permission {
        self.check_permission()
    }

    fn list_assets(&self, options: &ListOptions) -> Result<Vec<AssetRecord>, AssetStoreError> {
        if options.media_type != MediaType::Photo {
            return Ok(Vec::new());
        }
        if !self.root.is_dir() {
            return Err(AssetStoreError::Enumeration(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_image(path))
            .collect();
        paths.sort();

        let mut assets: Vec<AssetRecord> = paths.iter().map(|path| self.read_record(path)).collect();

        // Stable, so ties keep path order.
        assets.sort_by_key(|a| a.creation_time.unwrap_or(i64::MIN));
        assets.truncate(options.limit);

        tracing::debug!(root = %self.root.display(), count = assets.len(), "Listed assets");
        Ok(assets)
    }

    fn get_asset_metadata(&self, id: &str) -> Result<AssetMetadataExtra, AssetStoreError> {
        let path = self.resolve(id).ok_or_else(|| AssetStoreError::MetadataFetch {
            id: id.to_string(),
            reason: "not a file in the library".to_string(),
        })?;

        let size = fs::metadata(&path)
            .map_err(|e| AssetStoreError::MetadataFetch {
                id: id.to_string(),
                reason: e.to_string(),
            })?
            .len();

        let exif = read_exif(&path);
        let mut metadata = AssetMetadataExtra {
            file_size_bytes: Some(size),
            is_favorite: self.is_favorite(&path),
            location_present: exif.has_gps,
            ..AssetMetadataExtra::default()
        };
        if exif.screenshot {
            metadata.platform_subtypes.insert(SCREENSHOT_SUBTYPE.to_string());
        }

        Ok(metadata)
    }

    fn resample(&self, uri: &str, width: u32, height: u32) -> Result<Vec<u8>, AssetStoreError> {
        let resample_err = |reason: String| AssetStoreError::Resample {
            uri: uri.to_string(),
            reason,
        };

        let image = image::open(uri).map_err(|e| resample_err(e.to_string()))?;
        let resized = image.resize_exact(width, height, FilterType::Triangle);

        // JPEG has no alpha channel.
        let mut encoded = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(resized.to_rgb8())
            .write_to(&mut encoded, ImageFormat::Jpeg)
            .map_err(|e| resample_err(e.to_string()))?;

        Ok(encoded.into_inner())
    }

    fn delete_assets(&self, ids: &[String]) -> Result<DeleteOutcome, AssetStoreError> {
        let paths = ids
            .iter()
            .map(|id| {
                self.resolve(id)
                    .ok_or_else(|| AssetStoreError::Delete(format!("{} is not a file in the library", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let moved = self
            .trash
            .move_all_to_trash(&paths)
            .map_err(|e| AssetStoreError::Delete(format!("{:#}", e)))?;

        tracing::info!(count = moved.len(), trash = %self.trash.trash_path().display(), "Moved assets to trash");
        Ok(DeleteOutcome {
            deleted_count: moved.len(),
        })
    }
}

fn modified_millis(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).timestamp_millis())
}

/// Read what EXIF there is; files without EXIF yield the default.
fn read_exif(path: &Path) -> ExifSummary {
    let mut summary = ExifSummary::default();

    let Ok(file) = File::open(path) else {
        return summary;
    };
    let mut bufreader = BufReader::new(file);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut bufreader) else {
        return summary;
    };

    if let Some(field) = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY) {
        if let exif::Value::Ascii(ref values) = field.value {
            summary.taken_at = values
                .first()
                .and_then(|raw| exif::DateTime::from_ascii(raw).ok())
                .and_then(|dt| exif_millis(&dt));
        }
    }

    summary.has_gps = exif
        .get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY)
        .is_some()
        && exif
            .get_field(exif::Tag::GPSLongitude, exif::In::PRIMARY)
            .is_some();

    // iOS tags screenshots with a "Screenshot" user comment.
    if let Some(field) = exif.get_field(exif::Tag::UserComment, exif::In::PRIMARY) {
        summary.screenshot = field
            .display_value()
            .to_string()
            .to_lowercase()
            .contains("screenshot");
    }

    summary
}

/// EXIF times carry no zone; they are read as UTC.
fn exif_millis(dt: &exif::DateTime) -> Option<i64> {
    NaiveDate::from_ymd_opt(i32::from(dt.year), u32::from(dt.month), u32::from(dt.day))?
        .and_hms_opt(u32::from(dt.hour), u32::from(dt.minute), u32::from(dt.second))
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrashConfig;
    use crate::scanner::{ScanOptions, Scanner};
    use image::{Rgb, RgbImage};
    use std::time::{Duration, SystemTime};
    use tempfile::{tempdir, TempDir};

    fn write_png(path: &Path, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]))
            .save(path)
            .unwrap();
    }

    fn set_mtime(path: &Path, secs: u64) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn store(dir: &TempDir, favorites: Vec<PathBuf>) -> FsAssetStore {
        let config = ScannerConfig {
            favorites,
            ..ScannerConfig::default()
        };
        let trash = TrashManager::new(TrashConfig {
            path: dir.path().join("trash"),
            ..TrashConfig::default()
        });
        FsAssetStore::new(dir.path().join("library"), &config, trash)
    }

    #[test]
    fn test_list_assets_sorted_by_time() {
        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        write_png(&library.join("b.png"), 40, 30);
        write_png(&library.join("nested/a.png"), 20, 10);
        fs::write(library.join("notes.txt"), b"not an image").unwrap();
        set_mtime(&library.join("b.png"), 1_000);
        set_mtime(&library.join("nested/a.png"), 2_000);

        let assets = store(&dir, Vec::new()).list_assets(&ListOptions::default()).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].filename, "b.png");
        assert_eq!((assets[0].width, assets[0].height), (40, 30));
        assert_eq!(assets[0].creation_time, Some(1_000_000));
        assert_eq!(assets[1].filename, "a.png");
    }

    #[test]
    fn test_list_respects_limit() {
        let dir = tempdir().unwrap();
        for i in 0..3 {
            write_png(&dir.path().join(format!("library/{}.png", i)), 8, 8);
        }
        let options = ListOptions {
            limit: 2,
            ..ListOptions::default()
        };
        assert_eq!(store(&dir, Vec::new()).list_assets(&options).unwrap().len(), 2);
    }

    #[test]
    fn test_list_matches_extension_case_insensitively() {
        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        write_png(&library.join("shout.png"), 8, 8);
        fs::rename(library.join("shout.png"), library.join("SHOUT.PNG")).unwrap();
        fs::write(library.join("archive.png.bak"), b"not listed").unwrap();

        let assets = store(&dir, Vec::new()).list_assets(&ListOptions::default()).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].filename, "SHOUT.PNG");
        assert_eq!((assets[0].width, assets[0].height), (8, 8));
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let store = store(&dir, Vec::new());
        assert_eq!(store.check_permission(), Permission::Denied);
        assert!(matches!(
            store.list_assets(&ListOptions::default()),
            Err(AssetStoreError::Enumeration(_))
        ));
    }

    #[test]
    fn test_metadata_and_favorites() {
        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        write_png(&library.join("keep/a.png"), 16, 16);
        write_png(&library.join("b.png"), 16, 16);

        let store = store(&dir, vec![PathBuf::from("keep")]);
        let fav = store
            .get_asset_metadata(&library.join("keep/a.png").to_string_lossy())
            .unwrap();
        assert!(fav.is_favorite);
        assert!(!fav.location_present);
        assert_eq!(
            fav.file_size_bytes,
            Some(fs::metadata(library.join("keep/a.png")).unwrap().len())
        );

        let other = store
            .get_asset_metadata(&library.join("b.png").to_string_lossy())
            .unwrap();
        assert!(!other.is_favorite);

        assert!(store.get_asset_metadata("/elsewhere/c.png").is_err());
    }

    #[test]
    fn test_resample_encodes_exact_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library/a.png");
        write_png(&path, 50, 40);

        let bytes = store(&dir, Vec::new())
            .resample(&path.to_string_lossy(), 9, 9)
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (9, 9));
    }

    #[test]
    fn test_delete_moves_to_trash() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("library/a.png");
        let b = dir.path().join("library/b.png");
        write_png(&a, 8, 8);
        write_png(&b, 8, 8);
        let store = store(&dir, Vec::new());

        let outcome = store
            .delete_assets(&[a.to_string_lossy().to_string()])
            .unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert!(!a.exists());
        assert_eq!(fs::read_dir(dir.path().join("trash")).unwrap().count(), 1);

        // All or nothing.
        let err = store
            .delete_assets(&[b.to_string_lossy().to_string(), "/nope.png".to_string()])
            .unwrap_err();
        assert!(matches!(err, AssetStoreError::Delete(_)));
        assert!(b.exists());
    }

    #[test]
    fn test_scan_finds_copied_photo() {
        let dir = tempdir().unwrap();
        let library = dir.path().join("library");
        write_png(&library.join("2023/photo.png"), 64, 48);
        fs::create_dir_all(library.join("backup")).unwrap();
        fs::copy(library.join("2023/photo.png"), library.join("backup/photo.png")).unwrap();

        let store = store(&dir, Vec::new());
        let result = Scanner::new()
            .run_scan(&store, &ScanOptions::default(), None, None)
            .unwrap();

        assert_eq!(result.scanned_count, 2);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.screenshots, 0);
    }
}
