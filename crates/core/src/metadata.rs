//! Writes keywords into the EXIF `XPKeywords` slot of JPEG, PNG and TIFF files.
//!
//! The slot is tag 0x9C9E in IFD0 holding UTF-16LE text. Existing EXIF
//! fields are carried over when the block is rebuilt. JPEG and PNG lose
//! their thumbnail IFD; a TIFF keeps every IFD along with its image data.

use crate::progress::Progress;
use crate::table::{self, TAG_DELIMITER};
use anyhow::Context;
use bytes::Bytes;
use exif::experimental::Writer;
use exif::{Field, In, Reader, Tag, Value};
use img_parts::{DynImage, ImageEXIF};
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const XP_KEYWORDS: Tag = Tag(exif::Context::Tiff, 0x9c9e);

const SUB_IFDS: Tag = Tag(exif::Context::Tiff, 0x014a);

// Offsets and pointers the writer lays out itself, plus SubIFDs, whose
// offsets would go stale once the file is rebuilt.
const LAYOUT_TAGS: [Tag; 10] = [
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::TileOffsets,
    Tag::TileByteCounts,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    SUB_IFDS,
];

const TIFF_LE: [u8; 4] = *b"II*\0";
const TIFF_BE: [u8; 4] = *b"MM\0*";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("no writable keyword slot in {}", .0.display())]
    UnsupportedContainer(PathBuf),
    #[error("malformed EXIF data: {0}")]
    Exif(#[from] exif::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TagSummary {
    pub tagged: usize,
    pub skipped: usize,
}

/// UTF-16LE with a terminating NUL, no byte order mark.
pub fn encode_xp(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

/// Accepts an optional byte order mark and any number of trailing NULs.
pub fn decode_xp(raw: &[u8]) -> String {
    let mut units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    match units.first() {
        Some(0xFEFF) => {
            units.remove(0);
        }
        Some(0xFFFE) => {
            units.remove(0);
            for unit in units.iter_mut() {
                *unit = unit.swap_bytes();
            }
        }
        _ => {}
    }
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16_lossy(&units)
}

/// The value to store given what is already there. An absent or empty
/// existing value counts as nothing to append to.
pub fn merged_keywords(existing: Option<&str>, tags: &str, remove_existing: bool) -> String {
    match existing {
        Some(old) if !remove_existing && !old.is_empty() => {
            format!("{}{}{}", old, TAG_DELIMITER, tags)
        }
        _ => tags.to_string(),
    }
}

fn xp_text(field: &Field) -> Option<String> {
    match &field.value {
        Value::Byte(raw) | Value::Undefined(raw, _) => Some(decode_xp(raw)),
        _ => None,
    }
}

fn is_carried_over(field: &Field) -> bool {
    !(field.tag == XP_KEYWORDS && field.ifd_num == In::PRIMARY)
        && !LAYOUT_TAGS.contains(&field.tag)
        && !matches!(field.value, Value::Unknown(..))
}

/// Where the EXIF block lives in a file.
enum Container {
    /// JPEG or PNG: the block is one segment or chunk among others.
    Segmented(DynImage),
    /// The whole file is the block.
    Tiff(Vec<u8>),
}

fn is_tiff(raw: &[u8]) -> bool {
    raw.starts_with(&TIFF_LE) || raw.starts_with(&TIFF_BE)
}

fn load_container(path: &Path) -> anyhow::Result<Container> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
    if is_tiff(&raw) {
        return Ok(Container::Tiff(raw));
    }
    let image = DynImage::from_bytes(Bytes::from(raw))
        .with_context(|| format!("Failed to parse image {:?}", path))?;
    match image {
        Some(image) => Ok(Container::Segmented(image)),
        None => Err(MetadataError::UnsupportedContainer(path.to_path_buf()).into()),
    }
}

fn parse_exif(container: &Container) -> Result<Option<exif::Exif>, MetadataError> {
    let raw = match container {
        Container::Segmented(image) => match image.exif() {
            Some(raw) => raw.to_vec(),
            None => return Ok(None),
        },
        Container::Tiff(raw) => raw.clone(),
    };
    Ok(Some(Reader::new().read_raw(raw)?))
}

fn current_keywords(exif: Option<&exif::Exif>) -> Option<String> {
    exif.and_then(|e| e.get_field(XP_KEYWORDS, In::PRIMARY))
        .and_then(xp_text)
}

/// Current keyword slot value, `None` when the image carries no such field.
pub fn read_keywords(path: &Path) -> anyhow::Result<Option<String>> {
    let container = load_container(path)?;
    let exif = parse_exif(&container).with_context(|| format!("In {:?}", path))?;
    Ok(current_keywords(exif.as_ref()))
}

/// Image data referenced from one IFD of a TIFF.
enum ImageData<'a> {
    Strips(Vec<&'a [u8]>),
    Tiles(Vec<&'a [u8]>),
}

fn chunks<'a>(
    exif: &'a exif::Exif,
    ifd: In,
    offsets: Tag,
    counts: Tag,
) -> Result<Option<Vec<&'a [u8]>>, MetadataError> {
    let (Some(offsets), Some(counts)) = (exif.get_field(offsets, ifd), exif.get_field(counts, ifd))
    else {
        return Ok(None);
    };
    let (Some(offsets), Some(counts)) = (offsets.value.iter_uint(), counts.value.iter_uint())
    else {
        return Err(exif::Error::InvalidFormat("Image data offsets are not integers").into());
    };
    if offsets.len() != counts.len() {
        return Err(exif::Error::InvalidFormat("Image data offsets and counts differ").into());
    }
    let buf = exif.buf();
    offsets
        .zip(counts)
        .map(|(offset, count)| {
            let start = offset as usize;
            start
                .checked_add(count as usize)
                .and_then(|end| buf.get(start..end))
                .ok_or(MetadataError::Exif(exif::Error::InvalidFormat(
                    "Image data out of bounds",
                )))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn image_data(exif: &exif::Exif, ifd: In) -> Result<Option<ImageData<'_>>, MetadataError> {
    if let Some(strips) = chunks(exif, ifd, Tag::StripOffsets, Tag::StripByteCounts)? {
        return Ok(Some(ImageData::Strips(strips)));
    }
    Ok(chunks(exif, ifd, Tag::TileOffsets, Tag::TileByteCounts)?.map(ImageData::Tiles))
}

fn encode_block(writer: &mut Writer<'_>, little_endian: bool) -> Result<Vec<u8>, MetadataError> {
    let mut block = Cursor::new(Vec::new());
    writer.write(&mut block, little_endian)?;
    Ok(block.into_inner())
}

// JPEG/PNG: only the primary IFD and its Exif, GPS and Interop children.
fn rebuild_segment(exif: Option<&exif::Exif>, keywords: &Field) -> Result<Vec<u8>, MetadataError> {
    let mut writer = Writer::new();
    if let Some(exif) = exif {
        for field in exif
            .fields()
            .filter(|f| f.ifd_num == In::PRIMARY && is_carried_over(f))
        {
            writer.push_field(field);
        }
    }
    writer.push_field(keywords);
    encode_block(&mut writer, exif.map(|e| e.little_endian()).unwrap_or(true))
}

// TIFF: every IFD is rewritten together with the strips or tiles it points to.
fn rebuild_tiff(exif: &exif::Exif, keywords: &Field) -> Result<Vec<u8>, MetadataError> {
    let ifds: BTreeSet<u16> = exif.fields().map(|f| f.ifd_num.0).collect();
    let mut data = Vec::new();
    for ifd in &ifds {
        if let Some(found) = image_data(exif, In(*ifd))? {
            data.push((In(*ifd), found));
        }
    }

    let mut writer = Writer::new();
    for field in exif.fields().filter(|f| is_carried_over(f)) {
        writer.push_field(field);
    }
    writer.push_field(keywords);
    for (ifd, found) in &data {
        match found {
            ImageData::Strips(strips) => writer.set_strips(strips, *ifd),
            ImageData::Tiles(tiles) => writer.set_tiles(tiles, *ifd),
        }
    }
    encode_block(&mut writer, exif.little_endian())
}

/// Stores `tags` in the keyword slot of `path`, replacing or appending to
/// the current value. The file is rewritten in place through a temp file.
pub fn write_keywords(path: &Path, tags: &str, remove_existing: bool) -> anyhow::Result<()> {
    let container = load_container(path)?;
    let exif = parse_exif(&container).with_context(|| format!("In {:?}", path))?;

    let existing = current_keywords(exif.as_ref());
    let merged = merged_keywords(existing.as_deref(), tags, remove_existing);
    debug!(path = ?path, keywords = %merged, "writing keyword slot");

    let keywords = Field {
        tag: XP_KEYWORDS,
        ifd_num: In::PRIMARY,
        value: Value::Byte(encode_xp(&merged)),
    };
    let encoded = match container {
        Container::Segmented(mut image) => {
            let block = rebuild_segment(exif.as_ref(), &keywords)
                .with_context(|| format!("Failed to build EXIF for {:?}", path))?;
            image.set_exif(Some(Bytes::from(block)));
            image.encoder().bytes().to_vec()
        }
        Container::Tiff(_) => {
            let exif = exif
                .as_ref()
                .with_context(|| format!("No IFD in TIFF {:?}", path))?;
            rebuild_tiff(exif, &keywords)
                .with_context(|| format!("Failed to rebuild TIFF {:?}", path))?
        }
    };

    replace_file(path, &encoded)
}

fn replace_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let permissions = std::fs::metadata(path)?.permissions();
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    tmp.write_all(contents)
        .with_context(|| format!("Failed to write {:?}", path))?;
    tmp.flush()?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}

/// Tags every file listed in a results CSV with its keywords.
///
/// Files whose format has no keyword slot are skipped with a warning. Any
/// other failure stops the run; files tagged before it stay tagged.
pub fn apply_tags(
    results_path: &Path,
    remove_existing: bool,
    progress: &mut dyn Write,
) -> anyhow::Result<TagSummary> {
    let grouped = table::read_keywords_by_file(results_path)?;
    info!("Start to insert EXIF tags into {} file(s).", grouped.len());

    let mut summary = TagSummary::default();
    let mut counter = Progress::new(grouped.len());
    for (file, keywords) in &grouped {
        let path = Path::new(file);
        match write_keywords(path, &table::tag_string(keywords), remove_existing) {
            Ok(()) => summary.tagged += 1,
            Err(err) => match err.downcast_ref::<MetadataError>() {
                Some(MetadataError::UnsupportedContainer(_)) => {
                    warn!("Skipping {:?}: format has no keyword slot", path);
                    summary.skipped += 1;
                }
                _ => return Err(err),
            },
        }
        counter.advance(progress)?;
    }
    Ok(summary)
}
