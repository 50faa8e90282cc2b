/// Capture-time extraction from EXIF
///
/// Walks JPEG marker segments to the Exif APP1 block, then the TIFF
/// structure inside it, looking for DateTimeOriginal (0x9003). Any problem
/// along the way yields the file's last-modified time instead: this never
/// fails outward.

use chrono::NaiveDateTime;

const SOI: [u8; 2] = [0xFF, 0xD8];
const MARKER_APP1: u8 = 0xE1;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;

const TIFF_MAGIC: u16 = 0x002A;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
const IFD_ENTRY_SIZE: usize = 12;
const DATE_TIME_LEN: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// Capture instant in epoch milliseconds, or `last_modified` when the bytes
/// carry no usable DateTimeOriginal.
pub fn capture_time(bytes: &[u8], mime_type: &str, last_modified: i64) -> i64 {
    if !is_jpeg(mime_type) {
        return last_modified;
    }

    match date_time_original(bytes) {
        Some(millis) => millis,
        None => {
            tracing::debug!(len = bytes.len(), "No EXIF capture time, using last-modified");
            last_modified
        }
    }
}

fn is_jpeg(mime_type: &str) -> bool {
    mime_type.eq_ignore_ascii_case("image/jpeg") || mime_type.eq_ignore_ascii_case("image/jpg")
}

/// Scan marker segments for the Exif APP1 block
fn date_time_original(data: &[u8]) -> Option<i64> {
    if !data.starts_with(&SOI) {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }

        let marker = data[pos + 1];
        if marker == 0xFF {
            // Fill byte before the real marker
            pos += 1;
            continue;
        }
        if marker == MARKER_SOS || marker == MARKER_EOI {
            return None;
        }

        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if length < 2 {
            return None;
        }
        let body_start = pos + 4;
        let segment_end = pos + 2 + length;
        if segment_end > data.len() {
            // Truncated by the head limit
            return None;
        }

        let body = &data[body_start..segment_end];
        if marker == MARKER_APP1 && body.starts_with(b"Exif") {
            // Signature plus two padding bytes
            return body.get(6..).and_then(parse_tiff);
        }

        pos = segment_end;
    }

    None
}

fn parse_tiff(tiff: &[u8]) -> Option<i64> {
    let order = match tiff.get(0..2)? {
        [0x49, 0x49] => ByteOrder::Little,
        [0x4D, 0x4D] => ByteOrder::Big,
        _ => return None,
    };

    if read_u16(tiff, 2, order)? != TIFF_MAGIC {
        return None;
    }

    let ifd0 = read_u32(tiff, 4, order)? as usize;
    if ifd0 < 8 {
        return None;
    }

    if let Some(offset) = find_tag(tiff, ifd0, TAG_DATE_TIME_ORIGINAL, order) {
        return read_date_time(tiff, offset);
    }

    // Cameras usually keep DateTimeOriginal in the Exif sub-IFD
    let exif_ifd = find_tag(tiff, ifd0, TAG_EXIF_IFD_POINTER, order)? as usize;
    if exif_ifd < 8 {
        return None;
    }
    let offset = find_tag(tiff, exif_ifd, TAG_DATE_TIME_ORIGINAL, order)?;
    read_date_time(tiff, offset)
}

/// Value/offset field of the first entry with `tag` in the IFD at `ifd`
fn find_tag(tiff: &[u8], ifd: usize, tag: u16, order: ByteOrder) -> Option<u32> {
    let count = read_u16(tiff, ifd, order)? as usize;

    for i in 0..count {
        let entry = ifd + 2 + i * IFD_ENTRY_SIZE;
        if entry + IFD_ENTRY_SIZE > tiff.len() {
            return None;
        }
        if read_u16(tiff, entry, order)? == tag {
            return read_u32(tiff, entry + 8, order);
        }
    }

    None
}

/// Read `YYYY:MM:DD HH:MM:SS` at `offset` (relative to the TIFF header)
fn read_date_time(tiff: &[u8], offset: u32) -> Option<i64> {
    let start = offset as usize;
    let raw = tiff.get(start..start + DATE_TIME_LEN)?;
    let text = std::str::from_utf8(raw).ok()?;
    parse_exif_date_time(text)
}

/// EXIF writes dates with colons; swap them for dashes before parsing.
/// The value has no zone, so it is taken as UTC.
pub fn parse_exif_date_time(text: &str) -> Option<i64> {
    let normalized = text.replacen(':', "-", 2);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn read_u16(data: &[u8], pos: usize, order: ByteOrder) -> Option<u16> {
    let bytes: [u8; 2] = data.get(pos..pos + 2)?.try_into().ok()?;
    Some(match order {
        ByteOrder::Little => u16::from_le_bytes(bytes),
        ByteOrder::Big => u16::from_be_bytes(bytes),
    })
}

fn read_u32(data: &[u8], pos: usize, order: ByteOrder) -> Option<u32> {
    let bytes: [u8; 4] = data.get(pos..pos + 4)?.try_into().ok()?;
    Some(match order {
        ByteOrder::Little => u32::from_le_bytes(bytes),
        ByteOrder::Big => u32::from_be_bytes(bytes),
    })
}
