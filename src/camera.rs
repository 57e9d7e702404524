use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::ImageFormat;
use log::{debug, info, warn};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_BOUNDARY: &str = "frame";

/// Largest part body the decoder buffers.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const SNAPSHOT_WIDTH: u32 = 1024;
const SNAPSHOT_HEIGHT: u32 = 768;

/// Splits a `multipart/x-mixed-replace` body into its JPEG parts.
#[derive(Debug)]
pub struct MjpegDecoder {
    buf: BytesMut,
    boundary: Vec<u8>,
    delimiter: Vec<u8>,
}

impl MjpegDecoder {
    pub fn new(boundary: &str) -> Self {
        let boundary = format!("--{}", boundary).into_bytes();
        let mut delimiter = b"\r\n".to_vec();
        delimiter.extend_from_slice(&boundary);
        MjpegDecoder {
            buf: BytesMut::new(),
            boundary,
            delimiter,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the next complete part body, or `None` until more data arrives.
    /// Parts larger than `MAX_FRAME_LEN` are skipped.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            let start = match find(&self.buf, &self.boundary) {
                Some(start) => start,
                None => {
                    // Keep only what could be the start of a split boundary.
                    let keep = self.boundary.len() - 1;
                    if self.buf.len() > keep {
                        let _ = self.buf.split_to(self.buf.len() - keep);
                    }
                    return None;
                }
            };
            if start > 0 {
                // Preamble, or the CRLF that closed the previous part.
                let _ = self.buf.split_to(start);
            }
            let headers_start = self.boundary.len();
            let headers_len = find(&self.buf[headers_start..], b"\r\n\r\n")?;
            let body_start = headers_start + headers_len + 4;
            let headers = &self.buf[headers_start..headers_start + headers_len];
            let body_end = match content_length(headers) {
                Some(len) if len > MAX_FRAME_LEN => None,
                Some(len) => match body_start.checked_add(len) {
                    Some(end) if self.buf.len() >= end => Some(end),
                    Some(_) => return None,
                    None => None,
                },
                None => match find(&self.buf[body_start..], &self.delimiter) {
                    Some(len) => Some(body_start + len),
                    None if self.buf.len() - body_start > MAX_FRAME_LEN => None,
                    None => return None,
                },
            };
            match body_end {
                Some(end) => {
                    let mut part = self.buf.split_to(end);
                    return Some(part.split_off(body_start).freeze());
                }
                None => {
                    warn!("Skipping oversized camera frame");
                    let _ = self.buf.split_to(body_start);
                }
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(headers: &[u8]) -> Option<usize> {
    String::from_utf8_lossy(headers).split("\r\n").find_map(|line| {
        let idx = line.find(':')?;
        if line[..idx].trim().eq_ignore_ascii_case("content-length") {
            line[idx + 1..].trim().parse().ok()
        } else {
            None
        }
    })
}

/// Extracts the boundary parameter from a multipart content type.
pub fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let param = param.trim();
        let idx = param.find('=')?;
        if param[..idx].trim().eq_ignore_ascii_case("boundary") {
            Some(param[idx + 1..].trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// The camera's live MJPEG feed.
#[derive(Debug)]
pub struct CameraStream {
    response: reqwest::Response,
    decoder: MjpegDecoder,
}

impl CameraStream {
    pub fn new(response: reqwest::Response) -> Self {
        let boundary = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_of)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());
        debug!("Camera stream boundary {:?}", boundary);
        CameraStream {
            response,
            decoder: MjpegDecoder::new(&boundary),
        }
    }

    /// Waits for the next complete JPEG frame. `None` means the stream ended.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(Some(frame));
            }
            match self.response.chunk().await? {
                Some(chunk) => self.decoder.push(&chunk),
                None => return Ok(None),
            }
        }
    }

    pub async fn first_frame(&mut self) -> Result<Bytes> {
        self.next_frame().await?.ok_or(Error::StreamEnded)
    }
}

/// Decodes a JPEG frame, scales it to fit 1024x768 and writes it into `dir`
/// under a random name.
pub fn save_snapshot(frame: &[u8], dir: &Path) -> Result<PathBuf> {
    let image = ImageReader::with_format(Cursor::new(frame), ImageFormat::Jpeg).decode()?;
    let name = format!("{:x}.jpeg", Uuid::new_v4().to_simple());
    let path = dir.join(&name);
    image
        .resize(SNAPSHOT_WIDTH, SNAPSHOT_HEIGHT, FilterType::Triangle)
        .save(&path)?;
    info!("Saved camera snapshot to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};
    use std::fs;

    fn part(body: &[u8]) -> Vec<u8> {
        let mut out = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
        out
    }

    #[test]
    fn frames_are_delimited_by_the_next_boundary() {
        let mut decoder = MjpegDecoder::new("frame");
        let mut stream = part(b"first");
        stream.extend(part(b"second"));
        stream.extend_from_slice(b"--frame\r\n");
        let (a, b) = stream.split_at(13);
        decoder.push(a);
        assert_eq!(decoder.next_frame(), None);
        decoder.push(b);
        assert_eq!(decoder.next_frame().unwrap(), &b"first"[..]);
        assert_eq!(decoder.next_frame().unwrap(), &b"second"[..]);
        assert_eq!(decoder.next_frame(), None);
    }

    #[test]
    fn last_frame_waits_for_its_terminator() {
        let mut decoder = MjpegDecoder::new("frame");
        decoder.push(&part(b"only"));
        assert_eq!(decoder.next_frame(), None);
        decoder.push(b"--frame");
        assert_eq!(decoder.next_frame().unwrap(), &b"only"[..]);
    }

    #[test]
    fn content_length_is_honored() {
        let mut decoder = MjpegDecoder::new("b");
        decoder.push(b"preamble\r\n--b\r\ncontent-length: 6\r\n\r\nab\r\n");
        assert_eq!(decoder.next_frame(), None);
        decoder.push(b"cd\r\n--b\r\nContent-Length: 1\r\n\r\nz\r\n");
        assert_eq!(decoder.next_frame().unwrap(), &b"ab\r\ncd"[..]);
        assert_eq!(decoder.next_frame().unwrap(), &b"z"[..]);
        assert_eq!(decoder.buffered(), 2);
    }

    #[test]
    fn oversized_content_length_is_skipped() {
        let mut decoder = MjpegDecoder::new("frame");
        decoder.push(b"--frame\r\nContent-Length: 18446744073709551615\r\n\r\nxx\r\n--frame\r\n");
        assert_eq!(decoder.next_frame(), None);
        decoder.push(b"Content-Type: image/jpeg\r\n\r\nok\r\n--frame\r\n");
        assert_eq!(decoder.next_frame().unwrap(), &b"ok"[..]);

        let mut decoder = MjpegDecoder::new("frame");
        let header = format!("--frame\r\nContent-Length: {}\r\n\r\n", MAX_FRAME_LEN + 1);
        decoder.push(header.as_bytes());
        decoder.push(&part(b"next"));
        decoder.push(b"--frame");
        assert_eq!(decoder.next_frame().unwrap(), &b"next"[..]);
    }

    #[test]
    fn unterminated_garbage_is_not_kept() {
        let mut decoder = MjpegDecoder::new("frame");
        decoder.push(&[0u8; 4096]);
        assert_eq!(decoder.next_frame(), None);
        assert!(decoder.buffered() < "--frame".len());
    }

    #[test]
    fn boundary_from_content_type() {
        assert_eq!(
            boundary_of("multipart/x-mixed-replace; boundary=frame").as_deref(),
            Some("frame")
        );
        assert_eq!(
            boundary_of("multipart/x-mixed-replace;charset=x; Boundary=\"cam\"").as_deref(),
            Some("cam")
        );
        assert_eq!(boundary_of("image/jpeg"), None);
    }

    #[test]
    fn snapshot_is_scaled_into_the_directory() {
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(16, 8, Rgb([200u8, 10, 10])))
            .write_to(&mut jpeg, ImageOutputFormat::Jpeg(90))
            .unwrap();
        let dir = std::env::temp_dir().join(format!("plate-console-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        let path = save_snapshot(&jpeg, &dir).unwrap();
        assert_eq!(path.parent(), Some(dir.as_path()));
        let (w, h) = image::image_dimensions(&path).unwrap();
        assert!(w <= SNAPSHOT_WIDTH && h <= SNAPSHOT_HEIGHT);
        assert_eq!(w, 2 * h);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn garbage_frame_is_an_image_error() {
        let dir = std::env::temp_dir();
        match save_snapshot(b"not a jpeg", &dir) {
            Err(Error::Image(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
