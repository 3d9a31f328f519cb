use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Response;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default size of the chunks yielded by a [`ByteStream`].
pub const STREAM_CHUNK_SIZE: usize = 100 * 1024;

/// Lazy, single-pass sequence of body chunks.
///
/// Iterating yields `Ok(chunk)` until the body is exhausted. When the server announced a
/// length and the body ends short, the last item is [`Error::Truncated`]. Nothing is
/// yielded after an error.
pub struct ByteStream<R = Response> {
    reader: R,
    url: String,
    expected: Option<u64>,
    received: u64,
    chunk_size: usize,
    progress: bool,
    pending: Option<io::Error>,
    done: bool,
}

impl ByteStream<Response> {
    pub(crate) fn from_response(resp: Response, progress: bool) -> Self {
        let url = resp.url().to_string();
        let expected = resp.content_length();
        ByteStream::new(resp, url, expected).with_progress(progress)
    }
}

impl<R: Read> ByteStream<R> {
    /// Wraps any reader; `expected` is the announced body length, if known.
    pub fn new(reader: R, url: impl Into<String>, expected: Option<u64>) -> Self {
        Self {
            reader,
            url: url.into(),
            expected,
            received: 0,
            chunk_size: STREAM_CHUNK_SIZE,
            progress: false,
            pending: None,
            done: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Show a progress bar on stderr while [`ByteStream::save`] runs.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// URL the bytes come from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Length announced by the server, if any.
    pub fn expected_len(&self) -> Option<u64> {
        self.expected
    }

    /// Bytes yielded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Writes every chunk to `path`, creating parent directories as needed.
    ///
    /// The file is closed on every exit path. On error, whatever was written stays on disk.
    pub fn save(mut self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
        }

        let pb = self.progress.then(|| progress_bar(self.expected));
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut out = BufWriter::new(file);

        while let Some(chunk) = self.next() {
            let chunk = chunk?;
            out.write_all(&chunk).map_err(|e| Error::io(path, e))?;
            if let Some(pb) = &pb {
                pb.inc(chunk.len() as u64);
            }
        }
        out.flush().map_err(|e| Error::io(path, e))?;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        debug!(url = %self.url, path = %path.display(), bytes = self.received, "download saved");
        Ok(path.to_path_buf())
    }

    /// Reads the remaining body into memory.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for chunk in self {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }

    fn fill_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Hand out what arrived before the failure; the error surfaces next time.
                Err(e) if filled > 0 => {
                    self.pending = Some(e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

impl<R: Read> Iterator for ByteStream<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let read = match self.pending.take() {
            Some(e) => Err(e),
            None => self.fill_chunk(),
        };

        match read {
            Ok(chunk) if chunk.is_empty() => {
                self.done = true;
                match self.expected {
                    Some(expected) if self.received < expected => Some(Err(self.truncated(None))),
                    _ => None,
                }
            }
            Ok(chunk) => {
                self.received += chunk.len() as u64;
                Some(Ok(chunk))
            }
            Err(e) => {
                // reqwest reports a connection dropped mid-body as an io error.
                self.done = true;
                warn!(url = %self.url, error = %e, received = self.received, "download interrupted");
                Some(Err(self.truncated(Some(e))))
            }
        }
    }
}

impl<R> ByteStream<R> {
    fn truncated(&self, source: Option<io::Error>) -> Error {
        Error::Truncated {
            url: self.url.clone(),
            expected: self.expected.unwrap_or(self.received),
            received: self.received,
            source,
        }
    }
}

fn progress_bar(len: Option<u64>) -> ProgressBar {
    match len {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        None => ProgressBar::new_spinner(),
    }
}

/// What to do with files that already exist when extracting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    #[default]
    Replace,
    Skip,
}

/// Extracts a zip archive into `dest`, returning the number of files written.
pub fn extract_zip(archive: &Path, dest: &Path, overwrite: Overwrite) -> Result<usize> {
    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|source| Error::Archive {
        path: archive.to_path_buf(),
        source,
    })?;

    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|source| Error::Archive {
            path: archive.to_path_buf(),
            source,
        })?;

        let Some(rel) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(Error::Archive {
                path: archive.to_path_buf(),
                source: zip::result::ZipError::InvalidArchive(
                    "entry path escapes the destination directory".into(),
                ),
            });
        };
        let out_path = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| Error::io(&out_path, e))?;
            continue;
        }

        if overwrite == Overwrite::Skip && out_path.exists() {
            debug!(path = %out_path.display(), "keeping existing file");
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| Error::io(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| Error::io(&out_path, e))?;
        written += 1;
    }

    Ok(written)
}
