//! Frame type flowing through the graph
//!
//! The pixel buffer is shared behind an `Arc`, so broadcasting a frame to
//! several branches is a pointer copy. Each recipient owns its header and
//! metadata independently. A transform that wants to mutate pixels calls
//! [`Frame::pixels_mut`], which privatizes the buffer first.

use crate::lang::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pixel layout of a frame's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A video frame: shared immutable pixels plus per-recipient metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    data: Arc<[u8]>,
    format: PixelFormat,
    width: u32,
    height: u32,
    /// Position in the producing source's output sequence
    pub seq: u64,
    /// Seconds since the run started, stamped at production time
    pub timestamp: f64,
    /// Opaque side-band values; the core only moves them along
    pub metadata: BTreeMap<String, Value>,
}

impl Frame {
    /// A zero-filled frame of the given dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            data: vec![0u8; len].into(),
            format,
            width,
            height,
            seq: 0,
            timestamp: 0.0,
            metadata: BTreeMap::new(),
        }
    }

    /// Wrap an existing pixel buffer. The buffer length must match
    /// `width * height * channels`.
    pub fn from_pixels(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * format.channels()
        );
        Self {
            data: pixels.into(),
            format,
            width,
            height,
            seq: 0,
            timestamp: 0.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel access. If the buffer is shared with another frame
    /// (after a broadcast), it is copied first so no recipient observes
    /// the mutation.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        if Arc::get_mut(&mut self.data).is_none() {
            self.data = Arc::from(&self.data[..]);
        }
        Arc::get_mut(&mut self.data).unwrap()
    }

    /// Whether this frame still shares its pixel buffer with another.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Builder-style metadata attachment.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set_meta(key, value);
        self
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[{}x{} {:?}, seq={}, t={:.3}s]",
            self.width, self.height, self.format, self.seq, self.timestamp
        )
    }
}
