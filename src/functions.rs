//! Built-in frame functions
//!
//! A self-contained catalog: synthetic sources, simple RGB pixel
//! processors, and logging/discarding sinks. Camera capture, file I/O,
//! codecs, and display windows belong to the host application, which
//! registers its own functions next to these.
//!
//! Pixel math here assumes 8-bit RGB; that is a property of this catalog,
//! not of the runtime, which never looks at pixel bytes.

use crate::graph::NodeKind;
use crate::lang::{Params, Value};
use crate::runtime::frame::{Frame, PixelFormat};
use crate::runtime::registry::{FunctionRegistry, FunctionSpec, TransformError};
use tracing::{debug, info};

fn param_i64(params: &Params, key: &str, default: i64) -> i64 {
    params.get(key).and_then(Value::as_i64).unwrap_or(default)
}

fn param_u32(params: &Params, key: &str, default: u32) -> u32 {
    param_i64(params, key, default as i64).clamp(1, 1 << 14) as u32
}

fn param_color(params: &Params, key: &str) -> [u8; 3] {
    match params.get(key).and_then(Value::as_array) {
        Some([r, g, b]) => [*r as u8, *g as u8, *b as u8],
        _ => [0, 0, 0],
    }
}

/// Luma approximation on one RGB pixel.
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8
}

fn test_pattern(
    _frame: Option<Frame>,
    seq: u64,
    params: &Params,
) -> Result<Option<Frame>, TransformError> {
    let limit = param_i64(params, "limit", 0);
    if limit > 0 && seq >= limit as u64 {
        return Ok(None);
    }
    let width = param_u32(params, "width", 640);
    let height = param_u32(params, "height", 480);

    // Diagonal gradient scrolling one pixel per frame
    let phase = (seq % 256) as u32;
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    for y in 0..height {
        for x in 0..width {
            let i = ((y * width + x) * 3) as usize;
            pixels[i] = ((x + phase) % 256) as u8;
            pixels[i + 1] = ((y + phase) % 256) as u8;
            pixels[i + 2] = ((x + y) % 256) as u8;
        }
    }
    Ok(Some(Frame::from_pixels(width, height, PixelFormat::Rgb8, pixels)))
}

fn solid(
    _frame: Option<Frame>,
    seq: u64,
    params: &Params,
) -> Result<Option<Frame>, TransformError> {
    let limit = param_i64(params, "limit", 0);
    if limit > 0 && seq >= limit as u64 {
        return Ok(None);
    }
    let width = param_u32(params, "width", 640);
    let height = param_u32(params, "height", 480);
    let [r, g, b] = param_color(params, "color");

    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for _ in 0..(width as usize * height as usize) {
        pixels.extend_from_slice(&[r, g, b]);
    }
    Ok(Some(Frame::from_pixels(width, height, PixelFormat::Rgb8, pixels)))
}

fn expect_frame(frame: Option<Frame>) -> Result<Frame, TransformError> {
    frame.ok_or_else(|| TransformError::Failed("processor invoked without a frame".into()))
}

fn grayscale(
    frame: Option<Frame>,
    _seq: u64,
    _params: &Params,
) -> Result<Option<Frame>, TransformError> {
    let mut frame = expect_frame(frame)?;
    if frame.format() == PixelFormat::Rgb8 {
        let pixels = frame.pixels_mut();
        for px in pixels.chunks_exact_mut(3) {
            let l = luma(px[0], px[1], px[2]);
            px.fill(l);
        }
    }
    Ok(Some(frame))
}

fn invert(
    frame: Option<Frame>,
    _seq: u64,
    _params: &Params,
) -> Result<Option<Frame>, TransformError> {
    let mut frame = expect_frame(frame)?;
    for byte in frame.pixels_mut() {
        *byte = 255 - *byte;
    }
    Ok(Some(frame))
}

fn brightness(
    frame: Option<Frame>,
    _seq: u64,
    params: &Params,
) -> Result<Option<Frame>, TransformError> {
    let amount = param_i64(params, "amount", 0).clamp(-255, 255);
    let mut frame = expect_frame(frame)?;
    for byte in frame.pixels_mut() {
        *byte = (*byte as i64 + amount).clamp(0, 255) as u8;
    }
    Ok(Some(frame))
}

fn threshold(
    frame: Option<Frame>,
    _seq: u64,
    params: &Params,
) -> Result<Option<Frame>, TransformError> {
    let level = param_i64(params, "level", 128).clamp(0, 255) as u8;
    let mut frame = expect_frame(frame)?;
    match frame.format() {
        PixelFormat::Rgb8 => {
            for px in frame.pixels_mut().chunks_exact_mut(3) {
                let v = if luma(px[0], px[1], px[2]) >= level { 255 } else { 0 };
                px.fill(v);
            }
        }
        _ => {
            for byte in frame.pixels_mut() {
                *byte = if *byte >= level { 255 } else { 0 };
            }
        }
    }
    Ok(Some(frame))
}

fn passthrough(
    frame: Option<Frame>,
    _seq: u64,
    _params: &Params,
) -> Result<Option<Frame>, TransformError> {
    Ok(frame)
}

fn null_sink(
    _frame: Option<Frame>,
    _seq: u64,
    _params: &Params,
) -> Result<Option<Frame>, TransformError> {
    Ok(None)
}

fn count_sink(
    frame: Option<Frame>,
    seq: u64,
    params: &Params,
) -> Result<Option<Frame>, TransformError> {
    if let Some(frame) = frame {
        let label = params
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("count");
        debug!("[{}] {}", label, frame);
        if (seq + 1) % 30 == 0 {
            info!("[{}] {} frames", label, seq + 1);
        }
    }
    Ok(None)
}

/// Register the catalog into a registry. Called once for the process-wide
/// default registry.
pub fn register_builtins(registry: &mut FunctionRegistry) {
    registry.register(
        "test-pattern",
        FunctionSpec::new(NodeKind::Source, test_pattern)
            .with_default("width", Value::Int(640))
            .with_default("height", Value::Int(480))
            .with_default("limit", Value::Int(0))
            .with_description("synthetic moving gradient"),
    );
    registry.register(
        "solid",
        FunctionSpec::new(NodeKind::Source, solid)
            .with_default("width", Value::Int(640))
            .with_default("height", Value::Int(480))
            .with_default("color", Value::Array(vec![0.0, 0.0, 0.0]))
            .with_default("limit", Value::Int(0))
            .with_description("constant color frames"),
    );

    let gray = FunctionSpec::new(NodeKind::Processor, grayscale)
        .with_description("convert RGB to grayscale");
    registry.register("grayscale", gray.clone());
    registry.register("gray", gray);
    registry.register(
        "invert",
        FunctionSpec::new(NodeKind::Processor, invert).with_description("invert pixel values"),
    );
    registry.register(
        "brightness",
        FunctionSpec::new(NodeKind::Processor, brightness)
            .with_default("amount", Value::Int(0))
            .with_description("add a constant to every channel"),
    );
    registry.register(
        "threshold",
        FunctionSpec::new(NodeKind::Processor, threshold)
            .with_default("level", Value::Int(128))
            .with_description("binary threshold on luma"),
    );
    registry.register(
        "passthrough",
        FunctionSpec::new(NodeKind::Processor, passthrough).with_description("forward unchanged"),
    );

    registry.register(
        "null",
        FunctionSpec::new(NodeKind::Sink, null_sink).with_description("discard frames"),
    );
    registry.register(
        "count",
        FunctionSpec::new(NodeKind::Sink, count_sink)
            .with_default("label", Value::Str("count".into()))
            .with_description("log a running frame count"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(pixels: &[u8], width: u32, height: u32) -> Frame {
        Frame::from_pixels(width, height, PixelFormat::Rgb8, pixels.to_vec())
    }

    #[test]
    fn test_pattern_respects_limit() {
        let mut params = Params::new();
        params.insert("limit".into(), Value::Int(2));
        params.insert("width".into(), Value::Int(4));
        params.insert("height".into(), Value::Int(4));

        assert!(test_pattern(None, 0, &params).unwrap().is_some());
        assert!(test_pattern(None, 1, &params).unwrap().is_some());
        assert!(test_pattern(None, 2, &params).unwrap().is_none());
    }

    #[test]
    fn test_pattern_animates() {
        let mut params = Params::new();
        params.insert("width".into(), Value::Int(8));
        params.insert("height".into(), Value::Int(8));
        let a = test_pattern(None, 0, &params).unwrap().unwrap();
        let b = test_pattern(None, 1, &params).unwrap().unwrap();
        assert_ne!(a.pixels(), b.pixels());
    }

    #[test]
    fn test_solid_color() {
        let mut params = Params::new();
        params.insert("width".into(), Value::Int(2));
        params.insert("height".into(), Value::Int(1));
        params.insert("color".into(), Value::Array(vec![10.0, 20.0, 30.0]));
        let frame = solid(None, 0, &params).unwrap().unwrap();
        assert_eq!(frame.pixels(), &[10, 20, 30, 10, 20, 30]);
    }

    #[test]
    fn test_grayscale_flattens_channels() {
        let frame = rgb(&[255, 0, 0, 0, 255, 0], 2, 1);
        let out = grayscale(Some(frame), 0, &Params::new()).unwrap().unwrap();
        let px = out.pixels();
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], px[4]);
    }

    #[test]
    fn test_invert() {
        let frame = rgb(&[0, 128, 255], 1, 1);
        let out = invert(Some(frame), 0, &Params::new()).unwrap().unwrap();
        assert_eq!(out.pixels(), &[255, 127, 0]);
    }

    #[test]
    fn test_brightness_saturates() {
        let mut params = Params::new();
        params.insert("amount".into(), Value::Int(100));
        let frame = rgb(&[200, 10, 0], 1, 1);
        let out = brightness(Some(frame), 0, &params).unwrap().unwrap();
        assert_eq!(out.pixels(), &[255, 110, 100]);
    }

    #[test]
    fn test_threshold() {
        let mut params = Params::new();
        params.insert("level".into(), Value::Int(128));
        let frame = rgb(&[255, 255, 255, 5, 5, 5], 2, 1);
        let out = threshold(Some(frame), 0, &params).unwrap().unwrap();
        assert_eq!(out.pixels(), &[255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_processor_without_frame_is_a_fault() {
        assert!(grayscale(None, 0, &Params::new()).is_err());
    }
}
