//! Desktop camera window: camera selection and the GStreamer capture loop

#[cfg(feature = "live")]
pub mod processor;

#[cfg(feature = "live")]
pub use processor::LiveProcessor;

use std::io::{BufRead, Write};
use tracing::warn;

pub const CAMERA_PROMPT: &str = "Ingresa el número de cámara (0=PC, 1=móvil, etc): ";

/// Parse a camera index typed by the user
pub fn parse_camera_index(input: &str) -> Option<u32> {
    input.trim().parse().ok()
}

/// Ask for a camera index; anything unparsable selects camera 0
pub fn prompt_camera_index<R: BufRead, W: Write>(mut input: R, mut output: W) -> u32 {
    if let Err(e) = write!(output, "{}", CAMERA_PROMPT).and_then(|_| output.flush()) {
        warn!("Could not write camera prompt: {}", e);
    }

    let mut line = String::new();
    if let Err(e) = input.read_line(&mut line) {
        warn!("Could not read camera index: {}, using camera 0", e);
        return 0;
    }

    parse_camera_index(&line).unwrap_or_else(|| {
        warn!("Invalid camera index {:?}, using camera 0", line.trim());
        0
    })
}

/// Configured camera, otherwise ask on the terminal
pub fn resolve_camera(configured: Option<u32>) -> u32 {
    match configured {
        Some(index) => index,
        None => {
            let stdin = std::io::stdin();
            prompt_camera_index(stdin.lock(), std::io::stdout())
        }
    }
}

/// GStreamer source element for a camera index on this platform
pub fn camera_source(index: u32) -> String {
    if cfg!(target_os = "linux") {
        format!("v4l2src device=/dev/video{}", index)
    } else if cfg!(target_os = "macos") {
        format!("avfvideosrc device-index={}", index)
    } else {
        "autovideosrc".to_string()
    }
}

/// Capture pipeline delivering RGB frames of the given size to an appsink named `sink`
pub fn capture_description(source: &str, width: u32, height: u32) -> String {
    format!(
        "{} ! videoconvert ! videoscale ! video/x-raw,format=RGB,width={},height={} ! appsink name=sink max-buffers=1 drop=true sync=false",
        source, width, height
    )
}

/// Display pipeline fed through an appsrc named `src`
pub fn display_description() -> &'static str {
    "appsrc name=src ! videoconvert ! autovideosink sync=false"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_camera_index() {
        assert_eq!(parse_camera_index("1\n"), Some(1));
        assert_eq!(parse_camera_index("  0 "), Some(0));
        assert_eq!(parse_camera_index("movil"), None);
        assert_eq!(parse_camera_index("-1"), None);
        assert_eq!(parse_camera_index(""), None);
    }

    #[test]
    fn test_prompt_reads_index() {
        let mut output = Vec::new();
        let index = prompt_camera_index(Cursor::new("2\n"), &mut output);

        assert_eq!(index, 2);
        assert_eq!(String::from_utf8(output).unwrap(), CAMERA_PROMPT);
    }

    #[test]
    fn test_prompt_falls_back_to_zero() {
        assert_eq!(prompt_camera_index(Cursor::new("abc\n"), Vec::new()), 0);
        assert_eq!(prompt_camera_index(Cursor::new(""), Vec::new()), 0);
    }

    #[test]
    fn test_configured_camera_skips_prompt() {
        assert_eq!(resolve_camera(Some(3)), 3);
    }

    #[test]
    fn test_camera_source() {
        let source = camera_source(1);
        if cfg!(target_os = "linux") {
            assert_eq!(source, "v4l2src device=/dev/video1");
        } else if cfg!(target_os = "macos") {
            assert_eq!(source, "avfvideosrc device-index=1");
        } else {
            assert_eq!(source, "autovideosrc");
        }
    }

    #[test]
    fn test_capture_description() {
        let description = capture_description("autovideosrc", 640, 480);
        assert!(description.starts_with("autovideosrc ! "));
        assert!(description.contains("format=RGB,width=640,height=480"));
        assert!(description.contains("appsink name=sink"));
    }
}
