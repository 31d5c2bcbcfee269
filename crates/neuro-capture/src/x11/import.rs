//! Screenshot capture through ImageMagick's `import`.
//!
//! Each frame is written to a temporary PNG and decoded back, so a capture
//! costs a process spawn plus a file round trip: expect tens of
//! milliseconds per frame. `import -window` reads from the X server, so a
//! window covered by another one yields the covering pixels.

use std::ffi::OsStr;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::xdotool::{parse_geometry, XDOTOOL};
use super::{resolve_tool, run_tool, tool_failure};
use crate::decode::{PixelLayout, RawImage};
use crate::error::CaptureError;
use crate::frame::Bounds;
use crate::surface::SurfaceBackend;
use crate::window::WindowHandle;
use crate::{BackendCapabilities, CaptureResult};

const IMPORT: &str = "import";
const TEMP_PREFIX: &str = "neuro-capture-";
const TEMP_SUFFIX: &str = ".png";

/// Screenshot backend that shells out to `xdotool` and `import`.
#[derive(Debug, Clone)]
pub struct ImportBackend {
    xdotool: PathBuf,
    import: PathBuf,
}

impl ImportBackend {
    /// Locate both tools on PATH.
    pub fn new() -> CaptureResult<Self> {
        Ok(Self {
            xdotool: resolve_tool(XDOTOOL)?,
            import: resolve_tool(IMPORT)?,
        })
    }
}

fn window_id(window: &WindowHandle) -> CaptureResult<&str> {
    match window {
        WindowHandle::X11(id) => Ok(id.as_str()),
        other => Err(CaptureError::UnsupportedHandle(other.to_string())),
    }
}

impl SurfaceBackend for ImportBackend {
    type Surface = NamedTempFile;

    fn name(&self) -> &'static str {
        "import"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            captures_obscured: false,
            filesystem_round_trip: true,
        }
    }

    fn window_bounds(&mut self, window: &WindowHandle) -> CaptureResult<Bounds> {
        let id = window_id(window)?;
        let output = run_tool(&self.xdotool, XDOTOOL, ["getwindowgeometry", "--shell", id])?;
        if !output.status.success() {
            return Err(tool_failure(XDOTOOL, id, &output));
        }

        parse_geometry(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            CaptureError::ToolFailed {
                tool: XDOTOOL,
                status: output.status.to_string(),
                stderr: "geometry output missing WIDTH/HEIGHT".to_string(),
            }
        })
    }

    fn acquire(&mut self, _window: &WindowHandle, _bounds: Bounds) -> CaptureResult<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile()?;
        Ok(file)
    }

    fn read(
        &mut self,
        window: &WindowHandle,
        surface: &mut NamedTempFile,
        _bounds: Bounds,
    ) -> CaptureResult<RawImage> {
        let id = window_id(window)?;
        let path = surface.path().to_path_buf();

        let output = run_tool(
            &self.import,
            IMPORT,
            [OsStr::new("-window"), OsStr::new(id), path.as_os_str()],
        )?;
        if !output.status.success() {
            return Err(tool_failure(IMPORT, id, &output));
        }

        // The image is decoded at whatever size import wrote, which may
        // differ from the geometry queried a moment earlier.
        let image = image::open(&path)?.to_rgba8();
        let (width, height) = image.dimensions();
        debug!(window = id, width, height, "Decoded screenshot");

        Ok(RawImage::packed(
            image.into_raw(),
            width,
            height,
            PixelLayout::Rgba,
        ))
    }

    fn release(&mut self, surface: NamedTempFile) {
        if let Err(err) = surface.close() {
            warn!(error = %err, "Failed to remove capture temp file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::surface::SurfaceCapturer;
    #[cfg(unix)]
    use crate::x11::write_script;
    #[cfg(unix)]
    use crate::FrameCapturer;
    #[cfg(unix)]
    use std::path::Path;

    #[cfg(unix)]
    const GEOMETRY: &str = "echo WINDOW=77\necho X=10\necho Y=20\necho WIDTH=4\necho HEIGHT=3";

    #[cfg(unix)]
    fn fake_backend(dir: &Path, import_body: &str) -> ImportBackend {
        ImportBackend {
            xdotool: write_script(dir, "xdotool", GEOMETRY),
            import: write_script(dir, "import", import_body),
        }
    }

    #[test]
    fn test_native_handles_rejected() {
        let err = window_id(&WindowHandle::Native(0x10)).unwrap_err();
        assert!(matches!(err, CaptureError::UnsupportedHandle(_)));
        assert_eq!(window_id(&WindowHandle::X11("42".into())).unwrap(), "42");
    }

    #[test]
    fn test_temp_file_removed_on_release() {
        let mut backend = ImportBackend {
            xdotool: PathBuf::from("xdotool"),
            import: PathBuf::from("import"),
        };
        let window = WindowHandle::X11("1".into());
        let surface = backend.acquire(&window, Bounds::new(0, 0, 1, 1)).unwrap();
        let path = surface.path().to_path_buf();
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with(TEMP_SUFFIX));

        backend.release(surface);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_decodes_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("screen.png");
        image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]))
            .save(&source)
            .unwrap();
        let backend = fake_backend(
            dir.path(),
            &format!("cp \"{}\" \"$3\"", source.display()),
        );

        let mut capturer = SurfaceCapturer::new(backend);
        let frame = capturer.capture(&WindowHandle::X11("77".into())).unwrap();

        assert!(frame.is_valid());
        assert_eq!((frame.width, frame.height), (4, 3));
        assert_eq!(&frame.pixels[..4], &[30, 20, 10, 255]);
        assert_eq!(frame.sequence, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_import_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("import.log");
        let backend = fake_backend(
            dir.path(),
            &format!(
                "echo \"$3\" > \"{}\"\necho 'import: unable to grab mouse' >&2\nexit 1",
                log.display()
            ),
        );

        let mut capturer = SurfaceCapturer::new(backend);
        let err = capturer
            .capture(&WindowHandle::X11("77".into()))
            .unwrap_err();
        match err {
            CaptureError::ToolFailed { tool, stderr, .. } => {
                assert_eq!(tool, IMPORT);
                assert!(stderr.contains("unable to grab mouse"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let written = std::fs::read_to_string(&log).unwrap();
        let temp_path = Path::new(written.trim());
        assert!(temp_path.to_string_lossy().ends_with(TEMP_SUFFIX));
        assert!(!temp_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_vanished_window_is_reported_as_gone() {
        let dir = tempfile::tempdir().unwrap();
        let backend = fake_backend(
            dir.path(),
            "echo \"import: unable to read X window image '$2'\" >&2\nexit 1",
        );

        let mut capturer = SurfaceCapturer::new(backend);
        let err = capturer
            .capture(&WindowHandle::X11("77".into()))
            .unwrap_err();
        assert!(err.is_window_gone());
    }
}
