// Client-side capture cycle: idle -> pending -> review | error -> idle.
//
// The phase is one tagged enum rather than a set of booleans, so states
// like "review and error at once" cannot be represented at all.

use std::io::Cursor;

use image::ImageOutputFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Front,
    Back,
}

impl Facing {
    pub fn toggled(self) -> Self {
        match self {
            Facing::Front => Facing::Back,
            Facing::Back => Facing::Front,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending,
    Review,
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("a capture is already in flight")]
    Busy,
    #[error("nothing to reset")]
    NotResolved,
    #[error("frame decode failed: {0}")]
    BadFrame(#[from] image::ImageError),
}

/// Owns the facing choice, the current phase, and the picture under
/// review. One generation request is in flight at most: `capture` is
/// rejected anywhere but `Idle`.
pub struct CaptureSession {
    facing: Facing,
    phase: Phase,
    picture: Option<Vec<u8>>,
}

impl CaptureSession {
    pub fn new() -> Self {
        CaptureSession {
            facing: Facing::Back,
            phase: Phase::Idle,
            picture: None,
        }
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn picture(&self) -> Option<&[u8]> {
        self.picture.as_deref()
    }

    /// Flips between front and back. Phase is untouched.
    pub fn toggle_facing(&mut self) {
        self.facing = self.facing.toggled();
    }

    /// Accepts a frame from the camera, corrects its orientation when the
    /// front camera took it, and locks the session while the upload runs.
    /// Returns the corrected frame to hand to the upload client.
    pub fn capture(&mut self, frame: &[u8]) -> Result<&[u8], CaptureError> {
        if self.phase != Phase::Idle {
            return Err(CaptureError::Busy);
        }
        let corrected = orient_frame(frame, self.facing)?;
        self.phase = Phase::Pending;
        Ok(self.picture.insert(corrected))
    }

    /// Upload completion callback. `Some` swaps in the generated picture
    /// and enters review; `None` enters the error phase with the capture
    /// still on screen. Ignored outside `Pending`.
    pub fn resolve(&mut self, generated: Option<Vec<u8>>) {
        if self.phase != Phase::Pending {
            return;
        }
        match generated {
            Some(picture) => {
                self.picture = Some(picture);
                self.phase = Phase::Review;
            }
            None => self.phase = Phase::Error,
        }
    }

    /// Back to the camera. Only reachable from review or error; the
    /// stored picture is discarded.
    pub fn reset(&mut self) -> Result<(), CaptureError> {
        match self.phase {
            Phase::Review | Phase::Error => {
                self.picture = None;
                self.phase = Phase::Idle;
                Ok(())
            }
            _ => Err(CaptureError::NotResolved),
        }
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Front-camera frames arrive mirrored and upside-down relative to the
/// preview; a 180° rotation plus a vertical flip puts them right. Back
/// frames pass through untouched.
pub fn orient_frame(frame: &[u8], facing: Facing) -> Result<Vec<u8>, image::ImageError> {
    match facing {
        Facing::Back => Ok(frame.to_vec()),
        Facing::Front => {
            let img = image::load_from_memory(frame)?;
            let fixed = img.rotate180().flipv();
            let mut png = Vec::new();
            fixed.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;
            Ok(png)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(img: &RgbaImage) -> Vec<u8> {
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    fn two_pixel_frame() -> Vec<u8> {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        png_bytes(&img)
    }

    #[test]
    fn back_frames_pass_through_unmodified() {
        let frame = two_pixel_frame();
        assert_eq!(orient_frame(&frame, Facing::Back).unwrap(), frame);
    }

    #[test]
    fn front_frames_are_rotated_and_flipped() {
        let frame = two_pixel_frame();
        let fixed = orient_frame(&frame, Facing::Front).unwrap();
        let img = image::load_from_memory(&fixed).unwrap().to_rgba8();
        // rotate180 then flipv swaps the two pixels horizontally.
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn capture_is_rejected_while_pending() {
        let frame = two_pixel_frame();
        let mut session = CaptureSession::new();
        session.capture(&frame).unwrap();
        assert_eq!(session.phase(), Phase::Pending);
        assert!(matches!(session.capture(&frame), Err(CaptureError::Busy)));
        assert_eq!(session.phase(), Phase::Pending);
    }

    #[test]
    fn toggle_facing_leaves_phase_alone() {
        let mut session = CaptureSession::new();
        assert_eq!(session.facing(), Facing::Back);
        session.toggle_facing();
        assert_eq!(session.facing(), Facing::Front);
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn successful_resolve_enters_review_with_the_generated_picture() {
        let mut session = CaptureSession::new();
        session.capture(&two_pixel_frame()).unwrap();
        session.resolve(Some(vec![1, 2, 3]));
        assert_eq!(session.phase(), Phase::Review);
        assert_eq!(session.picture(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn failed_resolve_enters_error_keeping_the_capture() {
        let mut session = CaptureSession::new();
        let capture = session.capture(&two_pixel_frame()).unwrap().to_vec();
        session.resolve(None);
        assert_eq!(session.phase(), Phase::Error);
        assert_eq!(session.picture(), Some(&capture[..]));
    }

    #[test]
    fn reset_only_from_review_or_error() {
        let mut session = CaptureSession::new();
        assert!(session.reset().is_err());

        session.capture(&two_pixel_frame()).unwrap();
        assert!(session.reset().is_err());

        session.resolve(None);
        session.reset().unwrap();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.picture().is_none());

        session.capture(&two_pixel_frame()).unwrap();
        session.resolve(Some(vec![9]));
        session.reset().unwrap();
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.picture().is_none());
    }

    #[test]
    fn resolve_outside_pending_is_ignored() {
        let mut session = CaptureSession::new();
        session.resolve(Some(vec![1]));
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.picture().is_none());
    }
}
