//! Core console primitives and traits.

pub mod bits;
pub mod logging;
pub mod palette;
pub mod types {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }

        /// Pixel at (x, y), or `None` outside the frame.
        pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
            if x >= self.width || y >= self.height {
                return None;
            }
            self.pixels.get((y * self.width + x) as usize).copied()
        }

        /// One full row of pixels.
        pub fn row(&self, y: u32) -> &[u32] {
            let start = (y * self.width) as usize;
            &self.pixels[start..start + self.width as usize]
        }
    }

    pub type AudioSample = i16;
}

use serde_json::Value;

/// A high-level System trait tying a console and its host frame pump together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return to the freshly-loaded state of the current cart.
    fn reset(&mut self);

    /// Run one full frame (tick start, guest tick, tick end, blit) and return the framebuffer.
    fn step_frame(&mut self) -> Result<types::Frame, Self::Error>;

    /// Return a JSON-serializable save state.
    /// Note: Save states should NOT include cart data.
    fn save_state(&self) -> Value;

    /// Load a JSON save state.
    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error>;

    /// Check if this system supports save/load state functionality
    fn supports_save_states(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_initialization() {
        let f = types::Frame::new(10, 10);
        assert_eq!(f.pixels.len(), 100);
        assert_eq!(f.width, 10);
        assert_eq!(f.height, 10);
    }

    #[test]
    fn frame_pixel_access() {
        let mut f = types::Frame::new(4, 2);
        f.pixels[5] = 0xFF00FF00;
        assert_eq!(f.pixel(1, 1), Some(0xFF00FF00));
        assert_eq!(f.pixel(4, 0), None);
        assert_eq!(f.row(1), &[0, 0xFF00FF00, 0, 0]);
    }

    struct MockSystem {
        frames: u32,
    }

    impl System for MockSystem {
        type Error = std::convert::Infallible;

        fn reset(&mut self) {
            self.frames = 0;
        }

        fn step_frame(&mut self) -> Result<types::Frame, Self::Error> {
            self.frames += 1;
            Ok(types::Frame::new(2, 2))
        }

        fn save_state(&self) -> serde_json::Value {
            serde_json::json!({"mock": true, "version": 1, "frames": self.frames})
        }

        fn load_state(&mut self, v: &serde_json::Value) -> Result<(), serde_json::Error> {
            if let Some(frames) = v.get("frames").and_then(|f| f.as_u64()) {
                self.frames = frames as u32;
            }
            Ok(())
        }
    }

    #[test]
    fn mock_system_save_load_roundtrip() {
        let mut sys = MockSystem { frames: 0 };
        sys.step_frame().unwrap();
        sys.step_frame().unwrap();
        let v = sys.save_state();
        let s = serde_json::to_string(&v).expect("serialize");
        let v2: serde_json::Value = serde_json::from_str(&s).expect("deserialize");
        let mut sys2 = MockSystem { frames: 0 };
        assert!(sys2.load_state(&v2).is_ok());
        assert_eq!(sys2.frames, 2);
    }

    #[test]
    fn test_system_supports_save_states() {
        let sys = MockSystem { frames: 0 };
        // Default implementation returns false
        assert!(!sys.supports_save_states());
    }

    #[test]
    fn test_system_reset() {
        let mut sys = MockSystem { frames: 3 };
        sys.reset();
        assert_eq!(sys.frames, 0);
    }
}
