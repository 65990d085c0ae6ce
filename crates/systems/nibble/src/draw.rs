//! Drawing primitives over the screen bitmap.
//!
//! Colors are mapped through the palette map before they are stored, and every
//! write goes through [`Ram`] so the overlay dirty mask sees it.

use crate::memory::{layout, Ram, HEIGHT, WIDTH};

/// Drawing clip rectangle, `[l, r) x [t, b)` in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRect {
    pub l: i32,
    pub t: i32,
    pub r: i32,
    pub b: i32,
}

impl ClipRect {
    pub const FULL: ClipRect = ClipRect {
        l: 0,
        t: 0,
        r: WIDTH as i32,
        b: HEIGHT as i32,
    };

    /// Clip to a rectangle, clamped to the screen.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            l: x.max(0),
            t: y.max(0),
            r: x.saturating_add(width).min(WIDTH as i32),
            b: y.saturating_add(height).min(HEIGHT as i32),
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.l && y >= self.t && x < self.r && y < self.b
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

impl Default for ClipRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Pixel drawing context: RAM plus the active clip.
pub struct Canvas<'a> {
    ram: &'a mut Ram,
    clip: ClipRect,
}

impl<'a> Canvas<'a> {
    pub fn new(ram: &'a mut Ram, clip: ClipRect) -> Self {
        Self { ram, clip }
    }

    /// Fill the clip area.
    pub fn cls(&mut self, color: u8) {
        let color = self.ram.map_color(color);
        if self.clip.is_full() {
            let fill = color | (color << 4);
            self.ram.memset(layout::SCREEN.offset as i64, fill, layout::SCREEN.size as i64);
        } else {
            let c = self.clip;
            self.fill(c.l, c.t, c.r - c.l, c.b - c.t, color);
        }
    }

    pub fn pix(&mut self, x: i32, y: i32, color: u8) {
        let color = self.ram.map_color(color);
        self.put(x, y, color);
    }

    /// Screen pixel at `(x, y)`, 0 outside the screen.
    pub fn get_pix(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= WIDTH as i32 || y >= HEIGHT as i32 {
            return 0;
        }
        self.ram.screen_pixel(y as usize * WIDTH + x as usize)
    }

    pub fn rect(&mut self, x: i32, y: i32, width: i32, height: i32, color: u8) {
        let color = self.ram.map_color(color);
        self.fill(x, y, width, height, color);
    }

    pub fn rectb(&mut self, x: i32, y: i32, width: i32, height: i32, color: u8) {
        if width <= 0 || height <= 0 {
            return;
        }
        let color = self.ram.map_color(color);
        self.fill(x, y, width, 1, color);
        self.fill(x, y + height - 1, width, 1, color);
        self.fill(x, y, 1, height, color);
        self.fill(x + width - 1, y, 1, height, color);
    }

    /// Bresenham line, clipped to the clip rect before it is walked.
    pub fn line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u8) {
        let color = self.ram.map_color(color);
        let Some((x0, y0, x1, y1)) = self.clip_segment(x0, y0, x1, y1) else {
            return;
        };
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = ((x1 - x0).signum(), (y1 - y0).signum());
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.put(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Liang-Barsky clip of a segment to the inclusive clip pixels.
    fn clip_segment(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> Option<(i32, i32, i32, i32)> {
        let c = self.clip;
        if c.l >= c.r || c.t >= c.b {
            return None;
        }
        let (fx0, fy0) = (x0 as f64, y0 as f64);
        let (dx, dy) = (x1 as f64 - fx0, y1 as f64 - fy0);
        let edges = [
            (-dx, fx0 - c.l as f64),
            (dx, (c.r - 1) as f64 - fx0),
            (-dy, fy0 - c.t as f64),
            (dy, (c.b - 1) as f64 - fy0),
        ];
        let (mut enter, mut leave) = (0.0f64, 1.0f64);
        for (p, q) in edges {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                enter = enter.max(r);
            } else {
                leave = leave.min(r);
            }
            if enter > leave {
                return None;
            }
        }
        let at = |t: f64| ((fx0 + t * dx).round() as i32, (fy0 + t * dy).round() as i32);
        let ((ax, ay), (bx, by)) = (at(enter), at(leave));
        Some((ax, ay, bx, by))
    }

    fn fill(&mut self, x: i32, y: i32, width: i32, height: i32, color: u8) {
        let l = x.max(self.clip.l);
        let t = y.max(self.clip.t);
        let r = x.saturating_add(width).min(self.clip.r);
        let b = y.saturating_add(height).min(self.clip.b);
        for py in t..b {
            for px in l..r {
                self.ram.set_screen_pixel(py as usize * WIDTH + px as usize, color);
            }
        }
    }

    fn put(&mut self, x: i32, y: i32, color: u8) {
        if self.clip.contains(x, y) {
            self.ram.set_screen_pixel(y as usize * WIDTH + x as usize, color);
        }
    }
}
